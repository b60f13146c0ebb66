//! PLY Gaussian splat ingestion
//!
//! Reads the text header of a PLY file and then the binary body as a packed
//! array of [`GaussianRecord`]s. The body is reinterpreted byte for byte; the
//! declared properties are recorded but do not drive any field remapping.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use splatcrate_core::{Error, GaussianRecord, Result, RECORD_FLOAT_COUNT};
use tracing::{debug, info, warn};

/// Line that terminates the text header.
pub const END_HEADER: &str = "end_header";

/// Upper bound on the capacity reserved up front from an untrusted count.
const MAX_RESERVE: usize = 1 << 20;

/// A `property <type> <name>` declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlyProperty {
    pub ty: String,
    pub name: String,
}

/// Body encoding named on the `format` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlyFormat {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

/// Parsed PLY header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlyHeader {
    pub format: String,
    pub num_vertices: usize,
    pub num_faces: usize,
    pub vertex_properties: Vec<PlyProperty>,
    pub face_properties: Vec<PlyProperty>,
}

impl PlyHeader {
    /// Read header lines from `reader` up to and including `end_header`.
    ///
    /// The reader is left positioned at the first byte of the body.
    pub fn parse<R: BufRead>(reader: &mut R) -> Result<Self> {
        let mut header = PlyHeader::default();
        let mut line = Vec::new();

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                return Err(Error::HeaderMalformed(format!(
                    "reached end of input before '{}'",
                    END_HEADER
                )));
            }

            let text = String::from_utf8_lossy(&line);
            let mut tokens = text.split_whitespace();
            let Some(keyword) = tokens.next() else {
                continue;
            };

            match keyword {
                "format" => {
                    header.format = tokens.next().unwrap_or_default().to_string();
                }
                "element" => {
                    let name = tokens.next().unwrap_or_default();
                    match name {
                        "vertex" => header.num_vertices = parse_count(name, tokens.next())?,
                        "face" => header.num_faces = parse_count(name, tokens.next())?,
                        other => debug!("ignoring PLY element '{}'", other),
                    }
                }
                "property" => {
                    let property = parse_property(tokens.collect())?;
                    // Properties fill the vertex list up to the declared vertex
                    // count; anything past that is attributed to faces.
                    if header.vertex_properties.len() < header.num_vertices {
                        header.vertex_properties.push(property);
                    } else {
                        header.face_properties.push(property);
                    }
                }
                END_HEADER => return Ok(header),
                _ => {}
            }
        }
    }

    /// Encoding of the body, if the format string is one PLY defines
    pub fn binary_format(&self) -> Option<PlyFormat> {
        match self.format.as_str() {
            "ascii" => Some(PlyFormat::Ascii),
            "binary_little_endian" => Some(PlyFormat::BinaryLittleEndian),
            "binary_big_endian" => Some(PlyFormat::BinaryBigEndian),
            _ => None,
        }
    }

    /// Bytes per binary record
    pub fn record_stride(&self) -> usize {
        GaussianRecord::SIZE
    }

    /// Total number of body bytes the header promises
    pub fn body_len(&self) -> usize {
        self.num_vertices.saturating_mul(self.record_stride())
    }

    fn check_layout(&self) {
        let native = if cfg!(target_endian = "little") {
            PlyFormat::BinaryLittleEndian
        } else {
            PlyFormat::BinaryBigEndian
        };
        if self.binary_format() != Some(native) {
            warn!(
                "PLY format '{}' is not the native binary encoding; records are read as-is",
                self.format
            );
        }

        let all_float = !self.vertex_properties.is_empty()
            && self.vertex_properties.iter().all(|p| p.ty == "float");
        if all_float && self.vertex_properties.len() != RECORD_FLOAT_COUNT {
            warn!(
                "PLY declares {} float vertex properties but records hold {} floats",
                self.vertex_properties.len(),
                RECORD_FLOAT_COUNT
            );
        }
    }
}

fn parse_count(element: &str, token: Option<&str>) -> Result<usize> {
    let token = token.ok_or_else(|| {
        Error::HeaderMalformed(format!("element '{}' is missing its count", element))
    })?;
    token.parse::<usize>().map_err(|_| {
        Error::HeaderMalformed(format!("element '{}' has invalid count '{}'", element, token))
    })
}

fn parse_property(tokens: Vec<&str>) -> Result<PlyProperty> {
    match tokens.as_slice() {
        ["list", _, _, name] => Ok(PlyProperty {
            ty: "list".to_string(),
            name: name.to_string(),
        }),
        [ty, name] => Ok(PlyProperty {
            ty: ty.to_string(),
            name: name.to_string(),
        }),
        _ => Err(Error::HeaderMalformed(format!(
            "unrecognized property declaration '{}'",
            tokens.join(" ")
        ))),
    }
}

/// Header and records of a loaded splat file
#[derive(Debug, Clone)]
pub struct GaussianCloud {
    pub header: PlyHeader,
    pub records: Vec<GaussianRecord>,
}

impl GaussianCloud {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One-shot reader for Gaussian splat PLY files
pub struct GaussianPlyReader;

impl GaussianPlyReader {
    /// Load every record from the file at `path`
    pub fn read_path<P: AsRef<Path>>(path: P) -> Result<GaussianCloud> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::FileNotFound {
                path: path.display().to_string(),
            },
            _ => Error::Io(e),
        })?;

        let start = Instant::now();
        let cloud = Self::read(&mut BufReader::new(file))?;
        info!(
            "loaded {} gaussians from {} in {:.1} ms",
            cloud.len(),
            path.display(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(cloud)
    }

    /// Parse a header followed by exactly `num_vertices` records
    pub fn read<R: BufRead>(reader: &mut R) -> Result<GaussianCloud> {
        let header = PlyHeader::parse(reader)?;
        header.check_layout();
        debug!(
            "PLY header: format={} vertices={} faces={} vertex properties={}",
            header.format,
            header.num_vertices,
            header.num_faces,
            header.vertex_properties.len()
        );

        let records = read_records(reader, header.num_vertices)?;
        Ok(GaussianCloud { header, records })
    }
}

fn read_records<R: Read>(reader: &mut R, expected: usize) -> Result<Vec<GaussianRecord>> {
    let mut records = Vec::with_capacity(expected.min(MAX_RESERVE));
    let mut block = [0u8; GaussianRecord::SIZE];

    for read in 0..expected {
        match reader.read_exact(&mut block) {
            Ok(()) => records.push(bytemuck::pod_read_unaligned(&block)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(Error::TruncatedRecords { expected, read });
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }

    Ok(records)
}

/// Convenience wrapper around [`GaussianPlyReader::read_path`]
pub fn load_gaussians<P: AsRef<Path>>(path: P) -> Result<Vec<GaussianRecord>> {
    GaussianPlyReader::read_path(path).map(|cloud| cloud.records)
}
