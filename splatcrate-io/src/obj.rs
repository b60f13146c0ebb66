//! OBJ mesh loading

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use ::obj::{IndexTuple, ObjData};
use splatcrate_core::{Error, Result};
use tracing::{debug, info};

/// Triangle mesh as read from a Wavefront OBJ file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl ObjMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Read a triangulated OBJ mesh.
///
/// Files without normals get per-face normals accumulated onto their
/// vertices.
pub fn read_obj_mesh<P: AsRef<Path>>(path: P) -> Result<ObjMesh> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound {
            path: path.display().to_string(),
        },
        _ => Error::Io(e),
    })?;

    let mesh = parse_obj(&bytes)?;
    info!(
        "loaded mesh {} ({} vertices, {} triangles)",
        path.display(),
        mesh.vertex_count(),
        mesh.triangle_count()
    );
    Ok(mesh)
}

/// Parse OBJ text already in memory.
///
/// Polygons are fan-triangulated. Corners sharing a position and normal
/// index become one vertex. A file without faces is `InvalidData`.
pub fn parse_obj(bytes: &[u8]) -> Result<ObjMesh> {
    let data = ObjData::load_buf(bytes).map_err(|e| Error::InvalidData(format!("failed to parse OBJ: {}", e)))?;

    let corners: Vec<IndexTuple> = data
        .objects
        .iter()
        .flat_map(|object| object.groups.iter())
        .flat_map(|group| group.polys.iter())
        .filter(|poly| poly.0.len() >= 3)
        .flat_map(|poly| {
            let first = poly.0[0];
            poly.0.windows(2).skip(1).flat_map(move |pair| [first, pair[0], pair[1]])
        })
        .collect();
    if corners.is_empty() {
        return Err(Error::InvalidData("OBJ contains no triangles".to_string()));
    }

    let has_normals = corners.iter().all(|IndexTuple(_, _, n)| n.is_some());
    if !has_normals {
        debug!("OBJ has no usable normals, computing them from faces");
    }

    let mut mesh = ObjMesh::default();
    let mut vertex_ids: HashMap<(usize, Option<usize>), u32> = HashMap::new();
    for &IndexTuple(p, _, n) in &corners {
        let n = if has_normals { n } else { None };
        let id = match vertex_ids.get(&(p, n)) {
            Some(&id) => id,
            None => {
                let position = *data
                    .position
                    .get(p)
                    .ok_or_else(|| Error::InvalidData(format!("OBJ position index {} out of range", p + 1)))?;
                mesh.positions.push(position);
                if let Some(n) = n {
                    let normal = *data
                        .normal
                        .get(n)
                        .ok_or_else(|| Error::InvalidData(format!("OBJ normal index {} out of range", n + 1)))?;
                    mesh.normals.push(normal);
                }
                let id = vertex_ids.len() as u32;
                vertex_ids.insert((p, n), id);
                id
            }
        };
        mesh.indices.push(id);
    }

    if !has_normals {
        mesh.normals = face_normals(&mesh.positions, &mesh.indices);
    }
    Ok(mesh)
}

fn face_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![[0.0f32; 3]; positions.len()];

    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let (pa, pb, pc) = (positions[a], positions[b], positions[c]);
        let e1 = [pb[0] - pa[0], pb[1] - pa[1], pb[2] - pa[2]];
        let e2 = [pc[0] - pa[0], pc[1] - pa[1], pc[2] - pa[2]];
        let n = [
            e1[1] * e2[2] - e1[2] * e2[1],
            e1[2] * e2[0] - e1[0] * e2[2],
            e1[0] * e2[1] - e1[1] * e2[0],
        ];
        for &i in &[a, b, c] {
            for k in 0..3 {
                normals[i][k] += n[k];
            }
        }
    }

    for n in &mut normals {
        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        if len > f32::EPSILON {
            for v in n.iter_mut() {
                *v /= len;
            }
        } else {
            *n = [0.0, 1.0, 0.0];
        }
    }

    normals
}
