//! Integration tests for splatcrate-io
//!
//! These tests write small scene files to the temp directory and load them
//! back through the public entry points.

use std::path::PathBuf;

use splatcrate_core::{Error, GaussianRecord};
use splatcrate_io::{load_gaussians, read_obj_mesh, GaussianPlyReader, PlyFormat};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("splatcrate_it_{}_{}", std::process::id(), name))
}

fn splat_file(declared: usize, records: &[GaussianRecord]) -> Vec<u8> {
    let mut bytes = format!(
        "ply\nformat binary_little_endian 1.0\nelement vertex {}\nproperty float x\nproperty float y\nproperty float z\nend_header\n",
        declared
    )
    .into_bytes();
    bytes.extend_from_slice(bytemuck::cast_slice(records));
    bytes
}

#[test]
fn test_splat_cloud_round_trip_through_disk() {
    let records: Vec<GaussianRecord> = (0..5)
        .map(|i| {
            let mut record = GaussianRecord::new([i as f32, 0.5, -1.0], [0.1, 0.2, 0.3], 0.75);
            record.sh[0] = 0.25 * i as f32;
            record
        })
        .collect();
    let path = temp_path("cloud.ply");
    std::fs::write(&path, splat_file(records.len(), &records)).unwrap();

    let cloud = GaussianPlyReader::read_path(&path).unwrap();
    assert_eq!(cloud.header.num_vertices, 5);
    assert_eq!(cloud.header.binary_format(), Some(PlyFormat::BinaryLittleEndian));
    assert_eq!(cloud.records, records);
    assert_eq!(cloud.records[4].sh_dc()[0], 1.0);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_truncated_file_on_disk() {
    let records = vec![GaussianRecord::default(); 2];
    let path = temp_path("truncated.ply");
    std::fs::write(&path, splat_file(3, &records)).unwrap();

    match load_gaussians(&path) {
        Err(Error::TruncatedRecords { expected, read }) => {
            assert_eq!((expected, read), (3, 2));
        }
        other => panic!("expected TruncatedRecords, got {:?}", other),
    }

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_obj_mesh_from_disk() {
    let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 0 0 1\nf 1 2 3\nf 1 3 4\n";
    let path = temp_path("mesh.obj");
    std::fs::write(&path, text).unwrap();

    let mesh = read_obj_mesh(&path).unwrap();
    assert_eq!(mesh.triangle_count(), 2);
    assert_eq!(mesh.normals.len(), mesh.positions.len());

    std::fs::remove_file(&path).unwrap();
}
