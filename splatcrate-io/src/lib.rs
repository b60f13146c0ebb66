//! File loading for splatcrate
//!
//! - PLY Gaussian splat clouds, read as packed binary records
//! - Wavefront OBJ triangle meshes

pub mod obj;
pub mod ply;

pub use self::obj::{parse_obj, read_obj_mesh, ObjMesh};
pub use self::ply::{load_gaussians, GaussianCloud, GaussianPlyReader, PlyFormat, PlyHeader, PlyProperty};
