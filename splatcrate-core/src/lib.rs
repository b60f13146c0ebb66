//! Core data types for splatcrate
//!
//! This crate holds the pieces shared by the I/O, GPU and viewer crates: the
//! Gaussian record layout, object transforms, render objects and the common
//! error type.

pub mod error;
pub mod gaussian;
pub mod object;
pub mod transform;

pub use error::*;
pub use gaussian::*;
pub use object::*;
pub use transform::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

/// Common result type for splatcrate operations
pub type Result<T> = std::result::Result<T, Error>;
