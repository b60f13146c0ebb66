//! # splatcrate viewer
//!
//! Window and frame loop around `splatcrate-gpu`: command line configuration,
//! a first-person camera driven from the keyboard, and the per-frame update of
//! the global uniform block.

pub mod app;
pub mod camera;
pub mod config;
pub mod controller;

pub use app::SplatViewer;
pub use camera::Camera;
pub use config::ViewerConfig;
pub use controller::{KeyMappings, KeyboardMovementController};
