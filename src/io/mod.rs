//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - per-voxel result exports (`export`)
//! - run manifest JSON read/write (`manifest`)
//! - directory and file naming conventions (`layout`)

pub mod export;
pub mod ingest;
pub mod layout;
pub mod manifest;

pub use export::*;
pub use ingest::*;
pub use layout::*;
pub use manifest::*;
