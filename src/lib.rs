//! arcprobe - archive format detection and item listing
//!
//! Tries an ordered catalog of container formats against a seekable stream,
//! opens the first one that matches, looks inside single-stream wrappers
//! such as gzip or xz, and turns each format's native metadata into uniform
//! [`Item`] records.

pub mod catalog;
pub mod cli;
pub mod context;
pub mod detect;
pub mod error;
pub mod formats;
pub mod item;
pub mod list;
pub mod progress;
pub mod session;
pub mod stream;
pub mod utils;

// re-export main types for convenience
pub use catalog::{FormatCatalog, FormatId};
pub use context::ProbeContext;
pub use detect::{DetectOptions, Detection, Detector, OpenedArchive};
pub use error::{Error, Result};
pub use item::{Item, Stat};
pub use stream::StreamHandle;
