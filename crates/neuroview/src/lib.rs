//! neuroview dataset tooling
//!
//! Configuration, file discovery, background decoding and export built on
//! top of the `neuroview-formats` decoders.

pub mod cli;
pub mod discovery;
pub mod export;
pub mod loader;
pub mod settings;

// Re-export commonly used types
pub use discovery::{discover_datasets, DatasetFile, DatasetKind, DatasetPatterns, Hemisphere};
pub use export::{export_directory, export_file, ExportError, ExportOptions, ExportStats};
pub use loader::{AsyncLoader, DecodedAsset, LoadError, LoadHandle, LoadResult, LoadStatus, Scene};
pub use settings::{Settings, SettingsError};
