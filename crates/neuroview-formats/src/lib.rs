//! Decoders for neuroimaging datasets
//!
//! This crate turns FreeSurfer surfaces and curvature maps, TrackVis fiber
//! tracks and Connectome Mapping Toolkit graphs into flat numeric buffers
//! ready for geometric analysis or upload to a renderer. Every decoder works
//! synchronously on a fully buffered file and owns its output.

pub mod connectome;
pub mod cursor;
pub mod curvature;
pub mod encode;
pub mod error;
pub mod geometry;
pub mod histogram;
pub mod surface;
pub mod tracks;

// Re-export commonly used types
pub use connectome::{ConnectomeEdge, ConnectomeEdges, ConnectomeGraph, ConnectomeNode, ConnectomeNodes};
pub use cursor::ByteCursor;
pub use curvature::{Curvature, CurvatureMap, CurvatureStats};
pub use error::FormatError;
pub use geometry::{Bounds, Placement, Vec3};
pub use histogram::Histogram;
pub use surface::Surface;
pub use tracks::{Track, TrackHeader, TrackSet};

/// Result type for decoding operations
pub type Result<T> = std::result::Result<T, FormatError>;
