//! Error type shared by every decoder

use thiserror::Error;

/// Errors raised while decoding a dataset buffer
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Unexpected end of buffer: needed {needed} bytes at offset {offset}, buffer is {len} bytes")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("Invalid magic number: expected {expected:#08x}, got {received:#08x}")]
    BadMagic { expected: u32, received: u32 },

    #[error("Face {face} references vertex {index}, but the mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        face: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("Vertex count mismatch: curvature has {curvature}, surface has {surface}")]
    VertexCountMismatch { curvature: usize, surface: usize },

    #[error("Connectome references unknown node {0}")]
    UnknownNode(usize),

    #[error("Invalid node key: {0}")]
    InvalidNodeKey(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
