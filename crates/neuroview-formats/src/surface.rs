//! FreeSurfer triangle surface decoding
//!
//! Layout (all numeric fields big-endian):
//!
//! ```text
//! [3]  magic
//! [..] free-text info line, terminated by "\n\n"
//! [4]  vertex count
//! [4]  face count
//! [vertex count * 12] x, y, z positions as f32
//! [face count * 12]   triangle vertex indices as u32
//! ```
//!
//! Decoding derives smooth per-vertex normals and face-unrolled position and
//! normal buffers so that every triangle corner owns its own entry.

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::cursor::ByteCursor;
use crate::error::FormatError;
use crate::geometry::{face_normal, unroll_by_faces, Bounds, Placement, Vec3};
use crate::Result;

/// Magic number of a FreeSurfer triangle surface file
pub const TRIANGLE_FILE_MAGIC: u32 = 16_777_214;

/// Maximum number of bytes scanned for the end of the info line
const HEADER_SCAN_LIMIT: usize = 200;

/// A decoded cortical surface mesh
#[derive(Debug, Clone, Serialize)]
pub struct Surface {
    /// 24-bit magic read from the first three bytes
    pub magic: u32,
    /// Info line stored between the magic and the vertex count
    pub info: String,
    /// Vertex positions, x,y,z triplets
    pub positions: Vec<f32>,
    /// Triangle vertex indices, one triplet per face
    pub indices: Vec<u32>,
    /// Averaged per-vertex normals, x,y,z triplets
    pub vertex_normals: Vec<f32>,
    /// Positions unrolled per triangle corner (9 floats per face)
    pub position_buffer: Vec<f32>,
    /// Normals unrolled per triangle corner (9 floats per face)
    pub normal_buffer: Vec<f32>,
    /// Bounds over every vertex position
    pub bounds: Option<Bounds>,
    pub placement: Placement,
    /// Vertices not referenced by any face
    pub orphan_vertices: usize,
}

impl Surface {
    /// Decode a surface from a fully buffered file
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);

        let magic = cursor.read_u24_be()?;
        if magic != TRIANGLE_FILE_MAGIC {
            warn!("Unexpected surface magic {:#08x}, decoding anyway", magic);
        }

        let mut info = Vec::new();
        for _ in 0..HEADER_SCAN_LIMIT {
            let byte = cursor.read_u8()?;
            if byte == b'\n' {
                break;
            }
            info.push(byte);
        }
        // Second newline of the terminator
        cursor.skip(1)?;

        let vertex_count = cursor.read_u32_be()? as usize;
        let face_count = cursor.read_u32_be()? as usize;
        debug!(
            "Surface header: {} vertices, {} faces",
            vertex_count, face_count
        );

        let positions = cursor.read_f32_be_array(vertex_count.saturating_mul(3))?;
        let indices = cursor.read_u32_be_array(face_count.saturating_mul(3))?;

        let info = String::from_utf8_lossy(&info).into_owned();
        Self::from_parts(magic, info, positions, indices)
    }

    /// Build a surface from raw positions and indices, deriving normals,
    /// unrolled buffers and placement.
    pub fn from_parts(
        magic: u32,
        info: String,
        positions: Vec<f32>,
        indices: Vec<u32>,
    ) -> Result<Self> {
        let vertex_count = positions.len() / 3;

        if let Some((corner, &index)) = indices
            .iter()
            .enumerate()
            .find(|&(_, &index)| index as usize >= vertex_count)
        {
            return Err(FormatError::IndexOutOfRange {
                face: corner / 3,
                index,
                vertex_count,
            });
        }

        let (vertex_normals, orphan_vertices) = average_vertex_normals(&positions, &indices);
        if orphan_vertices > 0 {
            warn!(
                "{} of {} vertices belong to no face; their normals are set to zero",
                orphan_vertices, vertex_count
            );
        }

        trace!("Unrolling {} faces", indices.len() / 3);
        let position_buffer = unroll_by_faces(&positions, 3, &indices);
        let normal_buffer = unroll_by_faces(&vertex_normals, 3, &indices);

        let bounds = Bounds::from_points(positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]));
        let placement = Placement::from_bounds(bounds.as_ref());

        Ok(Self {
            magic,
            info,
            positions,
            indices,
            vertex_normals,
            position_buffer,
            normal_buffer,
            bounds,
            placement,
            orphan_vertices,
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn face_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Number of vertices in the unrolled buffers
    pub fn rendered_vertex_count(&self) -> usize {
        self.indices.len()
    }

    pub fn vertex(&self, index: usize) -> Vec3 {
        let p = &self.positions[index * 3..index * 3 + 3];
        [p[0], p[1], p[2]]
    }

    pub fn vertex_normal(&self, index: usize) -> Vec3 {
        let n = &self.vertex_normals[index * 3..index * 3 + 3];
        [n[0], n[1], n[2]]
    }

    pub fn face(&self, index: usize) -> [u32; 3] {
        let f = &self.indices[index * 3..index * 3 + 3];
        [f[0], f[1], f[2]]
    }

    /// Whether the magic identifies a FreeSurfer triangle file
    pub fn is_triangle_file(&self) -> bool {
        self.magic == TRIANGLE_FILE_MAGIC
    }
}

/// Accumulate unit face normals onto their vertices and average them.
///
/// Returns the normals and the number of vertices no face touched; those
/// keep a zero normal.
fn average_vertex_normals(positions: &[f32], indices: &[u32]) -> (Vec<f32>, usize) {
    let vertex_count = positions.len() / 3;
    let mut sums = vec![0.0f32; vertex_count * 3];
    let mut counts = vec![0u32; vertex_count];

    let vertex = |i: usize| -> Vec3 { [positions[i * 3], positions[i * 3 + 1], positions[i * 3 + 2]] };

    for face in indices.chunks_exact(3) {
        let corners = [face[0] as usize, face[1] as usize, face[2] as usize];
        let normal = face_normal(vertex(corners[0]), vertex(corners[1]), vertex(corners[2]));

        for &v in &corners {
            sums[v * 3] += normal[0];
            sums[v * 3 + 1] += normal[1];
            sums[v * 3 + 2] += normal[2];
            counts[v] += 1;
        }
    }

    let mut orphans = 0;
    for (v, &count) in counts.iter().enumerate() {
        if count == 0 {
            orphans += 1;
            continue;
        }
        let count = count as f32;
        sums[v * 3] /= count;
        sums[v * 3 + 1] /= count;
        sums[v * 3 + 2] /= count;
    }

    (sums, orphans)
}
