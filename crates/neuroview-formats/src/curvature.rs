//! FreeSurfer "new format" curvature decoding
//!
//! Layout (big-endian):
//!
//! ```text
//! [3] magic, always 0xffffff
//! [4] vertex count
//! [4] face count (unused)
//! [4] values per vertex (unused)
//! [vertex count * 4] f32 values
//! ```

use serde::Serialize;
use tracing::debug;

use crate::cursor::ByteCursor;
use crate::error::FormatError;
use crate::surface::Surface;
use crate::Result;

pub const CURVATURE_MAGIC: u32 = 16_777_215;

/// Standard deviations around the signed means used for the display range
pub const DISPLAY_RANGE_SIGMAS: f32 = 2.5;

/// Descriptive statistics of a curvature map, split by sign
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvatureStats {
    pub min: f32,
    pub max: f32,
    /// Values `>= 0`
    pub positive_count: usize,
    /// Values `< 0`
    pub negative_count: usize,
    pub positive_mean: f32,
    pub negative_mean: f32,
    pub positive_std_dev: f32,
    pub negative_std_dev: f32,
    pub mean: f32,
    pub std_dev: f32,
    /// `negative_mean - 2.5 * negative_std_dev`
    pub display_min: f32,
    /// `positive_mean + 2.5 * positive_std_dev`
    pub display_max: f32,
}

impl CurvatureStats {
    /// Two-pass statistics: sums and extrema first, squared deviations second.
    pub fn from_values(values: &[f32]) -> Self {
        let mut min = values.first().copied().unwrap_or(0.0);
        let mut max = min;

        let (mut pos_sum, mut neg_sum, mut sum) = (0.0f64, 0.0f64, 0.0f64);
        let (mut pos_count, mut neg_count) = (0usize, 0usize);

        for &value in values {
            if value >= 0.0 {
                pos_count += 1;
                pos_sum += value as f64;
            } else {
                neg_count += 1;
                neg_sum += value as f64;
            }
            sum += value as f64;

            if value > max {
                max = value;
            }
            if value < min {
                min = value;
            }
        }

        let positive_mean = mean_of(pos_sum, pos_count);
        let negative_mean = mean_of(neg_sum, neg_count);
        let mean = mean_of(sum, values.len());

        let (mut pos_sq, mut neg_sq, mut sq) = (0.0f64, 0.0f64, 0.0f64);
        for &value in values {
            let value = value as f64;
            if value >= 0.0 {
                pos_sq += (value - positive_mean).powi(2);
            } else {
                neg_sq += (value - negative_mean).powi(2);
            }
            sq += (value - mean).powi(2);
        }

        let positive_std_dev = sample_std_dev(pos_sq, pos_count);
        let negative_std_dev = sample_std_dev(neg_sq, neg_count);
        let std_dev = sample_std_dev(sq, values.len());

        let mut stats = Self {
            min,
            max,
            positive_count: pos_count,
            negative_count: neg_count,
            positive_mean: positive_mean as f32,
            negative_mean: negative_mean as f32,
            positive_std_dev: positive_std_dev as f32,
            negative_std_dev: negative_std_dev as f32,
            mean: mean as f32,
            std_dev: std_dev as f32,
            display_min: 0.0,
            display_max: 0.0,
        };
        let (display_min, display_max) = stats.display_range_with(DISPLAY_RANGE_SIGMAS);
        stats.display_min = display_min;
        stats.display_max = display_max;
        stats
    }

    /// Display range at `sigmas` standard deviations around the signed means
    pub fn display_range_with(&self, sigmas: f32) -> (f32, f32) {
        (
            self.negative_mean - sigmas * self.negative_std_dev,
            self.positive_mean + sigmas * self.positive_std_dev,
        )
    }
}

fn mean_of(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn sample_std_dev(squared_deviations: f64, count: usize) -> f64 {
    if count > 1 {
        (squared_deviations / (count - 1) as f64).sqrt()
    } else {
        0.0
    }
}

/// Per-vertex curvature values decoded without a paired surface
#[derive(Debug, Clone, Serialize)]
pub struct CurvatureMap {
    /// Face count field from the header, not used for decoding
    pub face_count: u32,
    /// Values-per-vertex field from the header, not used for decoding
    pub values_per_vertex: u32,
    pub values: Vec<f32>,
    pub stats: CurvatureStats,
}

impl CurvatureMap {
    /// Decode a curvature file on its own.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);

        let magic = cursor.read_u24_be()?;
        if magic != CURVATURE_MAGIC {
            return Err(FormatError::BadMagic {
                expected: CURVATURE_MAGIC,
                received: magic,
            });
        }

        let vertex_count = cursor.read_u32_be()? as usize;
        let face_count = cursor.read_u32_be()?;
        let values_per_vertex = cursor.read_u32_be()?;
        debug!("Curvature header: {} vertices", vertex_count);

        let values = cursor.read_f32_be_array(vertex_count)?;
        let stats = CurvatureStats::from_values(&values);

        Ok(Self {
            face_count,
            values_per_vertex,
            values,
            stats,
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.values.len()
    }

    /// Expand the values per triangle corner of `surface`, in face order.
    pub fn unroll_onto(&self, surface: &Surface) -> Result<Vec<f32>> {
        if self.values.len() != surface.vertex_count() {
            return Err(FormatError::VertexCountMismatch {
                curvature: self.values.len(),
                surface: surface.vertex_count(),
            });
        }

        Ok(surface
            .indices
            .iter()
            .map(|&index| self.values[index as usize])
            .collect())
    }
}

/// Curvature joined with the surface it describes
#[derive(Debug, Clone, Serialize)]
pub struct Curvature {
    pub map: CurvatureMap,
    /// One value per triangle corner, aligned with the surface's
    /// `position_buffer` and `normal_buffer`
    pub buffer: Vec<f32>,
}

impl Curvature {
    /// Decode a curvature file against an already decoded surface.
    pub fn decode(data: &[u8], surface: &Surface) -> Result<Self> {
        let map = CurvatureMap::decode(data)?;
        let buffer = map.unroll_onto(surface)?;
        Ok(Self { map, buffer })
    }

    pub fn stats(&self) -> &CurvatureStats {
        &self.map.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{encode_curvature, encode_surface};

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-5, "{a} != {b}");
    }

    #[test]
    fn test_signed_statistics() {
        let values = [-0.4, -0.2, 0.1, 0.3, 0.5];
        let stats = CurvatureStats::from_values(&values);

        assert_eq!(stats.min, -0.4);
        assert_eq!(stats.max, 0.5);
        assert_eq!(stats.positive_count, 3);
        assert_eq!(stats.negative_count, 2);
        assert_close(stats.positive_mean, 0.3);
        assert_close(stats.negative_mean, -0.3);
        assert_close(stats.mean, 0.06);

        // Sample standard deviations
        assert_close(stats.positive_std_dev, 0.2);
        assert_close(stats.negative_std_dev, (0.02f32).sqrt());
        assert_close(stats.display_min, -0.3 - 2.5 * (0.02f32).sqrt());
        assert_close(stats.display_max, 0.3 + 2.5 * 0.2);

        assert!(stats.negative_mean <= 0.0 && stats.positive_mean >= 0.0);
        assert!(stats.std_dev >= 0.0);
    }

    #[test]
    fn test_empty_subsets_degrade_to_zero() {
        let stats = CurvatureStats::from_values(&[0.25]);
        assert_eq!(stats.negative_mean, 0.0);
        assert_eq!(stats.negative_std_dev, 0.0);
        assert_eq!(stats.positive_std_dev, 0.0);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.min, 0.25);
        assert_eq!(stats.max, 0.25);

        let empty = CurvatureStats::from_values(&[]);
        assert_eq!(empty.mean, 0.0);
        assert_eq!(empty.min, 0.0);
    }

    #[test]
    fn test_zero_counts_as_positive() {
        let stats = CurvatureStats::from_values(&[0.0, -1.0]);
        assert_eq!(stats.positive_count, 1);
        assert_eq!(stats.negative_count, 1);
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let mut bytes = encode_curvature(&[0.1, 0.2], 0);
        bytes[2] = 0xfe;

        let err = CurvatureMap::decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            FormatError::BadMagic {
                expected: CURVATURE_MAGIC,
                received: 16_777_214
            }
        ));
    }

    #[test]
    fn test_unrolled_buffer_follows_faces() {
        let positions = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0];
        let indices = vec![0, 1, 2, 0, 2, 3];
        let surface = Surface::decode(&encode_surface("s", &positions, &indices)).unwrap();

        let bytes = encode_curvature(&[-1.0, 2.0, 3.0, -4.0], 2);
        let curvature = Curvature::decode(&bytes, &surface).unwrap();

        assert_eq!(curvature.map.face_count, 2);
        assert_eq!(curvature.map.values_per_vertex, 1);
        assert_eq!(curvature.buffer, vec![-1.0, 2.0, 3.0, -1.0, 3.0, -4.0]);
        assert_eq!(curvature.buffer.len(), surface.face_count() * 3);
    }

    #[test]
    fn test_vertex_count_mismatch() {
        let positions = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0];
        let surface = Surface::decode(&encode_surface("s", &positions, &[0, 1, 2])).unwrap();

        let bytes = encode_curvature(&[0.5, 0.5], 1);
        let err = Curvature::decode(&bytes, &surface).unwrap_err();
        assert!(matches!(
            err,
            FormatError::VertexCountMismatch {
                curvature: 2,
                surface: 3
            }
        ));
    }
}
