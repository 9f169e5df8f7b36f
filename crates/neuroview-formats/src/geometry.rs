//! Geometry helpers shared by the surface and track decoders

use serde::{Deserialize, Serialize};

pub type Vec3 = [f32; 3];

pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn length(v: Vec3) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

pub fn distance(a: Vec3, b: Vec3) -> f32 {
    length(sub(a, b))
}

/// Scale `v` to unit length. A zero vector is returned unchanged.
pub fn normalize(v: Vec3) -> Vec3 {
    let len = length(v);
    if len == 0.0 {
        return v;
    }
    [v[0] / len, v[1] / len, v[2] / len]
}

/// Unit normal of the triangle `(v0, v1, v2)` from `(v1 - v0) x (v2 - v1)`.
pub fn face_normal(v0: Vec3, v1: Vec3, v2: Vec3) -> Vec3 {
    normalize(cross(sub(v1, v0), sub(v2, v1)))
}

/// Axis-aligned bounds of a point set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Minimum coordinates (x, y, z)
    pub min: Vec3,
    /// Maximum coordinates (x, y, z)
    pub max: Vec3,
}

impl Bounds {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Bounds of every point yielded, or `None` for an empty set
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vec3>,
    {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut bounds = Self::new(first, first);
        for point in points {
            bounds.include(point);
        }
        Some(bounds)
    }

    /// Grow the bounds to contain `point`
    pub fn include(&mut self, point: Vec3) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(point[axis]);
            self.max[axis] = self.max[axis].max(point[axis]);
        }
    }

    pub fn center(&self) -> Vec3 {
        [
            (self.max[0] - self.min[0]) / 2.0 + self.min[0],
            (self.max[1] - self.min[1]) / 2.0 + self.min[1],
            (self.max[2] - self.min[2]) / 2.0 + self.min[2],
        ]
    }

    pub fn size(&self) -> Vec3 {
        sub(self.max, self.min)
    }

    /// Per-axis reciprocal extent. A flat axis yields infinity.
    pub fn scale(&self) -> Vec3 {
        let size = self.size();
        [1.0 / size[0], 1.0 / size[1], 1.0 / size[2]]
    }

    pub fn diagonal_length(&self) -> f32 {
        length(self.size())
    }

    /// Check if the bounds are valid (min <= max)
    pub fn is_valid(&self) -> bool {
        self.min[0] <= self.max[0] && self.min[1] <= self.max[1] && self.min[2] <= self.max[2]
    }
}

/// Center and per-axis scale derived from a bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub center: Vec3,
    pub scale: Vec3,
}

impl Placement {
    /// Placement used when there is nothing to bound
    pub const IDENTITY: Placement = Placement {
        center: [0.0; 3],
        scale: [1.0; 3],
    };

    pub fn from_bounds(bounds: Option<&Bounds>) -> Self {
        match bounds {
            Some(b) => Self {
                center: b.center(),
                scale: b.scale(),
            },
            None => Self::IDENTITY,
        }
    }

    /// Largest per-axis scale, for fitting an object uniformly
    pub fn uniform_scale(&self) -> f32 {
        self.scale[1..]
            .iter()
            .fold(self.scale[0], |acc, &s| if s > acc { s } else { acc })
    }
}

/// Expand a per-vertex attribute with `stride` components into one entry per
/// triangle corner, following `indices`.
///
/// The caller guarantees every index addresses a full vertex in `values`.
pub fn unroll_by_faces(values: &[f32], stride: usize, indices: &[u32]) -> Vec<f32> {
    let mut unrolled = Vec::with_capacity(indices.len() * stride);
    for &index in indices {
        let start = index as usize * stride;
        unrolled.extend_from_slice(&values[start..start + stride]);
    }
    unrolled
}
