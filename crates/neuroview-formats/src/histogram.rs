//! Scalar histograms and their bar geometry
//!
//! Bar geometry lives in a unit square: bin `i` spans `[i / n, (i + 1) / n]`
//! horizontally and its height is the bin count over the tallest bin.

use serde::Serialize;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub bins: Vec<u32>,
    /// Largest bin count
    pub max_count: u32,
    /// Inclusive value range `[min, max]`
    pub range: (f32, f32),
    /// Bar vertices, 4 per bin as x,y pairs
    pub vertices: Vec<f32>,
    /// Bar triangles, 6 indices per bin
    pub indices: Vec<u32>,
}

impl Histogram {
    /// Bin every value in `[min, max]`; values outside the range are
    /// dropped. A value equal to `max` falls into the last bin.
    pub fn compute(values: &[f32], bin_count: usize, min: f32, max: f32) -> Self {
        let mut histogram = Self {
            bins: Vec::new(),
            max_count: 0,
            range: (min, max),
            vertices: Vec::new(),
            indices: Vec::new(),
        };
        histogram.recompute(values, bin_count, min, max);
        histogram
    }

    /// Replace the bins and geometry with a new range and bin count
    pub fn recompute(&mut self, values: &[f32], bin_count: usize, min: f32, max: f32) {
        self.bins = vec![0; bin_count];
        self.max_count = 0;
        self.range = (min, max);

        if bin_count > 0 {
            let span = max - min;
            for &value in values {
                if !(value >= min && value <= max) {
                    continue;
                }
                let bin = if span > 0.0 {
                    let normalized = (value - min) / span;
                    ((normalized * bin_count as f32).floor() as usize).min(bin_count - 1)
                } else {
                    0
                };
                self.bins[bin] += 1;
                self.max_count = self.max_count.max(self.bins[bin]);
            }
        }

        let (vertices, indices) = self.geometry();
        self.vertices = vertices;
        self.indices = indices;
        trace!(
            "Histogram of {} bins over [{}, {}], tallest bin {}",
            bin_count,
            min,
            max,
            self.max_count
        );
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    /// Total number of binned values
    pub fn total(&self) -> u64 {
        self.bins.iter().map(|&c| c as u64).sum()
    }

    /// Normalized bar height of `bin`; zero when every bin is empty
    pub fn height(&self, bin: usize) -> f32 {
        if self.max_count == 0 {
            0.0
        } else {
            self.bins[bin] as f32 / self.max_count as f32
        }
    }

    /// Build the bar quads: per bin the vertices (right, top), (left, top),
    /// (right, 0), (left, 0) and the triangles (0, 1, 2), (2, 1, 3).
    pub fn geometry(&self) -> (Vec<f32>, Vec<u32>) {
        let n = self.bins.len();
        let bar_width = 1.0 / n as f32;
        let mut vertices = Vec::with_capacity(n * 8);
        let mut indices = Vec::with_capacity(n * 6);

        for i in 0..n {
            let left = bar_width * i as f32;
            let right = bar_width * (i + 1) as f32;
            let height = self.height(i);

            vertices.extend_from_slice(&[right, height, left, height, right, 0.0, left, 0.0]);

            let base = (i * 4) as u32;
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 1, base + 3]);
        }

        (vertices, indices)
    }

    /// Two vertical unit-height lines at the positions of `lo` and `hi`
    /// within the histogram range, as x,y pairs: top then bottom.
    pub fn threshold_markers(&self, lo: f32, hi: f32) -> [f32; 8] {
        let lo_x = self.normalize(lo);
        let hi_x = self.normalize(hi);
        [lo_x, 1.0, lo_x, 0.0, hi_x, 1.0, hi_x, 0.0]
    }

    fn normalize(&self, value: f32) -> f32 {
        let (min, max) = self.range;
        if max > min {
            (value - min) / (max - min)
        } else {
            0.0
        }
    }
}
