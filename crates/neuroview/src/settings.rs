//! Per-dataset settings persistence for neuroview
//!
//! Settings are stored as `neuroview.toml` in the dataset directory. Every
//! field is optional; missing values fall back to the defaults below and
//! command line flags override both.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use neuroview_formats::curvature::DISPLAY_RANGE_SIGMAS;

/// Filename used for per-directory settings
pub const SETTINGS_FILENAME: &str = "neuroview.toml";

/// Default number of histogram bins
pub const DEFAULT_HISTOGRAM_BINS: usize = 100;

/// Default minimum track length in millimetres
pub const DEFAULT_MIN_TRACK_LENGTH: f32 = 15.0;

/// Histogram settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSettings {
    /// Number of bins
    pub bins: Option<usize>,
    /// Fixed value range [min, max]; the data range is used when unset
    pub range: Option<[f32; 2]>,
}

/// Curvature display settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurvatureSettings {
    /// Standard deviations around the signed means used for the display range
    pub display_sigmas: Option<f32>,
}

/// Track filtering settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackSettings {
    /// Tracks shorter than this (mm) are left out of summaries and exports
    pub min_length: Option<f32>,
}

/// Loader settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoaderSettings {
    /// Number of decode worker threads
    pub workers: Option<usize>,
}

/// Top-level settings struct, serialized as neuroview.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    pub histogram: Option<HistogramSettings>,
    pub curvature: Option<CurvatureSettings>,
    pub tracks: Option<TrackSettings>,
    pub loader: Option<LoaderSettings>,
}

impl Settings {
    /// Load settings from a neuroview.toml file in the given directory.
    /// Returns Ok(None) if the file doesn't exist.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>, SettingsError> {
        let path = dir.join(SETTINGS_FILENAME);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| SettingsError::Io {
            path: path.clone(),
            source: e,
        })?;
        let settings: Settings =
            toml::from_str(&contents).map_err(|e| SettingsError::ParseToml {
                path: path.clone(),
                source: e,
            })?;
        info!("Loaded settings from {:?}", path);
        Ok(Some(settings))
    }

    /// Load settings for `path` (a dataset file or directory), falling back
    /// to defaults when there is no settings file.
    pub fn load_for(path: &Path) -> Result<Self, SettingsError> {
        match resolve_settings_dir(path) {
            Some(dir) => Ok(Self::load_from_dir(&dir)?.unwrap_or_default()),
            None => Ok(Self::default()),
        }
    }

    /// Save settings to neuroview.toml in the given directory.
    /// Merges with existing file if present (preserves unknown keys); a
    /// malformed existing file is reported and left untouched.
    pub fn save_to_dir(&self, dir: &Path) -> Result<(), SettingsError> {
        let path = dir.join(SETTINGS_FILENAME);

        let ours = toml::to_string_pretty(self).map_err(|e| SettingsError::SerializeToml {
            path: path.clone(),
            source: e,
        })?;

        let merged = if path.exists() {
            let existing_contents =
                std::fs::read_to_string(&path).map_err(|e| SettingsError::Io {
                    path: path.clone(),
                    source: e,
                })?;
            let mut existing_table: toml::Table =
                toml::from_str(&existing_contents).map_err(|e| SettingsError::ParseToml {
                    path: path.clone(),
                    source: e,
                })?;
            let our_table: toml::Table =
                toml::from_str(&ours).map_err(|e| SettingsError::ParseToml {
                    path: path.clone(),
                    source: e,
                })?;

            for (key, value) in our_table {
                existing_table.insert(key, value);
            }

            toml::to_string_pretty(&existing_table).map_err(|e| SettingsError::SerializeToml {
                path: path.clone(),
                source: e,
            })?
        } else {
            ours
        };

        std::fs::write(&path, merged).map_err(|e| SettingsError::Io {
            path: path.clone(),
            source: e,
        })?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn histogram_bins(&self) -> usize {
        self.histogram
            .as_ref()
            .and_then(|h| h.bins)
            .unwrap_or(DEFAULT_HISTOGRAM_BINS)
    }

    pub fn histogram_range(&self) -> Option<(f32, f32)> {
        self.histogram
            .as_ref()
            .and_then(|h| h.range)
            .map(|[min, max]| (min, max))
    }

    pub fn display_sigmas(&self) -> f32 {
        self.curvature
            .as_ref()
            .and_then(|c| c.display_sigmas)
            .unwrap_or(DISPLAY_RANGE_SIGMAS)
    }

    pub fn min_track_length(&self) -> f32 {
        self.tracks
            .as_ref()
            .and_then(|t| t.min_length)
            .unwrap_or(DEFAULT_MIN_TRACK_LENGTH)
    }

    /// Worker count, defaulting to the available parallelism
    pub fn workers(&self) -> usize {
        self.loader
            .as_ref()
            .and_then(|l| l.workers)
            .filter(|&w| w > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }

    /// Merge histogram settings
    pub fn set_histogram(&mut self, bins: usize, range: Option<(f32, f32)>) {
        self.histogram = Some(HistogramSettings {
            bins: Some(bins),
            range: range.map(|(min, max)| [min, max]),
        });
    }
}

/// Errors that can occur during settings operations
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize TOML for {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
}

/// Resolve the settings directory from a path argument.
/// If the path is a file, returns its parent directory.
/// If the path is a directory, returns it directly.
pub fn resolve_settings_dir(path: &Path) -> Option<PathBuf> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if canonical.is_dir() {
        Some(canonical)
    } else if canonical.is_file() {
        canonical.parent().map(|p| p.to_path_buf())
    } else {
        None
    }
}
