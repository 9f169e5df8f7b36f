//! Dataset discovery: classify files in a directory by name

use clap::ValueEnum;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The kinds of file the decoders understand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ValueEnum)]
pub enum DatasetKind {
    /// FreeSurfer triangle surface (lh.pial, rh.white, ...)
    Surface,
    /// FreeSurfer per-vertex curvature (lh.curv, rh.sulc, ...)
    Curvature,
    /// TrackVis fiber tracks (.trk)
    Tracks,
    /// Connectome node table (JSON)
    ConnectomeNodes,
    /// Connectome edge table (JSON)
    ConnectomeEdges,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Hemisphere {
    Left,
    Right,
}

impl Hemisphere {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "lh" => Some(Self::Left),
            "rh" => Some(Self::Right),
            _ => None,
        }
    }
}

/// A classified dataset file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetFile {
    pub path: PathBuf,
    pub kind: DatasetKind,
    pub hemisphere: Option<Hemisphere>,
}

/// A pattern for matching dataset files
struct KindPattern {
    kind: DatasetKind,
    regex: Regex,
    /// Capture group holding the hemisphere prefix, if any
    hemisphere_group: Option<usize>,
}

impl KindPattern {
    fn new(kind: DatasetKind, pattern: &str, hemisphere_group: Option<usize>) -> Self {
        Self {
            kind,
            regex: Regex::new(pattern).expect("Invalid regex pattern"),
            hemisphere_group,
        }
    }
}

/// Filename patterns tried in order; the first match wins
pub struct DatasetPatterns {
    patterns: Vec<KindPattern>,
}

impl Default for DatasetPatterns {
    fn default() -> Self {
        Self {
            patterns: vec![
                KindPattern::new(
                    DatasetKind::Surface,
                    r"^(lh|rh)\.(pial|white|inflated|orig|sphere|smoothwm)$",
                    Some(1),
                ),
                KindPattern::new(
                    DatasetKind::Curvature,
                    r"^(lh|rh)\.(curv|sulc|thickness|area|avg_curv)$",
                    Some(1),
                ),
                KindPattern::new(DatasetKind::Tracks, r"(?i)^.+\.trk$", None),
                KindPattern::new(DatasetKind::ConnectomeNodes, r"(?i)^.*nodes.*\.json$", None),
                KindPattern::new(DatasetKind::ConnectomeEdges, r"(?i)^.*edges.*\.json$", None),
            ],
        }
    }
}

impl DatasetPatterns {
    /// Classify a bare file name
    pub fn classify(&self, filename: &str) -> Option<(DatasetKind, Option<Hemisphere>)> {
        self.patterns.iter().find_map(|pattern| {
            let captures = pattern.regex.captures(filename)?;
            let hemisphere = pattern
                .hemisphere_group
                .and_then(|group| captures.get(group))
                .and_then(|m| Hemisphere::from_prefix(m.as_str()));
            Some((pattern.kind, hemisphere))
        })
    }

    /// Classify a path by its file name
    pub fn classify_path(&self, path: &Path) -> Option<DatasetFile> {
        let filename = path.file_name()?.to_str()?;
        let (kind, hemisphere) = self.classify(filename)?;
        Some(DatasetFile {
            path: path.to_path_buf(),
            kind,
            hemisphere,
        })
    }
}

/// Discover dataset files in a directory, sorted by path
pub fn discover_datasets(
    directory: &Path,
    recursive: bool,
    patterns: &DatasetPatterns,
) -> Result<Vec<DatasetFile>, std::io::Error> {
    let mut files = Vec::new();
    scan_directory(directory, recursive, patterns, &mut files)?;
    files.sort_by(|a, b| a.path.cmp(&b.path));

    info!("Found {} dataset files in {:?}", files.len(), directory);
    Ok(files)
}

fn scan_directory(
    directory: &Path,
    recursive: bool,
    patterns: &DatasetPatterns,
    files: &mut Vec<DatasetFile>,
) -> Result<(), std::io::Error> {
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();

        if path.is_dir() && recursive {
            scan_directory(&path, recursive, patterns, files)?;
        } else if path.is_file() {
            match patterns.classify_path(&path) {
                Some(file) => files.push(file),
                None => debug!("Skipping unrecognized file {:?}", path),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_classify_names() {
        let patterns = DatasetPatterns::default();

        assert_eq!(
            patterns.classify("lh.pial"),
            Some((DatasetKind::Surface, Some(Hemisphere::Left)))
        );
        assert_eq!(
            patterns.classify("rh.sulc"),
            Some((DatasetKind::Curvature, Some(Hemisphere::Right)))
        );
        assert_eq!(patterns.classify("dti_tracks.TRK"), Some((DatasetKind::Tracks, None)));
        assert_eq!(
            patterns.classify("connectome_nodes.json"),
            Some((DatasetKind::ConnectomeNodes, None))
        );
        assert_eq!(
            patterns.classify("connectome_edges.json"),
            Some((DatasetKind::ConnectomeEdges, None))
        );

        assert_eq!(patterns.classify("lh.pial.bak"), None);
        assert_eq!(patterns.classify("neuroview.toml"), None);
        assert_eq!(patterns.classify("xh.curv"), None);
    }

    #[test]
    fn test_dataset_discovery() {
        let temp_dir = TempDir::new().unwrap();
        let dir_path = temp_dir.path();

        for file in ["lh.white", "lh.curv", "notes.txt", "fibers.trk"] {
            File::create(dir_path.join(file)).unwrap();
        }
        fs::create_dir(dir_path.join("cmp")).unwrap();
        File::create(dir_path.join("cmp").join("nodes.json")).unwrap();

        let patterns = DatasetPatterns::default();

        let flat = discover_datasets(dir_path, false, &patterns).unwrap();
        assert_eq!(flat.len(), 3);

        let all = discover_datasets(dir_path, true, &patterns).unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.iter().any(|f| f.kind == DatasetKind::ConnectomeNodes));

        // Sorted by path
        let names: Vec<_> = flat
            .iter()
            .map(|f| f.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["fibers.trk", "lh.curv", "lh.white"]);
    }
}
