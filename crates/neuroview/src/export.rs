//! Export decoded buffers to disk
//!
//! Every decoded file becomes one or more `<name>.<buffer>.bin` files holding
//! little-endian `f32` values plus a `<name>.json` summary.

use byteorder::{LittleEndian, WriteBytesExt};
use rayon::prelude::*;
use serde_json::json;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use neuroview_formats::TrackSet;

use crate::discovery::{DatasetKind, DatasetPatterns};
use crate::loader::{decode_file, DecodedAsset, LoadError};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(String),

    #[error("Cannot tell what kind of file {0:?} is")]
    Unrecognized(PathBuf),
}

/// Options shared by every exported file
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Output directory; defaults to each input's directory
    pub output: Option<PathBuf>,
    /// Tracks shorter than this are left out
    pub min_track_length: f32,
}

#[derive(Debug, Clone)]
pub struct ExportStats {
    pub path: PathBuf,
    pub input_size: u64,
    pub output_size: u64,
    pub outputs: Vec<PathBuf>,
    pub processing_time: Duration,
    pub error: Option<String>,
}

impl ExportStats {
    fn failed(path: &Path, error: &ExportError) -> Self {
        Self {
            path: path.to_path_buf(),
            input_size: 0,
            output_size: 0,
            outputs: Vec::new(),
            processing_time: Duration::from_secs(0),
            error: Some(error.to_string()),
        }
    }
}

/// Write `values` as little-endian f32, returning the number of bytes written
pub fn write_f32_buffer(path: &Path, values: &[f32]) -> std::io::Result<u64> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    for &value in values {
        writer.write_f32::<LittleEndian>(value)?;
    }
    writer.flush()?;
    Ok(values.len() as u64 * 4)
}

/// Decode one file and write its buffers and summary
pub fn export_file(
    input: &Path,
    kind: DatasetKind,
    options: &ExportOptions,
) -> Result<ExportStats, ExportError> {
    let start_time = Instant::now();
    let (asset, input_size) = decode_file(input, kind)?;

    let output_dir = match &options.output {
        Some(dir) => dir.clone(),
        None => input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    fs::create_dir_all(&output_dir)?;

    let stem = input
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ExportError::Unrecognized(input.to_path_buf()))?
        .to_string();

    let (buffers, summary): (Vec<(&str, Vec<f32>)>, serde_json::Value) = match asset {
        DecodedAsset::Surface(surface) => {
            let summary = json!({
                "kind": kind,
                "info": surface.info,
                "vertex_count": surface.vertex_count(),
                "face_count": surface.face_count(),
                "orphan_vertices": surface.orphan_vertices,
                "bounds": surface.bounds,
                "placement": surface.placement,
            });
            (
                vec![
                    ("positions", surface.position_buffer),
                    ("normals", surface.normal_buffer),
                ],
                summary,
            )
        }
        DecodedAsset::Curvature(map) => {
            let summary = json!({
                "kind": kind,
                "vertex_count": map.vertex_count(),
                "stats": map.stats,
            });
            (vec![("values", map.values)], summary)
        }
        DecodedAsset::Tracks(set) => {
            let total = set.track_count();
            let kept: Vec<_> = set
                .tracks_longer_than(options.min_track_length)
                .cloned()
                .collect();
            let filtered = TrackSet::from_tracks(set.header, kept);
            let summary = json!({
                "kind": kind,
                "track_count": total,
                "exported_tracks": filtered.track_count(),
                "min_track_length": options.min_track_length,
                "rendered_vertex_count": filtered.rendered_vertex_count(),
                "bounds": filtered.bounds,
                "placement": filtered.placement,
            });
            (
                vec![
                    ("positions", filtered.position_buffer),
                    ("colors", filtered.color_buffer),
                ],
                summary,
            )
        }
        DecodedAsset::ConnectomeNodes(nodes) => {
            let summary = json!({
                "kind": kind,
                "node_count": nodes.len(),
                "bounds": nodes.bounds(),
                "nodes": nodes.nodes,
            });
            (vec![("positions", nodes.positions())], summary)
        }
        DecodedAsset::ConnectomeEdges(edges) => {
            let summary = serde_json::to_value(&edges)?;
            (Vec::new(), json!({ "kind": kind, "edges": summary }))
        }
    };

    let mut outputs = Vec::new();
    let mut output_size = 0;
    for (name, values) in &buffers {
        let path = output_dir.join(format!("{stem}.{name}.bin"));
        output_size += write_f32_buffer(&path, values)?;
        debug!("Wrote {} floats to {:?}", values.len(), path);
        outputs.push(path);
    }

    let summary_path = output_dir.join(format!("{stem}.json"));
    let summary_text = serde_json::to_string_pretty(&summary)?;
    fs::write(&summary_path, &summary_text)?;
    output_size += summary_text.len() as u64;
    outputs.push(summary_path);

    Ok(ExportStats {
        path: input.to_path_buf(),
        input_size: input_size as u64,
        output_size,
        outputs,
        processing_time: start_time.elapsed(),
        error: None,
    })
}

/// Export every recognized file in `directory` whose name matches `pattern`
pub fn export_directory(
    directory: &Path,
    pattern: &str,
    parallel: bool,
    patterns: &DatasetPatterns,
    options: &ExportOptions,
) -> Result<Vec<ExportStats>, ExportError> {
    let pattern =
        glob::Pattern::new(pattern).map_err(|e| ExportError::Pattern(e.to_string()))?;

    let mut files: Vec<PathBuf> = fs::read_dir(directory)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| pattern.matches(name))
        })
        .collect();
    files.sort();

    info!("Found {} files to export in {:?}", files.len(), directory);

    let export_one = |path: &PathBuf| -> ExportStats {
        let result = patterns
            .classify_path(path)
            .ok_or_else(|| ExportError::Unrecognized(path.clone()))
            .and_then(|file| export_file(&file.path, file.kind, options));
        match result {
            Ok(stats) => stats,
            Err(e) => ExportStats::failed(path, &e),
        }
    };

    let stats: Vec<ExportStats> = if parallel {
        files.par_iter().map(export_one).collect()
    } else {
        files.iter().map(export_one).collect()
    };

    Ok(stats)
}
