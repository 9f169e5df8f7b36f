use log::{error, info, warn};
use std::fs;
use std::path::Path;

use neuroview::cli::{Args, Command};
use neuroview::loader::decode_file;
use neuroview::settings::resolve_settings_dir;
use neuroview::{
    discover_datasets, export_directory, export_file, AsyncLoader, DatasetKind, DatasetPatterns,
    DecodedAsset, ExportOptions, ExportStats, Scene, Settings,
};
use neuroview_formats::{Curvature, Histogram, Surface};

/// Width of the longest histogram bar in characters
const BAR_WIDTH: f32 = 50.0;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse_args();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match args.command {
        Command::Info { file, kind } => run_info(&file, kind),
        Command::Histogram {
            curvature,
            surface,
            bins,
            min,
            max,
            save,
        } => run_histogram(&curvature, &surface, bins, min.zip(max), save),
        Command::Scene {
            directory,
            recursive,
            workers,
        } => run_scene(&directory, recursive, workers),
        Command::Export {
            input,
            output,
            pattern,
            parallel,
            threads,
        } => run_export(&input, output, &pattern, parallel, threads),
    }
}

fn resolve_kind(path: &Path, kind: Option<DatasetKind>) -> Result<DatasetKind, String> {
    kind.or_else(|| DatasetPatterns::default().classify_path(path).map(|f| f.kind))
        .ok_or_else(|| format!("Cannot tell what kind of file {:?} is; pass --kind", path))
}

fn run_info(path: &Path, kind: Option<DatasetKind>) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("File '{}' does not exist", path.display()).into());
    }
    let kind = resolve_kind(path, kind)?;
    let settings = Settings::load_for(path)?;
    let (asset, bytes) = decode_file(path, kind)?;

    println!("Dataset File Information:");
    println!("=========================");
    println!("File: {}", path.display());
    println!("Kind: {:?}", kind);
    println!("Size: {} bytes", bytes);

    match asset {
        DecodedAsset::Surface(surface) => {
            println!("Info: {}", surface.info.trim());
            println!("Vertices: {}", surface.vertex_count());
            println!("Faces: {}", surface.face_count());
            if surface.orphan_vertices > 0 {
                println!("Orphan vertices: {}", surface.orphan_vertices);
            }
            print_bounds(surface.bounds.as_ref());
        }
        DecodedAsset::Curvature(map) => {
            let stats = map.stats;
            let (lo, hi) = stats.display_range_with(settings.display_sigmas());
            println!("Vertices: {}", map.vertex_count());
            println!("Range: [{:.6}, {:.6}]", stats.min, stats.max);
            println!("Mean: {:.6} (std dev {:.6})", stats.mean, stats.std_dev);
            println!(
                "Positive: {} values, mean {:.6}, std dev {:.6}",
                stats.positive_count, stats.positive_mean, stats.positive_std_dev
            );
            println!(
                "Negative: {} values, mean {:.6}, std dev {:.6}",
                stats.negative_count, stats.negative_mean, stats.negative_std_dev
            );
            println!("Display range: [{:.6}, {:.6}]", lo, hi);
        }
        DecodedAsset::Tracks(set) => {
            let min_length = settings.min_track_length();
            println!("Tracks: {}", set.track_count());
            println!(
                "Tracks of at least {} mm: {}",
                min_length,
                set.tracks_longer_than(min_length).count()
            );
            println!("Line vertices: {}", set.rendered_vertex_count());
            println!("Voxel size: {:?}", set.header.voxel_size);
            println!("Voxel order: {}", set.header.voxel_order.trim_end_matches('\0'));
            let scalars = set.header.scalar_names();
            if !scalars.is_empty() {
                println!("Scalars: {}", scalars.join(", "));
            }
            let properties = set.header.property_names();
            if !properties.is_empty() {
                println!("Properties: {}", properties.join(", "));
            }
            print_bounds(set.bounds.as_ref());
        }
        DecodedAsset::ConnectomeNodes(nodes) => {
            println!("Nodes: {}", nodes.len());
            print_bounds(nodes.bounds().as_ref());
        }
        DecodedAsset::ConnectomeEdges(edges) => {
            println!("Edges: {}", edges.len());
            println!(
                "Number of fibers: [{}, {}]",
                edges.min_number_of_fibers, edges.max_number_of_fibers
            );
            println!(
                "Mean fiber length: [{:.3}, {:.3}]",
                edges.min_fiber_length_mean, edges.max_fiber_length_mean
            );
        }
    }

    Ok(())
}

fn print_bounds(bounds: Option<&neuroview_formats::Bounds>) {
    if let Some(bounds) = bounds {
        let size = bounds.size();
        println!("\nBounding Box:");
        println!(
            "  Min: [{:.6}, {:.6}, {:.6}]",
            bounds.min[0], bounds.min[1], bounds.min[2]
        );
        println!(
            "  Max: [{:.6}, {:.6}, {:.6}]",
            bounds.max[0], bounds.max[1], bounds.max[2]
        );
        println!("  Size: [{:.6}, {:.6}, {:.6}]", size[0], size[1], size[2]);
    }
}

fn run_histogram(
    curvature_path: &Path,
    surface_path: &Path,
    bins: Option<usize>,
    range: Option<(f32, f32)>,
    save: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = Settings::load_for(curvature_path)?;

    let surface = Surface::decode(&fs::read(surface_path)?)?;
    let curvature = Curvature::decode(&fs::read(curvature_path)?, &surface)?;
    let stats = curvature.stats();

    let bins = bins.unwrap_or_else(|| settings.histogram_bins());
    let (min, max) = range
        .or_else(|| settings.histogram_range())
        .unwrap_or((stats.min, stats.max));

    let histogram = Histogram::compute(&curvature.buffer, bins, min, max);
    let (lo, hi) = stats.display_range_with(settings.display_sigmas());
    let markers = histogram.threshold_markers(lo, hi);

    println!(
        "Curvature histogram of {} ({} corner values, {} bins over [{:.4}, {:.4}])",
        curvature_path.display(),
        curvature.buffer.len(),
        histogram.bin_count(),
        min,
        max
    );

    let step = (max - min) / bins.max(1) as f32;
    for (i, &count) in histogram.bins.iter().enumerate() {
        let bar = "#".repeat((histogram.height(i) * BAR_WIDTH).round() as usize);
        println!("{:>10.4} | {:<8} {}", min + step * i as f32, count, bar);
    }

    println!(
        "Display range [{:.4}, {:.4}] at {:.2}..{:.2} of the histogram width",
        lo, hi, markers[0], markers[4]
    );

    if save {
        let dir = resolve_settings_dir(curvature_path)
            .ok_or_else(|| format!("No directory to save settings for {:?}", curvature_path))?;
        settings.set_histogram(bins, range);
        settings.save_to_dir(&dir)?;
    }
    Ok(())
}

fn run_scene(
    directory: &Path,
    recursive: bool,
    workers: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load_for(directory)?;
    let files = discover_datasets(directory, recursive, &DatasetPatterns::default())?;
    if files.is_empty() {
        warn!("No dataset files found in {:?}", directory);
        return Ok(());
    }

    let loader = AsyncLoader::new(workers.unwrap_or_else(|| settings.workers()));
    for file in files {
        loader.queue(file)?;
    }
    let results = loader.wait_all();
    let decoded_bytes: usize = results.iter().map(|r| r.bytes).sum();
    info!("Decoded {} files ({} bytes)", results.len(), decoded_bytes);

    let scene = Scene::assemble(results);

    println!("Scene: {}", directory.display());
    for layer in &scene.surfaces {
        println!(
            "  Surface {}: {} vertices, {} faces",
            layer.path.display(),
            layer.surface.vertex_count(),
            layer.surface.face_count()
        );
        for (path, curvature) in &layer.curvatures {
            let stats = curvature.stats();
            println!(
                "    {}: display range [{:.3}, {:.3}]",
                path.file_name().unwrap_or_default().to_string_lossy(),
                stats.display_min,
                stats.display_max
            );
        }
    }
    let min_length = settings.min_track_length();
    for (path, set) in &scene.tracks {
        println!(
            "  Tracks {}: {} tracks, {} of at least {} mm",
            path.display(),
            set.track_count(),
            set.tracks_longer_than(min_length).count(),
            min_length
        );
    }
    if let Some(graph) = &scene.connectome {
        println!(
            "  Connectome: {} nodes, {} edges",
            graph.nodes.len(),
            graph.edges.len()
        );
    }
    for (path, e) in &scene.failures {
        error!("Failed: {:?}: {}", path, e);
    }

    Ok(())
}

fn run_export(
    input: &Path,
    output: Option<std::path::PathBuf>,
    pattern: &str,
    parallel: bool,
    threads: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if !input.exists() {
        return Err(format!("Input path does not exist: {:?}", input).into());
    }
    let settings = Settings::load_for(input)?;

    if threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    let options = ExportOptions {
        output,
        min_track_length: settings.min_track_length(),
    };

    let stats = if input.is_dir() {
        export_directory(input, pattern, parallel, &DatasetPatterns::default(), &options)?
    } else {
        let kind = resolve_kind(input, None)?;
        vec![export_file(input, kind, &options)?]
    };

    print_summary(&stats);
    Ok(())
}

fn print_summary(stats: &[ExportStats]) {
    let successful = stats.iter().filter(|s| s.error.is_none()).count();
    let failed = stats.len() - successful;

    println!("\n=== Export Summary ===");
    println!("Total files: {}", stats.len());
    println!("  Successful: {}", successful);
    println!("  Failed: {}", failed);

    for stat in stats.iter().filter(|s| s.error.is_none()) {
        println!(
            "  {} -> {} files, {} KB in {:.2}s",
            stat.path.display(),
            stat.outputs.len(),
            stat.output_size / 1024,
            stat.processing_time.as_secs_f64()
        );
    }

    for stat in stats.iter() {
        if let Some(error) = &stat.error {
            eprintln!("\nFailed: {:?}", stat.path);
            eprintln!("  Error: {}", error);
        }
    }
}
