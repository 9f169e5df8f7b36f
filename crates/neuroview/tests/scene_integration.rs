//! End-to-end checks for the tooling: write a dataset directory, discover it,
//! decode it on the worker pool and join the results into a scene.

use std::fs;
use std::path::Path;

use neuroview::{
    discover_datasets, export_directory, AsyncLoader, DatasetKind, DatasetPatterns, ExportOptions,
    Hemisphere, LoadError, Scene,
};
use neuroview_formats::encode::{encode_curvature, encode_surface, encode_tracks};
use neuroview_formats::{Track, TrackHeader};
use tempfile::TempDir;

/// Tetrahedron with outward-facing triangles
const POSITIONS: [f32; 12] = [
    0.0, 0.0, 0.0, //
    1.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, //
    0.0, 0.0, 1.0,
];
const INDICES: [u32; 12] = [0, 2, 1, 0, 1, 3, 0, 3, 2, 1, 2, 3];

const NODES: &str = r#"{
    "1": {"pial_x": 0.0, "pial_y": 0.0, "pial_z": 0.0, "dn_name": "lh.a"},
    "2": {"pial_x": 10.0, "pial_y": 0.0, "pial_z": 0.0, "dn_name": "lh.b"},
    "3": {"pial_x": 0.0, "pial_y": 10.0, "pial_z": 0.0}
}"#;

const EDGES: &str = r#"{
    "1": {"2": {"fiber_length_mean": 20.0, "fiber_length_std": 1.0, "number_of_fibers": 10}},
    "2": {"1": {"fiber_length_mean": 20.0, "fiber_length_std": 1.0, "number_of_fibers": 10},
          "3": {"fiber_length_mean": 40.0, "fiber_length_std": 2.0, "number_of_fibers": 30}},
    "3": {"2": {"fiber_length_mean": 40.0, "fiber_length_std": 2.0, "number_of_fibers": 30},
          "3": {"fiber_length_mean": 5.0, "fiber_length_std": 0.5, "number_of_fibers": 50}}
}"#;

fn write_dataset(dir: &Path) {
    fs::write(dir.join("lh.pial"), encode_surface("created by test", &POSITIONS, &INDICES)).unwrap();
    fs::write(dir.join("lh.curv"), encode_curvature(&[0.5, -0.25, 0.125, -1.0], 4)).unwrap();

    let header = TrackHeader {
        voxel_size: [2.0, 2.0, 2.0],
        ..TrackHeader::default()
    };
    let tracks = vec![
        Track::new(vec![[0.0, 0.0, 0.0], [30.0, 0.0, 0.0]], vec![], vec![]),
        Track::new(vec![[0.0, 0.0, 0.0], [0.0, 3.0, 4.0]], vec![], vec![]),
        Track::new(vec![[1.0, 1.0, 1.0]], vec![], vec![]),
    ];
    fs::write(dir.join("fibers.trk"), encode_tracks(&header, &tracks)).unwrap();

    fs::write(dir.join("connectome_nodes.json"), NODES).unwrap();
    fs::write(dir.join("connectome_edges.json"), EDGES).unwrap();
    fs::write(dir.join("notes.txt"), "ignored").unwrap();
}

fn load_scene(dir: &Path) -> Scene {
    let files = discover_datasets(dir, false, &DatasetPatterns::default()).unwrap();
    let loader = AsyncLoader::new(3);
    for file in files {
        loader.queue(file).unwrap();
    }
    Scene::assemble(loader.wait_all())
}

#[test]
fn test_discover_dataset_directory() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path());

    let files = discover_datasets(dir.path(), false, &DatasetPatterns::default()).unwrap();
    let kinds: Vec<DatasetKind> = files.iter().map(|f| f.kind).collect();

    // Sorted by path
    assert_eq!(
        kinds,
        vec![
            DatasetKind::ConnectomeEdges,
            DatasetKind::ConnectomeNodes,
            DatasetKind::Tracks,
            DatasetKind::Curvature,
            DatasetKind::Surface,
        ]
    );
    assert_eq!(files[3].hemisphere, Some(Hemisphere::Left));
    assert_eq!(files[2].hemisphere, None);
}

#[test]
fn test_scene_joins_curvature_and_connectome() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path());

    let scene = load_scene(dir.path());
    assert!(scene.failures.is_empty());

    assert_eq!(scene.surfaces.len(), 1);
    let layer = &scene.surfaces[0];
    assert_eq!(layer.surface.face_count(), 4);
    let curvature = layer.curvature("curv").expect("curvature joined to lh.pial");
    assert_eq!(curvature.buffer.len(), layer.surface.rendered_vertex_count());
    assert_eq!(&curvature.buffer[..3], &[0.5, 0.125, -0.25]);
    assert_eq!(curvature.stats().min, -1.0);

    assert_eq!(scene.tracks.len(), 1);
    let (_, set) = &scene.tracks[0];
    assert_eq!(set.track_count(), 3);
    assert_eq!(set.tracks[1].length, 5.0);
    assert_eq!(set.tracks_longer_than(15.0).count(), 1);
    // Two segments in total, two vertices each
    assert_eq!(set.rendered_vertex_count(), 4);

    let graph = scene.connectome.as_ref().expect("connectome joined");
    assert_eq!(graph.nodes.len(), 3);
    // 1-2, 2-3 and the 3-3 self edge; mirrored entries collapse
    assert_eq!(graph.edges.len(), 3);
    assert_eq!(graph.edges.min_number_of_fibers, 10.0);
    assert_eq!(graph.edges.max_number_of_fibers, 50.0);
    assert_eq!(graph.nodes.nodes[2].name, None);
}

#[test]
fn test_scene_reports_unjoinable_files() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path());
    fs::write(dir.path().join("rh.curv"), encode_curvature(&[0.0; 4], 4)).unwrap();
    fs::write(dir.path().join("broken.trk"), b"TRACK").unwrap();

    let scene = load_scene(dir.path());

    assert_eq!(scene.surfaces.len(), 1);
    assert_eq!(scene.tracks.len(), 1);
    assert_eq!(scene.failures.len(), 2);
    assert!(scene
        .failures
        .iter()
        .any(|(_, e)| matches!(e, LoadError::MissingSurface { .. })));
    assert!(scene
        .failures
        .iter()
        .any(|(path, e)| path.ends_with("broken.trk") && matches!(e, LoadError::Format { .. })));
}

#[test]
fn test_export_dataset_directory() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path());
    let out = dir.path().join("out");

    let options = ExportOptions {
        output: Some(out.clone()),
        min_track_length: 15.0,
    };
    let stats =
        export_directory(dir.path(), "*", true, &DatasetPatterns::default(), &options).unwrap();

    // notes.txt is listed but cannot be classified
    assert_eq!(stats.len(), 6);
    assert_eq!(stats.iter().filter(|s| s.error.is_some()).count(), 1);

    assert!(out.join("lh.pial.positions.bin").exists());
    assert!(out.join("lh.curv.values.bin").exists());
    assert!(out.join("fibers.trk.colors.bin").exists());
    assert!(out.join("connectome_nodes.json.positions.bin").exists());
    assert!(out.join("connectome_edges.json.json").exists());

    let positions = fs::read(out.join("fibers.trk.positions.bin")).unwrap();
    // One kept segment: two vertices of [x, y, z, length]
    assert_eq!(positions.len(), 2 * 4 * 4);
}
