//! Integration tests for neuroview-formats: write dataset files to disk, read
//! them back and decode them the way the tooling does.

use std::fs::{self, File};
use std::path::Path;

use neuroview_formats::encode::{write_curvature, write_surface, write_tracks};
use neuroview_formats::{
    ConnectomeEdges, ConnectomeGraph, ConnectomeNodes, Curvature, Histogram, Surface, Track,
    TrackHeader, TrackSet,
};
use tempfile::TempDir;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Unit octahedron with outward-facing triangles
fn octahedron() -> (Vec<f32>, Vec<u32>) {
    let positions = vec![
        1.0, 0.0, 0.0, //
        -1.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, //
        0.0, -1.0, 0.0, //
        0.0, 0.0, 1.0, //
        0.0, 0.0, -1.0,
    ];

    let mut indices = Vec::new();
    for x in [0u32, 1] {
        for y in [2u32, 3] {
            for z in [4u32, 5] {
                let positive = (x == 0) ^ (y == 3) ^ (z == 5);
                if positive {
                    indices.extend_from_slice(&[x, y, z]);
                } else {
                    indices.extend_from_slice(&[x, z, y]);
                }
            }
        }
    }
    (positions, indices)
}

fn write_file(path: &Path, write: impl FnOnce(&mut File) -> std::io::Result<()>) {
    let mut file = File::create(path).expect("Failed to create fixture");
    write(&mut file).expect("Failed to write fixture");
}

#[test]
fn test_surface_and_curvature_from_disk() {
    init_logging();
    let dir = TempDir::new().expect("Failed to create temp dir");
    let (positions, indices) = octahedron();

    let surf_path = dir.path().join("lh.pial");
    write_file(&surf_path, |f| write_surface(f, "created by test", &positions, &indices));

    let curv_path = dir.path().join("lh.curv");
    let values: Vec<f32> = positions.chunks_exact(3).map(|p| p[0]).collect();
    write_file(&curv_path, |f| write_curvature(f, &values, 8));

    let surface = Surface::decode(&fs::read(&surf_path).unwrap()).expect("Failed to decode surface");
    assert_eq!(surface.vertex_count(), 6);
    assert_eq!(surface.face_count(), 8);
    assert_eq!(surface.orphan_vertices, 0);
    assert_eq!(surface.placement.center, [0.0, 0.0, 0.0]);
    assert_eq!(surface.placement.uniform_scale(), 0.5);

    // Every vertex normal points away from the center
    for v in 0..surface.vertex_count() {
        let p = surface.vertex(v);
        let n = surface.vertex_normal(v);
        let dot = p[0] * n[0] + p[1] * n[1] + p[2] * n[2];
        assert!(dot > 0.5, "vertex {v} normal {n:?}");
    }

    let curvature =
        Curvature::decode(&fs::read(&curv_path).unwrap(), &surface).expect("Failed to decode curvature");
    assert_eq!(curvature.buffer.len(), surface.position_buffer.len() / 3);

    // Curvature follows the unrolled x coordinate corner by corner
    for (corner, &value) in curvature.buffer.iter().enumerate() {
        assert_eq!(value, surface.position_buffer[corner * 3]);
    }

    let stats = curvature.stats();
    assert_eq!(stats.min, -1.0);
    assert_eq!(stats.max, 1.0);
    assert_eq!(stats.positive_count, 5);
    assert_eq!(stats.negative_count, 1);

    let histogram = Histogram::compute(&curvature.buffer, 4, stats.min, stats.max);
    assert_eq!(histogram.total(), 24);
    // Corners at x = 0 fall in the third bin
    assert_eq!(histogram.bins, vec![4, 0, 16, 4]);
}

#[test]
fn test_tracks_from_disk() {
    init_logging();
    let dir = TempDir::new().expect("Failed to create temp dir");

    let header = TrackHeader {
        dim: [64, 64, 32],
        voxel_size: [2.0, 2.0, 2.5],
        n_scalars: 1,
        ..TrackHeader::default()
    };
    let tracks: Vec<Track> = (0..10)
        .map(|i| {
            let length = 5.0 * (i + 1) as f32;
            let points = (0..=4).map(|s| [i as f32, 0.0, length * s as f32 / 4.0]).collect();
            Track::new(points, vec![0.5; 5], vec![])
        })
        .collect();

    let path = dir.path().join("fibers.trk");
    write_file(&path, |f| write_tracks(f, &header, &tracks));

    let set = TrackSet::decode(&fs::read(&path).unwrap()).expect("Failed to decode tracks");
    assert_eq!(set.track_count(), 10);
    assert_eq!(set.header.voxel_size, [2.0, 2.0, 2.5]);
    assert_eq!(set.rendered_vertex_count(), 10 * 4 * 2);
    assert_eq!(set.tracks_longer_than(15.0).count(), 8);

    for (decoded, original) in set.tracks.iter().zip(&tracks) {
        assert!((decoded.length - original.length).abs() < 1e-4);
        assert_eq!(decoded.point_scalars(2), &[0.5]);
    }

    // Every track runs along +z
    assert!(set.color_buffer.chunks_exact(3).all(|c| c == [0.0, 0.0, 1.0]));
}

#[test]
fn test_connectome_from_disk() {
    init_logging();
    let dir = TempDir::new().expect("Failed to create temp dir");

    let nodes_path = dir.path().join("connectome_nodes.json");
    fs::write(
        &nodes_path,
        r#"{
            "1": { "pial_x": -30.0, "pial_y": 10.0, "pial_z": 5.0, "dn_name": "lh.a" },
            "2": { "pial_x": 30.0, "pial_y": 10.0, "pial_z": 5.0, "dn_name": "rh.a" },
            "3": { "pial_x": 0.0, "pial_y": -40.0, "pial_z": 20.0, "dn_name": "brainstem" }
        }"#,
    )
    .unwrap();

    let edges_path = dir.path().join("connectome_edges.json");
    fs::write(
        &edges_path,
        r#"{
            "1": { "2": { "fiber_length_mean": 80.0, "fiber_length_std": 5.0, "number_of_fibers": 120 },
                   "3": { "fiber_length_mean": 60.0, "fiber_length_std": 4.0, "number_of_fibers": 40 } },
            "2": { "1": { "fiber_length_mean": 80.0, "fiber_length_std": 5.0, "number_of_fibers": 120 } },
            "3": { "1": { "fiber_length_mean": 60.0, "fiber_length_std": 4.0, "number_of_fibers": 40 } }
        }"#,
    )
    .unwrap();

    // Edges decoded first, joined once the nodes are in
    let edges = ConnectomeEdges::from_slice(&fs::read(&edges_path).unwrap()).unwrap();
    let nodes = ConnectomeNodes::from_slice(&fs::read(&nodes_path).unwrap()).unwrap();
    let graph = ConnectomeGraph::join(nodes, edges).expect("Failed to join connectome");

    assert_eq!(graph.edges.len(), 2);
    assert_eq!(graph.rendered_vertex_count(), 4);
    assert_eq!(graph.edges.min_number_of_fibers, 40.0);
    assert_eq!(graph.edges.max_number_of_fibers, 120.0);
    assert_eq!(&graph.edge_positions[6..12], &[-30.0, 10.0, 5.0, 0.0, -40.0, 20.0]);
    assert_eq!(graph.nodes.nodes[2].name.as_deref(), Some("brainstem"));
}
