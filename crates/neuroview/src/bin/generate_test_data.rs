use serde_json::{json, Map, Value};
use std::f32::consts::PI;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use neuroview_formats::encode::{write_curvature, write_surface, write_tracks};
use neuroview_formats::{Track, TrackHeader};

const RINGS: usize = 24;
const SEGMENTS: usize = 48;
const RADIUS: [f32; 3] = [30.0, 45.0, 35.0];
const HEMISPHERE_OFFSET: f32 = 35.0;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("test_data"));
    fs::create_dir_all(&out_dir)?;

    for (prefix, offset) in [("lh", -HEMISPHERE_OFFSET), ("rh", HEMISPHERE_OFFSET)] {
        let (positions, indices) = ellipsoid([offset, 0.0, 0.0]);

        let path = out_dir.join(format!("{prefix}.pial"));
        let mut file = BufWriter::new(File::create(&path)?);
        write_surface(&mut file, "created by generate_test_data", &positions, &indices)?;
        println!(
            "Created {} ({} vertices, {} faces)",
            path.display(),
            positions.len() / 3,
            indices.len() / 3
        );

        let curvature = folding_pattern(&positions, offset);
        let path = out_dir.join(format!("{prefix}.curv"));
        let mut file = BufWriter::new(File::create(&path)?);
        write_curvature(&mut file, &curvature, (indices.len() / 3) as u32)?;
        println!("Created {}", path.display());
    }

    write_track_file(&out_dir.join("fibers.trk"))?;
    write_connectome(&out_dir)?;

    Ok(())
}

/// UV ellipsoid centered at `center` with outward-facing triangles
fn ellipsoid(center: [f32; 3]) -> (Vec<f32>, Vec<u32>) {
    let mut positions = Vec::new();
    let mut push = |x: f32, y: f32, z: f32| {
        positions.extend_from_slice(&[
            center[0] + RADIUS[0] * x,
            center[1] + RADIUS[1] * y,
            center[2] + RADIUS[2] * z,
        ]);
    };

    push(0.0, 0.0, 1.0);
    for ring in 1..RINGS {
        let theta = PI * ring as f32 / RINGS as f32;
        for segment in 0..SEGMENTS {
            let phi = 2.0 * PI * segment as f32 / SEGMENTS as f32;
            push(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
        }
    }
    push(0.0, 0.0, -1.0);

    let north = 0u32;
    let south = (1 + (RINGS - 1) * SEGMENTS) as u32;
    let at = |ring: usize, segment: usize| (1 + (ring - 1) * SEGMENTS + segment % SEGMENTS) as u32;

    let mut indices = Vec::new();
    for s in 0..SEGMENTS {
        indices.extend_from_slice(&[north, at(1, s), at(1, s + 1)]);
    }
    for ring in 1..RINGS - 1 {
        for s in 0..SEGMENTS {
            let (a, b, c, d) = (at(ring, s), at(ring + 1, s), at(ring + 1, s + 1), at(ring, s + 1));
            indices.extend_from_slice(&[a, b, c, a, c, d]);
        }
    }
    for s in 0..SEGMENTS {
        indices.extend_from_slice(&[at(RINGS - 1, s), south, at(RINGS - 1, s + 1)]);
    }

    (positions, indices)
}

/// Gyri and sulci as a smooth signed pattern over the surface
fn folding_pattern(positions: &[f32], offset: f32) -> Vec<f32> {
    positions
        .chunks_exact(3)
        .map(|p| {
            let x = (p[0] - offset) / RADIUS[0];
            let y = p[1] / RADIUS[1];
            let z = p[2] / RADIUS[2];
            0.3 * (4.0 * y + 2.0 * z).sin() * (3.0 * x).cos() - 0.05
        })
        .collect()
}

/// Arched commissural fibers between the hemispheres, plus short local ones
fn write_track_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut header = TrackHeader {
        dim: [128, 128, 64],
        voxel_size: [2.0, 2.0, 2.0],
        n_scalars: 1,
        n_properties: 1,
        ..TrackHeader::default()
    };
    header.scalar_name.replace_range(0..2, "fa");
    header.property_name.replace_range(0..5, "group");

    let mut tracks = Vec::new();
    for i in 0..60 {
        let y = -30.0 + i as f32;
        let height = 10.0 + (i % 7) as f32 * 3.0;
        let points: Vec<[f32; 3]> = (0..=20)
            .map(|s| {
                let t = s as f32 / 20.0;
                [-40.0 + 80.0 * t, y, height * (PI * t).sin()]
            })
            .collect();
        let fa: Vec<f32> = (0..points.len())
            .map(|s| 0.4 + 0.3 * (PI * s as f32 / 20.0).sin())
            .collect();
        tracks.push(Track::new(points, fa, vec![0.0]));
    }
    for i in 0..20 {
        let x = if i % 2 == 0 { -HEMISPHERE_OFFSET } else { HEMISPHERE_OFFSET };
        let z = -10.0 + i as f32;
        let points = vec![[x, -4.0, z], [x, 0.0, z + 1.0], [x, 4.0, z]];
        tracks.push(Track::new(points, vec![0.2; 3], vec![1.0]));
    }

    let mut file = BufWriter::new(File::create(path)?);
    write_tracks(&mut file, &header, &tracks)?;
    println!("Created {} ({} tracks)", path.display(), tracks.len());
    Ok(())
}

/// Eight regions per hemisphere, connected to their neighbours and mirrored
/// across the midline
fn write_connectome(out_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    const PER_HEMISPHERE: usize = 8;

    let mut nodes = Map::new();
    for id in 1..=2 * PER_HEMISPHERE {
        let (side, offset) = if id <= PER_HEMISPHERE {
            ("lh", -HEMISPHERE_OFFSET)
        } else {
            ("rh", HEMISPHERE_OFFSET)
        };
        let k = (id - 1) % PER_HEMISPHERE;
        let phi = 2.0 * PI * k as f32 / PER_HEMISPHERE as f32;
        nodes.insert(
            id.to_string(),
            json!({
                "pial_x": offset + 0.5 * RADIUS[0] * phi.cos(),
                "pial_y": RADIUS[1] * 0.8 * phi.sin(),
                "pial_z": 10.0,
                "dn_name": format!("{side}.region{}", k + 1),
            }),
        );
    }

    let mut edges: Map<String, Value> = Map::new();
    let mut connect = |i: usize, j: usize, fibers: u32, length: f32| {
        for (a, b) in [(i, j), (j, i)] {
            let row = edges
                .entry(a.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(row) = row {
                row.insert(
                    b.to_string(),
                    json!({
                        "fiber_length_mean": length,
                        "fiber_length_std": length * 0.1,
                        "number_of_fibers": fibers,
                    }),
                );
            }
        }
    };

    for k in 0..PER_HEMISPHERE {
        let next = (k + 1) % PER_HEMISPHERE;
        connect(k + 1, next + 1, 20 + 5 * k as u32, 25.0 + k as f32);
        connect(
            PER_HEMISPHERE + k + 1,
            PER_HEMISPHERE + next + 1,
            18 + 4 * k as u32,
            24.0 + k as f32,
        );
        connect(k + 1, PER_HEMISPHERE + k + 1, 60 - 3 * k as u32, 70.0 + 2.0 * k as f32);
    }

    let nodes_path = out_dir.join("connectome_nodes.json");
    fs::write(&nodes_path, serde_json::to_string_pretty(&Value::Object(nodes))?)?;
    println!("Created {}", nodes_path.display());

    let edges_path = out_dir.join("connectome_edges.json");
    fs::write(&edges_path, serde_json::to_string_pretty(&Value::Object(edges))?)?;
    println!("Created {}", edges_path.display());

    Ok(())
}
