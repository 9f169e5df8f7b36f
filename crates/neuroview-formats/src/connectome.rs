//! Connectome node and edge tables
//!
//! Both tables are JSON objects keyed by 1-based node ids, as written by the
//! Connectome Mapping Toolkit:
//!
//! ```json
//! { "1": { "pial_x": 1.0, "pial_y": 2.0, "pial_z": 3.0, "dn_name": "ctx-lh-insula" } }
//! { "1": { "2": { "fiber_length_mean": 40.2, "fiber_length_std": 3.1, "number_of_fibers": 12 } } }
//! ```
//!
//! The edge table stores every connection twice (`i -> j` and `j -> i`); only
//! entries with `j >= i` are kept.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::FormatError;
use crate::geometry::{Bounds, Placement, Vec3};
use crate::Result;

#[derive(Debug, Clone, Deserialize)]
struct NodeRecord {
    pial_x: f32,
    pial_y: f32,
    pial_z: f32,
    #[serde(default)]
    dn_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EdgeRecord {
    fiber_length_mean: f32,
    fiber_length_std: f32,
    number_of_fibers: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectomeNode {
    pub position: Vec3,
    pub name: Option<String>,
}

/// Dense node table; node `i` is the record stored under key `i + 1`
#[derive(Debug, Clone, Serialize)]
pub struct ConnectomeNodes {
    pub nodes: Vec<ConnectomeNode>,
}

impl ConnectomeNodes {
    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_table(serde_json::from_str(text)?)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Self::from_table(serde_json::from_slice(data)?)
    }

    fn from_table(mut table: HashMap<String, NodeRecord>) -> Result<Self> {
        if let Some(bad) = table.keys().find(|key| key.parse::<usize>().is_err()) {
            return Err(FormatError::InvalidNodeKey(bad.clone()));
        }

        let count = table.len();
        let mut nodes = Vec::with_capacity(count);
        for i in 0..count {
            let record = table
                .remove(&(i + 1).to_string())
                .ok_or(FormatError::UnknownNode(i))?;
            nodes.push(ConnectomeNode {
                position: [record.pial_x, record.pial_y, record.pial_z],
                name: record.dn_name,
            });
        }

        debug!("Loaded {} connectome nodes", nodes.len());
        Ok(Self { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node positions as x,y,z triplets
    pub fn positions(&self) -> Vec<f32> {
        self.nodes.iter().flat_map(|n| n.position).collect()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(self.nodes.iter().map(|n| n.position))
    }
}

/// An undirected connection between two 0-based node indices
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConnectomeEdge {
    pub node_index0: usize,
    pub node_index1: usize,
    pub fiber_length_mean: f32,
    pub fiber_length_std: f32,
    pub number_of_fibers: f32,
}

/// Deduplicated edge list with value ranges
#[derive(Debug, Clone, Serialize)]
pub struct ConnectomeEdges {
    pub edges: Vec<ConnectomeEdge>,
    pub min_number_of_fibers: f32,
    pub max_number_of_fibers: f32,
    pub min_fiber_length_mean: f32,
    pub max_fiber_length_mean: f32,
}

impl ConnectomeEdges {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(Self::from_table(&serde_json::from_str(text)?))
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Ok(Self::from_table(&serde_json::from_slice(data)?))
    }

    fn from_table(table: &HashMap<String, HashMap<String, EdgeRecord>>) -> Self {
        // Node count is taken from the number of rows in the table
        let node_count = table.len();
        let mut edges = Vec::new();

        for i in 1..=node_count {
            let Some(row) = table.get(&i.to_string()) else {
                continue;
            };
            for j in i..=node_count {
                if let Some(record) = row.get(&j.to_string()) {
                    edges.push(ConnectomeEdge {
                        node_index0: i - 1,
                        node_index1: j - 1,
                        fiber_length_mean: record.fiber_length_mean,
                        fiber_length_std: record.fiber_length_std,
                        number_of_fibers: record.number_of_fibers,
                    });
                }
            }
        }

        debug!("Loaded {} connectome edges over {} rows", edges.len(), node_count);
        Self::from_edges(edges)
    }

    /// Wrap an edge list, computing the fiber count and length ranges.
    /// Ranges are zero for an empty list.
    pub fn from_edges(edges: Vec<ConnectomeEdge>) -> Self {
        let mut ranges = match edges.first() {
            Some(first) => [
                first.number_of_fibers,
                first.number_of_fibers,
                first.fiber_length_mean,
                first.fiber_length_mean,
            ],
            None => [0.0; 4],
        };

        for edge in &edges {
            ranges[0] = ranges[0].min(edge.number_of_fibers);
            ranges[1] = ranges[1].max(edge.number_of_fibers);
            ranges[2] = ranges[2].min(edge.fiber_length_mean);
            ranges[3] = ranges[3].max(edge.fiber_length_mean);
        }

        Self {
            edges,
            min_number_of_fibers: ranges[0],
            max_number_of_fibers: ranges[1],
            min_fiber_length_mean: ranges[2],
            max_fiber_length_mean: ranges[3],
        }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Nodes and edges joined into line segments
#[derive(Debug, Clone, Serialize)]
pub struct ConnectomeGraph {
    pub nodes: ConnectomeNodes,
    pub edges: ConnectomeEdges,
    /// Both endpoint positions of every edge, 6 floats per edge
    pub edge_positions: Vec<f32>,
    /// `number_of_fibers / (max - min)` per edge
    pub fiber_weights: Vec<f32>,
    /// `fiber_length_mean / (max - min)` per edge
    pub length_weights: Vec<f32>,
    pub bounds: Option<Bounds>,
    pub placement: Placement,
}

impl ConnectomeGraph {
    /// Join an edge list onto its node table. Every edge endpoint must name an
    /// existing node.
    pub fn join(nodes: ConnectomeNodes, edges: ConnectomeEdges) -> Result<Self> {
        let fiber_range = edges.max_number_of_fibers - edges.min_number_of_fibers;
        let length_range = edges.max_fiber_length_mean - edges.min_fiber_length_mean;
        if !edges.is_empty() && (fiber_range == 0.0 || length_range == 0.0) {
            warn!("Connectome edge values have an empty range; weights are zero");
        }

        let mut edge_positions = Vec::with_capacity(edges.len() * 6);
        let mut fiber_weights = Vec::with_capacity(edges.len());
        let mut length_weights = Vec::with_capacity(edges.len());

        for edge in &edges.edges {
            for index in [edge.node_index0, edge.node_index1] {
                let node = nodes.nodes.get(index).ok_or(FormatError::UnknownNode(index))?;
                edge_positions.extend_from_slice(&node.position);
            }
            fiber_weights.push(weight(edge.number_of_fibers, fiber_range));
            length_weights.push(weight(edge.fiber_length_mean, length_range));
        }

        let bounds = nodes.bounds();
        let placement = Placement::from_bounds(bounds.as_ref());

        Ok(Self {
            nodes,
            edges,
            edge_positions,
            fiber_weights,
            length_weights,
            bounds,
            placement,
        })
    }

    /// Two line vertices per edge
    pub fn rendered_vertex_count(&self) -> usize {
        self.edge_positions.len() / 3
    }
}

fn weight(value: f32, range: f32) -> f32 {
    if range == 0.0 {
        0.0
    } else {
        value / range
    }
}
