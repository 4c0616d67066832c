//! Attention flow.
//!
//! Treats augmented attention weights as capacities in a layered graph and
//! attributes each input position to each final-layer position by max-flow.
//! Node `i * seq_len + k` is "position `k` after `i` layers"; layer 0 is the
//! input embeddings.

use super::maxflow::FlowNetwork;
use super::tensor::{normalize_distribution, AttentionTensor, Matrix};
use crate::error::AttnError;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Edges with capacity at or below this are left out of the graph.
pub const DEFAULT_CAPACITY_THRESHOLD: f64 = 1e-8;

/// Knobs for [`flow_with`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowOptions {
    /// Blend each layer's head average with the identity: `(avg + I) * 0.5`.
    pub add_identity: bool,
    /// Drop `k -> k` edges between consecutive layers.
    pub remove_diagonal: bool,
    /// Minimum capacity for an edge to be materialized.
    pub threshold: f64,
    /// Run the per-sink max-flow queries on the rayon pool.
    pub parallel: bool,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            add_identity: true,
            remove_diagonal: false,
            threshold: DEFAULT_CAPACITY_THRESHOLD,
            parallel: true,
        }
    }
}

/// A node of the layered flow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowNode {
    pub layer: usize,
    pub position: usize,
}

/// Per-layer augmented attention, `[layer][from][to]`.
pub fn joint_attentions(attentions: &AttentionTensor, add_identity: bool) -> Vec<Matrix> {
    (0..attentions.num_layers())
        .map(|layer| {
            let mut m = attentions.head_average(layer);
            if add_identity {
                m.add_identity();
                m.scale(0.5);
            }
            m.row_normalize_guarded();
            m
        })
        .collect()
}

/// The layered capacity graph.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    graph: DiGraph<FlowNode, f64>,
    num_layers: usize,
    seq_len: usize,
}

impl FlowGraph {
    /// Build the graph from per-layer joint attention matrices.
    pub fn build(joint: &[Matrix], seq_len: usize, options: &FlowOptions) -> Self {
        let num_layers = joint.len();
        let mut graph = DiGraph::with_capacity((num_layers + 1) * seq_len, num_layers * seq_len * seq_len);

        for layer in 0..=num_layers {
            for position in 0..seq_len {
                graph.add_node(FlowNode { layer, position });
            }
        }

        for (i, weights) in joint.iter().enumerate() {
            for from in 0..seq_len {
                for to in 0..seq_len {
                    if options.remove_diagonal && from == to {
                        continue;
                    }
                    let capacity = weights[(from, to)];
                    if capacity <= options.threshold {
                        continue;
                    }
                    let u = NodeIndex::new(i * seq_len + from);
                    let v = NodeIndex::new((i + 1) * seq_len + to);
                    trace!(layer = i + 1, from, to, capacity, "flow edge");
                    graph.add_edge(u, v, capacity);
                }
            }
        }

        Self {
            graph,
            num_layers,
            seq_len,
        }
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Graph index of `position` after `layer` layers.
    pub fn node(&self, layer: usize, position: usize) -> usize {
        layer * self.seq_len + position
    }

    pub fn node_label(&self, index: usize) -> Option<FlowNode> {
        self.graph.node_weight(NodeIndex::new(index)).copied()
    }

    /// Capacity of the edge entering layer `layer` (1-based) from `from` to `to`.
    pub fn capacity(&self, layer: usize, from: usize, to: usize) -> Option<f64> {
        if layer == 0 || layer > self.num_layers {
            return None;
        }
        let u = NodeIndex::new(self.node(layer - 1, from));
        let v = NodeIndex::new(self.node(layer, to));
        self.graph
            .find_edge(u, v)
            .and_then(|e| self.graph.edge_weight(e).copied())
    }

    fn network(&self) -> FlowNetwork {
        let mut net = FlowNetwork::new(self.graph.node_count());
        for edge in self.graph.edge_references() {
            net.add_edge(edge.source().index(), edge.target().index(), *edge.weight());
        }
        net
    }
}

/// Flow with default options.
pub fn flow(attentions: &AttentionTensor, source: Option<usize>) -> Result<Matrix, AttnError> {
    flow_with(attentions, source, &FlowOptions::default())
}

/// Compute the flow matrix.
///
/// With `Some(source)` the result is `1 x seq_len`: the normalized max-flow
/// from that input position to every final-layer position. With `None` every
/// input position is a source and the result is `seq_len x seq_len`.
pub fn flow_with(
    attentions: &AttentionTensor,
    source: Option<usize>,
    options: &FlowOptions,
) -> Result<Matrix, AttnError> {
    let seq_len = attentions.seq_len();
    if let Some(index) = source
        && index >= seq_len
    {
        return Err(AttnError::InvalidIndex {
            index: index as i64,
            len: seq_len,
        });
    }

    let joint = joint_attentions(attentions, options.add_identity);
    let graph = FlowGraph::build(&joint, seq_len, options);
    debug!(
        layers = graph.num_layers(),
        seq_len,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "built attention flow graph"
    );
    let network = graph.network();

    let sources: Vec<usize> = match source {
        Some(index) => vec![index],
        None => (0..seq_len).collect(),
    };
    let rows: Vec<Vec<f64>> = if options.parallel {
        sources
            .par_iter()
            .map(|&s| flow_row(&network, &graph, s, true))
            .collect()
    } else {
        sources
            .iter()
            .map(|&s| flow_row(&network, &graph, s, false))
            .collect()
    };
    Matrix::from_rows(rows)
}

fn flow_row(network: &FlowNetwork, graph: &FlowGraph, source: usize, parallel: bool) -> Vec<f64> {
    let final_layer = graph.num_layers();
    let sink_flow = |position: usize| {
        let sink = graph.node(final_layer, position);
        let value = network.max_flow(graph.node(0, source), sink);
        if value == 0.0 {
            trace!(source, sink = position, "no augmenting path, flow is zero");
        }
        value
    };

    let mut row: Vec<f64> = if parallel {
        (0..graph.seq_len()).into_par_iter().map(sink_flow).collect()
    } else {
        (0..graph.seq_len()).map(sink_flow).collect()
    };
    if normalize_distribution(&mut row) {
        debug!(source, "no flow reached the final layer, substituted uniform distribution");
    }
    row
}
