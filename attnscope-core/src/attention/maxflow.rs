//! Dinic's max-flow over a residual network with `f64` capacities.
//!
//! The network is immutable once built; every [`FlowNetwork::max_flow`] call
//! works on its own copy of the residual capacities, so one network can be
//! shared across threads and queried for many (source, sink) pairs.

use std::collections::VecDeque;

/// Residual capacities at or below this are treated as saturated.
const RESIDUAL_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone)]
struct ResidualArc {
    to: usize,
    capacity: f64,
}

/// Directed network; arc `2k` is a forward arc and `2k + 1` its reverse.
#[derive(Debug, Clone, Default)]
pub struct FlowNetwork {
    arcs: Vec<ResidualArc>,
    adjacency: Vec<Vec<usize>>,
}

impl FlowNetwork {
    pub fn new(nodes: usize) -> Self {
        Self {
            arcs: Vec::new(),
            adjacency: vec![Vec::new(); nodes],
        }
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of forward edges.
    pub fn edge_count(&self) -> usize {
        self.arcs.len() / 2
    }

    pub fn add_edge(&mut self, from: usize, to: usize, capacity: f64) {
        let id = self.arcs.len();
        self.arcs.push(ResidualArc { to, capacity });
        self.arcs.push(ResidualArc {
            to: from,
            capacity: 0.0,
        });
        self.adjacency[from].push(id);
        self.adjacency[to].push(id + 1);
    }

    /// Maximum flow value from `source` to `sink`. Returns 0.0 when no
    /// augmenting path exists or when `source == sink`.
    pub fn max_flow(&self, source: usize, sink: usize) -> f64 {
        if source == sink || source >= self.node_count() || sink >= self.node_count() {
            return 0.0;
        }

        let mut residual: Vec<f64> = self.arcs.iter().map(|a| a.capacity).collect();
        let mut level = vec![-1i64; self.node_count()];
        let mut cursor = vec![0usize; self.node_count()];
        let mut total = 0.0;

        while self.bfs_levels(&residual, &mut level, source, sink) {
            cursor.iter_mut().for_each(|c| *c = 0);
            loop {
                let pushed = self.augment(&mut residual, &level, &mut cursor, source, sink, f64::INFINITY);
                if pushed <= RESIDUAL_EPSILON {
                    break;
                }
                total += pushed;
            }
        }
        total
    }

    fn bfs_levels(&self, residual: &[f64], level: &mut [i64], source: usize, sink: usize) -> bool {
        level.iter_mut().for_each(|l| *l = -1);
        level[source] = 0;
        let mut queue = VecDeque::from([source]);
        while let Some(u) = queue.pop_front() {
            for &arc in &self.adjacency[u] {
                let v = self.arcs[arc].to;
                if level[v] < 0 && residual[arc] > RESIDUAL_EPSILON {
                    level[v] = level[u] + 1;
                    queue.push_back(v);
                }
            }
        }
        level[sink] >= 0
    }

    fn augment(
        &self,
        residual: &mut [f64],
        level: &[i64],
        cursor: &mut [usize],
        u: usize,
        sink: usize,
        limit: f64,
    ) -> f64 {
        if u == sink {
            return limit;
        }
        while cursor[u] < self.adjacency[u].len() {
            let arc = self.adjacency[u][cursor[u]];
            let v = self.arcs[arc].to;
            if residual[arc] > RESIDUAL_EPSILON && level[v] == level[u] + 1 {
                let pushed = self.augment(residual, level, cursor, v, sink, limit.min(residual[arc]));
                if pushed > RESIDUAL_EPSILON {
                    residual[arc] -= pushed;
                    residual[arc ^ 1] += pushed;
                    return pushed;
                }
            }
            cursor[u] += 1;
        }
        0.0
    }
}
