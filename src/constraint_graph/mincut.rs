// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;

use log::debug;

use super::{Axis, ConstraintGraph};

pub(crate) const INFINITE: i64 = i64::MAX / 4;

/// Dense residual network for small max-flow instances.
#[derive(Debug, Clone)]
pub(crate) struct FlowNetwork {
    residual: Vec<Vec<i64>>,
}

impl FlowNetwork {
    pub(crate) fn new(nodes: usize) -> Self {
        FlowNetwork {
            residual: vec![vec![0; nodes]; nodes],
        }
    }

    pub(crate) fn add_edge(&mut self, from: usize, to: usize, capacity: i64) {
        self.residual[from][to] = (self.residual[from][to] + capacity).min(INFINITE);
    }

    fn augmenting_path(&self, source: usize, sink: usize) -> Option<Vec<usize>> {
        let n = self.residual.len();
        let mut parent = vec![usize::MAX; n];
        parent[source] = source;
        let mut queue = VecDeque::from([source]);
        while let Some(u) = queue.pop_front() {
            for v in 0..n {
                if parent[v] == usize::MAX && self.residual[u][v] > 0 {
                    parent[v] = u;
                    if v == sink {
                        let mut path = vec![sink];
                        let mut node = sink;
                        while node != source {
                            node = parent[node];
                            path.push(node);
                        }
                        path.reverse();
                        return Some(path);
                    }
                    queue.push_back(v);
                }
            }
        }
        None
    }

    /// Edmonds-Karp. Returns the flow value and, for every node, whether it
    /// is on the source side of a minimum cut.
    pub(crate) fn min_cut(&mut self, source: usize, sink: usize) -> (i64, Vec<bool>) {
        let mut flow = 0;
        while let Some(path) = self.augmenting_path(source, sink) {
            let bottleneck = path
                .windows(2)
                .map(|w| self.residual[w[0]][w[1]])
                .min()
                .unwrap_or(0);
            for w in path.windows(2) {
                self.residual[w[0]][w[1]] -= bottleneck;
                self.residual[w[1]][w[0]] += bottleneck;
            }
            flow += bottleneck;
        }

        let n = self.residual.len();
        let mut reachable = vec![false; n];
        reachable[source] = true;
        let mut queue = VecDeque::from([source]);
        while let Some(u) = queue.pop_front() {
            for v in 0..n {
                if !reachable[v] && self.residual[u][v] > 0 {
                    reachable[v] = true;
                    queue.push_back(v);
                }
            }
        }
        (flow, reachable)
    }
}

/// Moves a minimum set of precedence edges from `graph` to `orthogonal` so
/// that the negative-slack part of `graph` is disconnected.
///
/// Only edges between negative-slack nodes take part. Each costs one plus the
/// slack deficit the pair would cause if enforced on the orthogonal axis
/// instead. Returns the number of edges moved; both graphs have fresh slacks
/// afterwards.
pub(crate) fn adjust_graph<A: Axis>(
    graph: &mut ConstraintGraph<A>,
    orthogonal: &mut ConstraintGraph<A::Orthogonal>,
) -> usize {
    let n = graph.len();
    let critical = (0..n).map(|i| graph.slack(i) < 0).collect::<Vec<_>>();
    let edges = graph
        .edges()
        .filter(|&(u, v)| critical[u] && critical[v])
        .collect::<Vec<_>>();
    if edges.is_empty() {
        return 0;
    }

    let source = n;
    let sink = n + 1;
    let mut network = FlowNetwork::new(n + 2);
    let mut has_predecessor = vec![false; n];
    let mut has_successor = vec![false; n];
    for &(u, v) in &edges {
        let (before, after) = orthogonal.oriented(u, v);
        let new_slack =
            orthogonal.max(after) - (orthogonal.min(before) + orthogonal.size(before));
        network.add_edge(u, v, 1 + (-new_slack).max(0));
        has_successor[u] = true;
        has_predecessor[v] = true;
    }
    for i in (0..n).filter(|&i| critical[i]) {
        if has_successor[i] && !has_predecessor[i] {
            network.add_edge(source, i, INFINITE);
        }
        if has_predecessor[i] && !has_successor[i] {
            network.add_edge(i, sink, INFINITE);
        }
    }

    let (flow, source_side) = network.min_cut(source, sink);
    let cut = edges
        .into_iter()
        .filter(|&(u, v)| source_side[u] && !source_side[v])
        .collect::<Vec<_>>();
    debug!(
        "Moving {} {} edges to the {} graph (cut capacity {})",
        cut.len(),
        A::NAME,
        <A::Orthogonal as Axis>::NAME,
        flow
    );

    for &(u, v) in &cut {
        graph.remove_edge(u, v);
        let (before, after) = orthogonal.oriented(u, v);
        orthogonal.add_edge(before, after);
    }
    graph.calculate_slacks();
    orthogonal.calculate_slacks();
    cut.len()
}
