// SPDX-License-Identifier: Apache-2.0

use std::marker::PhantomData;

use fixedbitset::FixedBitSet;
use log::{debug, warn};
use nalgebra::DVector;

use crate::cell::{CellId, WorkCell};
use crate::config::GraphConfig;
use crate::floorplan::{Floorplan, RowAlignment};
use crate::{BoundingBox, Coordinate};

mod axis;
mod mincut;
mod solver;

pub use axis::{Axis, Horizontal, Vertical};

use solver::{Constraint, DisplacementProblem};

/// Outcome of the edge exchange between the horizontal and vertical graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphStatus {
    /// Every cell has a non-empty feasible range on both axes.
    Feasible,
    /// Some cell still has negative slack after `iterations` exchanges. The
    /// solve proceeds anyway and the result may overlap.
    StillInfeasible { iterations: usize },
}

impl GraphStatus {
    pub fn is_feasible(&self) -> bool {
        matches!(self, GraphStatus::Feasible)
    }
}

/// DAG of "must end before the other begins" relations on one axis, with a
/// source at `lower` and a sink at `upper`.
#[derive(Debug, Clone)]
pub struct ConstraintGraph<A: Axis> {
    boxes: Vec<BoundingBox>,
    successors: Vec<FixedBitSet>,
    lower: i64,
    upper: i64,
    min: Vec<i64>,
    max: Vec<i64>,
    axis: PhantomData<A>,
}

impl<A: Axis> ConstraintGraph<A> {
    /// Builds the transitively reduced graph of the pairs that bind on axis
    /// `A`, and computes slacks against `[lower, upper)`.
    pub fn build(boxes: &[BoundingBox], lower: i64, upper: i64) -> Self {
        let n = boxes.len();
        let mut graph = ConstraintGraph {
            boxes: boxes.to_vec(),
            successors: vec![FixedBitSet::with_capacity(n); n],
            lower,
            upper,
            min: vec![lower; n],
            max: vec![upper; n],
            axis: PhantomData,
        };

        for i in 0..n {
            for j in (i + 1)..n {
                let own = A::gap(&boxes[i], &boxes[j]);
                let other = <A::Orthogonal as Axis>::gap(&boxes[i], &boxes[j]);
                let binds = if A::WINS_TIES { own >= other } else { own > other };
                if binds {
                    let (before, after) = graph.oriented(i, j);
                    graph.successors[before].insert(after);
                }
            }
        }

        graph.transitive_closure();
        graph.transitive_reduction();
        graph.calculate_slacks();
        graph
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn has_edge(&self, from: usize, to: usize) -> bool {
        self.successors[from].contains(to)
    }

    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.successors
            .iter()
            .enumerate()
            .flat_map(|(u, set)| set.ones().map(move |v| (u, v)))
    }

    pub fn edge_count(&self) -> usize {
        self.successors.iter().map(|s| s.count_ones(..)).sum()
    }

    pub(crate) fn add_edge(&mut self, from: usize, to: usize) {
        self.successors[from].insert(to);
    }

    pub(crate) fn remove_edge(&mut self, from: usize, to: usize) {
        self.successors[from].set(to, false);
    }

    /// Orders a pair the way an edge between them must point: by position on
    /// this axis, then by index.
    pub fn oriented(&self, a: usize, b: usize) -> (usize, usize) {
        if (A::lo(&self.boxes[a]), a) <= (A::lo(&self.boxes[b]), b) {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn size(&self, node: usize) -> i64 {
        A::size(&self.boxes[node])
    }

    /// Smallest feasible coordinate of `node`.
    pub fn min(&self, node: usize) -> i64 {
        self.min[node]
    }

    /// Largest feasible coordinate of `node`.
    pub fn max(&self, node: usize) -> i64 {
        self.max[node]
    }

    pub fn slack(&self, node: usize) -> i64 {
        self.max[node] - self.min[node]
    }

    pub fn is_feasible(&self) -> bool {
        (0..self.len()).all(|i| self.slack(i) >= 0)
    }

    fn transitive_closure(&mut self) {
        let n = self.len();
        for k in 0..n {
            let through = self.successors[k].clone();
            for i in 0..n {
                if self.successors[i].contains(k) {
                    self.successors[i].union_with(&through);
                }
            }
        }
    }

    /// Drops every edge implied by a longer path. Assumes the edge set is
    /// transitively closed.
    fn transitive_reduction(&mut self) {
        let n = self.len();
        let closure = self.successors.clone();
        for (i, successors) in self.successors.iter_mut().enumerate() {
            let mut implied = FixedBitSet::with_capacity(n);
            for k in closure[i].ones() {
                implied.union_with(&closure[k]);
            }
            successors.difference_with(&implied);
        }
    }

    /// Nodes ordered so that every edge points forward.
    pub fn topological_order(&self) -> Vec<usize> {
        let mut order = (0..self.len()).collect::<Vec<_>>();
        order.sort_by_key(|&i| (A::lo(&self.boxes[i]), i));
        order
    }

    /// Longest-path bounds from the source and to the sink.
    pub fn calculate_slacks(&mut self) {
        let order = self.topological_order();

        self.min.fill(self.lower);
        for &u in &order {
            let end = self.min[u] + self.size(u);
            for v in self.successors[u].ones() {
                self.min[v] = self.min[v].max(end);
            }
        }

        for &u in order.iter().rev() {
            let size = self.size(u);
            let latest = self.successors[u]
                .ones()
                .map(|v| self.max[v] - size)
                .fold(self.upper - size, i64::min);
            self.max[u] = latest;
        }
    }

    /// Positions for every node minimizing weighted squared displacement from
    /// `targets`, then rounded to the grid. A forward sweep restores each
    /// edge after rounding, and the result is clamped into the bounds.
    fn place(
        &self,
        floorplan: &Floorplan,
        targets: &[f64],
        weights: &[f64],
        alignments: &[RowAlignment],
        config: &GraphConfig,
    ) -> Vec<i64> {
        let mut constraints = Vec::with_capacity(self.edge_count() + 2 * self.len());
        for i in 0..self.len() {
            constraints.push(Constraint::AtLeast {
                index: i,
                bound: self.lower as f64,
            });
            constraints.push(Constraint::AtMost {
                index: i,
                bound: (self.upper - self.size(i)) as f64,
            });
        }
        constraints.extend(self.edges().map(|(u, v)| Constraint::Separation {
            before: u,
            after: v,
            gap: self.size(u) as f64,
        }));

        let problem = DisplacementProblem {
            targets: DVector::from_column_slice(targets),
            weights: DVector::from_column_slice(weights),
            constraints,
        };
        let solution = solver::solve(&problem, config.solver_sweeps, config.solver_tolerance);

        let mut result = solution
            .iter()
            .zip(alignments)
            .map(|(value, alignment)| A::nearest(floorplan, *value, *alignment))
            .collect::<Vec<_>>();

        for u in self.topological_order() {
            let end = result[u] + self.size(u);
            for v in self.successors[u].ones() {
                if result[v] < end {
                    result[v] = A::at_or_after(floorplan, end, alignments[v]);
                }
            }
        }

        for (i, value) in result.iter_mut().enumerate() {
            let lo = A::at_or_after(floorplan, self.lower, alignments[i]);
            let hi = A::at_or_before(floorplan, self.upper - self.size(i), alignments[i]);
            *value = (*value).min(hi).max(lo);
        }
        result
    }
}

/// Trades edges between the two graphs until both are feasible, no more
/// progress is made, or `max_iterations` exchanges have run.
pub fn exchange_edges(
    horizontal: &mut ConstraintGraph<Horizontal>,
    vertical: &mut ConstraintGraph<Vertical>,
    max_iterations: usize,
) -> GraphStatus {
    for iteration in 0..max_iterations {
        if horizontal.is_feasible() && vertical.is_feasible() {
            return GraphStatus::Feasible;
        }
        let mut moved = 0;
        if !horizontal.is_feasible() {
            moved = mincut::adjust_graph(horizontal, vertical);
        }
        if moved == 0 && !vertical.is_feasible() {
            moved = mincut::adjust_graph(vertical, horizontal);
        }
        debug!("Edge exchange round {}: moved {} edges", iteration + 1, moved);
        if moved == 0 {
            warn!(
                "Constraint graphs still infeasible after {} rounds with no further progress",
                iteration + 1
            );
            return GraphStatus::StillInfeasible {
                iterations: iteration + 1,
            };
        }
    }

    if horizontal.is_feasible() && vertical.is_feasible() {
        GraphStatus::Feasible
    } else {
        warn!(
            "Constraint graphs still infeasible after {} rounds",
            max_iterations
        );
        GraphStatus::StillInfeasible {
            iterations: max_iterations,
        }
    }
}

/// Result of a constraint graph legalization.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSolution {
    pub positions: Vec<(CellId, Coordinate)>,
    pub status: GraphStatus,
}

/// Legalizes `cells` inside `bounds` with a pair of constraint graphs.
///
/// Each pair of cells is constrained on the axis where it is currently
/// separated more (horizontal on ties). When a coordinate range comes out
/// empty, edges are traded to the other axis along a minimum cut.
///
/// Cells are first snapped to the grid inside `bounds`. The resulting
/// positions respect every precedence edge when the status is `Feasible`;
/// otherwise some cells may still overlap and need repair.
pub fn legalize_with_constraint_graph(
    floorplan: &Floorplan,
    cells: &[WorkCell],
    bounds: BoundingBox,
    config: &GraphConfig,
) -> GraphSolution {
    if cells.is_empty() {
        return GraphSolution {
            positions: Vec::new(),
            status: GraphStatus::Feasible,
        };
    }

    let boxes = cells
        .iter()
        .map(|cell| cell.bbox_at(snap_into(floorplan, cell, &bounds)))
        .collect::<Vec<_>>();

    let mut horizontal =
        ConstraintGraph::<Horizontal>::build(&boxes, bounds.min_x, bounds.max_x);
    let mut vertical = ConstraintGraph::<Vertical>::build(&boxes, bounds.min_y, bounds.max_y);
    debug!(
        "Constraint graphs for {} cells: {} horizontal and {} vertical edges",
        cells.len(),
        horizontal.edge_count(),
        vertical.edge_count()
    );

    let status = exchange_edges(&mut horizontal, &mut vertical, config.max_iterations);

    let weights = cells.iter().map(|c| c.weight).collect::<Vec<_>>();
    let alignments = cells.iter().map(|c| c.alignment).collect::<Vec<_>>();
    let xs = horizontal.place(
        floorplan,
        &cells.iter().map(|c| c.location.x as f64).collect::<Vec<_>>(),
        &weights,
        &alignments,
        config,
    );
    let ys = vertical.place(
        floorplan,
        &cells.iter().map(|c| c.location.y as f64).collect::<Vec<_>>(),
        &weights,
        &alignments,
        config,
    );

    GraphSolution {
        positions: cells
            .iter()
            .zip(xs.into_iter().zip(ys))
            .map(|(cell, (x, y))| (cell.id, Coordinate::new(x, y)))
            .collect(),
        status,
    }
}

/// Nearest grid position for `cell` that keeps it inside `bounds`, if the
/// cell fits there at all.
fn snap_into(floorplan: &Floorplan, cell: &WorkCell, bounds: &BoundingBox) -> Coordinate {
    let x_lo = Horizontal::at_or_after(floorplan, bounds.min_x, cell.alignment);
    let x_hi = Horizontal::at_or_before(floorplan, bounds.max_x - cell.width, cell.alignment);
    let y_lo = Vertical::at_or_after(floorplan, bounds.min_y, cell.alignment);
    let y_hi = Vertical::at_or_before(floorplan, bounds.max_y - cell.height, cell.alignment);
    let x = Horizontal::nearest(floorplan, cell.location.x as f64, cell.alignment);
    let y = Vertical::nearest(floorplan, cell.location.y as f64, cell.alignment);
    Coordinate::new(x.min(x_hi).max(x_lo), y.min(y_hi).max(y_lo))
}
