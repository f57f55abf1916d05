// SPDX-License-Identifier: Apache-2.0

use crate::cell::CellId;
use crate::floorplan::Floorplan;
use crate::BoundingBox;

mod multirow;
pub use multirow::MultiRowAbacus;

/// A cell as seen by the compaction engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RowCell {
    pub id: CellId,
    /// Position the cell would like to have.
    pub target_x: f64,
    pub width: i64,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Cluster {
    origin: f64,
    width: f64,
    weight: f64,
    /// Sum of `weight * (target_x - offset in cluster)` over the members.
    displacement: f64,
    first: usize,
    len: usize,
}

impl Cluster {
    fn new(index: usize, cell: &RowCell) -> Self {
        Cluster {
            origin: cell.target_x,
            width: cell.width as f64,
            weight: cell.weight,
            displacement: cell.weight * cell.target_x,
            first: index,
            len: 1,
        }
    }

    fn add_cell(&mut self, cell: &RowCell) {
        self.displacement += cell.weight * (cell.target_x - self.width);
        self.weight += cell.weight;
        self.width += cell.width as f64;
        self.len += 1;
    }

    /// `self` followed by `next`, abutting.
    fn merged_with(&self, next: &Cluster) -> Cluster {
        Cluster {
            origin: self.origin,
            width: self.width + next.width,
            weight: self.weight + next.weight,
            displacement: self.displacement + next.displacement - next.weight * self.width,
            first: self.first,
            len: self.len + next.len,
        }
    }

    fn end(&self) -> f64 {
        self.origin + self.width
    }

    fn place(&mut self, lower: f64, upper: f64) {
        let optimal = self.displacement / self.weight;
        // an overfull row pins the cluster to the left edge
        self.origin = optimal.min(upper - self.width).max(lower);
    }
}

/// Collapses `current` onto the clusters of `stack`, merging while it
/// overlaps its predecessor. Returns the collapsed cluster and how many
/// clusters of `stack` survive in front of it.
fn collapse(stack: &[Cluster], mut current: Cluster, lower: f64, upper: f64) -> (Cluster, usize) {
    current.place(lower, upper);
    let mut keep = stack.len();
    while keep > 0 {
        let previous = &stack[keep - 1];
        if previous.end() <= current.origin {
            break;
        }
        current = previous.merged_with(&current);
        current.place(lower, upper);
        keep -= 1;
    }
    (current, keep)
}

/// Compaction state of one subrow: the committed cells, in insertion order,
/// and their clusters.
///
/// Cells are appended in order of their target x. Abutting cells form
/// clusters; a cluster sits at the weighted mean of its members' target
/// positions (shifted by their offsets inside the cluster), clamped into the
/// row. When a cluster collapses onto its left neighbour the two merge and the
/// merged cluster collapses again. For a fixed cell order this minimizes the
/// weighted squared displacement of the row.
#[derive(Debug, Clone)]
pub struct AbacusRow {
    lower: i64,
    upper: i64,
    y: i64,
    cells: Vec<RowCell>,
    clusters: Vec<Cluster>,
    used_width: i64,
}

impl AbacusRow {
    pub fn new(bbox: BoundingBox) -> Self {
        AbacusRow {
            lower: bbox.min_x,
            upper: bbox.max_x,
            y: bbox.min_y,
            cells: Vec::new(),
            clusters: Vec::new(),
            used_width: 0,
        }
    }

    pub fn y(&self) -> i64 {
        self.y
    }

    pub fn cells(&self) -> &[RowCell] {
        &self.cells
    }

    pub fn used_width(&self) -> i64 {
        self.used_width
    }

    pub fn free_width(&self) -> i64 {
        self.upper - self.lower - self.used_width
    }

    /// Cluster that `cell` starts or joins when appended, and the stack it
    /// collapses onto.
    fn appended(&self, cell: &RowCell) -> (Cluster, &[Cluster]) {
        let index = self.cells.len();
        match self.clusters.last() {
            Some(last) if last.end() > cell.target_x => {
                let mut joined = *last;
                joined.add_cell(cell);
                (joined, &self.clusters[..self.clusters.len() - 1])
            }
            _ => (Cluster::new(index, cell), &self.clusters[..]),
        }
    }

    /// Position `cell` would get if it were appended now. Nothing is
    /// modified, so repeated trials give identical answers.
    pub fn trial(&self, cell: &RowCell) -> f64 {
        let (current, stack) = self.appended(cell);
        let (collapsed, _) = collapse(stack, current, self.lower as f64, self.upper as f64);
        collapsed.end() - cell.width as f64
    }

    /// Appends `cell` for good.
    pub fn insert(&mut self, cell: RowCell) {
        let (current, stack) = self.appended(&cell);
        let (collapsed, keep) = collapse(stack, current, self.lower as f64, self.upper as f64);
        self.used_width += cell.width;
        self.cells.push(cell);
        self.clusters.truncate(keep);
        self.clusters.push(collapsed);
    }

    /// Unaligned optimal x of every committed cell, in insertion order.
    pub fn positions(&self) -> Vec<f64> {
        let mut result = Vec::with_capacity(self.cells.len());
        for cluster in &self.clusters {
            let mut x = cluster.origin;
            for cell in &self.cells[cluster.first..cluster.first + cluster.len] {
                result.push(x);
                x += cell.width as f64;
            }
        }
        result
    }

    /// Site-aligned, non-overlapping x of every committed cell: each cluster
    /// origin is rounded to the nearest site, then cells are pushed right to
    /// clear their left neighbour and finally pulled left to stay inside the
    /// row. `None` if the aligned cells no longer fit between the row ends.
    pub fn legal_positions(&self, floorplan: &Floorplan) -> Option<Vec<(CellId, i64)>> {
        let lower = floorplan.ceil_site(self.lower);
        let mut xs = Vec::with_capacity(self.cells.len());
        let mut previous_end = lower;
        for cluster in &self.clusters {
            let mut x = floorplan.nearest_site(cluster.origin).max(lower);
            for cell in &self.cells[cluster.first..cluster.first + cluster.len] {
                x = x.max(floorplan.ceil_site(previous_end));
                xs.push(x);
                previous_end = x + cell.width;
                x = previous_end;
            }
        }

        let mut limit = self.upper;
        for (x, cell) in xs.iter_mut().zip(&self.cells).rev() {
            if *x + cell.width > limit {
                *x = floorplan.floor_site(limit - cell.width);
                if *x < lower {
                    return None;
                }
            }
            limit = *x;
        }

        Some(self.cells.iter().map(|cell| cell.id).zip(xs).collect())
    }
}

/// Compacts `cells` (already ordered by target x) into `[lower, upper)` and
/// returns each cell's unaligned position.
pub fn compact(lower: i64, upper: i64, cells: &[RowCell]) -> Vec<f64> {
    let mut row = AbacusRow::new(BoundingBox::new(lower, 0, upper, 1));
    for cell in cells {
        row.insert(cell.clone());
    }
    row.positions()
}
