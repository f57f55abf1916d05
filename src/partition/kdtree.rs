// SPDX-License-Identifier: Apache-2.0

use crate::cell::CellId;
use crate::floorplan::Floorplan;
use crate::BoundingBox;

/// A leaf of the KD-tree: a box and the cells that lie entirely inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct KdPartition {
    pub bounds: BoundingBox,
    pub cells: Vec<CellId>,
}

/// Leaves of a KD-tree split, plus the cells that straddle a split line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KdSplit {
    pub partitions: Vec<KdPartition>,
    pub ancients: Vec<CellId>,
}

/// Splits `bounds` `depth` times at the median cell center, alternating
/// between vertical (x) and horizontal (y) split lines. Split lines sit on
/// site or row boundaries, so leaves never share a site. A cell crossing a
/// split line belongs to no leaf and is reported as an ancient instead.
pub fn split(
    floorplan: &Floorplan,
    cells: &[(CellId, BoundingBox)],
    bounds: BoundingBox,
    depth: usize,
) -> KdSplit {
    let mut result = KdSplit::default();
    let mut stack = vec![(bounds, cells.to_vec(), 0usize)];

    while let Some((bounds, cells, level)) = stack.pop() {
        if level == depth {
            result.partitions.push(KdPartition {
                bounds,
                cells: cells.iter().map(|(id, _)| *id).collect(),
            });
            continue;
        }

        let vertical_line = level % 2 == 0;
        let Some(line) = split_line(floorplan, &cells, &bounds, vertical_line) else {
            // too thin to split further
            result.partitions.push(KdPartition {
                bounds,
                cells: cells.iter().map(|(id, _)| *id).collect(),
            });
            continue;
        };

        let (low_bounds, high_bounds) = if vertical_line {
            (
                BoundingBox::new(bounds.min_x, bounds.min_y, line, bounds.max_y),
                BoundingBox::new(line, bounds.min_y, bounds.max_x, bounds.max_y),
            )
        } else {
            (
                BoundingBox::new(bounds.min_x, bounds.min_y, bounds.max_x, line),
                BoundingBox::new(bounds.min_x, line, bounds.max_x, bounds.max_y),
            )
        };

        let mut low = Vec::new();
        let mut high = Vec::new();
        for (id, bbox) in cells {
            let (lo, hi) = if vertical_line {
                (bbox.min_x, bbox.max_x)
            } else {
                (bbox.min_y, bbox.max_y)
            };
            if hi <= line {
                low.push((id, bbox));
            } else if lo >= line {
                high.push((id, bbox));
            } else {
                result.ancients.push(id);
            }
        }

        // pushed in reverse so that leaves come out low side first
        stack.push((high_bounds, high, level + 1));
        stack.push((low_bounds, low, level + 1));
    }

    result
}

/// Grid line closest to the median cell center, strictly inside `bounds`.
fn split_line(
    floorplan: &Floorplan,
    cells: &[(CellId, BoundingBox)],
    bounds: &BoundingBox,
    vertical_line: bool,
) -> Option<i64> {
    let mut centers = cells
        .iter()
        .map(|(_, b)| {
            let (x, y) = b.center();
            if vertical_line { x } else { y }
        })
        .collect::<Vec<_>>();
    centers.sort_by(f64::total_cmp);

    let (lo, hi) = if vertical_line {
        (bounds.min_x, bounds.max_x)
    } else {
        (bounds.min_y, bounds.max_y)
    };
    let median = centers
        .get(centers.len() / 2)
        .copied()
        .unwrap_or((lo + hi) as f64 / 2.0);

    let (snapped, first, last) = if vertical_line {
        (
            floorplan.nearest_site(median),
            floorplan.ceil_site(lo + 1),
            floorplan.floor_site(hi - 1),
        )
    } else {
        let row = ((median - floorplan.origin.y as f64) / floorplan.row_height as f64).round();
        (
            floorplan.row_y(row as i64),
            floorplan.ceil_row(lo + 1),
            floorplan.floor_row(hi - 1),
        )
    };
    if first > last {
        return None;
    }
    Some(snapped.clamp(first, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::Cell;

    #[test]
    fn straddling_cell_is_ancient() {
        let fp = Floorplan::new((0, 0), (100, 40), 10, 10);
        let mut arena = Arena::new();
        let cells = [(10, 0), (20, 10), (45, 20), (70, 0), (80, 30)]
            .iter()
            .map(|&(x, y)| {
                let cell = Cell::new("c", 10, 10).at(x, y);
                let bbox = cell.bbox();
                (arena.insert(cell), bbox)
            })
            .collect::<Vec<_>>();

        let split = split(&fp, &cells, fp.boundary(), 1);
        // median center x is 50, which the cell at 45 crosses
        assert_eq!(split.ancients, vec![cells[2].0]);
        assert_eq!(split.partitions.len(), 2);
        assert_eq!(split.partitions[0].bounds, BoundingBox::new(0, 0, 50, 40));
        assert_eq!(split.partitions[0].cells, vec![cells[0].0, cells[1].0]);
        assert_eq!(split.partitions[1].cells, vec![cells[3].0, cells[4].0]);
    }

    #[test]
    fn leaves_tile_the_bounds() {
        let fp = Floorplan::new((0, 0), (100, 40), 10, 10);
        let split = split(&fp, &[], fp.boundary(), 2);
        assert_eq!(split.partitions.len(), 4);
        let area: i64 = split.partitions.iter().map(|p| p.bounds.area()).sum();
        assert_eq!(area, fp.boundary().area());
        for (i, a) in split.partitions.iter().enumerate() {
            for b in &split.partitions[i + 1..] {
                assert!(!a.bounds.intersects(&b.bounds));
            }
        }
    }
}
