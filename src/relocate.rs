// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;

use indexmap::IndexMap;
use log::{debug, warn};
use rstar::{AABB, RTree, RTreeObject};

use crate::arena::SecondaryMap;
use crate::cell::{Cell, CellId};
use crate::error::RelocationError;
use crate::floorplan::{Floorplan, RowAlignment};
use crate::{Area, BoundingBox, Coordinate};

#[derive(Debug, Clone, PartialEq)]
struct IndexedBox {
    cell: CellId,
    envelope: AABB<[i64; 2]>,
}

impl RTreeObject for IndexedBox {
    type Envelope = AABB<[i64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    bbox: BoundingBox,
    fixed: bool,
    alignment: RowAlignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Push {
    Left,
    Right,
}

/// Cells moved by one relocation, with their new lower-left corners, and the
/// summed Manhattan displacement of all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub moves: Vec<(CellId, Coordinate)>,
    pub cost: i64,
}

/// Spatial index of cell boxes supporting all-or-nothing single-cell moves.
///
/// Moving a cell onto an occupied spot pushes the cells it lands on out of
/// the way, left or right, and those pushes cascade.
#[derive(Debug, Clone)]
pub struct CellLegalizer {
    index: RTree<IndexedBox>,
    entries: SecondaryMap<Cell, Entry>,
    ids: Vec<CellId>,
}

impl CellLegalizer {
    /// Indexes the bounding box of every given cell.
    pub fn build_index<'a>(cells: impl IntoIterator<Item = (CellId, &'a Cell)>) -> Self {
        let mut entries = SecondaryMap::new();
        let mut ids = Vec::new();
        let mut boxes = Vec::new();
        for (id, cell) in cells {
            let bbox = cell.bbox();
            entries.insert(
                id,
                Entry {
                    name: cell.name.clone(),
                    bbox,
                    fixed: cell.fixed,
                    alignment: cell.alignment,
                },
            );
            ids.push(id);
            boxes.push(IndexedBox {
                cell: id,
                envelope: bbox.to_aabb(),
            });
        }
        CellLegalizer {
            index: RTree::bulk_load(boxes),
            entries,
            ids,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Current box of an indexed cell.
    pub fn bbox(&self, id: CellId) -> Option<BoundingBox> {
        self.entries.get(id).map(|e| e.bbox)
    }

    fn name(&self, id: CellId) -> String {
        self.entries
            .get(id)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Moves `id` so that its lower-left corner is at `target`, pushing
    /// whatever it lands on. With `estimate_only` nothing is modified and
    /// only the cost is meaningful.
    pub fn legalize_cell(
        &mut self,
        id: CellId,
        target: Coordinate,
        region: &Area,
        estimate_only: bool,
    ) -> Result<Relocation, RelocationError> {
        let relocation = self.plan(id, target, region)?;
        if !estimate_only {
            self.commit(&relocation);
        }
        Ok(relocation)
    }

    /// Cost of moving `id` to `target`, without moving anything.
    pub fn estimate(
        &self,
        id: CellId,
        target: Coordinate,
        region: &Area,
    ) -> Result<i64, RelocationError> {
        self.plan(id, target, region).map(|r| r.cost)
    }

    fn plan(
        &self,
        id: CellId,
        target: Coordinate,
        region: &Area,
    ) -> Result<Relocation, RelocationError> {
        let entry = self
            .entries
            .get(id)
            .filter(|e| {
                self.index.contains(&IndexedBox {
                    cell: id,
                    envelope: e.bbox.to_aabb(),
                })
            })
            .ok_or_else(|| RelocationError::NotIndexed {
                cell: id.to_string(),
            })?;

        let mover = entry.bbox.moved_to(target);
        if !region.covers(&mover) {
            return Err(RelocationError::LeavesRegion {
                cell: entry.name.clone(),
            });
        }

        let mut proposals: IndexMap<CellId, (BoundingBox, Push)> = IndexMap::new();
        let mut queue = VecDeque::from([(id, mover, None)]);

        while let Some((pusher, pusher_box, direction)) = queue.pop_front() {
            let mut touching = self
                .index
                .locate_in_envelope_intersecting(&pusher_box.to_aabb())
                .map(|hit| hit.cell)
                .filter(|cell| !proposals.contains_key(cell))
                .collect::<Vec<_>>();
            touching.extend(proposals.keys().copied());

            for other in touching {
                if other == id || other == pusher {
                    continue;
                }
                let Some(other_entry) = self.entries.get(other) else {
                    continue;
                };
                let current = proposals
                    .get(&other)
                    .map(|(b, _)| *b)
                    .unwrap_or(other_entry.bbox);
                if !current.intersects(&pusher_box) {
                    continue;
                }
                if other_entry.fixed {
                    return Err(RelocationError::BlockedByFixed {
                        cell: entry.name.clone(),
                        blocker: other_entry.name.clone(),
                    });
                }

                let left_shift = current.max_x - pusher_box.min_x;
                let right_shift = pusher_box.max_x - current.min_x;
                let push = direction.unwrap_or(if left_shift <= right_shift {
                    Push::Left
                } else {
                    Push::Right
                });
                if let Some((_, previous)) = proposals.get(&other) {
                    if *previous != push {
                        return Err(RelocationError::Conflict {
                            cell: other_entry.name.clone(),
                        });
                    }
                }

                let pushed = match push {
                    Push::Left => current.translate(-left_shift, 0),
                    Push::Right => current.translate(right_shift, 0),
                };
                if !region.covers(&pushed) {
                    return Err(RelocationError::LeavesRegion {
                        cell: other_entry.name.clone(),
                    });
                }
                proposals.insert(other, (pushed, push));
                queue.push_back((other, pushed, Some(push)));
            }
        }

        let mut moves = vec![(id, target)];
        let mut cost = entry.bbox.origin().manhattan(&target);
        for (cell, (bbox, _)) in &proposals {
            if let Some(original) = self.entries.get(*cell) {
                cost += original.bbox.origin().manhattan(&bbox.origin());
            }
            moves.push((*cell, bbox.origin()));
        }
        Ok(Relocation { moves, cost })
    }

    fn commit(&mut self, relocation: &Relocation) {
        for (cell, to) in &relocation.moves {
            let Some(entry) = self.entries.get_mut(*cell) else {
                continue;
            };
            self.index.remove(&IndexedBox {
                cell: *cell,
                envelope: entry.bbox.to_aabb(),
            });
            entry.bbox = entry.bbox.moved_to(*to);
            self.index.insert(IndexedBox {
                cell: *cell,
                envelope: entry.bbox.to_aabb(),
            });
        }
    }

    /// Returns `true` if `id` overlaps another indexed cell, leaves `region`,
    /// or is off the grid.
    pub fn needs_repair(&self, id: CellId, region: &Area, floorplan: &Floorplan) -> bool {
        let Some(entry) = self.entries.get(id) else {
            return false;
        };
        let bbox = entry.bbox;
        let overlapping = self
            .index
            .locate_in_envelope_intersecting(&bbox.to_aabb())
            .any(|hit| hit.cell != id && self.entries.get(hit.cell).is_some_and(|e| e.bbox.intersects(&bbox)));
        overlapping
            || !region.covers(&bbox)
            || !floorplan.is_site_aligned(bbox.min_x)
            || !floorplan.is_row_aligned(bbox.min_y)
            || !entry.alignment.accepts(floorplan.row_index(bbox.min_y))
    }

    /// Up to `count` grid positions inside `region` closest to the cell's
    /// current position, nearest first.
    fn candidate_sites(
        &self,
        id: CellId,
        region: &Area,
        floorplan: &Floorplan,
        count: usize,
    ) -> Vec<Coordinate> {
        let (Some(entry), Some(bounds)) = (self.entries.get(id), region.bbox()) else {
            return Vec::new();
        };
        let origin = entry.bbox.origin();
        let (width, height) = (entry.bbox.width(), entry.bbox.height());
        let reach = count as i64 * floorplan.site_width;
        let center_x = floorplan.nearest_site(origin.x as f64);

        let mut sites = Vec::new();
        let mut y = floorplan.ceil_row(bounds.min_y);
        while y + height <= bounds.max_y {
            if entry.alignment.accepts(floorplan.row_index(y)) {
                let lo = floorplan.ceil_site((center_x - reach).max(bounds.min_x));
                let hi = floorplan.floor_site((center_x + reach).min(bounds.max_x - width));
                let mut x = lo;
                while x <= hi {
                    let site = Coordinate::new(x, y);
                    if region.covers(&entry.bbox.moved_to(site)) {
                        sites.push(site);
                    }
                    x += floorplan.site_width;
                }
            }
            y += floorplan.row_height;
        }
        sites.sort_by_key(|site| (site.manhattan(&origin), site.y, site.x));
        sites.truncate(count);
        sites
    }

    /// Moves every cell of `cells` that needs repair to the cheapest of its
    /// `candidates` nearest legal sites. Returns every committed move, in
    /// order; later moves supersede earlier ones for the same cell.
    pub fn repair(
        &mut self,
        cells: &[CellId],
        region: &Area,
        floorplan: &Floorplan,
        candidates: usize,
    ) -> Vec<(CellId, Coordinate)> {
        let mut applied = Vec::new();
        for &id in cells {
            if !self.needs_repair(id, region, floorplan) {
                continue;
            }
            let best = self
                .candidate_sites(id, region, floorplan, candidates)
                .into_iter()
                .filter_map(|site| self.estimate(id, site, region).ok().map(|cost| (cost, site)))
                .min_by_key(|(cost, _)| *cost);
            match best {
                Some((cost, site)) => {
                    debug!("Relocating {} to {} at cost {}", self.name(id), site, cost);
                    if let Ok(relocation) = self.legalize_cell(id, site, region, false) {
                        applied.extend(relocation.moves);
                    }
                }
                None => warn!("No legal site found to relocate {}", self.name(id)),
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    fn setup(cells: Vec<Cell>) -> (Vec<CellId>, CellLegalizer) {
        let mut arena = Arena::new();
        let ids = cells.into_iter().map(|c| arena.insert(c)).collect::<Vec<_>>();
        let legalizer = CellLegalizer::build_index(arena.iter());
        (ids, legalizer)
    }

    fn region() -> Area {
        Area::from(BoundingBox::new(0, 0, 100, 20))
    }

    #[test]
    fn move_into_free_space() {
        let (ids, mut legalizer) = setup(vec![Cell::new("a", 10, 10).at(0, 0)]);
        let relocation = legalizer
            .legalize_cell(ids[0], Coordinate::new(30, 10), &region(), false)
            .unwrap();
        assert_eq!(relocation.cost, 40);
        assert_eq!(legalizer.bbox(ids[0]), Some(BoundingBox::new(30, 10, 40, 20)));
    }

    #[test]
    fn push_cascades_right() {
        let (ids, mut legalizer) = setup(vec![
            Cell::new("mover", 10, 10).at(50, 10),
            Cell::new("b", 10, 10).at(22, 0),
            Cell::new("c", 10, 10).at(32, 0),
        ]);
        let estimate = legalizer
            .legalize_cell(ids[0], Coordinate::new(20, 0), &region(), true)
            .unwrap();
        // nothing moved yet
        assert_eq!(legalizer.bbox(ids[1]), Some(BoundingBox::new(22, 0, 32, 10)));

        let relocation = legalizer
            .legalize_cell(ids[0], Coordinate::new(20, 0), &region(), false)
            .unwrap();
        assert_eq!(estimate, relocation);
        assert_eq!(legalizer.bbox(ids[1]).unwrap().min_x, 30);
        assert_eq!(legalizer.bbox(ids[2]).unwrap().min_x, 40);
        assert_eq!(relocation.cost, 40 + 8 + 8);
    }

    #[test]
    fn fixed_neighbour_blocks() {
        let (ids, mut legalizer) = setup(vec![
            Cell::new("mover", 10, 10).at(0, 10),
            Cell::new("macro", 20, 10).at(20, 0).fixed(),
        ]);
        let err = legalizer
            .legalize_cell(ids[0], Coordinate::new(25, 0), &region(), false)
            .unwrap_err();
        assert!(matches!(err, RelocationError::BlockedByFixed { .. }));
        assert_eq!(legalizer.bbox(ids[0]), Some(BoundingBox::new(0, 10, 10, 20)));
    }

    #[test]
    fn push_out_of_region_fails() {
        let (ids, mut legalizer) = setup(vec![
            Cell::new("mover", 10, 10).at(0, 10),
            Cell::new("edge", 10, 10).at(90, 0),
        ]);
        let err = legalizer
            .legalize_cell(ids[0], Coordinate::new(88, 0), &region(), false)
            .unwrap_err();
        assert!(matches!(err, RelocationError::LeavesRegion { .. }));
    }

    #[test]
    fn unknown_cell_is_not_indexed() {
        let (_, mut legalizer) = setup(vec![Cell::new("a", 10, 10)]);
        let mut other = Arena::new();
        other.insert(Cell::new("x", 10, 10));
        // second slot of a foreign arena; the index only knows slot 0
        let stranger = other.insert(Cell::new("y", 10, 10));
        let err = legalizer
            .legalize_cell(stranger, Coordinate::new(0, 0), &region(), false)
            .unwrap_err();
        assert!(matches!(err, RelocationError::NotIndexed { .. }));
    }

    #[test]
    fn repair_separates_overlap() {
        let fp = Floorplan::new((0, 0), (100, 20), 10, 10);
        let (ids, mut legalizer) = setup(vec![
            Cell::new("a", 10, 10).at(40, 0),
            Cell::new("b", 10, 10).at(40, 0),
        ]);
        let moves = legalizer.repair(&ids, &region(), &fp, 16);
        assert!(!moves.is_empty());
        let a = legalizer.bbox(ids[0]).unwrap();
        let b = legalizer.bbox(ids[1]).unwrap();
        assert!(!a.intersects(&b));
        assert!(!legalizer.needs_repair(ids[0], &region(), &fp));
        assert!(!legalizer.needs_repair(ids[1], &region(), &fp));
    }
}
