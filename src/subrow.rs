// SPDX-License-Identifier: Apache-2.0

use itertools::Itertools;
use rstar::{AABB, PointDistance, RTree, RTreeObject};

use crate::arena::{Arena, Id};
use crate::error::LegalizeError;
use crate::floorplan::{Floorplan, RowAlignment};
use crate::geometry::covered_by_union;
use crate::{Area, BoundingBox, Coordinate};

pub type SubrowId = Id<Subrow>;

/// Maximal free horizontal segment of a row inside a legalization area.
/// `capacity` is the width still available for movable cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Subrow {
    bbox: BoundingBox,
    capacity: i64,
    row_index: i64,
}

impl Subrow {
    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn origin(&self) -> Coordinate {
        self.bbox.origin()
    }

    pub fn upper_corner(&self) -> Coordinate {
        self.bbox.upper_corner()
    }

    pub fn width(&self) -> i64 {
        self.bbox.width()
    }

    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    /// Chip row index of the bottom row of this subrow.
    pub fn row_index(&self) -> i64 {
        self.row_index
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SubrowEntry {
    id: SubrowId,
    envelope: AABB<[i64; 2]>,
}

impl RTreeObject for SubrowEntry {
    type Envelope = AABB<[i64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for SubrowEntry {
    fn distance_2(&self, point: &[i64; 2]) -> i64 {
        self.envelope.distance_2(point)
    }
}

/// The free row segments of a legalization area, indexed for nearest and
/// containment queries.
#[derive(Debug, Clone)]
pub struct SubrowSet {
    subrows: Arena<Subrow>,
    index: RTree<SubrowEntry>,
    pitch: i64,
    row_count: usize,
}

impl SubrowSet {
    /// Cuts the rows of `area` into subrows around `obstacles`.
    ///
    /// Rows are generated every `row_height * rows_per_cell`, starting from the
    /// first row boundary inside each area box, skipping one row if that row
    /// does not satisfy `alignment`. Each obstacle splits every subrow it
    /// overlaps into a left and a right remainder; with `align` the remainders
    /// are shrunk to whole sites. Empty remainders are dropped.
    pub fn create(
        floorplan: &Floorplan,
        obstacles: &[BoundingBox],
        area: &Area,
        rows_per_cell: i64,
        alignment: RowAlignment,
        align: bool,
    ) -> Result<SubrowSet, LegalizeError> {
        floorplan.validate()?;
        if rows_per_cell <= 0 {
            return Err(LegalizeError::InvalidRowSpan { rows_per_cell });
        }
        let pitch = floorplan.row_height * rows_per_cell;
        let area = area.clipped_to(&floorplan.boundary());

        let mut segments = Vec::new();
        for area_box in area.boxes() {
            let mut y = floorplan.ceil_row(area_box.min_y);
            if !alignment.accepts(floorplan.row_index(y)) {
                y += floorplan.row_height;
            }
            let (min_x, max_x) = if align {
                (
                    floorplan.ceil_site(area_box.min_x),
                    floorplan.floor_site(area_box.max_x),
                )
            } else {
                (area_box.min_x, area_box.max_x)
            };
            while y + pitch <= area_box.max_y {
                if max_x > min_x {
                    segments.push(BoundingBox::new(min_x, y, max_x, y + pitch));
                }
                y += pitch;
            }
        }

        let mut subrows = Arena::with_capacity(segments.len());
        for segment in merge_segments(segments) {
            subrows.insert(Subrow {
                bbox: segment,
                capacity: segment.width(),
                row_index: floorplan.row_index(segment.min_y),
            });
        }

        let mut index = RTree::bulk_load(
            subrows
                .iter()
                .map(|(id, subrow)| SubrowEntry {
                    id,
                    envelope: subrow.bbox.to_aabb(),
                })
                .collect(),
        );

        for obstacle in obstacles.iter().filter(|b| !b.is_empty()) {
            let hits = index
                .locate_in_envelope_intersecting(&obstacle.to_aabb())
                .filter(|entry| subrows[entry.id].bbox.intersects(obstacle))
                .cloned()
                .collect::<Vec<_>>();

            for hit in hits {
                index.remove(&hit);
                let Some(subrow) = subrows.remove(hit.id) else {
                    continue;
                };
                let bbox = subrow.bbox;

                let left_end = if align {
                    floorplan.floor_site(obstacle.min_x)
                } else {
                    obstacle.min_x
                };
                let right_start = if align {
                    floorplan.ceil_site(obstacle.max_x)
                } else {
                    obstacle.max_x
                };

                let remainders = [
                    BoundingBox::new(bbox.min_x, bbox.min_y, left_end.min(bbox.max_x), bbox.max_y),
                    BoundingBox::new(right_start.max(bbox.min_x), bbox.min_y, bbox.max_x, bbox.max_y),
                ];
                for remainder in remainders.into_iter().filter(|r| r.width() > 0) {
                    let id = subrows.insert(Subrow {
                        bbox: remainder,
                        capacity: remainder.width(),
                        row_index: subrow.row_index,
                    });
                    index.insert(SubrowEntry {
                        id,
                        envelope: remainder.to_aabb(),
                    });
                }
            }
        }

        let row_count = subrows.iter().map(|(_, s)| s.bbox.min_y).unique().count();

        Ok(SubrowSet {
            subrows,
            index,
            pitch,
            row_count,
        })
    }

    pub fn get(&self, id: SubrowId) -> &Subrow {
        &self.subrows[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = (SubrowId, &Subrow)> + '_ {
        self.subrows.iter()
    }

    pub fn subrow_count(&self) -> usize {
        self.subrows.len()
    }

    /// Number of distinct rows that still have at least one subrow.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.subrows.is_empty()
    }

    /// Height of every subrow in this set.
    pub fn pitch(&self) -> i64 {
        self.pitch
    }

    pub fn capacity(&self, id: SubrowId) -> i64 {
        self.subrows[id].capacity
    }

    pub fn set_capacity(&mut self, id: SubrowId, capacity: i64) {
        self.subrows[id].capacity = capacity;
    }

    pub fn origin(&self, id: SubrowId) -> Coordinate {
        self.subrows[id].origin()
    }

    pub fn upper_corner(&self, id: SubrowId) -> Coordinate {
        self.subrows[id].upper_corner()
    }

    /// The `k` subrows closest to `point`, nearest first.
    pub fn find_closest_subrows(&self, k: usize, point: Coordinate) -> Vec<SubrowId> {
        self.index
            .nearest_neighbor_iter(&point.to_point())
            .take(k)
            .map(|entry| entry.id)
            .collect()
    }

    /// Subrows ordered by distance from `point`, paired with the squared
    /// Euclidean distance from the point to the subrow box.
    pub(crate) fn nearest_with_distance(
        &self,
        point: Coordinate,
    ) -> impl Iterator<Item = (SubrowId, i64)> + '_ {
        let query = point.to_point();
        self.index
            .nearest_neighbor_iter(&query)
            .map(move |entry| (entry.id, entry.envelope.distance_2(&query)))
    }

    /// Subrow containing `point`, or the nearest subrow if none does.
    pub fn find_subrow_at(&self, point: Coordinate) -> Option<SubrowId> {
        self.index
            .locate_in_envelope_intersecting(&AABB::from_point(point.to_point()))
            .find(|entry| self.subrows[entry.id].bbox.contains_point(&point))
            .map(|entry| entry.id)
            .or_else(|| self.nearest(point))
    }

    /// Subrow whose box covers `query`, or the subrow nearest to its origin
    /// if none does (e.g. for a degenerate query).
    pub fn find_contained_subrow(&self, query: &BoundingBox) -> Option<SubrowId> {
        self.index
            .locate_in_envelope_intersecting(&query.to_aabb())
            .find(|entry| self.subrows[entry.id].bbox.covers(query))
            .map(|entry| entry.id)
            .or_else(|| self.nearest(query.origin()))
    }

    /// Appends every subrow that shares area with `query` to `out`, ordered
    /// bottom to top and left to right.
    pub fn find_contained_subrows(&self, query: &BoundingBox, out: &mut Vec<SubrowId>) {
        let start = out.len();
        out.extend(
            self.index
                .locate_in_envelope_intersecting(&query.to_aabb())
                .filter(|entry| self.subrows[entry.id].bbox.intersects(query))
                .map(|entry| entry.id),
        );
        out[start..].sort_by_key(|id| {
            let bbox = self.subrows[*id].bbox;
            (bbox.min_y, bbox.min_x)
        });
    }

    /// Returns `true` if `query` is entirely covered by subrows, i.e. it does
    /// not reach into a blocked gap or past the area.
    pub fn is_inside_subrows(&self, query: &BoundingBox) -> bool {
        let boxes = self
            .index
            .locate_in_envelope_intersecting(&query.to_aabb())
            .map(|entry| self.subrows[entry.id].bbox)
            .collect::<Vec<_>>();
        covered_by_union(query, &boxes)
    }

    fn nearest(&self, point: Coordinate) -> Option<SubrowId> {
        self.index
            .nearest_neighbor(&point.to_point())
            .map(|entry| entry.id)
    }
}

/// Merges segments of the same row that overlap or abut, so that overlapping
/// area boxes do not produce overlapping subrows.
fn merge_segments(mut segments: Vec<BoundingBox>) -> Vec<BoundingBox> {
    segments.sort_by_key(|s| (s.min_y, s.max_y, s.min_x));
    let mut merged: Vec<BoundingBox> = Vec::with_capacity(segments.len());
    for segment in segments {
        match merged.last_mut() {
            Some(last)
                if last.min_y == segment.min_y
                    && last.max_y == segment.max_y
                    && segment.min_x <= last.max_x =>
            {
                last.max_x = last.max_x.max(segment.max_x);
            }
            _ => merged.push(segment),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floorplan() -> Floorplan {
        Floorplan::new((0, 0), (100, 40), 10, 10)
    }

    fn chip(fp: &Floorplan) -> Area {
        Area::from(fp.boundary())
    }

    #[test]
    fn one_subrow_per_row_without_obstacles() {
        let fp = floorplan();
        let subrows = SubrowSet::create(&fp, &[], &chip(&fp), 1, RowAlignment::None, true).unwrap();
        assert_eq!(subrows.subrow_count(), 4);
        assert_eq!(subrows.row_count(), 4);
        assert!(subrows.iter().all(|(_, s)| s.capacity() == 100));
    }

    #[test]
    fn obstacle_splits_rows() {
        let fp = floorplan();
        let obstacle = BoundingBox::new(33, 5, 47, 15);
        let subrows = SubrowSet::create(&fp, &[obstacle], &chip(&fp), 1, RowAlignment::None, true).unwrap();
        // rows 0 and 1 are split, rows 2 and 3 are intact
        assert_eq!(subrows.subrow_count(), 6);
        let mut widths = subrows
            .iter()
            .filter(|(_, s)| s.row_index() == 0)
            .map(|(_, s)| (s.origin().x, s.upper_corner().x))
            .collect::<Vec<_>>();
        widths.sort();
        assert_eq!(widths, vec![(0, 30), (50, 100)]);
    }

    #[test]
    fn obstacle_at_edge_leaves_one_remainder() {
        let fp = floorplan();
        let obstacle = BoundingBox::new(0, 0, 20, 10);
        let subrows = SubrowSet::create(&fp, &[obstacle], &chip(&fp), 1, RowAlignment::None, true).unwrap();
        assert_eq!(subrows.subrow_count(), 4);
        let id = subrows.find_subrow_at(Coordinate::new(25, 0)).unwrap();
        assert_eq!(subrows.origin(id), Coordinate::new(20, 0));
    }

    #[test]
    fn parity_skips_first_row() {
        let fp = floorplan();
        let subrows = SubrowSet::create(&fp, &[], &chip(&fp), 2, RowAlignment::OddRows, true).unwrap();
        // rows 1-2 only; rows 3-4 would exceed the chip
        assert_eq!(subrows.subrow_count(), 1);
        let (_, subrow) = subrows.iter().next().unwrap();
        assert_eq!(subrow.row_index(), 1);
        assert_eq!(subrow.bbox().height(), 20);
    }

    #[test]
    fn area_taller_than_pitch_has_no_subrows() {
        let fp = floorplan();
        let area = Area::from(BoundingBox::new(0, 0, 100, 15));
        let subrows = SubrowSet::create(&fp, &[], &area, 2, RowAlignment::None, true).unwrap();
        assert!(subrows.is_empty());
        assert!(subrows.find_closest_subrows(5, Coordinate::new(0, 0)).is_empty());
        assert!(subrows.find_subrow_at(Coordinate::new(0, 0)).is_none());
    }

    #[test]
    fn degenerate_input_is_an_error() {
        let fp = floorplan();
        let flat = Floorplan::new((0, 0), (100, 40), 10, 0);
        assert!(matches!(
            SubrowSet::create(&flat, &[], &chip(&fp), 1, RowAlignment::None, true),
            Err(LegalizeError::InvalidFloorplan { .. })
        ));
        assert!(matches!(
            SubrowSet::create(&fp, &[], &chip(&fp), 0, RowAlignment::None, true),
            Err(LegalizeError::InvalidRowSpan { rows_per_cell: 0 })
        ));
    }

    #[test]
    fn closest_subrows_are_ordered() {
        let fp = floorplan();
        let subrows = SubrowSet::create(&fp, &[], &chip(&fp), 1, RowAlignment::None, true).unwrap();
        let ids = subrows.find_closest_subrows(2, Coordinate::new(50, 21));
        assert_eq!(ids.len(), 2);
        assert_eq!(subrows.origin(ids[0]).y, 20);
    }

    #[test]
    fn coverage_across_gap() {
        let fp = floorplan();
        let obstacle = BoundingBox::new(40, 0, 60, 10);
        let subrows = SubrowSet::create(&fp, &[obstacle], &chip(&fp), 1, RowAlignment::None, true).unwrap();
        assert!(subrows.is_inside_subrows(&BoundingBox::new(0, 0, 40, 20)));
        assert!(!subrows.is_inside_subrows(&BoundingBox::new(30, 0, 50, 10)));
        let mut hits = Vec::new();
        subrows.find_contained_subrows(&BoundingBox::new(30, 0, 70, 20), &mut hits);
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn contained_subrow_falls_back_to_nearest() {
        let fp = floorplan();
        let subrows = SubrowSet::create(&fp, &[], &chip(&fp), 1, RowAlignment::None, true).unwrap();
        let degenerate = BoundingBox::new(120, 15, 120, 15);
        let id = subrows.find_contained_subrow(&degenerate).unwrap();
        assert_eq!(subrows.get(id).row_index(), 1);
    }
}
