// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use geo::algorithm::area::Area as _;
use geo::algorithm::bool_ops::BooleanOps;
use geo::{Coord, MultiPolygon, Rect};
use rstar::AABB;

/// A point in database units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Coordinate {
    pub x: i64,
    pub y: i64,
}

impl Coordinate {
    pub fn new(x: i64, y: i64) -> Self {
        Coordinate { x, y }
    }

    /// Manhattan distance to `other`.
    pub fn manhattan(&self, other: &Coordinate) -> i64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub(crate) fn to_point(self) -> [i64; 2] {
        [self.x, self.y]
    }
}

impl From<(i64, i64)> for Coordinate {
    fn from(value: (i64, i64)) -> Self {
        Coordinate {
            x: value.0,
            y: value.1,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Axis-aligned box. The interval on each axis is half-open, so two boxes
/// that share an edge do not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

impl BoundingBox {
    pub fn new(min_x: i64, min_y: i64, max_x: i64, max_y: i64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Box with lower-left corner `origin` and the given size.
    pub fn from_origin_size(origin: Coordinate, width: i64, height: i64) -> Self {
        BoundingBox {
            min_x: origin.x,
            min_y: origin.y,
            max_x: origin.x + width,
            max_y: origin.y + height,
        }
    }

    pub fn width(&self) -> i64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> i64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> i64 {
        self.width().max(0) * self.height().max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn origin(&self) -> Coordinate {
        Coordinate::new(self.min_x, self.min_y)
    }

    pub fn upper_corner(&self) -> Coordinate {
        Coordinate::new(self.max_x, self.max_y)
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) as f64 / 2.0,
            (self.min_y + self.max_y) as f64 / 2.0,
        )
    }

    /// Returns `true` if the two boxes share positive area. Abutting boxes do
    /// not intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }

    /// Returns `true` if `other` lies entirely within this box (edges may
    /// coincide).
    pub fn covers(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && other.max_x <= self.max_x
            && other.max_y <= self.max_y
    }

    /// Returns `true` if `point` lies in the half-open box.
    pub fn contains_point(&self, point: &Coordinate) -> bool {
        self.min_x <= point.x && point.x < self.max_x && self.min_y <= point.y && point.y < self.max_y
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let result = BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        };
        if result.is_empty() { None } else { Some(result) }
    }

    pub fn translate(&self, dx: i64, dy: i64) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x + dx,
            min_y: self.min_y + dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }

    /// Moves the box so that its lower-left corner sits at `origin`.
    pub fn moved_to(&self, origin: Coordinate) -> BoundingBox {
        self.translate(origin.x - self.min_x, origin.y - self.min_y)
    }

    pub(crate) fn to_aabb(self) -> AABB<[i64; 2]> {
        AABB::from_corners([self.min_x, self.min_y], [self.max_x, self.max_y])
    }

    pub(crate) fn to_geo_polygon(self) -> geo::Polygon<f64> {
        Rect::new(
            Coord {
                x: self.min_x as f64,
                y: self.min_y as f64,
            },
            Coord {
                x: self.max_x as f64,
                y: self.max_y as f64,
            },
        )
        .to_polygon()
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[({}, {}), ({}, {})]",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// A rectilinear area described as a list of boxes, e.g. the chip core or a
/// fence region made of several rectangles.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Area {
    boxes: Vec<BoundingBox>,
}

impl Area {
    pub fn new(boxes: Vec<BoundingBox>) -> Self {
        Area {
            boxes: boxes.into_iter().filter(|b| !b.is_empty()).collect(),
        }
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        self.boxes.iter().copied().reduce(|a, b| a.union(&b))
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.boxes.iter().any(|b| b.intersects(other))
    }

    /// Returns `true` if `query` is fully covered by the union of this area's
    /// boxes.
    pub fn covers(&self, query: &BoundingBox) -> bool {
        covered_by_union(query, &self.boxes)
    }

    /// Clips every box of this area to `window`, dropping empty results.
    pub fn clipped_to(&self, window: &BoundingBox) -> Area {
        Area {
            boxes: self
                .boxes
                .iter()
                .filter_map(|b| b.intersection(window))
                .collect(),
        }
    }
}

impl From<BoundingBox> for Area {
    fn from(value: BoundingBox) -> Self {
        Area::new(vec![value])
    }
}

/// Returns `true` if the area of `query` is fully covered by the union of
/// `boxes`. The common single-box case is answered without building polygons.
pub fn covered_by_union(query: &BoundingBox, boxes: &[BoundingBox]) -> bool {
    if query.is_empty() {
        return boxes.iter().any(|b| b.covers(query));
    }

    let touching = boxes
        .iter()
        .filter(|b| b.intersects(query))
        .collect::<Vec<_>>();

    if touching.iter().any(|b| b.covers(query)) {
        return true;
    }
    if touching.is_empty() {
        return false;
    }

    // quick reject: the clipped pieces cannot add up to the query area
    let clipped_sum: i64 = touching
        .iter()
        .filter_map(|b| b.intersection(query))
        .map(|b| b.area())
        .sum();
    if clipped_sum < query.area() {
        return false;
    }

    let union = touching
        .iter()
        .filter_map(|b| b.intersection(query))
        .fold(MultiPolygon::<f64>::new(vec![]), |acc, b| {
            acc.union(&MultiPolygon::new(vec![b.to_geo_polygon()]))
        });

    // every piece was clipped to the query, so full coverage means equal area
    (union.unsigned_area() - query.area() as f64).abs() < 1e-6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abutting_boxes_do_not_intersect() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(10, 0, 20, 10);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&BoundingBox::new(9, 9, 11, 11)));
    }

    #[test]
    fn coverage_by_two_halves() {
        let halves = [BoundingBox::new(0, 0, 5, 10), BoundingBox::new(5, 0, 10, 10)];
        assert!(covered_by_union(&BoundingBox::new(2, 2, 8, 8), &halves));
    }

    #[test]
    fn coverage_with_gap() {
        let pieces = [BoundingBox::new(0, 0, 4, 10), BoundingBox::new(6, 0, 10, 10)];
        assert!(!covered_by_union(&BoundingBox::new(2, 2, 8, 8), &pieces));
    }

    #[test]
    fn overlapping_pieces_still_checked_exactly() {
        // the pieces overlap each other, so their summed area is larger than the
        // query even though a strip is uncovered
        let pieces = [
            BoundingBox::new(0, 0, 10, 4),
            BoundingBox::new(0, 0, 10, 4),
            BoundingBox::new(0, 6, 10, 10),
        ];
        assert!(!covered_by_union(&BoundingBox::new(0, 0, 10, 10), &pieces));
    }
}
