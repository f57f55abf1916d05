// SPDX-License-Identifier: Apache-2.0

use crate::floorplan::{Floorplan, RowAlignment};
use crate::BoundingBox;

/// One of the two placement axes. Constraint graphs are generic over this so
/// that the pairwise comparison loop is monomorphized per axis.
pub trait Axis: Sized + 'static {
    type Orthogonal: Axis;

    const NAME: &'static str;

    /// Whether a pair that is equally separated on both axes is constrained
    /// on this axis.
    const WINS_TIES: bool;

    fn lo(bbox: &BoundingBox) -> i64;

    fn hi(bbox: &BoundingBox) -> i64;

    fn size(bbox: &BoundingBox) -> i64 {
        Self::hi(bbox) - Self::lo(bbox)
    }

    /// Separation of two boxes on this axis; negative if they overlap.
    fn gap(a: &BoundingBox, b: &BoundingBox) -> i64 {
        (Self::lo(b) - Self::hi(a)).max(Self::lo(a) - Self::hi(b))
    }

    /// Closest legal grid position to `value`.
    fn nearest(floorplan: &Floorplan, value: f64, alignment: RowAlignment) -> i64;

    /// Smallest legal grid position at or above `value`.
    fn at_or_after(floorplan: &Floorplan, value: i64, alignment: RowAlignment) -> i64;

    /// Largest legal grid position at or below `value`.
    fn at_or_before(floorplan: &Floorplan, value: i64, alignment: RowAlignment) -> i64;
}

/// Left-of relationships; positions are sites.
#[derive(Debug, Clone, Copy)]
pub struct Horizontal;

/// Below relationships; positions are rows.
#[derive(Debug, Clone, Copy)]
pub struct Vertical;

impl Axis for Horizontal {
    type Orthogonal = Vertical;

    const NAME: &'static str = "horizontal";
    const WINS_TIES: bool = true;

    fn lo(bbox: &BoundingBox) -> i64 {
        bbox.min_x
    }

    fn hi(bbox: &BoundingBox) -> i64 {
        bbox.max_x
    }

    fn nearest(floorplan: &Floorplan, value: f64, _: RowAlignment) -> i64 {
        floorplan.nearest_site(value)
    }

    fn at_or_after(floorplan: &Floorplan, value: i64, _: RowAlignment) -> i64 {
        floorplan.ceil_site(value)
    }

    fn at_or_before(floorplan: &Floorplan, value: i64, _: RowAlignment) -> i64 {
        floorplan.floor_site(value)
    }
}

impl Axis for Vertical {
    type Orthogonal = Horizontal;

    const NAME: &'static str = "vertical";
    const WINS_TIES: bool = false;

    fn lo(bbox: &BoundingBox) -> i64 {
        bbox.min_y
    }

    fn hi(bbox: &BoundingBox) -> i64 {
        bbox.max_y
    }

    fn nearest(floorplan: &Floorplan, value: f64, alignment: RowAlignment) -> i64 {
        let offset = (value - floorplan.origin.y as f64) / floorplan.row_height as f64;
        let index = (offset + 0.5).floor() as i64;
        if alignment.accepts(index) {
            floorplan.row_y(index)
        } else if offset >= index as f64 {
            floorplan.row_y(index + 1)
        } else {
            floorplan.row_y(index - 1)
        }
    }

    fn at_or_after(floorplan: &Floorplan, value: i64, alignment: RowAlignment) -> i64 {
        let y = floorplan.ceil_row(value);
        if alignment.accepts(floorplan.row_index(y)) {
            y
        } else {
            y + floorplan.row_height
        }
    }

    fn at_or_before(floorplan: &Floorplan, value: i64, alignment: RowAlignment) -> i64 {
        let y = floorplan.floor_row(value);
        if alignment.accepts(floorplan.row_index(y)) {
            y
        } else {
            y - floorplan.row_height
        }
    }
}
