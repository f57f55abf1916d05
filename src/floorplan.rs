// SPDX-License-Identifier: Apache-2.0

use crate::error::LegalizeError;
use crate::{BoundingBox, Coordinate};

/// Row parity a cell requires, counted from the bottom row of the chip
/// (row 0 is even). Cells with power rails that only match one of the two
/// row orientations carry `EvenRows` or `OddRows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RowAlignment {
    #[default]
    None,
    EvenRows,
    OddRows,
}

impl RowAlignment {
    /// Returns `true` if a cell with this requirement may sit on row
    /// `row_index`.
    pub fn accepts(&self, row_index: i64) -> bool {
        match self {
            RowAlignment::None => true,
            RowAlignment::EvenRows => row_index.rem_euclid(2) == 0,
            RowAlignment::OddRows => row_index.rem_euclid(2) == 1,
        }
    }
}

/// Row and site grid of the chip. Rows are `row_height` tall and stacked from
/// `origin.y`; sites are `site_width` wide and start at `origin.x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Floorplan {
    pub origin: Coordinate,
    pub upper_corner: Coordinate,
    pub site_width: i64,
    pub row_height: i64,
}

impl Floorplan {
    pub fn new(
        origin: impl Into<Coordinate>,
        upper_corner: impl Into<Coordinate>,
        site_width: i64,
        row_height: i64,
    ) -> Self {
        Floorplan {
            origin: origin.into(),
            upper_corner: upper_corner.into(),
            site_width,
            row_height,
        }
    }

    pub fn validate(&self) -> Result<(), LegalizeError> {
        if self.site_width <= 0 {
            return Err(LegalizeError::InvalidFloorplan {
                reason: "site width must be positive",
            });
        }
        if self.row_height <= 0 {
            return Err(LegalizeError::InvalidFloorplan {
                reason: "row height must be positive",
            });
        }
        if self.boundary().is_empty() {
            return Err(LegalizeError::InvalidFloorplan {
                reason: "chip boundary is empty",
            });
        }
        Ok(())
    }

    /// The chip outline.
    pub fn boundary(&self) -> BoundingBox {
        BoundingBox::new(
            self.origin.x,
            self.origin.y,
            self.upper_corner.x,
            self.upper_corner.y,
        )
    }

    pub fn num_rows(&self) -> i64 {
        (self.upper_corner.y - self.origin.y) / self.row_height
    }

    /// Index of the row whose bottom edge is at or below `y`.
    pub fn row_index(&self, y: i64) -> i64 {
        (y - self.origin.y).div_euclid(self.row_height)
    }

    pub fn row_y(&self, index: i64) -> i64 {
        self.origin.y + index * self.row_height
    }

    pub fn row_box(&self, index: i64) -> BoundingBox {
        BoundingBox::new(
            self.origin.x,
            self.row_y(index),
            self.upper_corner.x,
            self.row_y(index) + self.row_height,
        )
    }

    pub fn rows(&self) -> impl Iterator<Item = BoundingBox> + '_ {
        (0..self.num_rows()).map(|index| self.row_box(index))
    }

    /// Number of rows a cell of the given height occupies.
    pub fn rows_spanned(&self, height: i64) -> i64 {
        ((height + self.row_height - 1) / self.row_height).max(1)
    }

    pub fn is_site_aligned(&self, x: i64) -> bool {
        (x - self.origin.x).rem_euclid(self.site_width) == 0
    }

    pub fn is_row_aligned(&self, y: i64) -> bool {
        (y - self.origin.y).rem_euclid(self.row_height) == 0
    }

    /// Largest site boundary at or left of `x`.
    pub fn floor_site(&self, x: i64) -> i64 {
        self.origin.x + (x - self.origin.x).div_euclid(self.site_width) * self.site_width
    }

    /// Smallest site boundary at or right of `x`.
    pub fn ceil_site(&self, x: i64) -> i64 {
        let floor = self.floor_site(x);
        if floor == x { x } else { floor + self.site_width }
    }

    /// `width` rounded up to whole sites.
    pub fn site_span(&self, width: i64) -> i64 {
        (width + self.site_width - 1).div_euclid(self.site_width) * self.site_width
    }

    /// Site boundary closest to `x` (ties go right).
    pub fn nearest_site(&self, x: f64) -> i64 {
        let offset = (x - self.origin.x as f64) / self.site_width as f64;
        self.origin.x + (offset + 0.5).floor() as i64 * self.site_width
    }

    pub fn floor_row(&self, y: i64) -> i64 {
        self.row_y(self.row_index(y))
    }

    pub fn ceil_row(&self, y: i64) -> i64 {
        let floor = self.floor_row(y);
        if floor == y { y } else { floor + self.row_height }
    }

    /// Index of the row closest to `y` that satisfies `alignment` and leaves
    /// room for `height` below the top of the chip.
    pub fn nearest_row_index(&self, y: i64, height: i64, alignment: RowAlignment) -> i64 {
        let last = (self.num_rows() - self.rows_spanned(height)).max(0);
        let offset = (y - self.origin.y) as f64 / self.row_height as f64;
        let mut index = ((offset + 0.5).floor() as i64).clamp(0, last);

        if !alignment.accepts(index) {
            let below = index - 1;
            let above = index + 1;
            let prefer_above = offset >= index as f64;
            index = match (below >= 0, above <= last) {
                (true, true) => {
                    if prefer_above {
                        above
                    } else {
                        below
                    }
                }
                (true, false) => below,
                (false, true) => above,
                // a single-row chip with the wrong parity; nothing better exists
                (false, false) => index,
            };
        }
        index
    }

    /// Closest site/row position for a cell of the given size whose lower-left
    /// corner is near `location`. The result lies inside the chip when the
    /// cell fits at all.
    pub fn snap_to_grid(
        &self,
        location: Coordinate,
        width: i64,
        height: i64,
        alignment: RowAlignment,
    ) -> Coordinate {
        let max_x = self.floor_site(self.upper_corner.x - width).max(self.origin.x);
        let x = self.nearest_site(location.x as f64).clamp(self.origin.x, max_x);
        let y = self.row_y(self.nearest_row_index(location.y, height, alignment));
        Coordinate::new(x, y)
    }
}
