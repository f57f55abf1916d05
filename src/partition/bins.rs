// SPDX-License-Identifier: Apache-2.0

use crate::cell::CellId;
use crate::floorplan::Floorplan;
use crate::BoundingBox;

#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    pub bounds: BoundingBox,
    pub cells: Vec<CellId>,
}

/// Uniform grid of bins over an area. Each cell is assigned to exactly one
/// bin: the one it overlaps most, or the nearest one if it overlaps none.
#[derive(Debug, Clone, PartialEq)]
pub struct BinDecomposition {
    bins: Vec<Bin>,
}

impl BinDecomposition {
    /// Bins are `bin_rows` rows tall and about as wide, rounded up to whole
    /// sites. Bins on the top and right edge are clipped to `bounds`.
    pub fn new(floorplan: &Floorplan, bounds: BoundingBox, bin_rows: i64) -> Self {
        let height = floorplan.row_height * bin_rows.max(1);
        let width = (height + floorplan.site_width - 1) / floorplan.site_width * floorplan.site_width;

        let mut bins = Vec::new();
        let mut y = bounds.min_y;
        while y < bounds.max_y {
            let mut x = bounds.min_x;
            while x < bounds.max_x {
                bins.push(Bin {
                    bounds: BoundingBox::new(
                        x,
                        y,
                        (x + width).min(bounds.max_x),
                        (y + height).min(bounds.max_y),
                    ),
                    cells: Vec::new(),
                });
                x += width;
            }
            y += height;
        }
        BinDecomposition { bins }
    }

    pub fn assign(&mut self, cells: &[(CellId, BoundingBox)]) {
        for (id, bbox) in cells {
            if let Some(index) = self.bin_for(bbox) {
                self.bins[index].cells.push(*id);
            }
        }
    }

    fn bin_for(&self, bbox: &BoundingBox) -> Option<usize> {
        let overlapping = self
            .bins
            .iter()
            .enumerate()
            .filter_map(|(i, bin)| bin.bounds.intersection(bbox).map(|o| (i, o.area())))
            .max_by_key(|&(i, area)| (area, std::cmp::Reverse(i)));
        if let Some((index, _)) = overlapping {
            return Some(index);
        }

        let (cx, cy) = bbox.center();
        self.bins
            .iter()
            .enumerate()
            .map(|(i, bin)| {
                let dx = (bin.bounds.min_x as f64 - cx).max(cx - bin.bounds.max_x as f64).max(0.0);
                let dy = (bin.bounds.min_y as f64 - cy).max(cy - bin.bounds.max_y as f64).max(0.0);
                (i, dx * dx + dy * dy)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn into_bins(self) -> Vec<Bin> {
        self.bins
    }
}
