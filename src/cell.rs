// SPDX-License-Identifier: Apache-2.0

use crate::arena::Id;
use crate::floorplan::RowAlignment;
use crate::{BoundingBox, Coordinate};

pub type CellId = Id<Cell>;

/// Outline of a standard cell relative to its lower-left corner. Most cells
/// are a single rectangle; rectilinear cells are a list of boxes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellShape {
    boxes: Vec<BoundingBox>,
    width: i64,
    height: i64,
}

impl CellShape {
    pub fn from_width_height(width: i64, height: i64) -> Self {
        assert!(width > 0 && height > 0, "Width and height must be positive");
        CellShape {
            boxes: vec![BoundingBox::new(0, 0, width, height)],
            width,
            height,
        }
    }

    /// Builds a shape from boxes given relative to the cell origin. The boxes
    /// are shifted so that their common bounding box starts at (0, 0).
    pub fn from_boxes(boxes: Vec<BoundingBox>) -> Self {
        let bbox = boxes
            .iter()
            .copied()
            .reduce(|a, b| a.union(&b))
            .expect("A cell shape needs at least one box");
        assert!(!bbox.is_empty(), "Cell shape must have positive area");
        CellShape {
            boxes: boxes
                .iter()
                .map(|b| b.translate(-bbox.min_x, -bbox.min_y))
                .collect(),
            width: bbox.width(),
            height: bbox.height(),
        }
    }

    pub fn width(&self) -> i64 {
        self.width
    }

    pub fn height(&self) -> i64 {
        self.height
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    pub fn is_rectangular(&self) -> bool {
        self.boxes.len() == 1
    }
}

/// A placeable cell. Identity and dimensions come from the netlist and
/// library; legalization only moves `location` and, while partitioning,
/// toggles `fixed`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub name: String,
    pub shape: CellShape,
    /// Lower-left corner.
    pub location: Coordinate,
    pub fixed: bool,
    pub alignment: RowAlignment,
    /// Name of the fence region this cell must stay inside.
    pub region: Option<String>,
    /// Displacement weight, usually the pin count.
    pub weight: f64,
}

impl Cell {
    pub fn new(name: impl AsRef<str>, width: i64, height: i64) -> Self {
        Cell::with_shape(name, CellShape::from_width_height(width, height))
    }

    pub fn with_shape(name: impl AsRef<str>, shape: CellShape) -> Self {
        Cell {
            name: name.as_ref().to_string(),
            shape,
            location: Coordinate::default(),
            fixed: false,
            alignment: RowAlignment::None,
            region: None,
            weight: 1.0,
        }
    }

    pub fn at(mut self, x: i64, y: i64) -> Self {
        self.location = Coordinate::new(x, y);
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    pub fn aligned(mut self, alignment: RowAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn in_region(mut self, region: impl AsRef<str>) -> Self {
        self.region = Some(region.as_ref().to_string());
        self
    }

    pub fn weighted(mut self, weight: f64) -> Self {
        assert!(weight > 0.0, "Cell weight must be positive");
        self.weight = weight;
        self
    }

    pub fn width(&self) -> i64 {
        self.shape.width()
    }

    pub fn height(&self) -> i64 {
        self.shape.height()
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::from_origin_size(self.location, self.width(), self.height())
    }

    /// Absolute boxes of the cell outline at its current location.
    pub fn boxes(&self) -> impl Iterator<Item = BoundingBox> + '_ {
        self.boxes_at(self.location)
    }

    pub fn boxes_at(&self, location: Coordinate) -> impl Iterator<Item = BoundingBox> + '_ {
        self.shape
            .boxes()
            .iter()
            .map(move |b| b.translate(location.x, location.y))
    }
}

/// Detached copy of what a legalization pass needs to know about a movable
/// cell. Work cells own no references into the design, so a batch of them can
/// be handed to another thread.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkCell {
    pub id: CellId,
    pub name: String,
    pub width: i64,
    pub height: i64,
    pub location: Coordinate,
    pub weight: f64,
    pub alignment: RowAlignment,
}

impl WorkCell {
    pub fn from_cell(id: CellId, cell: &Cell) -> Self {
        WorkCell {
            id,
            name: cell.name.clone(),
            width: cell.width(),
            height: cell.height(),
            location: cell.location,
            weight: cell.weight,
            alignment: cell.alignment,
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::from_origin_size(self.location, self.width, self.height)
    }

    pub fn bbox_at(&self, location: Coordinate) -> BoundingBox {
        BoundingBox::from_origin_size(location, self.width, self.height)
    }
}
