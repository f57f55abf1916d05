// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;

use rstar::{AABB, RTree, RTreeObject};

use super::Violation;
use crate::design::Design;
use crate::BoundingBox;

struct PlacedBox {
    index: usize,
    bbox: BoundingBox,
    envelope: AABB<[i64; 2]>,
}

impl RTreeObject for PlacedBox {
    type Envelope = AABB<[i64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Inserts the boxes of each cell in turn, first querying what is already
/// there. Rectilinear cells are checked box by box.
pub(crate) fn violations(design: &Design) -> Vec<Violation> {
    let cells = design.cells().map(|(_, c)| c).collect::<Vec<_>>();
    let mut rtree: RTree<PlacedBox> = RTree::new();
    let mut reported = HashSet::new();
    let mut result = Vec::new();

    for (index, cell) in cells.iter().enumerate() {
        let boxes = cell.boxes().collect::<Vec<_>>();
        for bbox in &boxes {
            let envelope = bbox.to_aabb();
            for hit in rtree.locate_in_envelope_intersecting(&envelope) {
                // the rtree also reports abutting boxes
                if !hit.bbox.intersects(bbox) {
                    continue;
                }
                if reported.insert((hit.index, index)) {
                    result.push(Violation::Overlap {
                        first: cells[hit.index].name.clone(),
                        second: cell.name.clone(),
                    });
                }
            }
        }
        for bbox in boxes {
            rtree.insert(PlacedBox {
                index,
                bbox,
                envelope: bbox.to_aabb(),
            });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellShape;
    use crate::floorplan::Floorplan;
    use crate::Cell;

    fn design() -> Design {
        Design::new(Floorplan::new((0, 0), (100, 40), 10, 10))
    }

    #[test]
    fn abutting_cells_are_fine() {
        let mut design = design();
        design.add_cell(Cell::new("a", 10, 10).at(0, 0));
        design.add_cell(Cell::new("b", 10, 10).at(10, 0));
        design.add_cell(Cell::new("c", 10, 10).at(0, 10));
        assert!(violations(&design).is_empty());
    }

    #[test]
    fn each_pair_reported_once() {
        let mut design = design();
        design.add_cell(Cell::new("a", 20, 10).at(0, 0));
        design.add_cell(Cell::new("b", 10, 10).at(5, 0));
        design.add_cell(Cell::new("c", 10, 10).at(50, 0));
        assert_eq!(
            violations(&design),
            vec![Violation::Overlap {
                first: "a".to_string(),
                second: "b".to_string()
            }]
        );
    }

    #[test]
    fn rectilinear_notch_can_be_filled() {
        let mut design = design();
        let l_shape = CellShape::from_boxes(vec![
            BoundingBox::new(0, 0, 20, 10),
            BoundingBox::new(0, 10, 10, 20),
        ]);
        design.add_cell(Cell::with_shape("l", l_shape).at(0, 0));
        design.add_cell(Cell::new("filler", 10, 10).at(10, 10));
        assert!(violations(&design).is_empty());
    }
}
