// SPDX-License-Identifier: Apache-2.0

use super::Violation;
use crate::design::Design;

pub(crate) fn violations(design: &Design) -> Vec<Violation> {
    let chip = design.floorplan().boundary();
    let mut result = Vec::new();

    for (_, cell) in design.cells() {
        let bbox = cell.bbox();
        if !cell.boxes().all(|b| chip.covers(&b)) {
            result.push(Violation::OutsideChip {
                cell: cell.name.clone(),
                bbox,
            });
        }

        match &cell.region {
            Some(name) => match design.region(name) {
                Some(region) => {
                    if !cell.boxes().all(|b| region.area.covers(&b)) {
                        result.push(Violation::OutsideRegion {
                            cell: cell.name.clone(),
                            region: name.clone(),
                            bbox,
                        });
                    }
                }
                None => result.push(Violation::UnknownRegion {
                    cell: cell.name.clone(),
                    region: name.clone(),
                }),
            },
            None if !cell.fixed => {
                for region in design.regions() {
                    if cell.boxes().any(|b| region.area.intersects(&b)) {
                        result.push(Violation::InsideForeignRegion {
                            cell: cell.name.clone(),
                            region: region.name.clone(),
                        });
                    }
                }
            }
            None => {}
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::floorplan::Floorplan;
    use crate::{Area, BoundingBox, Cell, Region};

    #[test]
    fn region_membership_is_checked_both_ways() {
        let mut design = Design::new(Floorplan::new((0, 0), (100, 40), 10, 10));
        design.add_region(Region::new(
            "fence",
            Area::new(vec![BoundingBox::new(0, 0, 20, 20), BoundingBox::new(20, 0, 40, 10)]),
        ));
        design.add_cell(Cell::new("inside", 10, 10).at(25, 0).in_region("fence"));
        design.add_cell(Cell::new("notch", 10, 10).at(25, 10).in_region("fence"));
        design.add_cell(Cell::new("intruder", 10, 10).at(10, 10));
        design.add_cell(Cell::new("outside", 10, 10).at(95, 0));

        let violations = violations(&design);
        assert_eq!(violations.len(), 3);
        assert!(matches!(&violations[0], Violation::OutsideRegion { cell, .. } if cell == "notch"));
        assert!(matches!(&violations[1], Violation::InsideForeignRegion { cell, .. } if cell == "intruder"));
        assert!(matches!(&violations[2], Violation::OutsideChip { cell, .. } if cell == "outside"));
    }
}
