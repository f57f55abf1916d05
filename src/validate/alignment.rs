// SPDX-License-Identifier: Apache-2.0

use super::Violation;
use crate::design::Design;

pub(crate) fn violations(design: &Design) -> Vec<Violation> {
    let floorplan = design.floorplan();
    let mut result = Vec::new();
    for (_, cell) in design.cells() {
        let location = cell.location;
        let row = floorplan.row_index(location.y);
        let on_grid = floorplan.is_site_aligned(location.x)
            && floorplan.is_row_aligned(location.y)
            && (0..floorplan.num_rows()).contains(&row);
        if !on_grid {
            result.push(Violation::Misaligned {
                cell: cell.name.clone(),
                location,
            });
        } else if !cell.alignment.accepts(row) {
            result.push(Violation::WrongRowParity {
                cell: cell.name.clone(),
                row,
            });
        }
    }
    result
}
