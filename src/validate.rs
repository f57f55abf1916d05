// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use log::warn;

use crate::design::Design;
use crate::{BoundingBox, Coordinate};

mod alignment;
mod boundaries;
mod overlaps;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Lower-left corner not on a site and row boundary.
    Misaligned { cell: String, location: Coordinate },
    /// On a row whose parity the cell does not accept.
    WrongRowParity { cell: String, row: i64 },
    OutsideChip { cell: String, bbox: BoundingBox },
    OutsideRegion {
        cell: String,
        region: String,
        bbox: BoundingBox,
    },
    /// A cell outside a region's member set reaches into it.
    InsideForeignRegion { cell: String, region: String },
    UnknownRegion { cell: String, region: String },
    Overlap { first: String, second: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Misaligned { cell, location } => {
                write!(f, "{cell} at {location} is not on the site/row grid")
            }
            Violation::WrongRowParity { cell, row } => {
                write!(f, "{cell} sits on row {row}, which has the wrong parity")
            }
            Violation::OutsideChip { cell, bbox } => {
                write!(f, "{cell} {bbox} is not inside the chip")
            }
            Violation::OutsideRegion { cell, region, bbox } => {
                write!(f, "{cell} {bbox} is not inside its region {region}")
            }
            Violation::InsideForeignRegion { cell, region } => {
                write!(f, "{cell} overlaps region {region} without being a member")
            }
            Violation::UnknownRegion { cell, region } => {
                write!(f, "{cell} belongs to unknown region {region}")
            }
            Violation::Overlap { first, second } => write!(f, "{first} and {second} overlap"),
        }
    }
}

fn report(violations: Vec<Violation>) -> bool {
    for violation in &violations {
        warn!("{}", violation);
    }
    violations.is_empty()
}

/// Every movable cell sits on a site boundary, on a row inside the chip, with
/// a row parity it accepts. Fixed cells are not checked.
pub fn check_alignment(design: &Design) -> bool {
    report(alignment::violations(design))
}

/// Every cell lies inside the chip, every region member inside its region,
/// and no movable non-member reaches into a region.
pub fn check_boundaries(design: &Design) -> bool {
    report(boundaries::violations(design))
}

/// No two cells share area. Abutting is fine.
pub fn check_cell_overlaps(design: &Design) -> bool {
    report(overlaps::violations(design))
}

/// All three checks. Every check runs even if an earlier one fails, so the
/// log lists every violation.
pub fn legalization_check(design: &Design) -> bool {
    let aligned = check_alignment(design);
    let bounded = check_boundaries(design);
    let disjoint = check_cell_overlaps(design);
    aligned && bounded && disjoint
}

/// Every violation of the three checks, without logging.
pub fn find_violations(design: &Design) -> Vec<Violation> {
    let mut violations = alignment::violations(design);
    violations.extend(boundaries::violations(design));
    violations.extend(overlaps::violations(design));
    violations
}
