// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use crate::BoundingBox;

/// Error type describing why a legalization pass could not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegalizeError {
    /// The floorplan has a degenerate grid or outline.
    InvalidFloorplan { reason: &'static str },
    /// The legalization area contains no free row segment at all.
    NoSubrows { area: BoundingBox },
    /// No subrow could take this cell even after the search window grew to
    /// cover every subrow.
    SearchExhausted {
        cell: String,
        width: i64,
        height: i64,
    },
    /// The cells committed to a row segment do not fit once they are moved
    /// onto whole sites.
    RowOverflow { row: BoundingBox },
    /// Subrows must span at least one row.
    InvalidRowSpan { rows_per_cell: i64 },
    /// A cell id does not refer to a live cell of the design.
    UnknownCell { cell: String },
    /// A cell names a region that is not in the region table.
    UnknownRegion { name: String },
}

impl fmt::Display for LegalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegalizeError::InvalidFloorplan { reason } => {
                write!(f, "invalid floorplan: {reason}")
            }
            LegalizeError::NoSubrows { area } => {
                write!(f, "no placeable row segments inside {area}")
            }
            LegalizeError::SearchExhausted {
                cell,
                width,
                height,
            } => write!(
                f,
                "cell {cell} ({width}x{height}) does not fit in any subrow of the legalization area"
            ),
            LegalizeError::RowOverflow { row } => {
                write!(f, "cells assigned to {row} do not fit on its sites")
            }
            LegalizeError::InvalidRowSpan { rows_per_cell } => {
                write!(f, "subrows must span at least one row, got {rows_per_cell}")
            }
            LegalizeError::UnknownCell { cell } => write!(f, "unknown cell {cell}"),
            LegalizeError::UnknownRegion { name } => write!(f, "unknown region '{name}'"),
        }
    }
}

impl std::error::Error for LegalizeError {}

/// Error type describing why a single-cell relocation was refused. A refused
/// relocation never changes anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocationError {
    /// The cell to move is not in the relocation index (stale cell set).
    NotIndexed { cell: String },
    /// Making room would require moving a fixed cell.
    BlockedByFixed { cell: String, blocker: String },
    /// Making room would push a cell out of the region.
    LeavesRegion { cell: String },
    /// The push cascade would have to move a cell both left and right.
    Conflict { cell: String },
}

impl fmt::Display for RelocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelocationError::NotIndexed { cell } => {
                write!(f, "cell {cell} is not in the relocation index")
            }
            RelocationError::BlockedByFixed { cell, blocker } => {
                write!(f, "moving {cell} would push fixed cell {blocker}")
            }
            RelocationError::LeavesRegion { cell } => {
                write!(f, "moving {cell} would push a cell out of the region")
            }
            RelocationError::Conflict { cell } => {
                write!(f, "cell {cell} would be pushed in both directions")
            }
        }
    }
}

impl std::error::Error for RelocationError {}
