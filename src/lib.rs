// SPDX-License-Identifier: Apache-2.0

mod geometry;
pub use geometry::{covered_by_union, Area, BoundingBox, Coordinate};

mod floorplan;
pub use floorplan::{Floorplan, RowAlignment};

pub mod arena;

mod cell;
pub use cell::{Cell, CellId, CellShape, WorkCell};

mod region;
pub use region::Region;

mod design;
pub use design::Design;

mod config;
pub use config::{GraphConfig, LegalizerConfig, RegionStrategy};

mod error;
pub use error::{LegalizeError, RelocationError};

pub mod subrow;
pub use subrow::{Subrow, SubrowId, SubrowSet};

pub mod abacus;
pub use abacus::{AbacusRow, MultiRowAbacus, RowCell};

mod driver;
pub use driver::{AbacusLegalizer, LegalizeStats};

pub mod constraint_graph;
pub use constraint_graph::{
    legalize_with_constraint_graph, ConstraintGraph, GraphSolution, GraphStatus, Horizontal,
    Vertical,
};

mod relocate;
pub use relocate::{CellLegalizer, Relocation};

pub mod partition;
pub use partition::{
    Bin, BinDecomposition, KdPartition, KdSplit, KdTreeLegalizer, PartitionFailure, PartitionReport,
};

pub mod validate;
pub use validate::{
    check_alignment, check_boundaries, check_cell_overlaps, find_violations, legalization_check,
    Violation,
};

mod legalizer;
pub use legalizer::{LegalizeReport, Legalizer, RegionOutcome};
