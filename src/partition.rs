// SPDX-License-Identifier: Apache-2.0

use std::thread;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::cell::{CellId, WorkCell};
use crate::design::Design;
use crate::driver::AbacusLegalizer;
use crate::error::LegalizeError;
use crate::{Area, BoundingBox, Coordinate};

mod bins;
mod kdtree;

pub use bins::{Bin, BinDecomposition};
pub use kdtree::{KdPartition, KdSplit};

/// A leaf whose legalization failed. The cells of that leaf keep their
/// snapped positions.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionFailure {
    pub bounds: BoundingBox,
    pub cells: usize,
    pub error: LegalizeError,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PartitionReport {
    pub partitions: usize,
    pub ancients: Vec<CellId>,
    pub failures: Vec<PartitionFailure>,
}

/// KD-tree partitioned legalization of a set of movable cells. Leaves are
/// legalized on scoped threads, each on a detached copy of its cells, and
/// the results are written back after the join.
#[derive(Debug, Clone)]
pub struct KdTreeLegalizer {
    depth: usize,
    search_window: usize,
}

impl KdTreeLegalizer {
    pub fn new(depth: usize, search_window: usize) -> Self {
        KdTreeLegalizer {
            depth,
            search_window,
        }
    }

    /// Moves every cell of `ids` to its nearest grid position.
    pub fn snap(&self, design: &mut Design, ids: &[CellId]) -> Result<(), LegalizeError> {
        let floorplan = *design.floorplan();
        for id in ids {
            let cell = design.try_cell(*id)?;
            let snapped =
                floorplan.snap_to_grid(cell.location, cell.width(), cell.height(), cell.alignment);
            design.set_location(*id, snapped)?;
        }
        Ok(())
    }

    /// Splits `ids` by their current boxes over the chip part of `area`.
    pub fn split(&self, design: &Design, ids: &[CellId], area: &Area) -> Result<KdSplit, LegalizeError> {
        let floorplan = design.floorplan();
        let bounds = area
            .clipped_to(&floorplan.boundary())
            .bbox()
            .unwrap_or_else(|| floorplan.boundary());
        let cells = ids
            .iter()
            .map(|id| design.try_cell(*id).map(|cell| (*id, cell.bbox())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(kdtree::split(floorplan, &cells, bounds, self.depth))
    }

    /// Legalizes the ancients against the fixed cells and `obstacles`, then
    /// marks them fixed so that every leaf sees them as blockages.
    pub fn pin_ancients(
        &self,
        design: &mut Design,
        ancients: &[CellId],
        obstacles: &[BoundingBox],
        area: &Area,
    ) -> Result<(), LegalizeError> {
        let cells = design.work_cells(ancients)?;
        let mut blocked = design.fixed_boxes();
        blocked.extend_from_slice(obstacles);
        let moves = AbacusLegalizer::new(design.floorplan(), self.search_window)
            .legalize(&cells, &blocked, area)?;
        design.apply_locations(&moves)?;
        design.set_fixed(ancients, true)
    }

    /// Legalizes every leaf on its own thread. A leaf that fails is logged
    /// and reported; the others are unaffected.
    pub fn legalize_partitions(
        &self,
        design: &mut Design,
        partitions: &[KdPartition],
        obstacles: &[BoundingBox],
        area: &Area,
    ) -> Result<Vec<PartitionFailure>, LegalizeError> {
        let mut blocked = design.fixed_boxes();
        blocked.extend_from_slice(obstacles);

        let jobs = partitions
            .iter()
            .filter(|p| !p.cells.is_empty())
            .map(|p| Ok((p.bounds, design.work_cells(&p.cells)?)))
            .collect::<Result<Vec<(BoundingBox, Vec<WorkCell>)>, LegalizeError>>()?;

        let driver = AbacusLegalizer::new(design.floorplan(), self.search_window);
        let results: Mutex<Vec<(usize, Result<Vec<(CellId, Coordinate)>, LegalizeError>)>> =
            Mutex::new(Vec::with_capacity(jobs.len()));

        thread::scope(|scope| {
            for (index, (bounds, cells)) in jobs.iter().enumerate() {
                let driver = &driver;
                let blocked = &blocked;
                let results = &results;
                let leaf_area = area.clipped_to(bounds);
                scope.spawn(move || {
                    debug!("Partition {} {}: {} cells", index, bounds, cells.len());
                    let result = driver.legalize(cells, blocked, &leaf_area);
                    results.lock().push((index, result));
                });
            }
        });

        let mut results = results.into_inner();
        results.sort_by_key(|(index, _)| *index);

        let mut failures = Vec::new();
        for (index, result) in results {
            let (bounds, cells) = &jobs[index];
            match result {
                Ok(moves) => design.apply_locations(&moves)?,
                Err(error) => {
                    warn!("Partition {} {} failed: {}", index, bounds, error);
                    failures.push(PartitionFailure {
                        bounds: *bounds,
                        cells: cells.len(),
                        error,
                    });
                }
            }
        }
        Ok(failures)
    }

    /// The whole flow. Fixed flags are restored before returning, also when
    /// an error is returned.
    pub fn legalize(
        &self,
        design: &mut Design,
        ids: &[CellId],
        obstacles: &[BoundingBox],
        area: &Area,
    ) -> Result<PartitionReport, LegalizeError> {
        let flags = design.fixed_flags();
        let result = self.run(design, ids, obstacles, area);
        design.restore_fixed_flags(&flags);
        result
    }

    fn run(
        &self,
        design: &mut Design,
        ids: &[CellId],
        obstacles: &[BoundingBox],
        area: &Area,
    ) -> Result<PartitionReport, LegalizeError> {
        self.snap(design, ids)?;
        let split = self.split(design, ids, area)?;
        info!(
            "KD-tree split of {} cells: {} partitions, {} ancients",
            ids.len(),
            split.partitions.len(),
            split.ancients.len()
        );

        self.pin_ancients(design, &split.ancients, obstacles, area)?;
        let failures = self.legalize_partitions(design, &split.partitions, obstacles, area)?;

        Ok(PartitionReport {
            partitions: split.partitions.len(),
            ancients: split.ancients,
            failures,
        })
    }
}
