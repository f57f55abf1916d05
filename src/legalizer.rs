// SPDX-License-Identifier: Apache-2.0

use log::{debug, info, warn};

use crate::cell::{CellId, WorkCell};
use crate::config::{LegalizerConfig, RegionStrategy};
use crate::constraint_graph::{legalize_with_constraint_graph, GraphStatus};
use crate::design::Design;
use crate::driver::{AbacusLegalizer, LegalizeStats};
use crate::error::LegalizeError;
use crate::partition::{BinDecomposition, KdTreeLegalizer, PartitionFailure};
use crate::region::Region;
use crate::relocate::CellLegalizer;
use crate::validate;
use crate::{Area, BoundingBox};

/// What happened to the members of one region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionOutcome {
    pub region: String,
    pub cells: usize,
    /// Only set when the region was solved with constraint graphs.
    pub graph_status: Option<GraphStatus>,
    /// Members still overlapping or outside the region after repair.
    pub unrepaired: usize,
}

/// Summary of a [`Legalizer::legalize`] run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LegalizeReport {
    /// Displacement of every cell that was movable when the run started.
    pub stats: LegalizeStats,
    pub regions: Vec<RegionOutcome>,
    pub partitions: usize,
    pub failed_partitions: Vec<PartitionFailure>,
    /// Result of the final legality check, if it was run.
    pub legal: Option<bool>,
}

/// A legalization session over one design.
#[derive(Debug, Clone, Default)]
pub struct Legalizer {
    config: LegalizerConfig,
}

impl Legalizer {
    pub fn new(config: LegalizerConfig) -> Self {
        Legalizer { config }
    }

    pub fn config(&self) -> &LegalizerConfig {
        &self.config
    }

    /// Legalizes every movable cell of `design` in place.
    ///
    /// Region members are placed inside their regions first and pinned
    /// while the remaining cells are placed around them. The `fixed` flag of
    /// every cell is the same afterwards as before, also on error.
    pub fn legalize(&self, design: &mut Design) -> Result<LegalizeReport, LegalizeError> {
        design.floorplan().validate()?;

        let flags = design.fixed_flags();
        let original = design.locations();
        let movable = design.movable_ids();
        info!(
            "Legalizing {} movable cells of {} ({} regions)",
            movable.len(),
            design.num_cells(),
            design.regions().count()
        );

        let mut report = LegalizeReport::default();
        let result = self.run(design, &mut report);
        design.restore_fixed_flags(&flags);
        result?;

        for id in &movable {
            if let (Some(from), Some(cell)) = (original.get(*id), design.cell(*id)) {
                report.stats.add(from.manhattan(&cell.location));
            }
        }
        info!(
            "Legalization done: {} of {} cells moved, total displacement {}, max displacement {}",
            report.stats.moved,
            report.stats.cells,
            report.stats.total_displacement,
            report.stats.max_displacement
        );

        if self.config.check_result {
            report.legal = Some(validate::legalization_check(design));
        }
        Ok(report)
    }

    fn run(&self, design: &mut Design, report: &mut LegalizeReport) -> Result<(), LegalizeError> {
        for id in design.movable_ids() {
            design.allowed_area(id)?;
        }

        let regions = design.regions().cloned().collect::<Vec<_>>();
        for region in &regions {
            let members = design
                .region_members(&region.name)
                .into_iter()
                .filter(|id| design.cell(*id).is_some_and(|c| !c.fixed))
                .collect::<Vec<_>>();
            if members.is_empty() {
                continue;
            }
            let outcome = self.legalize_region(design, region, &members)?;
            report.regions.push(outcome);
            design.set_fixed(&members, true)?;
        }

        let chip = Area::from(design.floorplan().boundary());
        let region_boxes = regions
            .iter()
            .flat_map(|r| r.area.boxes().iter().copied())
            .collect::<Vec<_>>();
        let ids = design.movable_ids();

        if self.config.partition_depth > 0 {
            let partitioned = KdTreeLegalizer::new(self.config.partition_depth, self.config.search_window)
                .legalize(design, &ids, &region_boxes, &chip)?;
            report.partitions = partitioned.partitions;
            report.failed_partitions = partitioned.failures;
        } else {
            let cells = design.work_cells(&ids)?;
            let mut obstacles = design.fixed_boxes();
            obstacles.extend(region_boxes);
            let moves = AbacusLegalizer::new(design.floorplan(), self.config.search_window)
                .legalize(&cells, &obstacles, &chip)?;
            design.apply_locations(&moves)?;
        }
        Ok(())
    }

    fn legalize_region(
        &self,
        design: &mut Design,
        region: &Region,
        members: &[CellId],
    ) -> Result<RegionOutcome, LegalizeError> {
        debug!(
            "Region {}: {} members, {:?} strategy",
            region.name,
            members.len(),
            self.config.region_strategy
        );
        let cells = design.work_cells(members)?;

        let (graph_status, unrepaired) = match self.config.region_strategy {
            RegionStrategy::Abacus => {
                let obstacles = design.fixed_boxes();
                let moves = AbacusLegalizer::new(design.floorplan(), self.config.search_window)
                    .legalize(&cells, &obstacles, &region.area)?;
                design.apply_locations(&moves)?;
                (None, 0)
            }
            RegionStrategy::ConstraintGraph => {
                let status = self.solve_region_graph(design, region, cells)?;
                let unrepaired = self.repair_region(design, region, members);
                (Some(status), unrepaired)
            }
        };

        Ok(RegionOutcome {
            region: region.name.clone(),
            cells: members.len(),
            graph_status,
            unrepaired,
        })
    }

    fn solve_region_graph(
        &self,
        design: &mut Design,
        region: &Region,
        cells: Vec<WorkCell>,
    ) -> Result<GraphStatus, LegalizeError> {
        let floorplan = *design.floorplan();
        let Some(bounds) = region.area.clipped_to(&floorplan.boundary()).bbox() else {
            return Err(LegalizeError::NoSubrows {
                area: region.area.bbox().unwrap_or_else(|| floorplan.boundary()),
            });
        };

        let groups: Vec<(BoundingBox, Vec<WorkCell>)> = if cells.len() > self.config.max_graph_cells {
            let mut bins = BinDecomposition::new(&floorplan, bounds, self.config.bin_rows);
            bins.assign(&cells.iter().map(|c| (c.id, c.bbox())).collect::<Vec<_>>());
            debug!("Region {} split into {} bins", region.name, bins.len());
            bins.into_bins()
                .into_iter()
                .filter(|bin| !bin.cells.is_empty())
                .map(|bin| {
                    let members = cells
                        .iter()
                        .filter(|c| bin.cells.contains(&c.id))
                        .cloned()
                        .collect();
                    (bin.bounds, members)
                })
                .collect()
        } else {
            vec![(bounds, cells)]
        };

        let mut status = GraphStatus::Feasible;
        for (bounds, group) in &groups {
            let solution = legalize_with_constraint_graph(&floorplan, group, *bounds, &self.config.graph);
            design.apply_locations(&solution.positions)?;
            if let GraphStatus::StillInfeasible { iterations } = solution.status {
                status = match status {
                    GraphStatus::StillInfeasible { iterations: seen } => GraphStatus::StillInfeasible {
                        iterations: seen.max(iterations),
                    },
                    GraphStatus::Feasible => solution.status,
                };
            }
        }
        Ok(status)
    }

    /// Moves members that overlap something or left the region to nearby
    /// legal sites. Returns how many could not be fixed.
    fn repair_region(&self, design: &mut Design, region: &Region, members: &[CellId]) -> usize {
        let floorplan = *design.floorplan();
        let window = region.area.bbox().unwrap_or_else(|| floorplan.boundary());
        let indexed = design
            .cells()
            .filter(|(id, cell)| members.contains(id) || (cell.fixed && cell.bbox().intersects(&window)));
        let mut relocation = CellLegalizer::build_index(indexed);

        let moves = relocation.repair(members, &region.area, &floorplan, self.config.relocation_candidates);
        for (id, location) in moves {
            if let Err(error) = design.set_location(id, location) {
                warn!("Could not apply relocation: {}", error);
            }
        }

        let unrepaired = members
            .iter()
            .filter(|id| relocation.needs_repair(**id, &region.area, &floorplan))
            .count();
        if unrepaired > 0 {
            warn!("Region {}: {} members could not be repaired", region.name, unrepaired);
        }
        unrepaired
    }
}
