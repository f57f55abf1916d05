// SPDX-License-Identifier: Apache-2.0

use log::{debug, info};

use crate::abacus::{AbacusRow, MultiRowAbacus, RowCell};
use crate::arena::SecondaryMap;
use crate::cell::{CellId, WorkCell};
use crate::error::LegalizeError;
use crate::floorplan::{Floorplan, RowAlignment};
use crate::subrow::{Subrow, SubrowId, SubrowSet};
use crate::{Area, BoundingBox, Coordinate};

/// Displacement summary of a set of moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LegalizeStats {
    pub cells: usize,
    pub moved: usize,
    /// Sum of Manhattan displacements.
    pub total_displacement: i64,
    pub max_displacement: i64,
}

impl LegalizeStats {
    /// Measures `moves` against the original locations in `cells`.
    pub fn measure(cells: &[WorkCell], moves: &[(CellId, Coordinate)]) -> Self {
        let mut stats = LegalizeStats::default();
        for (id, to) in moves {
            let Some(cell) = cells.iter().find(|c| c.id == *id) else {
                continue;
            };
            stats.add(cell.location.manhattan(to));
        }
        stats
    }

    pub fn add(&mut self, displacement: i64) {
        self.cells += 1;
        if displacement > 0 {
            self.moved += 1;
        }
        self.total_displacement += displacement;
        self.max_displacement = self.max_displacement.max(displacement);
    }

    pub fn merge(&mut self, other: &LegalizeStats) {
        self.cells += other.cells;
        self.moved += other.moved;
        self.total_displacement += other.total_displacement;
        self.max_displacement = self.max_displacement.max(other.max_displacement);
    }
}

/// Row-assignment legalizer built on cluster compaction.
///
/// Cells are visited in order of their original x. For each one, a window of
/// the nearest subrows is trial-evaluated with the compaction engine and the
/// cell is committed to the cheapest one. The window doubles until a subrow is
/// found or every subrow has been looked at.
#[derive(Debug, Clone)]
pub struct AbacusLegalizer {
    floorplan: Floorplan,
    search_window: usize,
}

/// Best candidate seen so far in a search.
struct Choice<P> {
    subrow: SubrowId,
    cost: f64,
    placement: P,
}

impl AbacusLegalizer {
    pub fn new(floorplan: &Floorplan, search_window: usize) -> Self {
        AbacusLegalizer {
            floorplan: *floorplan,
            search_window: search_window.max(1),
        }
    }

    /// Legalizes `cells` inside `area`, treating `obstacles` as blocked.
    /// Returns the new lower-left corner of every cell. Nothing is written
    /// back to the design; the caller applies the moves.
    pub fn legalize(
        &self,
        cells: &[WorkCell],
        obstacles: &[BoundingBox],
        area: &Area,
    ) -> Result<Vec<(CellId, Coordinate)>, LegalizeError> {
        self.floorplan.validate()?;
        if cells.is_empty() {
            return Ok(Vec::new());
        }

        let mut subrows = SubrowSet::create(
            &self.floorplan,
            obstacles,
            area,
            1,
            RowAlignment::None,
            true,
        )?;
        if subrows.is_empty() {
            return Err(LegalizeError::NoSubrows {
                area: area.bbox().unwrap_or_else(|| self.floorplan.boundary()),
            });
        }

        let mut order = cells.iter().collect::<Vec<_>>();
        order.sort_by_key(|c| (c.location.x, c.location.y, c.id));

        let multi_row = cells.iter().any(|c| c.height > self.floorplan.row_height);
        debug!(
            "Legalizing {} cells in {} subrows ({} rows){}",
            cells.len(),
            subrows.subrow_count(),
            subrows.row_count(),
            if multi_row { " with multi-row cells" } else { "" }
        );

        let result = if multi_row {
            self.legalize_multi_row(&order, obstacles, area, &mut subrows)?
        } else {
            self.legalize_single_row(&order, &mut subrows)?
        };

        let stats = LegalizeStats::measure(cells, &result);
        info!(
            "Legalized {} cells: {} moved, total displacement {}, max displacement {}",
            stats.cells, stats.moved, stats.total_displacement, stats.max_displacement
        );
        Ok(result)
    }

    fn legalize_single_row(
        &self,
        order: &[&WorkCell],
        subrows: &mut SubrowSet,
    ) -> Result<Vec<(CellId, Coordinate)>, LegalizeError> {
        let mut rows: SecondaryMap<Subrow, AbacusRow> = SecondaryMap::new();

        for cell in order {
            // rows are packed on whole sites
            let span = self.floorplan.site_span(cell.width);
            let row_cell = RowCell {
                id: cell.id,
                target_x: cell.location.x as f64,
                width: span,
                weight: cell.weight,
            };

            let choice = self.search(cell, subrows, |id, subrow| {
                if subrow.capacity() < span {
                    return None;
                }
                let x = match rows.get(id) {
                    Some(row) => row.trial(&row_cell),
                    None => AbacusRow::new(subrow.bbox()).trial(&row_cell),
                };
                let x = self.floorplan.nearest_site(x);
                let cost = (x - cell.location.x).abs() + (subrow.origin().y - cell.location.y).abs();
                Some((cost as f64, ()))
            })?;

            let bbox = subrows.get(choice.subrow).bbox();
            rows.get_or_insert_with(choice.subrow, || AbacusRow::new(bbox))
                .insert(row_cell);
            let capacity = subrows.capacity(choice.subrow);
            subrows.set_capacity(choice.subrow, capacity - span);
        }

        let mut result = Vec::with_capacity(order.len());
        for (subrow, row) in rows.iter() {
            let y = row.y();
            let xs = row
                .legal_positions(&self.floorplan)
                .ok_or_else(|| LegalizeError::RowOverflow {
                    row: subrows.get(subrow).bbox(),
                })?;
            result.extend(xs.into_iter().map(|(id, x)| (id, Coordinate::new(x, y))));
        }
        Ok(result)
    }

    fn legalize_multi_row(
        &self,
        order: &[&WorkCell],
        obstacles: &[BoundingBox],
        area: &Area,
        subrows: &mut SubrowSet,
    ) -> Result<Vec<(CellId, Coordinate)>, LegalizeError> {
        let bounds = area
            .clipped_to(&self.floorplan.boundary())
            .bbox()
            .unwrap_or_else(|| self.floorplan.boundary());
        let mut engine = MultiRowAbacus::new(&self.floorplan, bounds, obstacles);

        for cell in order {
            let span = self.floorplan.site_span(cell.width);
            let choice = self.search(cell, subrows, |_, subrow| {
                let position = engine.trial(cell, &subrow.bbox(), subrows)?;
                let spanned = self.spanned_subrows(subrows, cell, position)?;
                if spanned.iter().any(|id| subrows.capacity(*id) < span) {
                    return None;
                }
                Some((position.manhattan(&cell.location) as f64, spanned))
            })?;

            let bbox = subrows.get(choice.subrow).bbox();
            engine
                .insert(cell, &bbox, subrows)
                .ok_or_else(|| LegalizeError::SearchExhausted {
                    cell: cell.name.clone(),
                    width: cell.width,
                    height: cell.height,
                })?;
            for id in choice.placement {
                let capacity = subrows.capacity(id);
                subrows.set_capacity(id, capacity - span);
            }
        }

        Ok(engine.positions())
    }

    /// The subrow holding each row of `cell` at `position`, bottom first.
    /// `None` if some row is not inside a single subrow.
    fn spanned_subrows(
        &self,
        subrows: &SubrowSet,
        cell: &WorkCell,
        position: Coordinate,
    ) -> Option<Vec<SubrowId>> {
        (0..self.floorplan.rows_spanned(cell.height))
            .map(|row| {
                let y = position.y + row * self.floorplan.row_height;
                let slice = BoundingBox::new(
                    position.x,
                    y,
                    position.x + cell.width,
                    y + self.floorplan.row_height,
                );
                subrows
                    .find_contained_subrow(&slice)
                    .filter(|id| subrows.get(*id).bbox().covers(&slice))
            })
            .collect()
    }

    /// Finds the cheapest subrow for `cell`. `evaluate` returns the trial cost
    /// of a subrow, or `None` if the cell cannot go there; it must not modify
    /// anything. Ties go to the subrow found first.
    fn search<P>(
        &self,
        cell: &WorkCell,
        subrows: &SubrowSet,
        mut evaluate: impl FnMut(SubrowId, &Subrow) -> Option<(f64, P)>,
    ) -> Result<Choice<P>, LegalizeError> {
        let mut window = self.search_window;
        let mut explored = 0;
        let mut best: Option<Choice<P>> = None;

        loop {
            let candidates = subrows
                .nearest_with_distance(cell.location)
                .take(window + 1)
                .collect::<Vec<_>>();
            let end = window.min(candidates.len());

            for &(id, _) in &candidates[explored.min(end)..end] {
                let subrow = subrows.get(id);
                if subrow.width() < self.floorplan.site_span(cell.width)
                    || !cell.alignment.accepts(subrow.row_index())
                {
                    continue;
                }
                if let Some((cost, placement)) = evaluate(id, subrow) {
                    if best.as_ref().is_none_or(|b| cost < b.cost) {
                        best = Some(Choice {
                            subrow: id,
                            cost,
                            placement,
                        });
                    }
                }
            }
            explored = end;

            // candidates are ordered by distance, so the next one bounds
            // every subrow not yet explored
            let Some(&(_, distance2)) = candidates.get(window) else {
                break;
            };
            if let Some(choice) = &best {
                if choice.cost <= (distance2 as f64).sqrt() {
                    break;
                }
            }
            window *= 2;
            debug!("Widening search window for {} to {}", cell.name, window);
        }

        best.ok_or_else(|| LegalizeError::SearchExhausted {
            cell: cell.name.clone(),
            width: cell.width,
            height: cell.height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::Cell;

    fn floorplan() -> Floorplan {
        Floorplan::new((0, 0), (100, 40), 10, 10)
    }

    fn work_cells(cells: Vec<Cell>) -> Vec<WorkCell> {
        let mut arena = Arena::new();
        cells
            .into_iter()
            .map(|cell| {
                let id = arena.insert(cell.clone());
                WorkCell::from_cell(id, &cell)
            })
            .collect()
    }

    fn position(result: &[(CellId, Coordinate)], id: CellId) -> Coordinate {
        result.iter().find(|(i, _)| *i == id).unwrap().1
    }

    #[test]
    fn stacked_cells_spread_within_row() {
        let fp = floorplan();
        let cells = work_cells(vec![
            Cell::new("a", 10, 10).at(16, 20),
            Cell::new("b", 10, 10).at(16, 20),
        ]);
        let result = AbacusLegalizer::new(&fp, 5)
            .legalize(&cells, &[], &Area::from(fp.boundary()))
            .unwrap();
        let mut xs = result.iter().map(|(_, c)| c.x).collect::<Vec<_>>();
        xs.sort();
        assert_eq!(xs, vec![10, 20]);
        assert!(result.iter().all(|(_, c)| c.y == 20));
    }

    #[test]
    fn full_row_overflows_to_neighbour() {
        let fp = Floorplan::new((0, 0), (30, 20), 10, 10);
        let cells = work_cells(
            (0..4)
                .map(|i| Cell::new(format!("c{i}"), 10, 10).at(0, 0))
                .collect(),
        );
        let result = AbacusLegalizer::new(&fp, 1)
            .legalize(&cells, &[], &Area::from(fp.boundary()))
            .unwrap();
        assert_eq!(result.iter().filter(|(_, c)| c.y == 0).count(), 3);
        assert_eq!(result.iter().filter(|(_, c)| c.y == 10).count(), 1);
    }

    #[test]
    fn parity_is_respected() {
        let fp = floorplan();
        let cells = work_cells(vec![
            Cell::new("odd", 10, 10)
                .at(0, 0)
                .aligned(RowAlignment::OddRows),
        ]);
        let result = AbacusLegalizer::new(&fp, 5)
            .legalize(&cells, &[], &Area::from(fp.boundary()))
            .unwrap();
        assert_eq!(result[0].1, Coordinate::new(0, 10));
    }

    #[test]
    fn exhausted_search_is_an_error() {
        let fp = floorplan();
        let cells = work_cells(vec![Cell::new("wide", 200, 10).at(0, 0)]);
        let err = AbacusLegalizer::new(&fp, 5)
            .legalize(&cells, &[], &Area::from(fp.boundary()))
            .unwrap_err();
        assert!(matches!(err, LegalizeError::SearchExhausted { .. }));
    }

    #[test]
    fn empty_area_has_no_subrows() {
        let fp = floorplan();
        let cells = work_cells(vec![Cell::new("a", 10, 10)]);
        let err = AbacusLegalizer::new(&fp, 5)
            .legalize(&cells, &[], &Area::from(BoundingBox::new(0, 0, 100, 5)))
            .unwrap_err();
        assert!(matches!(err, LegalizeError::NoSubrows { .. }));
    }

    #[test]
    fn multi_row_cells_avoid_obstacles() {
        let fp = floorplan();
        let cells = work_cells(vec![
            Cell::new("tall", 10, 20).at(42, 3),
            Cell::new("short", 10, 10).at(44, 10),
        ]);
        let obstacle = BoundingBox::new(40, 0, 60, 10);
        let result = AbacusLegalizer::new(&fp, 5)
            .legalize(&cells, &[obstacle], &Area::from(fp.boundary()))
            .unwrap();
        let tall = BoundingBox::from_origin_size(position(&result, cells[0].id), 10, 20);
        let short = BoundingBox::from_origin_size(position(&result, cells[1].id), 10, 10);
        assert!(!tall.intersects(&obstacle));
        assert!(!short.intersects(&obstacle));
        assert!(!tall.intersects(&short));
        assert!(fp.boundary().covers(&tall));
    }

    #[test]
    fn multi_row_cells_use_capacity_of_every_row() {
        let fp = floorplan();
        let area = Area::from(fp.boundary());
        let cells = work_cells(vec![
            Cell::new("tall", 15, 20).at(0, 0),
            Cell::new("short", 10, 10).at(50, 30),
        ]);
        let mut subrows = SubrowSet::create(&fp, &[], &area, 1, RowAlignment::None, true).unwrap();
        let order = cells.iter().collect::<Vec<_>>();

        let result = AbacusLegalizer::new(&fp, 5)
            .legalize_multi_row(&order, &[], &area, &mut subrows)
            .unwrap();

        assert_eq!(position(&result, cells[0].id), Coordinate::new(0, 0));
        assert_eq!(position(&result, cells[1].id), Coordinate::new(50, 30));
        let mut capacities = subrows
            .iter()
            .map(|(_, s)| (s.row_index(), s.capacity()))
            .collect::<Vec<_>>();
        capacities.sort();
        // two sites of rows 0 and 1 for the tall cell
        assert_eq!(capacities, vec![(0, 80), (1, 80), (2, 100), (3, 90)]);
    }

    #[test]
    fn multi_row_cell_skips_full_rows() {
        let fp = floorplan();
        let area = Area::from(fp.boundary());
        let cells = work_cells(vec![Cell::new("tall", 10, 20).at(0, 0)]);
        let mut subrows = SubrowSet::create(&fp, &[], &area, 1, RowAlignment::None, true).unwrap();
        let row1 = subrows
            .iter()
            .find(|(_, s)| s.row_index() == 1)
            .map(|(id, _)| id)
            .unwrap();
        subrows.set_capacity(row1, 0);

        let result = AbacusLegalizer::new(&fp, 5)
            .legalize_multi_row(&[&cells[0]], &[], &area, &mut subrows)
            .unwrap();

        assert_eq!(result, vec![(cells[0].id, Coordinate::new(0, 20))]);
    }

    #[test]
    fn partial_site_widths_take_whole_sites() {
        let fp = Floorplan::new((0, 0), (100, 10), 10, 10);
        let cells = work_cells(
            (0..5)
                .map(|i| Cell::new(format!("c{i}"), 15, 10).at(i * 15, 0))
                .collect(),
        );
        let result = AbacusLegalizer::new(&fp, 5)
            .legalize(&cells, &[], &Area::from(fp.boundary()))
            .unwrap();
        let xs = cells
            .iter()
            .map(|c| position(&result, c.id).x)
            .collect::<Vec<_>>();
        assert_eq!(xs, vec![0, 20, 40, 60, 80]);
    }

    #[test]
    fn zero_row_height_is_an_error() {
        let fp = Floorplan::new((0, 0), (100, 40), 10, 0);
        let cells = work_cells(vec![Cell::new("a", 10, 10)]);
        let err = AbacusLegalizer::new(&fp, 5)
            .legalize(&cells, &[], &Area::from(fp.boundary()))
            .unwrap_err();
        assert!(matches!(err, LegalizeError::InvalidFloorplan { .. }));
    }
}
