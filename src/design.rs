// SPDX-License-Identifier: Apache-2.0

use indexmap::IndexMap;

use crate::arena::{Arena, SecondaryMap};
use crate::cell::{Cell, CellId, WorkCell};
use crate::error::LegalizeError;
use crate::floorplan::Floorplan;
use crate::region::Region;
use crate::{Area, BoundingBox, Coordinate};

/// Placement store: the floorplan, every cell with its current location, and
/// the fence table.
#[derive(Debug, Clone)]
pub struct Design {
    floorplan: Floorplan,
    cells: Arena<Cell>,
    regions: IndexMap<String, Region>,
}

impl Design {
    pub fn new(floorplan: Floorplan) -> Self {
        Design {
            floorplan,
            cells: Arena::new(),
            regions: IndexMap::new(),
        }
    }

    pub fn floorplan(&self) -> &Floorplan {
        &self.floorplan
    }

    pub fn add_cell(&mut self, cell: Cell) -> CellId {
        self.cells.insert(cell)
    }

    pub fn remove_cell(&mut self, id: CellId) -> Option<Cell> {
        self.cells.remove(id)
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id)
    }

    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(id)
    }

    /// Like [`Design::cell`], but a stale id is an error.
    pub fn try_cell(&self, id: CellId) -> Result<&Cell, LegalizeError> {
        self.cells
            .get(id)
            .ok_or_else(|| LegalizeError::UnknownCell {
                cell: id.to_string(),
            })
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellId, &Cell)> + '_ {
        self.cells.iter()
    }

    pub fn cell_ids(&self) -> Vec<CellId> {
        self.cells.ids().collect()
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn find_cell(&self, name: impl AsRef<str>) -> Option<CellId> {
        self.cells
            .iter()
            .find(|(_, cell)| cell.name == name.as_ref())
            .map(|(id, _)| id)
    }

    pub fn movable_ids(&self) -> Vec<CellId> {
        self.cells
            .iter()
            .filter(|(_, cell)| !cell.fixed)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn fixed_ids(&self) -> Vec<CellId> {
        self.cells
            .iter()
            .filter(|(_, cell)| cell.fixed)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn add_region(&mut self, region: Region) {
        self.regions.insert(region.name.clone(), region);
    }

    pub fn region(&self, name: impl AsRef<str>) -> Option<&Region> {
        self.regions.get(name.as_ref())
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> + '_ {
        self.regions.values()
    }

    /// Cells that must stay inside the named region.
    pub fn region_members(&self, name: impl AsRef<str>) -> Vec<CellId> {
        self.cells
            .iter()
            .filter(|(_, cell)| cell.region.as_deref() == Some(name.as_ref()))
            .map(|(id, _)| id)
            .collect()
    }

    /// Area a cell must stay inside: its region if it has one, otherwise the
    /// chip.
    pub fn allowed_area(&self, id: CellId) -> Result<Area, LegalizeError> {
        let cell = self.try_cell(id)?;
        match &cell.region {
            Some(name) => self
                .regions
                .get(name)
                .map(|region| region.area.clone())
                .ok_or_else(|| LegalizeError::UnknownRegion { name: name.clone() }),
            None => Ok(Area::from(self.floorplan.boundary())),
        }
    }

    pub fn work_cell(&self, id: CellId) -> Result<WorkCell, LegalizeError> {
        Ok(WorkCell::from_cell(id, self.try_cell(id)?))
    }

    pub fn work_cells(&self, ids: &[CellId]) -> Result<Vec<WorkCell>, LegalizeError> {
        ids.iter().map(|id| self.work_cell(*id)).collect()
    }

    /// Outline boxes of every fixed cell.
    pub fn fixed_boxes(&self) -> Vec<BoundingBox> {
        self.cells
            .iter()
            .filter(|(_, cell)| cell.fixed)
            .flat_map(|(_, cell)| cell.boxes().collect::<Vec<_>>())
            .collect()
    }

    pub fn set_location(&mut self, id: CellId, location: Coordinate) -> Result<(), LegalizeError> {
        self.cells
            .get_mut(id)
            .ok_or_else(|| LegalizeError::UnknownCell {
                cell: id.to_string(),
            })?
            .location = location;
        Ok(())
    }

    pub fn apply_locations(&mut self, moves: &[(CellId, Coordinate)]) -> Result<(), LegalizeError> {
        for (id, location) in moves {
            self.set_location(*id, *location)?;
        }
        Ok(())
    }

    pub fn locations(&self) -> SecondaryMap<Cell, Coordinate> {
        let mut result = SecondaryMap::new();
        for (id, cell) in self.cells.iter() {
            result.insert(id, cell.location);
        }
        result
    }

    /// Snapshot of every cell's `fixed` flag, for [`Design::restore_fixed_flags`].
    pub fn fixed_flags(&self) -> SecondaryMap<Cell, bool> {
        let mut result = SecondaryMap::new();
        for (id, cell) in self.cells.iter() {
            result.insert(id, cell.fixed);
        }
        result
    }

    pub fn restore_fixed_flags(&mut self, flags: &SecondaryMap<Cell, bool>) {
        for (id, cell) in self.cells.iter_mut() {
            if let Some(fixed) = flags.get(id) {
                cell.fixed = *fixed;
            }
        }
    }

    pub fn set_fixed(&mut self, ids: &[CellId], fixed: bool) -> Result<(), LegalizeError> {
        for id in ids {
            self.cells
                .get_mut(*id)
                .ok_or_else(|| LegalizeError::UnknownCell {
                    cell: id.to_string(),
                })?
                .fixed = fixed;
        }
        Ok(())
    }
}
