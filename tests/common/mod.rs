// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rowfit::*;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 10x10 sites and rows.
pub fn floorplan(width: i64, height: i64) -> Floorplan {
    Floorplan::new((0, 0), (width, height), 10, 10)
}

pub fn location(design: &Design, id: CellId) -> Coordinate {
    design.cell(id).unwrap().location
}

/// Adds `count` movable cells of random site-multiple width at random
/// positions inside the chip.
pub fn scatter(design: &mut Design, rng: &mut StdRng, count: usize, heights: &[i64]) -> Vec<CellId> {
    let chip = design.floorplan().boundary();
    (0..count)
        .map(|i| {
            let width = 10 * rng.gen_range(1..=3);
            let height = heights[rng.gen_range(0..heights.len())];
            let x = rng.gen_range(chip.min_x..chip.max_x - width);
            let y = rng.gen_range(chip.min_y..chip.max_y - height);
            design.add_cell(Cell::new(format!("c{i}"), width, height).at(x, y))
        })
        .collect()
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
