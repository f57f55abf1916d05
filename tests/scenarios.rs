// SPDX-License-Identifier: Apache-2.0

mod common;

use common::{floorplan, init_logger, location};
use rowfit::*;

#[test]
fn already_legal_cells_stay_put() {
    init_logger();
    let mut design = Design::new(floorplan(100, 40));
    let expected = [(10, 20), (20, 0), (30, 30), (40, 10)];
    let ids = expected
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| design.add_cell(Cell::new(format!("c{i}"), 10, 10).at(x, y)))
        .collect::<Vec<_>>();
    assert!(legalization_check(&design));

    let report = Legalizer::default().legalize(&mut design).unwrap();

    for (id, (x, y)) in ids.iter().zip(expected) {
        assert_eq!(location(&design, *id), Coordinate::new(x, y));
    }
    assert_eq!(report.stats.moved, 0);
    assert_eq!(report.legal, Some(true));
    assert!(legalization_check(&design));
}

#[test]
fn stacked_pair_is_separated_with_least_displacement() {
    init_logger();
    let mut design = Design::new(floorplan(100, 40));
    let a = design.add_cell(Cell::new("a", 10, 10).at(16, 20));
    let b = design.add_cell(Cell::new("b", 10, 10).at(16, 20));

    let report = Legalizer::default().legalize(&mut design).unwrap();

    let mut positions = vec![location(&design, a), location(&design, b)];
    positions.sort();
    assert_eq!(positions, vec![Coordinate::new(10, 20), Coordinate::new(20, 20)]);
    // (10, 20) + (20, 20) is the cheapest of the abutting pairs in that row
    assert_eq!(report.stats.total_displacement, 10);
    assert_eq!(report.legal, Some(true));
}

#[test]
fn cell_outside_chip_fails_check_until_legalized() {
    init_logger();
    let mut design = Design::new(floorplan(100, 40));
    design.add_cell(Cell::new("inside", 10, 10).at(0, 0));
    let stray = design.add_cell(Cell::new("stray", 10, 10).at(150, 10));

    assert!(!check_boundaries(&design));
    assert!(!legalization_check(&design));

    let report = Legalizer::default().legalize(&mut design).unwrap();

    assert_eq!(location(&design, stray), Coordinate::new(90, 10));
    assert!(check_boundaries(&design));
    assert!(legalization_check(&design));
    assert_eq!(report.legal, Some(true));
}

#[test]
fn ancients_are_pinned_during_partitioning_then_released() {
    init_logger();
    let mut design = Design::new(floorplan(100, 40));
    let left = [
        design.add_cell(Cell::new("l0", 10, 10).at(10, 0)),
        design.add_cell(Cell::new("l1", 10, 10).at(20, 10)),
    ];
    let straddler = design.add_cell(Cell::new("mid", 20, 10).at(40, 20));
    let right = [
        design.add_cell(Cell::new("r0", 10, 10).at(70, 0)),
        design.add_cell(Cell::new("r1", 10, 10).at(80, 30)),
    ];
    let ids = design.movable_ids();
    let chip = Area::from(design.floorplan().boundary());

    let kd = KdTreeLegalizer::new(1, 5);
    let flags = design.fixed_flags();
    kd.snap(&mut design, &ids).unwrap();
    let split = kd.split(&design, &ids, &chip).unwrap();
    assert_eq!(split.ancients, vec![straddler]);
    assert_eq!(split.partitions.len(), 2);
    assert_eq!(split.partitions[0].cells, left.to_vec());
    assert_eq!(split.partitions[1].cells, right.to_vec());

    kd.pin_ancients(&mut design, &split.ancients, &[], &chip).unwrap();
    assert!(design.cell(straddler).unwrap().fixed);
    assert!(left.iter().chain(&right).all(|id| !design.cell(*id).unwrap().fixed));

    let failures = kd
        .legalize_partitions(&mut design, &split.partitions, &[], &chip)
        .unwrap();
    assert!(failures.is_empty());
    // still pinned until the caller restores the flags
    assert!(design.cell(straddler).unwrap().fixed);

    design.restore_fixed_flags(&flags);
    assert!(!design.cell(straddler).unwrap().fixed);
    assert!(legalization_check(&design));
}

#[test]
fn partitioned_run_restores_fixed_flags() {
    init_logger();
    let mut design = Design::new(floorplan(100, 40));
    let macro_cell = design.add_cell(Cell::new("macro", 20, 20).at(60, 20).fixed());
    let straddler = design.add_cell(Cell::new("mid", 20, 10).at(41, 3));
    design.add_cell(Cell::new("l0", 10, 10).at(12, 4));
    design.add_cell(Cell::new("r0", 10, 10).at(66, 24));

    let config = LegalizerConfig {
        partition_depth: 1,
        ..LegalizerConfig::default()
    };
    let report = Legalizer::new(config).legalize(&mut design).unwrap();

    assert_eq!(report.partitions, 2);
    assert!(report.failed_partitions.is_empty());
    assert!(!design.cell(straddler).unwrap().fixed);
    assert!(design.cell(macro_cell).unwrap().fixed);
    assert_eq!(location(&design, macro_cell), Coordinate::new(60, 20));
    assert_eq!(report.legal, Some(true));
}

#[test]
fn partitioned_run_with_mixed_heights() {
    init_logger();
    let mut design = Design::new(floorplan(200, 40));
    design.add_cell(Cell::new("t0", 10, 20).at(12, 3));
    design.add_cell(Cell::new("s0", 15, 10).at(31, 22));
    design.add_cell(Cell::new("s1", 10, 10).at(24, 4));
    let straddler = design.add_cell(Cell::new("mid", 20, 10).at(93, 14));
    design.add_cell(Cell::new("t1", 20, 20).at(150, 11));
    design.add_cell(Cell::new("s2", 15, 10).at(161, 27));
    design.add_cell(Cell::new("s3", 10, 10).at(140, 2));

    let config = LegalizerConfig {
        partition_depth: 1,
        ..LegalizerConfig::default()
    };
    let report = Legalizer::new(config).legalize(&mut design).unwrap();

    assert_eq!(report.partitions, 2);
    assert!(report.failed_partitions.is_empty());
    // straddles the split line at x = 100, so it is placed before the leaves
    assert_eq!(location(&design, straddler), Coordinate::new(90, 10));
    assert!(!design.cell(straddler).unwrap().fixed);
    assert_eq!(report.legal, Some(true));
    assert!(legalization_check(&design));
}
