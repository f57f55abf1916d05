// SPDX-License-Identifier: Apache-2.0

mod common;

use common::{floorplan, init_logger, location, rng, scatter};
use rowfit::*;
use rstest::rstest;

fn with_macros(width: i64, height: i64) -> Design {
    let mut design = Design::new(floorplan(width, height));
    design.add_cell(Cell::new("macro0", 30, 20).at(50, 20).fixed());
    design.add_cell(Cell::new("macro1", 20, 30).at(120, 50).fixed());
    design
}

#[rstest]
#[case(3)]
#[case(17)]
#[case(2024)]
fn random_cells_become_legal(#[case] seed: u64) {
    init_logger();
    let mut design = with_macros(200, 100);
    scatter(&mut design, &mut rng(seed), 25, &[10]);

    let report = Legalizer::default().legalize(&mut design).unwrap();

    assert_eq!(report.stats.cells, 25);
    assert_eq!(report.legal, Some(true));
    assert!(find_violations(&design).is_empty());
}

#[rstest]
#[case(5)]
#[case(99)]
fn subrows_are_never_overfilled(#[case] seed: u64) {
    init_logger();
    let mut design = with_macros(200, 100);
    let ids = scatter(&mut design, &mut rng(seed), 40, &[10]);
    Legalizer::default().legalize(&mut design).unwrap();

    let subrows = SubrowSet::create(
        design.floorplan(),
        &design.fixed_boxes(),
        &Area::from(design.floorplan().boundary()),
        1,
        RowAlignment::None,
        true,
    )
    .unwrap();
    let mut used = vec![0; subrows.subrow_count()];
    for id in &ids {
        let bbox = design.cell(*id).unwrap().bbox();
        let holders = subrows
            .iter()
            .enumerate()
            .filter(|(_, (_, subrow))| subrow.bbox().covers(&bbox))
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        assert_eq!(holders.len(), 1, "{bbox} is not in exactly one subrow");
        used[holders[0]] += bbox.width();
    }
    for ((_, subrow), used) in subrows.iter().zip(used) {
        assert!(used <= subrow.width());
    }
}

#[rstest]
#[case(8)]
#[case(31)]
fn mixed_heights_become_legal(#[case] seed: u64) {
    init_logger();
    let mut design = Design::new(floorplan(200, 100));
    design.add_cell(Cell::new("macro", 30, 30).at(80, 30).fixed());
    scatter(&mut design, &mut rng(seed), 12, &[10, 20]);

    let report = Legalizer::default().legalize(&mut design).unwrap();

    assert_eq!(report.legal, Some(true));
}

#[test]
fn parity_restricted_cell_lands_on_accepted_row() {
    init_logger();
    let mut design = Design::new(floorplan(100, 40));
    let odd = design.add_cell(Cell::new("odd", 10, 10).at(30, 1).aligned(RowAlignment::OddRows));
    let even = design.add_cell(Cell::new("even", 10, 10).at(60, 12).aligned(RowAlignment::EvenRows));

    let report = Legalizer::default().legalize(&mut design).unwrap();

    assert_eq!(location(&design, odd), Coordinate::new(30, 10));
    // row 2 is closer to y = 12 than row 0
    assert_eq!(location(&design, even), Coordinate::new(60, 20));
    assert_eq!(report.legal, Some(true));
}

#[test]
fn fixed_cells_do_not_move() {
    init_logger();
    let mut design = Design::new(floorplan(100, 40));
    let blocker = design.add_cell(Cell::new("blocker", 20, 10).at(40, 10).fixed());
    let mover = design.add_cell(Cell::new("m", 10, 10).at(38, 10));

    Legalizer::default().legalize(&mut design).unwrap();

    assert_eq!(location(&design, blocker), Coordinate::new(40, 10));
    assert!(design.cell(blocker).unwrap().fixed);
    assert_eq!(location(&design, mover), Coordinate::new(30, 10));
}

#[test]
fn bad_floorplan_is_rejected() {
    let mut design = Design::new(Floorplan::new((0, 0), (100, 40), 0, 10));
    design.add_cell(Cell::new("m", 10, 10).at(5, 5));
    assert!(matches!(
        Legalizer::default().legalize(&mut design),
        Err(LegalizeError::InvalidFloorplan { .. })
    ));
}

#[test]
fn everything_blocked_is_an_error() {
    let mut design = Design::new(floorplan(40, 20));
    design.add_cell(Cell::new("wall", 40, 20).at(0, 0).fixed());
    design.add_cell(Cell::new("m", 10, 10).at(5, 5));
    assert!(matches!(
        Legalizer::default().legalize(&mut design),
        Err(LegalizeError::NoSubrows { .. })
    ));
}

#[test]
fn cell_next_to_abutting_macros_uses_free_rows() {
    init_logger();
    let mut design = Design::new(floorplan(100, 40));
    design.add_cell(Cell::new("macro0", 20, 40).at(40, 0).fixed());
    design.add_cell(Cell::new("macro1", 20, 40).at(60, 0).fixed());
    let tall = design.add_cell(Cell::new("tall", 10, 20).at(10, 0));
    let a = design.add_cell(Cell::new("a", 10, 10).at(45, 10));

    let report = Legalizer::default().legalize(&mut design).unwrap();

    assert_eq!(location(&design, tall), Coordinate::new(10, 0));
    assert_eq!(location(&design, a), Coordinate::new(30, 10));
    assert_eq!(report.legal, Some(true));
    assert!(legalization_check(&design));
}

#[test]
fn partial_site_widths_are_packed_on_whole_sites() {
    init_logger();
    let mut design = Design::new(floorplan(100, 10));
    let ids = (0..5)
        .map(|i| design.add_cell(Cell::new(format!("c{i}"), 15, 10).at(i * 15, 0)))
        .collect::<Vec<_>>();

    let report = Legalizer::default().legalize(&mut design).unwrap();

    let xs = ids.iter().map(|id| location(&design, *id).x).collect::<Vec<_>>();
    assert_eq!(xs, vec![0, 20, 40, 60, 80]);
    assert_eq!(report.legal, Some(true));
    assert!(legalization_check(&design));
}

#[test]
fn partial_site_widths_count_whole_sites_of_capacity() {
    init_logger();
    let mut design = Design::new(floorplan(100, 10));
    for i in 0..6 {
        design.add_cell(Cell::new(format!("c{i}"), 15, 10).at(i * 15, 0));
    }
    let before = design.locations();

    // 90 units of cells, but six whole-site spans of 20 do not fit in 100
    let error = Legalizer::default().legalize(&mut design).unwrap_err();

    assert!(matches!(error, LegalizeError::SearchExhausted { ref cell, .. } if cell == "c5"));
    assert!(design.cells().all(|(id, cell)| before.get(id) == Some(&cell.location)));
}

#[test]
fn mixed_heights_with_partial_sites_share_rows() {
    init_logger();
    let mut design = Design::new(floorplan(100, 20));
    design.add_cell(Cell::new("tall", 15, 20).at(0, 0));
    for i in 0..4 {
        design.add_cell(Cell::new(format!("s{i}"), 15, 10).at(10 + i * 10, 0));
    }

    let report = Legalizer::default().legalize(&mut design).unwrap();

    assert_eq!(report.legal, Some(true));
    assert!(legalization_check(&design));
}
