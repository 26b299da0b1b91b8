use super::*;
use crate::netlist;

#[test]
fn single_cell_lands_between_anchors() {
    let mut netlist = netlist!(
        cells: [
            a => (2, 2);
        ],
        fixed_cells: [
            left => (0, 0), (0, 0);
            right => (20, 0), (0, 0);
        ],
        nets: [
            [left, a],
            [a, right]
        ]
    );

    let placer = AnalyticPlacer::new(PlacerTunables::default());
    let stats = placer.solve(&mut netlist).unwrap();

    assert_eq!(stats.rows, 1);
    assert_eq!(stats.stars, 0);
    assert_eq!(netlist.nodes[0].center(), Coord64::new(10, 0));
}

#[test]
fn chain_spreads_evenly() {
    let mut netlist = netlist!(
        cells: [
            a => (0, 0);
            b => (0, 0);
            c => (0, 0);
        ],
        fixed_cells: [
            left => (0, 0), (0, 0);
            right => (40, 40), (0, 0);
        ],
        nets: [
            [left, a],
            [a, b],
            [b, c],
            [c, right]
        ]
    );

    // Unit anchor weight and a tight tolerance so the spread is exact.
    let placer = AnalyticPlacer::new(PlacerTunables {
        fixed_weight: 1.0,
        tolerance: 1.0e-9,
        ..Default::default()
    });
    placer.solve(&mut netlist).unwrap();

    assert_eq!(netlist.nodes[0].center(), Coord64::new(10, 10));
    assert_eq!(netlist.nodes[1].center(), Coord64::new(20, 20));
    assert_eq!(netlist.nodes[2].center(), Coord64::new(30, 30));
}

#[test]
fn star_net_pulls_to_centroid() {
    // Three fixed corners share one 4-endpoint net with a movable cell;
    // the star model should settle the cell at the centroid.
    let mut netlist = netlist!(
        cells: [
            m => (0, 0);
        ],
        fixed_cells: [
            p0 => (0, 0), (0, 0);
            p1 => (30, 0), (0, 0);
            p2 => (0, 30), (0, 0);
        ],
        nets: [
            [p0, p1, p2, m]
        ]
    );

    let placer = AnalyticPlacer::new(PlacerTunables {
        tolerance: 1.0e-9,
        ..Default::default()
    });
    let stats = placer.solve(&mut netlist).unwrap();

    assert_eq!(stats.stars, 1);
    let center = netlist.nodes[0].center();
    assert_eq!(center, Coord64::new(10, 10));
}

#[test]
fn oversized_nets_are_skipped() {
    let tunables = PlacerTunables {
        max_net_size: 3,
        ..Default::default()
    };

    let mut netlist = netlist!(
        cells: [
            a => (0, 0);
        ],
        fixed_cells: [
            p0 => (0, 0), (0, 0);
            p1 => (8, 0), (0, 0);
            p2 => (0, 8), (0, 0);
            p3 => (8, 8), (0, 0);
        ],
        nets: [
            [p0, p1, p2, p3, a],
            [p0, a]
        ]
    );

    let placer = AnalyticPlacer::new(tunables);
    let stats = placer.solve(&mut netlist).unwrap();

    assert_eq!(stats.skipped_nets, 1);
    // Only the two-point net to p0 remains.
    assert_eq!(netlist.nodes[0].center(), Coord64::new(0, 0));
}

#[test]
fn fully_fixed_netlist_is_an_error() {
    let mut netlist = netlist!(
        cells: [
        ],
        fixed_cells: [
            p0 => (0, 0), (0, 0);
            p1 => (8, 0), (0, 0);
        ],
        nets: [
            [p0, p1]
        ]
    );

    let placer = AnalyticPlacer::new(PlacerTunables::default());
    assert!(placer.solve(&mut netlist).is_err());
}

#[test]
fn degenerate_and_unmovable_nets_are_ignored() {
    let mut netlist = netlist!(
        cells: [
            a => (0, 0);
        ],
        fixed_cells: [
            p0 => (0, 0), (0, 0);
            p1 => (6, 0), (0, 0);
            p2 => (6, 6), (0, 0);
        ],
        nets: [
            [p0, p1],
            [p2],
            [p2, a]
        ]
    );

    let placer = AnalyticPlacer::new(PlacerTunables::default());
    let stats = placer.solve(&mut netlist).unwrap();

    assert_eq!(stats.rows, 1);
    // Only the p2 net constrains the movable cell.
    assert_eq!(netlist.nodes[0].center(), Coord64::new(6, 6));
}
