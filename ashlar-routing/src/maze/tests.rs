use super::*;
use ashlar_common::geometry::Size64;
use std::collections::HashSet;

fn router(width: i64, height: i64, max_capacity: u16) -> MazeRouter {
    MazeRouter::new(Grid::new(width, height, Size64::new(1, 1), max_capacity))
}

fn chain_has_route_error(err: &anyhow::Error, predicate: impl Fn(&RouteError) -> bool) -> bool {
    err.chain()
        .filter_map(|e| e.downcast_ref::<RouteError>())
        .any(|e| predicate(e))
}

fn covered_cells(segments: &SegmentList) -> HashSet<GridCoord> {
    segments
        .iter()
        .flat_map(|s| s.cells().collect::<Vec<_>>())
        .collect()
}

#[test]
fn straight_route_is_one_segment() {
    let mut router = router(5, 1, 4);
    let segments = router
        .route_two_point(Coord64::new(0, 0), Coord64::new(4, 0))
        .unwrap();

    assert_eq!(segments.len(), 1);
    let seg = segments.iter().next().unwrap();
    assert_eq!(seg.length, 5);
    assert_eq!(seg.parent, None);
    assert_eq!(covered_cells(&segments).len(), 5);
}

#[test]
fn equal_endpoints_give_empty_segments() {
    let mut router = router(4, 4, 4);
    let segments = router
        .route_two_point(Coord64::new(2, 2), Coord64::new(2, 2))
        .unwrap();
    assert!(segments.is_empty());
}

#[test]
fn out_of_grid_endpoint_is_rejected() {
    let mut router = router(4, 4, 4);
    let err = router
        .route_two_point(Coord64::new(0, 0), Coord64::new(9, 0))
        .unwrap_err();
    assert!(chain_has_route_error(&err, |e| matches!(
        e,
        RouteError::InvalidEndpoint { .. }
    )));
}

#[test]
fn blocked_corridor_is_unroutable() {
    // 5x1 corridor with the middle cell blocked leaves no vertical room
    // to go around.
    let mut router = router(5, 1, 4);
    router.set_blockage(Coord64::new(2, 0));

    let err = router
        .route_two_point(Coord64::new(0, 0), Coord64::new(4, 0))
        .unwrap_err();
    assert!(chain_has_route_error(&err, |e| matches!(
        e,
        RouteError::Unroutable { .. }
    )));
}

#[test]
fn router_detours_around_blockages() {
    let mut router = router(5, 3, 4);
    router.set_blockage(Coord64::new(2, 0));

    let segments = router
        .route_two_point(Coord64::new(0, 0), Coord64::new(4, 0))
        .unwrap();

    let cells = covered_cells(&segments);
    assert!(!cells.contains(&GridCoord::new(2, 0)));
    assert!(cells.contains(&GridCoord::new(0, 0)));
    assert!(cells.contains(&GridCoord::new(4, 0)));
    // Shortest detour: 4 horizontal steps plus one row up and back down.
    assert_eq!(segments.cell_count(), 7);
}

#[test]
fn segment_parents_chain_toward_the_target() {
    let mut router = router(4, 4, 4);
    let segments = router
        .route_two_point(Coord64::new(0, 0), Coord64::new(3, 3))
        .unwrap();

    assert!(segments.len() >= 2, "an L route needs at least two runs");
    // Exactly one root (the segment created at the target), every other
    // parent index resolves inside the list.
    let roots = segments.iter().filter(|s| s.parent.is_none()).count();
    assert_eq!(roots, 1);
    for seg in segments.iter() {
        if let Some(parent) = seg.parent {
            assert!(segments.get(parent).is_some());
        }
    }
    // A run's end point is the next run's start.
    let runs: Vec<&NetSegment> = segments.iter().collect();
    for pair in runs.windows(2) {
        assert_eq!(pair[0].end_point(), pair[1].start);
    }
}

#[test]
fn route_is_idempotent_on_a_fresh_grid() {
    let terminals = [
        Coord64::new(0, 0),
        Coord64::new(6, 2),
        Coord64::new(3, 5),
        Coord64::new(6, 6),
    ];

    let first = router(8, 8, 8).route_net(&terminals, "n").unwrap();
    let second = router(8, 8, 8).route_net(&terminals, "n").unwrap();

    assert_eq!(first, second);
}

#[test]
fn capacity_matches_touched_cells_exactly() {
    let mut router = router(8, 8, 8);
    let terminals = [
        Coord64::new(0, 0),
        Coord64::new(7, 0),
        Coord64::new(0, 7),
        Coord64::new(7, 7),
    ];
    let segments = router.route_net(&terminals, "n").unwrap();

    let distinct = covered_cells(&segments);
    assert_eq!(router.grid().total_capacity_used(), distinct.len() as u64);

    // Every touched cell got exactly one increment.
    for pos in &distinct {
        assert_eq!(router.grid().at(*pos).unwrap().capacity, 1);
    }
    // Extraction marks were cleared afterwards.
    for pos in &distinct {
        let cell = router.grid().at(*pos).unwrap();
        assert!(!cell.has(GCell::EXTRACTED));
        assert!(!cell.has(GCell::MARKED));
    }
}

#[test]
fn full_cells_refuse_new_routes() {
    // Capacity 1: the first net fills the only corridor, the second must
    // fail.
    let mut router = router(3, 1, 1);
    router
        .route_net(&[Coord64::new(0, 0), Coord64::new(2, 0)], "n1")
        .unwrap();

    let err = router
        .route_net(&[Coord64::new(0, 0), Coord64::new(2, 0)], "n2")
        .unwrap_err();
    assert!(chain_has_route_error(&err, |e| matches!(
        e,
        RouteError::Unroutable { .. }
    )));
}

#[test]
fn lee_and_directed_agree_on_path_length() {
    let grid_a = Grid::new(9, 9, Size64::new(1, 1), 8);
    let grid_b = Grid::new(9, 9, Size64::new(1, 1), 8);

    let mut directed = MazeRouter::with_cost_model(grid_a, CostModel::Directed { slack: 0 });
    let mut lee = MazeRouter::with_cost_model(grid_b, CostModel::Lee);

    let from = Coord64::new(1, 1);
    let to = Coord64::new(7, 4);
    let a = directed.route_two_point(from, to).unwrap();
    let b = lee.route_two_point(from, to).unwrap();

    // Both are shortest paths over the same step costs.
    assert_eq!(a.cell_count(), b.cell_count());
}

#[test]
fn nets_route_in_ascending_terminal_order() {
    let mut router = router(16, 16, 8);
    let nets = vec![
        (
            "big".to_owned(),
            vec![
                Coord64::new(0, 0),
                Coord64::new(15, 0),
                Coord64::new(0, 15),
                Coord64::new(15, 15),
            ],
        ),
        (
            "small".to_owned(),
            vec![Coord64::new(3, 3), Coord64::new(5, 3)],
        ),
    ];

    let routed = router.route_nets(nets).unwrap();
    let names: Vec<&str> = routed.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["small", "big"]);
}

#[test]
fn two_point_route_cleans_its_scratch() {
    let mut router = router(6, 6, 8);
    router
        .route_two_point(Coord64::new(0, 0), Coord64::new(5, 5))
        .unwrap();

    for y in 0..6 {
        for x in 0..6 {
            let cell = router.grid().at(GridCoord::new(x, y)).unwrap();
            assert!(!cell.has(GCell::REACHED));
            assert!(!cell.has(GCell::SOURCE));
            assert!(!cell.has(GCell::TARGET));
            assert_eq!(cell.cost, PathCost::MAX);
        }
    }
}
