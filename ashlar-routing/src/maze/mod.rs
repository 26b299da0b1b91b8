//! Best-first (directed Lee) maze routing over the GCell grid.
//!
//! A net is decomposed into two-point connections along its rectilinear
//! MST; each connection expands a wavefront ordered by path cost plus a
//! slack-adjusted Manhattan estimate, then backtracks through the
//! predecessor flags into collinear run-length segments.

use anyhow::{ensure, Context, Result};
use ashlar_common::geometry::Coord64;
use itertools::Itertools;
use log::{debug, info};
use std::collections::BinaryHeap;
use std::fmt::Display;

use crate::grid::{Direction, GCell, Grid, GridCoord, PathCost, Predecessor};
use crate::prim;

#[cfg(test)]
mod tests;

#[derive(Debug, PartialEq)]
pub enum RouteError {
    /// No path between the endpoints under the current capacity and
    /// blockage state.
    Unroutable { from: GridCoord, to: GridCoord },
    /// An endpoint fell outside the grid.
    InvalidEndpoint { pos: Coord64 },
}

impl std::error::Error for RouteError {}

impl Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unroutable { from, to } => {
                write!(f, "no route from {} to {}", from, to)
            }
            Self::InvalidEndpoint { pos } => {
                write!(f, "route endpoint {} lies outside the routing grid", pos)
            }
        }
    }
}

/// A collinear run of grid cells. `parent` points at the previous
/// segment of the same backtrack (closer to the route target), as an
/// index into the owning [`SegmentList`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NetSegment {
    pub start: GridCoord,
    pub dir: Direction,
    /// Number of grid cells covered by this run.
    pub length: i64,
    pub parent: Option<u32>,
}

impl NetSegment {
    /// One past the last covered cell.
    pub fn end_point(&self) -> GridCoord {
        let mut p = self.start;
        for _ in 0..self.length {
            p = self.dir.step(p);
        }
        p
    }

    /// All cells covered by the run.
    pub fn cells(&self) -> impl Iterator<Item = GridCoord> + '_ {
        let mut p = self.start;
        (0..self.length).map(move |_| {
            let cur = p;
            p = self.dir.step(p);
            cur
        })
    }
}

/// Arena of net segments; parent references are indices, so the list is
/// freely movable and clonable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SegmentList {
    segments: Vec<NetSegment>,
}

impl SegmentList {
    pub fn push(&mut self, segment: NetSegment) -> u32 {
        self.segments.push(segment);
        (self.segments.len() - 1) as u32
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetSegment> {
        self.segments.iter()
    }

    pub fn get(&self, index: u32) -> Option<&NetSegment> {
        self.segments.get(index as usize)
    }

    /// Append `other`, rebasing its parent indices.
    pub fn absorb(&mut self, other: SegmentList) {
        let offset = self.segments.len() as u32;
        self.segments.extend(
            other
                .segments
                .into_iter()
                .map(|mut seg| {
                    seg.parent = seg.parent.map(|p| p + offset);
                    seg
                }),
        );
    }

    /// Total number of (non-distinct) cells covered.
    pub fn cell_count(&self) -> i64 {
        self.segments.iter().map(|s| s.length).sum()
    }
}

/// Wave expansion cost model.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CostModel {
    /// Plain Lee expansion: priority is the accumulated path cost only.
    Lee,
    /// Directed expansion: priority adds `max(0, manhattan − slack)`
    /// toward the target.
    Directed { slack: i64 },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct WaveItem {
    priority: PathCost,
    path_cost: PathCost,
    pos: GridCoord,
    pred: Predecessor,
}

impl Ord for WaveItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed so the heap yields the lowest priority first; the
        // position ordering keeps expansion deterministic.
        other
            .priority
            .cmp(&self.priority)
            .then(self.pos.x.cmp(&other.pos.x))
            .then(self.pos.y.cmp(&other.pos.y))
    }
}

impl PartialOrd for WaveItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

pub struct MazeRouter {
    grid: Grid,
    cost_model: CostModel,
}

const CELL_COST: PathCost = 1;
const BEND_PENALTY: PathCost = 2;

impl MazeRouter {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            cost_model: CostModel::Directed { slack: 0 },
        }
    }

    pub fn with_cost_model(grid: Grid, cost_model: CostModel) -> Self {
        Self { grid, cost_model }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    /// Mark the grid cell containing the chip coordinate as blocked.
    pub fn set_blockage(&mut self, p: Coord64) {
        let pos = self.grid.to_grid(p);
        self.grid.set_blocked(pos);
    }

    /// Route a single two-point connection. The expansion scratch
    /// (reached flags and costs) is cleared again before returning, on
    /// both the success and the failure path; capacity is NOT updated
    /// here; that is the net-level caller's job.
    pub fn route_two_point(&mut self, p1: Coord64, p2: Coord64) -> Result<SegmentList> {
        let source = self.grid.to_grid(p1);
        let target = self.grid.to_grid(p2);
        if !self.grid.is_valid(source) {
            return Err(RouteError::InvalidEndpoint { pos: p1 }.into());
        }
        if !self.grid.is_valid(target) {
            return Err(RouteError::InvalidEndpoint { pos: p2 }.into());
        }
        if source == target {
            return Ok(SegmentList::default());
        }

        {
            let cell = self.grid.at_mut(source).expect("validated source");
            cell.set(GCell::SOURCE | GCell::REACHED);
            cell.clear(GCell::TARGET);
            cell.cost = 0;
        }
        self.grid.at_mut(target).expect("validated target").set(GCell::TARGET);

        let mut wavefront = BinaryHeap::new();
        wavefront.push(WaveItem {
            priority: 0,
            path_cost: 0,
            pos: source,
            pred: Predecessor::Undefined,
        });

        let mut evaluations = 0usize;
        let result = loop {
            let Some(item) = wavefront.pop() else {
                break Err(RouteError::Unroutable {
                    from: source,
                    to: target,
                });
            };
            evaluations += 1;

            {
                let cell = self.grid.at_mut(item.pos).expect("wave stays on grid");
                if cell.cost <= item.path_cost && item.pos != source {
                    continue;
                }
                cell.set(GCell::REACHED);
                cell.set_predecessor(item.pred);
                cell.cost = item.path_cost;
            }

            if item.pos == target {
                debug!("maze evaluations: {}", evaluations);
                break Ok(self.backtrack(source, target));
            }

            for (neighbor, back) in [
                (item.pos.north(), Predecessor::South),
                (item.pos.south(), Predecessor::North),
                (item.pos.east(), Predecessor::West),
                (item.pos.west(), Predecessor::East),
            ] {
                let Some(cell) = self.grid.at(neighbor) else {
                    continue;
                };
                if cell.has(GCell::REACHED) || cell.has(GCell::BLOCKED) {
                    continue;
                }
                if cell.capacity >= self.grid.max_capacity() {
                    continue;
                }

                let mut path_cost = item.path_cost + CELL_COST;
                if item.pred != Predecessor::Undefined && item.pred != back {
                    path_cost += BEND_PENALTY;
                }
                let priority = match self.cost_model {
                    CostModel::Lee => path_cost,
                    CostModel::Directed { slack } => {
                        path_cost + (neighbor.manhattan_distance(&target) - slack).max(0)
                    }
                };
                wavefront.push(WaveItem {
                    priority,
                    path_cost,
                    pos: neighbor,
                    pred: back,
                });
            }
        };

        // Per-route scratch cleanup.
        self.grid.clear_reached_and_reset_cost();
        self.grid.at_mut(source).expect("validated source").clear(GCell::SOURCE);
        self.grid.at_mut(target).expect("validated target").clear(GCell::TARGET);

        result.map_err(Into::into)
    }

    /// Follow the predecessor flags from the target back to the source,
    /// collapsing collinear runs into segments.
    fn backtrack(&self, source: GridCoord, target: GridCoord) -> SegmentList {
        let mut segments = SegmentList::default();
        let mut current: Option<u32> = None;
        let mut pos = target;

        while pos != source {
            let cell = self.grid.at(pos).expect("backtrack stays on grid");
            let dir = cell
                .predecessor()
                .to_direction()
                .expect("backtrack hit an undefined predecessor");

            match current {
                Some(idx) if segments.segments[idx as usize].dir == dir => {
                    segments.segments[idx as usize].length += 1;
                }
                _ => {
                    let idx = segments.push(NetSegment {
                        start: pos,
                        dir,
                        length: 1,
                        parent: current,
                    });
                    current = Some(idx);
                }
            }
            pos = dir.step(pos);
        }

        // Cover the source cell with the final run.
        if let Some(idx) = current {
            segments.segments[idx as usize].length += 1;
        }
        segments
    }

    /// Route a whole net: decompose the terminals into an RMST and route
    /// every tree edge. On any failure the net is abandoned and the
    /// already accumulated segments are discarded. On success, every cell
    /// touched by the net's segments has its capacity counter bumped
    /// exactly once.
    pub fn route_net(&mut self, terminals: &[Coord64], net_name: &str) -> Result<SegmentList> {
        ensure!(
            !terminals.is_empty(),
            "net {:?} has no terminals to route",
            net_name
        );

        let tree = prim::prim(terminals);
        debug_assert_eq!(tree.len(), terminals.len());

        self.grid.clear_transient_flags();

        let mut all_segments = SegmentList::default();
        for node in &tree {
            for edge in &node.edges {
                let segments = self
                    .route_two_point(node.pos, edge.pos)
                    .with_context(|| format!("routing net {:?}", net_name))?;
                all_segments.absorb(segments);
            }
        }

        self.update_capacity(&all_segments);
        self.grid.clear_marks();

        Ok(all_segments)
    }

    /// Route a batch of nets in ascending terminal-count order, so short
    /// nets claim capacity first. Returns the routed segment lists in the
    /// order they were routed.
    pub fn route_nets(
        &mut self,
        nets: Vec<(String, Vec<Coord64>)>,
    ) -> Result<Vec<(String, SegmentList)>> {
        let total = nets.len();
        let mut routed = Vec::with_capacity(total);

        for (name, terminals) in nets
            .into_iter()
            .sorted_by_key(|(_, terminals)| terminals.len())
        {
            match self.route_net(&terminals, &name) {
                Ok(segments) => routed.push((name, segments)),
                Err(err) => {
                    info!("routed {} of {} nets before failure", routed.len(), total);
                    return Err(err);
                }
            }
        }
        info!("routed {} of {} nets", routed.len(), total);
        Ok(routed)
    }

    /// Bump the capacity of every cell covered by `segments`, at most
    /// once per cell; overlapping segments of one net count single.
    fn update_capacity(&mut self, segments: &SegmentList) {
        for segment in segments.iter() {
            for pos in segment.cells() {
                let Some(cell) = self.grid.at_mut(pos) else {
                    continue;
                };
                if !cell.has(GCell::EXTRACTED) {
                    cell.set(GCell::EXTRACTED | GCell::MARKED);
                    cell.capacity += 1;
                }
            }
        }
    }
}
