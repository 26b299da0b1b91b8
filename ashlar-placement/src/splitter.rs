//! Recursive-bisection support: split a placed netlist into two halves
//! along the longer axis of a partition rectangle, balancing movable
//! area, and rebuild per-side netlists.

use crate::net_model::{NetId, NodeId, PlacerNetlist, PlacerNode};
use ashlar_common::geometry::{Coord64, Rect64, Size64};
use log::debug;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SplitAxis {
    X,
    Y,
}

impl SplitAxis {
    fn of(&self, p: Coord64) -> i64 {
        match self {
            SplitAxis::X => p.x,
            SplitAxis::Y => p.y,
        }
    }
}

#[derive(Debug)]
pub struct SplitResult {
    pub axis: SplitAxis,
    /// Abutment coordinate between the halves, along `axis`.
    pub cut: i64,
    pub low: PlacerNetlist,
    pub high: PlacerNetlist,
}

/// Partition `netlist` across the longer axis of `rect`. The low side
/// receives the smallest center-ordered prefix whose cumulative movable
/// area reaches half of the total; fixed nodes follow their position but
/// contribute no area.
///
/// With `anchors` enabled, every net that spans the cut gains a fixed
/// zero-size node on the abutment edge of each half, so the half keeps
/// its pull toward the other side.
pub fn split(netlist: &PlacerNetlist, rect: Rect64, anchors: bool) -> SplitResult {
    let axis = if rect.width() > rect.height() {
        SplitAxis::X
    } else {
        SplitAxis::Y
    };

    let mut order: Vec<NodeId> = (0..netlist.nodes.len()).collect();
    order.sort_by_key(|&id| axis.of(netlist.nodes[id].center()));

    let total_area = netlist.movable_area();
    let mut running = 0i64;
    let mut cut_index = order.len();
    for (i, &id) in order.iter().enumerate() {
        if running >= (total_area + 1) / 2 {
            cut_index = i;
            break;
        }
        let node = &netlist.nodes[id];
        if !node.fixed {
            running += node.area();
        }
    }

    let mut selected = vec![false; netlist.nodes.len()];
    for &id in &order[..cut_index] {
        selected[id] = true;
    }

    let cut = order
        .get(cut_index)
        .map(|&id| axis.of(netlist.nodes[id].center()))
        .unwrap_or_else(|| axis.of(rect.ur));
    debug!(
        "split along {:?} at {} ({} of {} nodes on the low side)",
        axis,
        cut,
        cut_index,
        order.len()
    );

    let low = extract_side(netlist, &selected, true, axis, cut, anchors);
    let high = extract_side(netlist, &selected, false, axis, cut, anchors);

    SplitResult {
        axis,
        cut,
        low,
        high,
    }
}

fn extract_side(
    netlist: &PlacerNetlist,
    selected: &[bool],
    which: bool,
    axis: SplitAxis,
    cut: i64,
    anchors: bool,
) -> PlacerNetlist {
    let mut side = PlacerNetlist::default();
    let mut xlat: Vec<Option<NodeId>> = vec![None; netlist.nodes.len()];

    for (id, node) in netlist.nodes.iter().enumerate() {
        if selected[id] == which {
            let mut copy = node.clone();
            copy.connections.clear();
            xlat[id] = Some(side.create_node(copy, netlist.sources[id]));
        }
    }

    for net in &netlist.nets {
        let included: Vec<NodeId> = net
            .nodes
            .iter()
            .filter_map(|&id| xlat[id])
            .collect();
        if included.is_empty() {
            continue;
        }

        let external: Vec<NodeId> = net
            .nodes
            .iter()
            .filter(|&&id| xlat[id].is_none())
            .copied()
            .collect();

        let mut members = included;
        if anchors && !external.is_empty() {
            // One anchor per crossing net, on the abutment edge at the
            // external nodes' mean lateral position.
            let mean_other: i64 = external
                .iter()
                .map(|&id| {
                    let c = netlist.nodes[id].center();
                    match axis {
                        SplitAxis::X => c.y,
                        SplitAxis::Y => c.x,
                    }
                })
                .sum::<i64>()
                / external.len() as i64;
            let pos = match axis {
                SplitAxis::X => Coord64::new(cut, mean_other),
                SplitAxis::Y => Coord64::new(mean_other, cut),
            };
            let anchor =
                side.create_node(PlacerNode::fixed_at(pos, Size64::default()), None);
            members.push(anchor);
        }

        if members.len() < 2 {
            // Degenerate on this side; drop the net entirely.
            continue;
        }

        let net_id: NetId = side.create_net(net.weight);
        for node in members {
            side.connect(node, net_id);
        }
    }

    side
}
