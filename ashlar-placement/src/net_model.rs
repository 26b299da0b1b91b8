//! The placer's view of a netlist: dense node and net vectors extracted
//! from the design database, and the write-back path that returns solved
//! positions to it.

use anyhow::{anyhow, Result};
use ashlar_common::database::{Design, InstKey, ModuleKey, PlacementState};
use ashlar_common::geometry::{Coord64, Size64};
use std::collections::HashMap;

pub type NodeId = usize;
pub type NetId = usize;

/// One placeable entity. Positions are lower-left in nm, matching the
/// database; the solver works on centers through the accessors.
#[derive(Clone, Debug)]
pub struct PlacerNode {
    pub pos: Coord64,
    pub size: Size64,
    pub fixed: bool,
    pub weight: f64,
    pub connections: Vec<NetId>,
}

impl PlacerNode {
    pub fn movable(size: Size64) -> Self {
        Self {
            pos: Coord64::default(),
            size,
            fixed: false,
            weight: 1.0,
            connections: Vec::new(),
        }
    }

    pub fn fixed_at(pos: Coord64, size: Size64) -> Self {
        Self {
            pos,
            size,
            fixed: true,
            weight: 1.0,
            connections: Vec::new(),
        }
    }

    pub fn center(&self) -> Coord64 {
        Coord64::new(self.pos.x + self.size.w / 2, self.pos.y + self.size.h / 2)
    }

    pub fn set_center(&mut self, center: Coord64) {
        self.pos = Coord64::new(center.x - self.size.w / 2, center.y - self.size.h / 2);
    }

    pub fn area(&self) -> i64 {
        self.size.area()
    }
}

#[derive(Clone, Debug, Default)]
pub struct PlacerNet {
    pub nodes: Vec<NodeId>,
    pub weight: f64,
}

/// Dense netlist view. `sources[i]` remembers which database instance node
/// `i` came from; synthetic nodes (anchors) carry `None`.
#[derive(Clone, Debug, Default)]
pub struct PlacerNetlist {
    pub nodes: Vec<PlacerNode>,
    pub nets: Vec<PlacerNet>,
    pub sources: Vec<Option<InstKey>>,
}

impl PlacerNetlist {
    pub fn create_node(&mut self, node: PlacerNode, source: Option<InstKey>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(node);
        self.sources.push(source);
        id
    }

    pub fn create_net(&mut self, weight: f64) -> NetId {
        let id = self.nets.len();
        self.nets.push(PlacerNet {
            nodes: Vec::new(),
            weight,
        });
        id
    }

    /// Connect a node to a net, updating both sides.
    pub fn connect(&mut self, node: NodeId, net: NetId) {
        self.nets[net].nodes.push(node);
        self.nodes[node].connections.push(net);
    }

    pub fn movable_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.fixed).count()
    }

    pub fn movable_area(&self) -> i64 {
        self.nodes
            .iter()
            .filter(|n| !n.fixed)
            .map(|n| n.area())
            .sum()
    }

    /// Average movable node size, zero when there are no movable nodes.
    pub fn average_movable_size(&self) -> Size64 {
        let mut w_sum = 0i64;
        let mut h_sum = 0i64;
        let mut count = 0i64;
        for node in self.nodes.iter().filter(|n| !n.fixed) {
            w_sum += node.size.w;
            h_sum += node.size.h;
            count += 1;
        }
        if count == 0 {
            Size64::default()
        } else {
            Size64::new(w_sum / count, h_sum / count)
        }
    }

    /// Extract the placer view of a module. Degenerate nets (fewer than
    /// two distinct instances) are left out.
    pub fn from_module(design: &Design, module_key: ModuleKey) -> Result<Self> {
        let module = design
            .modules
            .get(module_key)
            .ok_or_else(|| anyhow!("from_module: stale module key"))?;

        let mut netlist = PlacerNetlist::default();
        let mut inst_to_node: HashMap<InstKey, NodeId> = HashMap::new();

        for (inst_key, inst) in module.netlist.instances.iter() {
            let size = design.instance_size(inst);
            let node = if inst.is_fixed() {
                PlacerNode::fixed_at(inst.pos, size)
            } else {
                let mut node = PlacerNode::movable(size);
                node.pos = inst.pos;
                node
            };
            let id = netlist.create_node(node, Some(inst_key));
            inst_to_node.insert(inst_key, id);
        }

        for (_, net) in module.netlist.nets.iter() {
            // Instance-level view: several pins of one instance on the
            // same net collapse into one endpoint.
            let mut endpoint_nodes: Vec<NodeId> = net
                .connections
                .iter()
                .filter_map(|(inst, _)| inst_to_node.get(inst).copied())
                .collect();
            endpoint_nodes.sort_unstable();
            endpoint_nodes.dedup();

            if endpoint_nodes.len() < 2 {
                continue;
            }
            let net_id = netlist.create_net(net.weight);
            for node in endpoint_nodes {
                netlist.connect(node, net_id);
            }
        }

        Ok(netlist)
    }

    /// Write solved positions back to the database. Movable instances
    /// transition `Unplaced → Placed`; fixed instances are not touched.
    pub fn write_back(&self, design: &mut Design, module_key: ModuleKey) -> Result<()> {
        let module = design
            .modules
            .get_mut(module_key)
            .ok_or_else(|| anyhow!("write_back: stale module key"))?;

        for (node, source) in self.nodes.iter().zip(self.sources.iter()) {
            let Some(inst_key) = source else { continue };
            if node.fixed {
                continue;
            }
            let inst = module
                .netlist
                .instances
                .get_mut(*inst_key)
                .ok_or_else(|| anyhow!("write_back: instance vanished"))?;
            debug_assert!(inst.placement != PlacementState::PlacedAndFixed);
            inst.pos = node.pos;
            inst.placement = PlacementState::Placed;
        }
        Ok(())
    }
}
