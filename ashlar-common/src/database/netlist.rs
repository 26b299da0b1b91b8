//! Flattened netlist storage: instances, nets and the symmetric
//! connectivity between them.

use super::{CellKey, InstKey, ModuleKey, NetKey, PinKey};
use crate::geometry::{Coord64, Orientation};
use crate::store::Store;
use anyhow::{bail, ensure, Result};
use std::collections::HashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InstanceKind {
    /// A standard-cell placement; the key names the archetype cell.
    Cell(CellKey),
    /// A top-level pin placeholder; the key names the module port.
    Pin(PinKey),
    /// A hierarchical sub-module placeholder.
    Module(ModuleKey),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PlacementState {
    #[default]
    Unplaced,
    Placed,
    PlacedAndFixed,
}

#[derive(Debug)]
pub struct Instance {
    pub name: String,
    pub kind: InstanceKind,
    /// Lower-left corner, nm.
    pub pos: Coord64,
    pub orientation: Orientation,
    pub placement: PlacementState,
    /// Bound nets per instance pin. The owning [`Netlist`] keeps this in
    /// sync with the reverse connection list on the net.
    pub pin_nets: HashMap<PinKey, NetKey>,
}

impl Instance {
    pub fn new(name: &str, kind: InstanceKind) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            pos: Coord64::default(),
            orientation: Orientation::R0,
            placement: PlacementState::Unplaced,
            pin_nets: HashMap::new(),
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.placement == PlacementState::PlacedAndFixed
    }

    pub fn is_placed(&self) -> bool {
        self.placement != PlacementState::Unplaced
    }
}

/// A set of instance pins that must be electrically connected.
#[derive(Debug, Default)]
pub struct Net {
    pub name: String,
    pub is_clock: bool,
    pub weight: f64,
    pub connections: Vec<(InstKey, PinKey)>,
}

impl Net {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            is_clock: false,
            weight: 1.0,
            connections: Vec::new(),
        }
    }

    /// A net with fewer than two connections carries no constraint and is
    /// skipped by the placer and router.
    pub fn is_degenerate(&self) -> bool {
        self.connections.len() < 2
    }
}

#[derive(Debug, Default)]
pub struct Netlist {
    pub instances: Store<InstKey, Instance>,
    pub nets: Store<NetKey, Net>,
}

impl Netlist {
    pub fn add_instance(&mut self, inst: Instance) -> Result<InstKey> {
        let name = inst.name.clone();
        self.instances
            .insert(&name, inst)
            .ok_or_else(|| anyhow::anyhow!("duplicate instance name {:?}", name))
    }

    pub fn add_net(&mut self, net: Net) -> Result<NetKey> {
        let name = net.name.clone();
        self.nets
            .insert(&name, net)
            .ok_or_else(|| anyhow::anyhow!("duplicate net name {:?}", name))
    }

    /// Bind `(inst, pin)` to `net`, recording the connection on both
    /// sides. A pin can be bound to at most one net.
    pub fn connect(&mut self, inst: InstKey, pin: PinKey, net: NetKey) -> Result<()> {
        let instance = self
            .instances
            .get_mut(inst)
            .ok_or_else(|| anyhow::anyhow!("connect: unknown instance {}", inst))?;
        if let Some(existing) = instance.pin_nets.get(&pin) {
            bail!(
                "pin {} of instance {:?} is already bound to net {}",
                pin,
                instance.name,
                existing
            );
        }
        let net_obj = self
            .nets
            .get_mut(net)
            .ok_or_else(|| anyhow::anyhow!("connect: unknown net {}", net))?;

        net_obj.connections.push((inst, pin));
        self.instances
            .get_mut(inst)
            .expect("instance vanished during connect")
            .pin_nets
            .insert(pin, net);
        Ok(())
    }

    /// Remove the binding of `(inst, pin)`; returns the net it was bound
    /// to, if any.
    pub fn disconnect(&mut self, inst: InstKey, pin: PinKey) -> Option<NetKey> {
        let net = self.instances.get_mut(inst)?.pin_nets.remove(&pin)?;
        if let Some(net_obj) = self.nets.get_mut(net) {
            net_obj
                .connections
                .retain(|&(i, p)| !(i == inst && p == pin));
        }
        Some(net)
    }

    /// Verify that pin↔net connectivity is symmetric and duplicate free.
    pub fn check_connectivity(&self) -> Result<()> {
        for (net_key, net) in self.nets.iter() {
            for &(inst_key, pin_key) in &net.connections {
                let inst = self
                    .instances
                    .get(inst_key)
                    .ok_or_else(|| anyhow::anyhow!("net {:?} references a dead instance", net.name))?;
                ensure!(
                    inst.pin_nets.get(&pin_key) == Some(&net_key),
                    "net {:?} lists ({:?}, {}) but the instance does not point back",
                    net.name,
                    inst.name,
                    pin_key
                );
                let count = net
                    .connections
                    .iter()
                    .filter(|&&(i, p)| i == inst_key && p == pin_key)
                    .count();
                ensure!(
                    count == 1,
                    "net {:?} lists ({:?}, {}) {} times",
                    net.name,
                    inst.name,
                    pin_key,
                    count
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn netlist_with_two_instances() -> (Netlist, InstKey, InstKey, NetKey) {
        let mut nl = Netlist::default();
        let a = nl
            .add_instance(Instance::new("a", InstanceKind::Cell(CellKey(0))))
            .unwrap();
        let b = nl
            .add_instance(Instance::new("b", InstanceKind::Cell(CellKey(0))))
            .unwrap();
        let n = nl.add_net(Net::new("n")).unwrap();
        (nl, a, b, n)
    }

    #[test]
    fn connect_is_symmetric() {
        let (mut nl, a, b, n) = netlist_with_two_instances();
        nl.connect(a, PinKey(0), n).unwrap();
        nl.connect(b, PinKey(1), n).unwrap();

        assert_eq!(nl.nets.get(n).unwrap().connections.len(), 2);
        assert_eq!(nl.instances.get(a).unwrap().pin_nets[&PinKey(0)], n);
        nl.check_connectivity().unwrap();
    }

    #[test]
    fn double_bind_rejected() {
        let (mut nl, a, _, n) = netlist_with_two_instances();
        nl.connect(a, PinKey(0), n).unwrap();
        assert!(nl.connect(a, PinKey(0), n).is_err());
    }

    #[test]
    fn disconnect_removes_both_sides() {
        let (mut nl, a, b, n) = netlist_with_two_instances();
        nl.connect(a, PinKey(0), n).unwrap();
        nl.connect(b, PinKey(1), n).unwrap();

        assert_eq!(nl.disconnect(a, PinKey(0)), Some(n));
        assert_eq!(nl.nets.get(n).unwrap().connections.len(), 1);
        assert!(nl.instances.get(a).unwrap().pin_nets.is_empty());
        nl.check_connectivity().unwrap();
    }
}
