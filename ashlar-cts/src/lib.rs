//! Mean-and-median clock-tree synthesis.
//!
//! Sinks are clustered by recursively splitting at the coordinate median
//! along the longer bounding-box axis until a cluster's capacitive load
//! fits under the buffer limit; each leaf cluster gets one buffer at its
//! mean position, and buffer inputs are re-buffered the same way when a
//! level's combined load grows past the limit again.

use anyhow::{anyhow, bail, ensure, Result};
use ashlar_common::database::{
    CellKey, Design, InstKey, Instance, InstanceKind, ModuleKey, Net, NetKey, PinKey,
    PlacementState,
};
use ashlar_common::geometry::{Coord64, Rect64};
use log::{debug, info, warn};
use std::collections::BTreeSet;

#[cfg(test)]
mod tests;

/// The buffer cell used for the tree.
#[derive(Clone, Debug)]
pub struct BufferSpec {
    pub cell: CellKey,
    pub input_pin: PinKey,
    pub output_pin: PinKey,
    /// Input pin capacitance, farad.
    pub input_capacitance: f64,
}

impl BufferSpec {
    /// Derive the spec from a buffer-like cell (one input, one output).
    pub fn from_cell(design: &Design, cell_key: CellKey) -> Result<Self> {
        let cell = design
            .cells
            .get(cell_key)
            .ok_or_else(|| anyhow!("buffer cell key is stale"))?;
        let input_pin = cell
            .input_pin()
            .ok_or_else(|| anyhow!("buffer cell {:?} has no input pin", cell.name))?;
        let output_pin = cell
            .output_pin()
            .ok_or_else(|| anyhow!("buffer cell {:?} has no output pin", cell.name))?;
        let input_capacitance = cell
            .pins
            .get(input_pin)
            .map(|p| p.capacitance)
            .unwrap_or(0.0);
        Ok(Self {
            cell: cell_key,
            input_pin,
            output_pin,
            input_capacitance,
        })
    }
}

#[derive(Clone, Debug)]
pub struct CtsConfig {
    /// Maximum capacitance any buffer may drive, farad.
    pub max_capacitance: f64,
    /// Wire-load proxy: farad per nm of cluster half-perimeter.
    pub wire_cap_per_nm: f64,
}

impl Default for CtsConfig {
    fn default() -> Self {
        Self {
            max_capacitance: 200.0e-15,
            wire_cap_per_nm: 0.0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct CtsSummary {
    pub sinks: usize,
    pub buffers_inserted: usize,
    /// Load presented to the clock-net driver after buffering, farad.
    pub root_capacitance: f64,
}

/// One clock sink (or, during recursion, an inserted buffer's input).
#[derive(Clone, Debug)]
struct Sink {
    inst: InstKey,
    pin: PinKey,
    pos: Coord64,
    capacitance: f64,
}

pub struct MeanAndMedianCts {
    buffer: BufferSpec,
    config: CtsConfig,
    buffer_counter: usize,
}

impl MeanAndMedianCts {
    pub fn new(buffer: BufferSpec, config: CtsConfig) -> Self {
        Self {
            buffer,
            config,
            buffer_counter: 0,
        }
    }

    /// Build the buffered tree for `clock_net` and rewire the net so it
    /// drives the tree roots instead of the raw sinks.
    pub fn synthesize(
        &mut self,
        design: &mut Design,
        module_key: ModuleKey,
        clock_net: NetKey,
    ) -> Result<CtsSummary> {
        ensure!(
            self.config.max_capacitance > 0.0,
            "maximum buffer capacitance must be positive"
        );

        let (sinks, drivers) = self.collect_sinks(design, module_key, clock_net)?;
        ensure!(
            !drivers.is_empty(),
            "clock net has no driver; cannot build a tree"
        );
        if sinks.is_empty() {
            warn!("clock net has no sinks, nothing to buffer");
            return Ok(CtsSummary::default());
        }
        let sink_count = sinks.len();
        let original_sinks: BTreeSet<(InstKey, PinKey)> =
            sinks.iter().map(|s| (s.inst, s.pin)).collect();

        // Take the raw sinks off the clock net; they will hang off the
        // inserted buffers instead.
        {
            let module = design
                .modules
                .get_mut(module_key)
                .ok_or_else(|| anyhow!("cts: stale module key"))?;
            for sink in &sinks {
                module.netlist.disconnect(sink.inst, sink.pin);
            }
        }

        let buffers_before = self.buffer_counter;
        let roots = self.buffer_cluster(design, module_key, sinks)?;

        // Attach the tree roots to the clock net and flag it.
        let root_capacitance = total_capacitance(&roots, 0.0);
        {
            let module = design
                .modules
                .get_mut(module_key)
                .ok_or_else(|| anyhow!("cts: stale module key"))?;
            for root in &roots {
                module.netlist.connect(root.inst, root.pin, clock_net)?;
            }
            let net = module
                .netlist
                .nets
                .get_mut(clock_net)
                .ok_or_else(|| anyhow!("cts: stale clock net key"))?;
            net.is_clock = true;
        }

        let summary = CtsSummary {
            sinks: sink_count,
            buffers_inserted: self.buffer_counter - buffers_before,
            root_capacitance,
        };

        self.check_invariants(design, module_key, clock_net, &original_sinks)?;
        info!(
            "clock tree: {} sinks behind {} buffers, {:.1} fF at the root",
            summary.sinks,
            summary.buffers_inserted,
            summary.root_capacitance * 1.0e15
        );
        Ok(summary)
    }

    /// Partition the net's connections into sinks and drivers.
    fn collect_sinks(
        &self,
        design: &Design,
        module_key: ModuleKey,
        clock_net: NetKey,
    ) -> Result<(Vec<Sink>, Vec<(InstKey, PinKey)>)> {
        let module = design
            .modules
            .get(module_key)
            .ok_or_else(|| anyhow!("cts: stale module key"))?;
        let net = module
            .netlist
            .nets
            .get(clock_net)
            .ok_or_else(|| anyhow!("cts: stale clock net key"))?;

        let mut sinks = Vec::new();
        let mut drivers = Vec::new();
        for &(inst_key, pin_key) in &net.connections {
            let inst = module
                .netlist
                .instances
                .get(inst_key)
                .ok_or_else(|| anyhow!("cts: net references a dead instance"))?;
            let pin = design
                .pin_info(module, inst, pin_key)
                .ok_or_else(|| anyhow!("cts: unknown pin on instance {:?}", inst.name))?;

            // A cell input pin is a sink. A module input port drives the
            // net from outside, so pin instances count by the opposite
            // rule.
            let is_sink = match inst.kind {
                InstanceKind::Pin(_) => pin.direction.is_output(),
                _ => pin.direction.is_input(),
            };
            if is_sink {
                let size = design.instance_size(inst);
                sinks.push(Sink {
                    inst: inst_key,
                    pin: pin_key,
                    pos: Coord64::new(inst.pos.x + size.w / 2, inst.pos.y + size.h / 2),
                    capacitance: pin.capacitance,
                });
            } else {
                drivers.push((inst_key, pin_key));
            }
        }
        Ok((sinks, drivers))
    }

    /// Recursively buffer a cluster. Returns the loads this cluster
    /// exposes upward: buffer input pins, each within the capacitance
    /// budget.
    fn buffer_cluster(
        &mut self,
        design: &mut Design,
        module_key: ModuleKey,
        mut sinks: Vec<Sink>,
    ) -> Result<Vec<Sink>> {
        let load = total_capacitance(&sinks, self.config.wire_cap_per_nm);

        if load <= self.config.max_capacitance || sinks.len() <= 1 {
            if load > self.config.max_capacitance {
                warn!(
                    "single sink exceeds the buffer budget ({:.1} fF > {:.1} fF)",
                    load * 1.0e15,
                    self.config.max_capacitance * 1.0e15
                );
            }
            let root = self.insert_buffer(design, module_key, &sinks)?;
            return Ok(vec![root]);
        }

        // Median split along the longer bounding-box axis.
        let bbox = bounding_box(&sinks);
        if bbox.width() >= bbox.height() {
            sinks.sort_by_key(|s| (s.pos.x, s.pos.y));
        } else {
            sinks.sort_by_key(|s| (s.pos.y, s.pos.x));
        }
        let upper = sinks.split_off(sinks.len() / 2);

        let mut roots = self.buffer_cluster(design, module_key, sinks)?;
        roots.extend(self.buffer_cluster(design, module_key, upper)?);

        // If the exposed buffer inputs together exceed the budget again,
        // buffer this level as well.
        if total_capacitance(&roots, self.config.wire_cap_per_nm) > self.config.max_capacitance {
            roots = self.buffer_cluster(design, module_key, roots)?;
        }
        Ok(roots)
    }

    /// Insert one buffer at the mean position of `sinks` and wire its
    /// output to every sink through a fresh net. Returns the buffer's
    /// input as the load exposed to the level above.
    fn insert_buffer(
        &mut self,
        design: &mut Design,
        module_key: ModuleKey,
        sinks: &[Sink],
    ) -> Result<Sink> {
        let mean = mean_position(sinks);
        let buffer_size = design
            .cells
            .get(self.buffer.cell)
            .ok_or_else(|| anyhow!("cts: buffer cell key is stale"))?
            .size;

        let module = design
            .modules
            .get_mut(module_key)
            .ok_or_else(|| anyhow!("cts: stale module key"))?;

        let index = self.buffer_counter;
        self.buffer_counter += 1;
        let name = format!("cts_buf_{}", index);
        let net_name = format!("cts_net_{}", index);

        let mut inst = Instance::new(&name, InstanceKind::Cell(self.buffer.cell));
        inst.pos = Coord64::new(mean.x - buffer_size.w / 2, mean.y - buffer_size.h / 2);
        inst.placement = PlacementState::Placed;
        let buffer_key = module.netlist.add_instance(inst)?;

        let mut net = Net::new(&net_name);
        net.is_clock = true;
        let net_key = module.netlist.add_net(net)?;

        module
            .netlist
            .connect(buffer_key, self.buffer.output_pin, net_key)?;
        for sink in sinks {
            module.netlist.connect(sink.inst, sink.pin, net_key)?;
        }
        debug!(
            "buffer {} at {} drives {} loads",
            name,
            mean,
            sinks.len()
        );

        Ok(Sink {
            inst: buffer_key,
            pin: self.buffer.input_pin,
            pos: mean,
            capacitance: self.buffer.input_capacitance,
        })
    }

    /// Post-conditions: the original sink set is intact and every sink is
    /// transitively driven from the clock net through inserted buffers.
    fn check_invariants(
        &self,
        design: &Design,
        module_key: ModuleKey,
        clock_net: NetKey,
        original_sinks: &BTreeSet<(InstKey, PinKey)>,
    ) -> Result<()> {
        let module = design
            .modules
            .get(module_key)
            .ok_or_else(|| anyhow!("cts: stale module key"))?;

        // Breadth-first walk downstream from the clock net.
        let mut reached: BTreeSet<(InstKey, PinKey)> = BTreeSet::new();
        let mut net_queue = vec![clock_net];
        let mut visited_nets = BTreeSet::new();
        while let Some(net_key) = net_queue.pop() {
            if !visited_nets.insert(net_key) {
                continue;
            }
            let net = module
                .netlist
                .nets
                .get(net_key)
                .ok_or_else(|| anyhow!("cts: dangling net during verification"))?;
            for &(inst_key, pin_key) in &net.connections {
                reached.insert((inst_key, pin_key));
                let inst = module
                    .netlist
                    .instances
                    .get(inst_key)
                    .ok_or_else(|| anyhow!("cts: dangling instance during verification"))?;
                // Descend through inserted buffers.
                if matches!(inst.kind, InstanceKind::Cell(c) if c == self.buffer.cell) {
                    if let Some(&downstream) = inst.pin_nets.get(&self.buffer.output_pin) {
                        net_queue.push(downstream);
                    }
                }
            }
        }

        for sink in original_sinks {
            if !reached.contains(sink) {
                bail!("clock sink lost during tree construction");
            }
        }
        Ok(())
    }
}

fn bounding_box(sinks: &[Sink]) -> Rect64 {
    let mut ll = Coord64::new(i64::MAX, i64::MAX);
    let mut ur = Coord64::new(i64::MIN, i64::MIN);
    for sink in sinks {
        ll.x = ll.x.min(sink.pos.x);
        ll.y = ll.y.min(sink.pos.y);
        ur.x = ur.x.max(sink.pos.x);
        ur.y = ur.y.max(sink.pos.y);
    }
    Rect64::new(ll, ur)
}

fn mean_position(sinks: &[Sink]) -> Coord64 {
    if sinks.is_empty() {
        return Coord64::default();
    }
    let n = sinks.len() as i64;
    Coord64::new(
        sinks.iter().map(|s| s.pos.x).sum::<i64>() / n,
        sinks.iter().map(|s| s.pos.y).sum::<i64>() / n,
    )
}

/// Pin capacitance plus the half-perimeter wire-load proxy.
fn total_capacitance(sinks: &[Sink], wire_cap_per_nm: f64) -> f64 {
    if sinks.is_empty() {
        return 0.0;
    }
    let pin_cap: f64 = sinks.iter().map(|s| s.capacitance).sum();
    let bbox = bounding_box(sinks);
    pin_cap + wire_cap_per_nm * (bbox.width() + bbox.height()) as f64
}
