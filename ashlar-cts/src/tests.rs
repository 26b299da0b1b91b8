use super::*;
use ashlar_common::database::{Cell, Module, PinDirection, PinInfo};
use ashlar_common::geometry::Size64;

const FF: f64 = 1.0e-15;

struct Fixture {
    design: Design,
    module: ModuleKey,
    clock_net: NetKey,
    buffer: BufferSpec,
    sink_keys: Vec<(InstKey, PinKey)>,
}

/// A clock net driven by one input port, fanning out to `sink_count`
/// flops of `sink_cap` farad each, spread on a diagonal.
fn fixture(sink_count: usize, sink_cap: f64) -> Fixture {
    let mut design = Design::new();

    let mut buf = Cell::new("CLKBUF", Size64::new(1_000, 2_000));
    buf.add_pin(PinInfo {
        name: "A".into(),
        direction: PinDirection::Input,
        capacitance: 5.0 * FF,
        ..Default::default()
    });
    buf.add_pin(PinInfo {
        name: "Y".into(),
        direction: PinDirection::Output,
        ..Default::default()
    });
    let buf_key = design.cells.insert("CLKBUF", buf).unwrap();

    let mut dff = Cell::new("DFF", Size64::new(2_000, 2_000));
    dff.add_pin(PinInfo {
        name: "CK".into(),
        direction: PinDirection::Input,
        capacitance: sink_cap,
        is_clock: true,
        ..Default::default()
    });
    dff.add_pin(PinInfo {
        name: "Q".into(),
        direction: PinDirection::Output,
        ..Default::default()
    });
    let dff_key = design.cells.insert("DFF", dff).unwrap();

    let mut module = Module::new("top");
    let clk_port = module
        .ports
        .insert(
            "clk",
            PinInfo {
                name: "clk".into(),
                direction: PinDirection::Input,
                ..Default::default()
            },
        )
        .unwrap();

    let clock_net = module.netlist.add_net(Net::new("clk")).unwrap();

    let mut port_inst = Instance::new("clk", InstanceKind::Pin(clk_port));
    port_inst.placement = PlacementState::PlacedAndFixed;
    let port_key = module.netlist.add_instance(port_inst).unwrap();
    module.netlist.connect(port_key, clk_port, clock_net).unwrap();

    let mut sink_keys = Vec::new();
    for i in 0..sink_count {
        let mut inst = Instance::new(&format!("ff{}", i), InstanceKind::Cell(dff_key));
        inst.pos = Coord64::new(4_000 * i as i64, 3_000 * i as i64);
        inst.placement = PlacementState::Placed;
        let inst_key = module.netlist.add_instance(inst).unwrap();
        let ck = design
            .cells
            .get(dff_key)
            .unwrap()
            .pin_by_name("CK")
            .unwrap();
        module.netlist.connect(inst_key, ck, clock_net).unwrap();
        sink_keys.push((inst_key, ck));
    }

    let module_key = design.modules.insert("top", module).unwrap();
    design.set_top_module(module_key);
    let buffer = BufferSpec::from_cell(&design, buf_key).unwrap();

    Fixture {
        design,
        module: module_key,
        clock_net,
        buffer,
        sink_keys,
    }
}

fn buffer_loads(design: &Design, module: ModuleKey, buffer_cell: CellKey) -> Vec<usize> {
    let module = design.modules.get(module).unwrap();
    module
        .netlist
        .instances
        .iter()
        .filter(|(_, inst)| matches!(inst.kind, InstanceKind::Cell(c) if c == buffer_cell))
        .map(|(_, inst)| {
            let out_net = inst
                .pin_nets
                .values()
                .copied()
                .find(|net| {
                    // The output net is the one where this instance is not
                    // the only load bearing pin; identify by name prefix.
                    module.netlist.nets.get(*net).unwrap().name.starts_with("cts_net_")
                })
                .expect("buffer with no output net");
            // Loads on the buffer's net, excluding the buffer itself.
            module
                .netlist
                .nets
                .get(out_net)
                .unwrap()
                .connections
                .iter()
                .filter(|(inst_key, _)| {
                    module.netlist.instances.get(*inst_key).unwrap().name != inst.name
                })
                .count()
        })
        .collect()
}

#[test]
fn sixteen_sinks_need_at_least_two_buffers() {
    let mut fx = fixture(16, 10.0 * FF);
    let mut cts = MeanAndMedianCts::new(
        fx.buffer.clone(),
        CtsConfig {
            max_capacitance: 80.0 * FF,
            wire_cap_per_nm: 0.0,
        },
    );

    let summary = cts
        .synthesize(&mut fx.design, fx.module, fx.clock_net)
        .unwrap();

    assert_eq!(summary.sinks, 16);
    assert!(summary.buffers_inserted >= 2);

    // No buffer drives more than 8 of the 10 fF sinks (80 fF budget).
    for load in buffer_loads(&fx.design, fx.module, fx.buffer.cell) {
        assert!(load <= 8, "a buffer drives {} loads", load);
    }
}

#[test]
fn sink_set_is_preserved() {
    let mut fx = fixture(13, 10.0 * FF);
    let mut cts = MeanAndMedianCts::new(
        fx.buffer.clone(),
        CtsConfig {
            max_capacitance: 40.0 * FF,
            wire_cap_per_nm: 0.0,
        },
    );
    cts.synthesize(&mut fx.design, fx.module, fx.clock_net)
        .unwrap();

    // Every original sink is still bound to exactly one clock-tree net.
    let module = fx.design.modules.get(fx.module).unwrap();
    for (inst_key, pin_key) in &fx.sink_keys {
        let inst = module.netlist.instances.get(*inst_key).unwrap();
        let net_key = inst
            .pin_nets
            .get(pin_key)
            .expect("sink lost its clock connection");
        let net = module.netlist.nets.get(*net_key).unwrap();
        assert!(net.is_clock);
        // Sinks now hang off buffer nets, not the trunk.
        assert!(net.name.starts_with("cts_net_"));
    }
}

#[test]
fn small_cluster_gets_a_single_buffer() {
    let mut fx = fixture(3, 10.0 * FF);
    let mut cts = MeanAndMedianCts::new(
        fx.buffer.clone(),
        CtsConfig {
            max_capacitance: 80.0 * FF,
            wire_cap_per_nm: 0.0,
        },
    );

    let summary = cts
        .synthesize(&mut fx.design, fx.module, fx.clock_net)
        .unwrap();

    assert_eq!(summary.buffers_inserted, 1);
    // The trunk net now drives exactly the port driver plus one buffer.
    let module = fx.design.modules.get(fx.module).unwrap();
    let trunk = module.netlist.nets.get(fx.clock_net).unwrap();
    assert_eq!(trunk.connections.len(), 2);
    assert!(trunk.is_clock);
}

#[test]
fn root_capacitance_reflects_buffer_inputs() {
    let mut fx = fixture(16, 10.0 * FF);
    let mut cts = MeanAndMedianCts::new(
        fx.buffer.clone(),
        CtsConfig {
            max_capacitance: 80.0 * FF,
            wire_cap_per_nm: 0.0,
        },
    );
    let summary = cts
        .synthesize(&mut fx.design, fx.module, fx.clock_net)
        .unwrap();

    // Two leaf buffers exposed to the trunk: 2 x 5 fF.
    let expected = 2.0 * 5.0 * FF;
    assert!(
        (summary.root_capacitance - expected).abs() < 0.1 * FF,
        "root load {} F",
        summary.root_capacitance
    );
}

#[test]
fn buffers_are_placed_at_cluster_centers() {
    let mut fx = fixture(4, 10.0 * FF);
    let mut cts = MeanAndMedianCts::new(
        fx.buffer.clone(),
        CtsConfig {
            max_capacitance: 80.0 * FF,
            wire_cap_per_nm: 0.0,
        },
    );
    cts.synthesize(&mut fx.design, fx.module, fx.clock_net)
        .unwrap();

    // Sinks sit at centers (1+4i, 1+3i) in um; their single buffer lands
    // on the mean of those centers.
    let module = fx.design.modules.get(fx.module).unwrap();
    let key = module.netlist.instances.lookup("cts_buf_0").unwrap();
    let buffer = module.netlist.instances.get(key).unwrap();
    assert_eq!(buffer.placement, PlacementState::Placed);

    let size = fx.design.instance_size(buffer);
    let center = Coord64::new(buffer.pos.x + size.w / 2, buffer.pos.y + size.h / 2);
    assert_eq!(center, Coord64::new(7_000, 5_500));
}

#[test]
fn missing_driver_is_an_error() {
    let mut fx = fixture(2, 10.0 * FF);
    // Cut the port driver off the net.
    {
        let module = fx.design.modules.get_mut(fx.module).unwrap();
        let port = module.netlist.instances.lookup("clk").unwrap();
        let port_pin = *module
            .netlist
            .instances
            .get(port)
            .unwrap()
            .pin_nets
            .keys()
            .next()
            .unwrap();
        module.netlist.disconnect(port, port_pin);
    }

    let mut cts = MeanAndMedianCts::new(fx.buffer.clone(), CtsConfig::default());
    assert!(cts
        .synthesize(&mut fx.design, fx.module, fx.clock_net)
        .is_err());
}

#[test]
fn wire_load_proxy_forces_deeper_trees() {
    // Same sinks, but a wire-load proxy that dwarfs the pin caps makes
    // wide clusters too expensive and forces more buffers.
    let pinless = fixture(16, 1.0 * FF);
    let mut fx = pinless;
    let mut cts = MeanAndMedianCts::new(
        fx.buffer.clone(),
        CtsConfig {
            max_capacitance: 80.0 * FF,
            // Diagonal spread is tens of um; this makes bbox size count.
            wire_cap_per_nm: 0.002 * FF,
        },
    );
    let summary = cts
        .synthesize(&mut fx.design, fx.module, fx.clock_net)
        .unwrap();

    assert!(summary.buffers_inserted > 1);
}
