//! The standard stage set: read_inputs → preflight → create_floorplan →
//! place → cts → check_timing_cts → global_route → check_timing_spef.

use crate::pipeline::{Pipeline, Stage, StageContext};
use crate::project::ProjectConfig;
use crate::timing::TimingRunner;
use anyhow::{anyhow, bail, ensure, Context, Result};
use ashlar_common::database::{
    Cell, Design, InstanceKind, ModuleKey, NetKey, PlacementState, Region, RegionKey,
};
use ashlar_common::fileutils::expand_environment_vars;
use ashlar_common::geometry::{Coord64, Rect64};
use ashlar_common::io::{def, ppm, verilog};
use ashlar_cts::{BufferSpec, CtsConfig, MeanAndMedianCts};
use ashlar_placement::analytic::{place_module, PlacerTunables};
use ashlar_placement::diffusion::{DiffusionConfig, DiffusionSpreader};
use ashlar_placement::legalizer::legalize_region;
use ashlar_placement::net_model::PlacerNetlist;
use ashlar_placement::splitter::split;
use ashlar_routing::grid::{determine_cell_size, track_counts, Grid};
use ashlar_routing::maze::MazeRouter;
use log::{info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Build the standard pipeline for a project. `base` is the directory of
/// the project file; relative paths resolve against it.
pub fn standard_pipeline(project: ProjectConfig, base: PathBuf) -> Pipeline {
    Pipeline::new(vec![
        Box::new(ReadInputs {
            project: project.clone(),
            base: base.clone(),
        }),
        Box::new(Preflight {
            project: project.clone(),
        }),
        Box::new(CreateFloorplan {
            project: project.clone(),
        }),
        Box::new(Place {
            project: project.clone(),
            base: base.clone(),
        }),
        Box::new(Cts {
            project: project.clone(),
            base: base.clone(),
        }),
        Box::new(CheckTiming {
            stage_name: "check_timing_cts",
            use_spef: false,
            project: project.clone(),
            base: base.clone(),
        }),
        Box::new(GlobalRoute {
            project: project.clone(),
            base: base.clone(),
        }),
        Box::new(CheckTiming {
            stage_name: "check_timing_spef",
            use_spef: true,
            project,
            base,
        }),
    ])
}

fn output_path(project: &ProjectConfig, base: &Path, file: &str) -> PathBuf {
    project.resolve_path(base, &project.output_dir).join(file)
}

fn top_module(design: &Design) -> Result<ModuleKey> {
    design
        .top_module()
        .ok_or_else(|| anyhow!("top module is not set; run read_inputs first"))
}

fn first_region(design: &Design) -> Result<RegionKey> {
    design
        .floorplan
        .first_region()
        .map(|(key, _)| key)
        .ok_or_else(|| anyhow!("no regions defined; run create_floorplan first"))
}

// ---------------------------------------------------------------------

struct ReadInputs {
    project: ProjectConfig,
    base: PathBuf,
}

impl Stage for ReadInputs {
    fn name(&self) -> &'static str {
        "read_inputs"
    }

    fn execute(&mut self, design: &mut Design, ctx: &StageContext<'_>) -> Result<()> {
        design.clear();

        for layer in &self.project.tech.layers {
            if design.tech.add_layer(layer.clone()).is_none() {
                bail!("duplicate layer {:?} in technology description", layer.name);
            }
        }
        for site in &self.project.tech.sites {
            if design.tech.add_site(site.clone()).is_none() {
                bail!("duplicate site {:?} in technology description", site.name);
            }
        }
        ctx.progress(20);

        for cell_config in &self.project.cells {
            let mut cell = Cell::new(&cell_config.name, cell_config.size);
            cell.class = cell_config.class;
            for pin in &cell_config.pins {
                cell.add_pin(pin.clone())
                    .ok_or_else(|| {
                        anyhow!(
                            "duplicate pin {:?} on cell {:?}",
                            pin.name,
                            cell_config.name
                        )
                    })?;
            }
            if design.cells.insert(&cell_config.name, cell).is_none() {
                bail!("duplicate cell {:?} in library", cell_config.name);
            }
        }
        ctx.progress(40);

        let netlist_path = self.project.resolve_path(&self.base, &self.project.verilog);
        let source = std::fs::read_to_string(&netlist_path)
            .with_context(|| format!("reading netlist {:?}", netlist_path))?;
        let module_key = verilog::read_module(design, &source)?;

        let module_name = design
            .modules
            .get(module_key)
            .expect("freshly read module")
            .name
            .clone();
        ensure!(
            module_name == self.project.top,
            "netlist defines module {:?}, project expects top {:?}",
            module_name,
            self.project.top
        );
        design.set_top_module(module_key);

        let module = design.top()?;
        info!(
            "read {:?}: {} instances, {} nets",
            module_name,
            module.netlist.instances.len(),
            module.netlist.nets.len()
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------

struct Preflight {
    project: ProjectConfig,
}

impl Stage for Preflight {
    fn name(&self) -> &'static str {
        "preflight"
    }

    fn execute(&mut self, design: &mut Design, _ctx: &StageContext<'_>) -> Result<()> {
        let module_key = top_module(design)?;
        let module = design
            .modules
            .get(module_key)
            .ok_or_else(|| anyhow!("top module key is stale"))?;
        ensure!(
            !module.netlist.instances.is_empty(),
            "top module {:?} has an empty netlist",
            module.name
        );

        ensure!(
            design
                .tech
                .site_by_name(&self.project.floorplan.site)
                .is_some(),
            "floorplan site {:?} is not defined in the technology",
            self.project.floorplan.site
        );

        for (_, inst) in module.netlist.instances.iter() {
            if let InstanceKind::Cell(cell_key) = inst.kind {
                let cell = design.cells.get(cell_key).ok_or_else(|| {
                    anyhow!("instance {:?} references an unknown cell", inst.name)
                })?;
                ensure!(
                    !cell.size.is_null(),
                    "cell {:?} has a null footprint",
                    cell.name
                );
            }
        }

        let degenerate = module
            .netlist
            .nets
            .iter()
            .filter(|(_, net)| net.is_degenerate())
            .count();
        if degenerate > 0 {
            warn!("{} degenerate nets will be ignored downstream", degenerate);
        }

        if design.cells.lookup(&self.project.cts.buffer).is_none() {
            warn!(
                "clock buffer {:?} is not in the library; the cts stage will fail",
                self.project.cts.buffer
            );
        }

        module.netlist.check_connectivity()?;
        info!("preflight checks passed");
        Ok(())
    }
}

// ---------------------------------------------------------------------

struct CreateFloorplan {
    project: ProjectConfig,
}

impl Stage for CreateFloorplan {
    fn name(&self) -> &'static str {
        "create_floorplan"
    }

    fn execute(&mut self, design: &mut Design, ctx: &StageContext<'_>) -> Result<()> {
        let module_key = top_module(design)?;
        let config = &self.project.floorplan;
        let site = design
            .tech
            .site_by_name(&config.site)
            .ok_or_else(|| anyhow!("floorplan site {:?} is not defined", config.site))?;
        let site_size = site.size;

        design.floorplan.clear();
        let mut region = Region {
            name: "core".into(),
            rect: Rect64::from_size(Coord64::new(0, 0), config.core_size),
            halo: [config.halo; 4],
            site: config.site.clone(),
            rows: Vec::new(),
        };
        region.build_rows(site_size)?;
        region.check_rows(site_size)?;
        let rows = region.rows.len();
        design
            .floorplan
            .add_region(region)
            .ok_or_else(|| anyhow!("region {:?} already exists", "core"))?;
        ctx.progress(50);

        // Pin placeholders get fixed positions on the left and right core
        // edges, evenly spread; the placer needs them locked down.
        let core = Rect64::from_size(Coord64::new(0, 0), config.core_size);
        let module = design
            .modules
            .get_mut(module_key)
            .ok_or_else(|| anyhow!("top module key is stale"))?;
        let pin_keys: Vec<_> = module
            .netlist
            .instances
            .iter()
            .filter(|(_, inst)| matches!(inst.kind, InstanceKind::Pin(_)))
            .map(|(key, _)| key)
            .collect();

        let half = (pin_keys.len() + 1) / 2;
        for (i, inst_key) in pin_keys.iter().enumerate() {
            let (x, side_index, side_count) = if i < half {
                (core.ll.x, i, half)
            } else {
                (core.ur.x, i - half, pin_keys.len() - half)
            };
            let y = core.ll.y
                + core.height() * (side_index as i64 + 1) / (side_count as i64 + 1);
            let inst = module
                .netlist
                .instances
                .get_mut(*inst_key)
                .expect("pin instance vanished");
            inst.pos = Coord64::new(x, y);
            inst.placement = PlacementState::PlacedAndFixed;
        }

        info!(
            "floorplan: core {}x{} nm, {} rows, {} pins fixed",
            config.core_size.w,
            config.core_size.h,
            rows,
            pin_keys.len()
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------

struct Place {
    project: ProjectConfig,
    base: PathBuf,
}

impl Stage for Place {
    fn name(&self) -> &'static str {
        "place"
    }

    fn execute(&mut self, design: &mut Design, ctx: &StageContext<'_>) -> Result<()> {
        let module_key = top_module(design)?;
        let region_key = first_region(design)?;

        let stats = place_module(design, module_key, region_key, &PlacerTunables::default())?;
        info!(
            "quadratic placement: {} rows, {} stars, {} skipped nets",
            stats.rows, stats.stars, stats.skipped_nets
        );
        ctx.progress(30);

        let region = design
            .floorplan
            .regions
            .get(region_key)
            .ok_or_else(|| anyhow!("region vanished during placement"))?;
        let place_rect = region.placement_rect();
        let site_size = design
            .tech
            .site_by_name(&region.site)
            .ok_or_else(|| anyhow!("region site {:?} is not defined", region.site))?
            .size;

        let diffusion_config = DiffusionConfig::default();
        let mut netlist = PlacerNetlist::from_module(design, module_key)?;

        // Bisection diagnostic: how evenly the quadratic result splits
        // the movable area across the region's longer axis.
        let partition = split(&netlist, place_rect, true);
        info!(
            "partition balance at {:?}={}: {} / {} movable nm2",
            partition.axis,
            partition.cut,
            partition.low.movable_area(),
            partition.high.movable_area()
        );

        let bin_size =
            DiffusionSpreader::bin_size_for(&netlist, site_size, &diffusion_config);
        let mut spreader =
            DiffusionSpreader::new(place_rect, bin_size, diffusion_config.wall_density);
        let diffusion_stats = spreader.run(&mut netlist, &diffusion_config);
        netlist.write_back(design, module_key)?;
        info!(
            "diffusion: {} iterations, max density {:.3}, converged: {}",
            diffusion_stats.iterations, diffusion_stats.max_density, diffusion_stats.converged
        );
        ctx.progress(60);

        let (width, height, densities) = spreader.density_snapshot();
        let density_path = output_path(&self.project, &self.base, "density.pgm");
        if let Ok(mut file) = File::create(&density_path) {
            ppm::write_density_pgm(&mut file, width, height, &densities)?;
        }

        let summary = legalize_region(design, module_key, region_key)?;
        info!(
            "legalized {} cells ({} spilled)",
            summary.legalized, summary.spilled
        );
        ctx.progress(90);

        let def_path = output_path(&self.project, &self.base, "placement.def");
        let mut def_file = File::create(&def_path)
            .with_context(|| format!("creating {:?}", def_path))?;
        let module = design.top()?;
        let die = Rect64::from_size(Coord64::new(0, 0), self.project.floorplan.core_size);
        def::write(design, module, die, &mut def_file)?;
        info!("placement snapshot written to {:?}", def_path);
        Ok(())
    }
}

// ---------------------------------------------------------------------

struct Cts {
    project: ProjectConfig,
    base: PathBuf,
}

fn find_clock_net(design: &Design, module_key: ModuleKey, configured: Option<&str>) -> Result<Option<NetKey>> {
    let module = design
        .modules
        .get(module_key)
        .ok_or_else(|| anyhow!("top module key is stale"))?;

    if let Some(name) = configured {
        return module
            .netlist
            .nets
            .lookup(name)
            .map(Some)
            .ok_or_else(|| anyhow!("configured clock net {:?} does not exist", name));
    }
    Ok(module
        .netlist
        .nets
        .lookup("clk")
        .or_else(|| module.netlist.nets.lookup("clock")))
}

impl Stage for Cts {
    fn name(&self) -> &'static str {
        "cts"
    }

    fn execute(&mut self, design: &mut Design, ctx: &StageContext<'_>) -> Result<()> {
        let module_key = top_module(design)?;
        let region_key = first_region(design)?;

        let Some(clock_net) = find_clock_net(
            design,
            module_key,
            self.project.cts.clock_net.as_deref(),
        )?
        else {
            warn!("no clock net found; skipping clock-tree synthesis");
            return Ok(());
        };

        let buffer_cell = design
            .cells
            .lookup(&self.project.cts.buffer)
            .ok_or_else(|| {
                anyhow!(
                    "clock buffer {:?} is not in the cell library",
                    self.project.cts.buffer
                )
            })?;
        let spec = BufferSpec::from_cell(design, buffer_cell)?;
        let config = CtsConfig {
            max_capacitance: self.project.cts.max_cap_ff * 1.0e-15,
            wire_cap_per_nm: self.project.cts.wire_cap_af_per_nm * 1.0e-18,
        };

        let mut cts = MeanAndMedianCts::new(spec, config);
        let summary = cts.synthesize(design, module_key, clock_net)?;
        info!(
            "cts: {} sinks, {} buffers, {:.1} fF root load",
            summary.sinks,
            summary.buffers_inserted,
            summary.root_capacitance * 1.0e15
        );
        ctx.progress(60);

        // The new buffers land between existing cells; re-legalize.
        legalize_region(design, module_key, region_key)?;

        let def_path = output_path(&self.project, &self.base, "placement_cts.def");
        let mut def_file = File::create(&def_path)
            .with_context(|| format!("creating {:?}", def_path))?;
        let module = design.top()?;
        let die = Rect64::from_size(Coord64::new(0, 0), self.project.floorplan.core_size);
        def::write(design, module, die, &mut def_file)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------

struct CheckTiming {
    stage_name: &'static str,
    use_spef: bool,
    project: ProjectConfig,
    base: PathBuf,
}

impl Stage for CheckTiming {
    fn name(&self) -> &'static str {
        self.stage_name
    }

    fn execute(&mut self, design: &mut Design, _ctx: &StageContext<'_>) -> Result<()> {
        let Some(timing) = &self.project.timing else {
            warn!("no timing tool configured; skipping {}", self.stage_name);
            return Ok(());
        };

        // Export the current netlist for the external tool.
        let netlist_path = output_path(
            &self.project,
            &self.base,
            &format!("{}.v", self.stage_name),
        );
        {
            let mut file = File::create(&netlist_path)
                .with_context(|| format!("creating {:?}", netlist_path))?;
            let module = design.top()?;
            verilog::write_module(design, module, &mut file)?;
        }

        let sdc = timing
            .sdc
            .as_ref()
            .map(|p| self.project.resolve_path(&self.base, p));
        let spef = if self.use_spef {
            timing
                .spef
                .as_ref()
                .map(|p| self.project.resolve_path(&self.base, p))
        } else {
            None
        };

        let runner = TimingRunner::new(&expand_environment_vars(&timing.command));
        let report = runner.run(&netlist_path, sdc.as_deref(), spef.as_deref())?;
        ensure!(
            report.ok,
            "timing check failed (worst slack: {:?} ns)",
            report.worst_slack_ns
        );
        info!(
            "timing clean, worst slack {:?} ns",
            report.worst_slack_ns
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------

struct GlobalRoute {
    project: ProjectConfig,
    base: PathBuf,
}

impl Stage for GlobalRoute {
    fn name(&self) -> &'static str {
        "global_route"
    }

    fn execute(&mut self, design: &mut Design, ctx: &StageContext<'_>) -> Result<()> {
        let module_key = top_module(design)?;
        let region_key = first_region(design)?;
        let site_name = design
            .floorplan
            .regions
            .get(region_key)
            .ok_or_else(|| anyhow!("region vanished"))?
            .site
            .clone();

        let cell_size = determine_cell_size(
            &design.tech,
            &site_name,
            self.project.route.h_tracks,
            self.project.route.v_tracks,
        )?;
        let tracks = track_counts(&design.tech, cell_size);
        let capacity = (tracks.horizontal + tracks.vertical).max(1) as u16;
        info!(
            "grid cell {}x{} nm, {} tracks of capacity",
            cell_size.w, cell_size.h, capacity
        );

        // The routable area covers the placed instances plus a margin.
        let module = design
            .modules
            .get(module_key)
            .ok_or_else(|| anyhow!("top module key is stale"))?;
        let mut die = Coord64::new(0, 0);
        for (_, inst) in module.netlist.instances.iter() {
            ensure!(
                inst.is_placed(),
                "instance {:?} has not been placed",
                inst.name
            );
            let size = design.instance_size(inst);
            die.x = die.x.max(inst.pos.x + size.w);
            die.y = die.y.max(inst.pos.y + size.h);
        }
        die.x += self.project.route.margin;
        die.y += self.project.route.margin;

        let grid_width = 1 + die.x / cell_size.w;
        let grid_height = 1 + die.y / cell_size.h;
        info!("routing grid: {}x{} cells", grid_width, grid_height);
        ctx.progress(20);

        // Net terminals are instance centers; degenerate nets are left
        // unrouted.
        let mut nets: Vec<(String, Vec<Coord64>)> = Vec::new();
        for (_, net) in module.netlist.nets.iter() {
            if net.is_degenerate() {
                continue;
            }
            let mut terminals = Vec::with_capacity(net.connections.len());
            for &(inst_key, _) in &net.connections {
                let inst = module
                    .netlist
                    .instances
                    .get(inst_key)
                    .ok_or_else(|| anyhow!("net {:?} references a dead instance", net.name))?;
                let size = design.instance_size(inst);
                terminals.push(Coord64::new(
                    inst.pos.x + size.w / 2,
                    inst.pos.y + size.h / 2,
                ));
            }
            terminals.sort_unstable_by_key(|p| (p.x, p.y));
            terminals.dedup();
            if terminals.len() >= 2 {
                nets.push((net.name.clone(), terminals));
            }
        }
        let net_count = nets.len();

        let mut router = MazeRouter::new(Grid::new(grid_width, grid_height, cell_size, capacity));
        let routed = router.route_nets(nets)?;
        let segments: usize = routed.iter().map(|(_, s)| s.len()).sum();
        info!("routed {} nets into {} segments", net_count, segments);
        ctx.progress(90);

        let bitmap = router.grid().congestion_bitmap();
        let ppm_path = output_path(&self.project, &self.base, "congestion.ppm");
        let mut file = File::create(&ppm_path)
            .with_context(|| format!("creating {:?}", ppm_path))?;
        ppm::write_ppm(&mut file, &bitmap)?;
        info!("congestion map written to {:?}", ppm_path);
        Ok(())
    }
}

// ---------------------------------------------------------------------
