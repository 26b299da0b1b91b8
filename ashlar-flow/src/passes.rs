//! Built-in passes exposed on the command surface.

use crate::pass::{Pass, PassManager, PassParams};
use anyhow::{anyhow, Context, Result};
use ashlar_common::database::Design;
use ashlar_common::geometry::{Coord64, Rect64};
use ashlar_common::io::{def, verilog};
use std::fs::File;

/// Die rectangle for exports: the first floorplan region when one
/// exists, otherwise the instance extents.
fn die_area(design: &Design) -> Result<Rect64> {
    if let Some((_, region)) = design.floorplan.first_region() {
        return Ok(region.rect);
    }
    let module = design.top()?;
    let mut ur = Coord64::new(0, 0);
    for (_, inst) in module.netlist.instances.iter() {
        let size = design.instance_size(inst);
        ur.x = ur.x.max(inst.pos.x + size.w);
        ur.y = ur.y.max(inst.pos.y + size.h);
    }
    Ok(Rect64::new(Coord64::new(0, 0), ur))
}

/// `write_def <file>`: dump the current placement as DEF.
struct WriteDef;

impl Pass for WriteDef {
    fn name(&self) -> &'static str {
        "write_def"
    }

    fn execute(&mut self, design: &mut Design, params: &PassParams) -> Result<()> {
        let path = params
            .positional()
            .first()
            .ok_or_else(|| anyhow!("write_def expects an output file name"))?;
        let die = die_area(design)?;
        let module = design.top()?;
        let mut file =
            File::create(path).with_context(|| format!("creating {:?}", path))?;
        def::write(design, module, die, &mut file)
    }

    fn help(&self) -> String {
        "write_def <file>\n  Write the top module placement as DEF.".into()
    }

    fn short_help(&self) -> String {
        "write the placement as DEF".into()
    }
}

/// `write_verilog <file>`: dump the current netlist.
struct WriteVerilog;

impl Pass for WriteVerilog {
    fn name(&self) -> &'static str {
        "write_verilog"
    }

    fn execute(&mut self, design: &mut Design, params: &PassParams) -> Result<()> {
        let path = params
            .positional()
            .first()
            .ok_or_else(|| anyhow!("write_verilog expects an output file name"))?;
        let module = design.top()?;
        let mut file =
            File::create(path).with_context(|| format!("creating {:?}", path))?;
        verilog::write_module(design, module, &mut file)
    }

    fn help(&self) -> String {
        "write_verilog <file>\n  Write the top module as structural Verilog.".into()
    }

    fn short_help(&self) -> String {
        "write the netlist as Verilog".into()
    }
}

/// The dispatcher with every built-in pass registered.
pub fn standard_passes() -> Result<PassManager> {
    let mut manager = PassManager::new();
    manager.register(Box::new(WriteDef))?;
    manager.register(Box::new(WriteVerilog))?;
    Ok(manager)
}
