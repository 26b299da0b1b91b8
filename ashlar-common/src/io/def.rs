//! DEF placement snapshot writer. Enough of the format for downstream
//! tools to pick up component locations; routing and special nets are not
//! emitted here.

use crate::database::{Design, InstanceKind, Module, PlacementState};
use crate::geometry::{Orientation, Rect64};
use anyhow::{anyhow, Result};
use std::io::Write;

fn orientation_name(orientation: Orientation) -> &'static str {
    match orientation {
        Orientation::R0 => "N",
        Orientation::R90 => "W",
        Orientation::R180 => "S",
        Orientation::R270 => "E",
        Orientation::MX => "FS",
        Orientation::MY => "FN",
        Orientation::MX90 => "FW",
        Orientation::MY90 => "FE",
    }
}

/// Write the module's placement as DEF. `die_area` is in nm; DEF database
/// units are written at 1000 per micron, so nm values pass through
/// unchanged.
pub fn write(design: &Design, module: &Module, die_area: Rect64, w: &mut impl Write) -> Result<()> {
    writeln!(w, "VERSION 5.8 ;")?;
    writeln!(w, "DESIGN {} ;", module.name)?;
    writeln!(w, "UNITS DISTANCE MICRONS 1000 ;")?;
    writeln!(
        w,
        "DIEAREA ( {} {} ) ( {} {} ) ;",
        die_area.ll.x, die_area.ll.y, die_area.ur.x, die_area.ur.y
    )?;

    let components: Vec<_> = module
        .netlist
        .instances
        .iter()
        .filter_map(|(_, inst)| match inst.kind {
            InstanceKind::Cell(cell) => Some((inst, cell)),
            _ => None,
        })
        .collect();

    writeln!(w, "COMPONENTS {} ;", components.len())?;
    for (inst, cell_key) in components {
        let cell = design
            .cells
            .get(cell_key)
            .ok_or_else(|| anyhow!("instance {:?} references a dead cell", inst.name))?;
        let state = match inst.placement {
            PlacementState::Unplaced => "UNPLACED",
            PlacementState::Placed => "PLACED",
            PlacementState::PlacedAndFixed => "FIXED",
        };
        if inst.placement == PlacementState::Unplaced {
            writeln!(w, "  - {} {} ;", inst.name, cell.name)?;
        } else {
            writeln!(
                w,
                "  - {} {} + {} ( {} {} ) {} ;",
                inst.name,
                cell.name,
                state,
                inst.pos.x,
                inst.pos.y,
                orientation_name(inst.orientation)
            )?;
        }
    }
    writeln!(w, "END COMPONENTS")?;

    let pins: Vec<_> = module
        .netlist
        .instances
        .iter()
        .filter(|(_, inst)| matches!(inst.kind, InstanceKind::Pin(_)))
        .map(|(_, inst)| inst)
        .collect();
    writeln!(w, "PINS {} ;", pins.len())?;
    for inst in pins {
        writeln!(
            w,
            "  - {} + PLACED ( {} {} ) N ;",
            inst.name, inst.pos.x, inst.pos.y
        )?;
    }
    writeln!(w, "END PINS")?;

    writeln!(w, "END DESIGN")?;
    Ok(())
}
