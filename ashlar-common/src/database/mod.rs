//! The design database. One [`Design`] container owns every technology,
//! library, netlist and floorplan object; everything else in the flow
//! holds typed keys into it.

mod cells;
mod floorplan;
mod netlist;
mod tech;

pub use cells::{Cell, CellClass, PinDirection, PinInfo};
pub use floorplan::{Floorplan, Region, Row};
pub use netlist::{Instance, InstanceKind, Net, Netlist, PlacementState};
pub use tech::{Layer, LayerDirection, LayerKind, Site, TechLib};

use crate::define_key;
use crate::geometry::Size64;
use crate::store::Store;
use anyhow::{anyhow, Result};

define_key!(LayerKey);
define_key!(SiteKey);
define_key!(CellKey);
define_key!(PinKey);
define_key!(InstKey);
define_key!(NetKey);
define_key!(RegionKey);
define_key!(ModuleKey);

/// A hierarchical netlist unit: its ports and its flattened contents.
#[derive(Debug, Default)]
pub struct Module {
    pub name: String,
    /// Module-level ports; `InstanceKind::Pin` instances reference these.
    pub ports: Store<PinKey, PinInfo>,
    pub netlist: Netlist,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }
}

/// The process-wide design container, created at startup and emptied by
/// `clear`.
#[derive(Debug, Default)]
pub struct Design {
    pub tech: TechLib,
    pub cells: Store<CellKey, Cell>,
    pub modules: Store<ModuleKey, Module>,
    pub floorplan: Floorplan,
    top_module: Option<ModuleKey>,
}

impl Design {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn set_top_module(&mut self, key: ModuleKey) {
        self.top_module = Some(key);
    }

    pub fn top_module(&self) -> Option<ModuleKey> {
        self.top_module
    }

    pub fn top(&self) -> Result<&Module> {
        self.top_module
            .and_then(|k| self.modules.get(k))
            .ok_or_else(|| anyhow!("top module is not set"))
    }

    pub fn top_mut(&mut self) -> Result<&mut Module> {
        let key = self
            .top_module
            .ok_or_else(|| anyhow!("top module is not set"))?;
        self.modules
            .get_mut(key)
            .ok_or_else(|| anyhow!("top module key is stale"))
    }

    /// Footprint of an instance: the archetype cell size for cell
    /// instances, zero for pin and module placeholders.
    pub fn instance_size(&self, inst: &Instance) -> Size64 {
        match inst.kind {
            InstanceKind::Cell(cell) => self
                .cells
                .get(cell)
                .map(|c| c.size)
                .unwrap_or_default(),
            InstanceKind::Pin(_) | InstanceKind::Module(_) => Size64::default(),
        }
    }

    /// Pin metadata for an instance pin: cell-library pins for cell
    /// instances, module ports for pin instances.
    pub fn pin_info<'a>(
        &'a self,
        module: &'a Module,
        inst: &Instance,
        pin: PinKey,
    ) -> Option<&'a PinInfo> {
        match inst.kind {
            InstanceKind::Cell(cell) => self.cells.get(cell)?.pins.get(pin),
            InstanceKind::Pin(port) => {
                debug_assert_eq!(port, pin);
                module.ports.get(pin)
            }
            InstanceKind::Module(_) => None,
        }
    }
}
