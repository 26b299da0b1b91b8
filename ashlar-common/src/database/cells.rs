//! Standard-cell library entries.

use super::PinKey;
use crate::geometry::{Coord64, Size64};
use crate::store::Store;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinDirection {
    #[default]
    Input,
    Output,
    InOut,
    Power,
    Ground,
}

impl PinDirection {
    pub fn is_input(&self) -> bool {
        matches!(self, PinDirection::Input | PinDirection::InOut)
    }

    pub fn is_output(&self) -> bool {
        matches!(self, PinDirection::Output | PinDirection::InOut)
    }
}

/// Library-level pin description shared by all instances of a cell.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PinInfo {
    pub name: String,
    pub direction: PinDirection,
    /// Input capacitance, farad.
    #[serde(default)]
    pub capacitance: f64,
    #[serde(default)]
    pub max_capacitance: f64,
    #[serde(default)]
    pub is_clock: bool,
    /// Boolean function of the pin, as written in the library.
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub tristate_function: String,
    /// Pin location relative to the cell lower-left corner.
    #[serde(default)]
    pub offset: Coord64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellClass {
    #[default]
    Core,
    Pad,
    Block,
    Endcap,
    Filler,
}

#[derive(Debug, Default)]
pub struct Cell {
    pub name: String,
    pub size: Size64,
    pub class: CellClass,
    pub symmetry: String,
    pub pins: Store<PinKey, PinInfo>,
}

impl Cell {
    pub fn new(name: &str, size: Size64) -> Self {
        Self {
            name: name.to_owned(),
            size,
            ..Default::default()
        }
    }

    /// Cell area in nm².
    pub fn area(&self) -> i64 {
        self.size.area()
    }

    pub fn add_pin(&mut self, pin: PinInfo) -> Option<PinKey> {
        let name = pin.name.clone();
        self.pins.insert(&name, pin)
    }

    pub fn pin_by_name(&self, name: &str) -> Option<PinKey> {
        self.pins.lookup(name)
    }

    /// First input pin, used for buffer-style cells.
    pub fn input_pin(&self) -> Option<PinKey> {
        self.pins
            .iter()
            .find(|(_, p)| p.direction == PinDirection::Input)
            .map(|(k, _)| k)
    }

    /// First output pin, used for buffer-style cells.
    pub fn output_pin(&self) -> Option<PinKey> {
        self.pins
            .iter()
            .find(|(_, p)| p.direction == PinDirection::Output)
            .map(|(k, _)| k)
    }
}
