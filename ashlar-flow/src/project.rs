//! Project configuration: one JSON file naming the inputs, technology,
//! cell library and per-stage knobs. LEF/Liberty parsing happens outside
//! the core; their distilled content arrives through this file.

use anyhow::{Context, Result};
use ashlar_common::database::{CellClass, Layer, PinInfo, Site};
use ashlar_common::fileutils::expand_environment_vars;
use ashlar_common::geometry::Size64;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    /// Gate-level netlist, Verilog.
    pub verilog: String,
    /// Name of the top module inside the netlist.
    pub top: String,
    #[serde(default)]
    pub tech: TechConfig,
    #[serde(default)]
    pub cells: Vec<CellConfig>,
    pub floorplan: FloorplanConfig,
    #[serde(default)]
    pub cts: CtsProjectConfig,
    #[serde(default)]
    pub route: RouteProjectConfig,
    /// External timing checks run only when configured.
    #[serde(default)]
    pub timing: Option<TimingConfig>,
    /// Where reports, snapshots and debug bitmaps go.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_output_dir() -> String {
    ".".to_owned()
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TechConfig {
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub sites: Vec<Site>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CellConfig {
    pub name: String,
    pub size: Size64,
    #[serde(default)]
    pub class: CellClass,
    #[serde(default)]
    pub pins: Vec<PinInfo>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FloorplanConfig {
    pub core_size: Size64,
    /// Uniform halo margin, nm.
    #[serde(default)]
    pub halo: i64,
    /// Placement site of the core region.
    pub site: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CtsProjectConfig {
    /// Buffer cell name in the library.
    #[serde(default = "default_cts_buffer")]
    pub buffer: String,
    /// Maximum buffer load, femtofarad.
    #[serde(default = "default_max_cap_ff")]
    pub max_cap_ff: f64,
    /// Clock net name; `clk` and `clock` are tried when absent.
    #[serde(default)]
    pub clock_net: Option<String>,
    /// Wire-load proxy in attofarad per nm of cluster half-perimeter.
    #[serde(default)]
    pub wire_cap_af_per_nm: f64,
}

fn default_cts_buffer() -> String {
    "CLKBUF".to_owned()
}

fn default_max_cap_ff() -> f64 {
    200.0
}

impl Default for CtsProjectConfig {
    fn default() -> Self {
        Self {
            buffer: default_cts_buffer(),
            max_cap_ff: default_max_cap_ff(),
            clock_net: None,
            wire_cap_af_per_nm: 0.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RouteProjectConfig {
    /// Requested horizontal routing tracks per grid cell.
    #[serde(default = "default_tracks")]
    pub h_tracks: i64,
    #[serde(default = "default_tracks")]
    pub v_tracks: i64,
    /// Margin added around the instance extents, nm.
    #[serde(default = "default_route_margin")]
    pub margin: i64,
}

fn default_tracks() -> i64 {
    100
}

fn default_route_margin() -> i64 {
    1_000
}

impl Default for RouteProjectConfig {
    fn default() -> Self {
        Self {
            h_tracks: default_tracks(),
            v_tracks: default_tracks(),
            margin: default_route_margin(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TimingConfig {
    /// External STA executable.
    pub command: String,
    #[serde(default)]
    pub sdc: Option<String>,
    #[serde(default)]
    pub spef: Option<String>,
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading project file {:?}", path))?;
        let project: ProjectConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing project file {:?}", path))?;
        Ok(project)
    }

    /// Resolve a configured path: `{VAR}` expansion, then relative paths
    /// are taken relative to `base`.
    pub fn resolve_path(&self, base: &Path, configured: &str) -> PathBuf {
        let expanded = expand_environment_vars(configured);
        let path = PathBuf::from(expanded);
        if path.is_absolute() {
            path
        } else {
            base.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_project_parses_with_defaults() {
        let json = r#"{
            "name": "demo",
            "verilog": "demo.v",
            "top": "demo",
            "floorplan": { "core_size": { "w": 100000, "h": 100000 }, "site": "core" }
        }"#;
        let project: ProjectConfig = serde_json::from_str(json).unwrap();

        assert_eq!(project.name, "demo");
        assert_eq!(project.cts.buffer, "CLKBUF");
        assert_eq!(project.route.h_tracks, 100);
        assert!(project.timing.is_none());
        assert_eq!(project.output_dir, ".");
    }

    #[test]
    fn tech_and_cells_deserialize() {
        let json = r#"{
            "name": "demo",
            "verilog": "demo.v",
            "top": "demo",
            "floorplan": { "core_size": { "w": 100000, "h": 100000 }, "halo": 2000, "site": "core" },
            "tech": {
                "layers": [
                    { "name": "metal1", "kind": "routing", "direction": "horizontal",
                      "pitch": { "w": 400, "h": 400 }, "width": 200, "spacing": 200 }
                ],
                "sites": [
                    { "name": "core", "size": { "w": 200, "h": 2000 } }
                ]
            },
            "cells": [
                { "name": "INV", "size": { "w": 600, "h": 2000 },
                  "pins": [
                    { "name": "A", "direction": "input", "capacitance": 1e-15 },
                    { "name": "Y", "direction": "output" }
                  ] }
            ]
        }"#;
        let project: ProjectConfig = serde_json::from_str(json).unwrap();

        assert_eq!(project.tech.layers.len(), 1);
        assert_eq!(project.tech.sites[0].size.h, 2_000);
        assert_eq!(project.cells[0].pins.len(), 2);
        assert_eq!(project.floorplan.halo, 2_000);
    }

    #[test]
    fn resolve_path_expands_and_rebases() {
        std::env::set_var("ASHLAR_PROJ_ROOT", "/abs/root");
        let json = r#"{
            "name": "demo",
            "verilog": "demo.v",
            "top": "demo",
            "floorplan": { "core_size": { "w": 1, "h": 1 }, "site": "core" }
        }"#;
        let project: ProjectConfig = serde_json::from_str(json).unwrap();

        assert_eq!(
            project.resolve_path(Path::new("/work"), "{ASHLAR_PROJ_ROOT}/a.v"),
            PathBuf::from("/abs/root/a.v")
        );
        assert_eq!(
            project.resolve_path(Path::new("/work"), "a.v"),
            PathBuf::from("/work/a.v")
        );
    }
}
