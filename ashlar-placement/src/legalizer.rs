//! Row legalization: snap placed cells onto site rows, resolve residual
//! overlap left-to-right and spill overfull rows to their neighbors.

use anyhow::{anyhow, Result};
use ashlar_common::database::{Design, InstKey, InstanceKind, ModuleKey, RegionKey, Row};
use ashlar_common::geometry::{Coord64, Orientation, Rect64};
use itertools::Itertools;
use log::{debug, info};
use std::cmp::Ordering;
use std::fmt::Display;

#[derive(Debug, PartialEq)]
pub enum LegalizeError {
    /// The movable area does not fit the region's rows at all.
    Infeasible {
        required_area: i64,
        available_area: i64,
    },
    /// A cell could not be placed in any row with slack.
    NoRowWithSlack { instance: String },
}

impl std::error::Error for LegalizeError {}

impl Display for LegalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Infeasible {
                required_area,
                available_area,
            } => write!(
                f,
                "placement is infeasible: {} nm2 of cells for {} nm2 of rows",
                required_area, available_area
            ),
            Self::NoRowWithSlack { instance } => {
                write!(f, "no row with slack found for instance {:?}", instance)
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct LegalizeSummary {
    pub legalized: usize,
    pub spilled: usize,
}

#[derive(Clone, Debug)]
struct MovableCell {
    inst: InstKey,
    name: String,
    width: i64,
    desired: Coord64,
}

/// Per-row placement state during the sweep.
struct RowState {
    rect: Rect64,
    flipped: bool,
    cursor: i64,
    /// Fixed-cell footprints intersecting this row, sorted by start.
    obstacles: Vec<(i64, i64)>,
    placements: Vec<(InstKey, i64)>,
}

impl RowState {
    fn new(row: &Row) -> Self {
        Self {
            rect: row.rect,
            flipped: row.flipped,
            cursor: row.rect.ll.x,
            obstacles: Vec::new(),
            placements: Vec::new(),
        }
    }

    fn bottom_y(&self) -> i64 {
        self.rect.ll.y
    }

    /// First legal x at or after `x` where a cell of `width` clears every
    /// obstacle, snapped up to the site pitch. `None` when it runs off the
    /// row.
    fn fit_from(&self, mut x: i64, width: i64, pitch: i64) -> Option<i64> {
        x = snap_up(x.max(self.rect.ll.x), self.rect.ll.x, pitch);
        loop {
            let mut bumped = false;
            for &(start, end) in &self.obstacles {
                if x < end && x + width > start {
                    x = snap_up(end, self.rect.ll.x, pitch);
                    bumped = true;
                }
            }
            if !bumped {
                break;
            }
        }
        (x + width <= self.rect.ur.x).then_some(x)
    }

    fn place(&mut self, inst: InstKey, x: i64, width: i64) {
        self.placements.push((inst, x));
        self.cursor = x + width;
    }
}

fn snap_up(x: i64, origin: i64, pitch: i64) -> i64 {
    let rel = x - origin;
    origin + ((rel + pitch - 1) / pitch) * pitch
}

fn snap_nearest(x: i64, origin: i64, pitch: i64) -> i64 {
    let rel = x - origin;
    origin + ((rel + pitch / 2) / pitch) * pitch
}

/// Legalize every non-fixed cell instance of `module` onto the rows of
/// `region`.
pub fn legalize_region(
    design: &mut Design,
    module_key: ModuleKey,
    region_key: RegionKey,
) -> Result<LegalizeSummary> {
    let _span = tracing::info_span!("row_legalize").entered();

    let region = design
        .floorplan
        .regions
        .get(region_key)
        .ok_or_else(|| anyhow!("legalize: stale region key"))?;
    let site = design
        .tech
        .site_by_name(&region.site)
        .ok_or_else(|| anyhow!("legalize: unknown site {:?}", region.site))?;
    let pitch = site.size.w;

    let mut rows: Vec<RowState> = region
        .rows
        .iter()
        .map(RowState::new)
        .sorted_by_key(|r| r.rect.ll.y)
        .collect();
    if rows.is_empty() {
        return Err(anyhow!("region {:?} has no rows", region.name));
    }

    // Gather movable cells and fixed obstacles.
    let module = design
        .modules
        .get(module_key)
        .ok_or_else(|| anyhow!("legalize: stale module key"))?;

    let mut movables: Vec<MovableCell> = Vec::new();
    let mut movable_area = 0i64;
    let mut obstacle_area = 0i64;

    for (inst_key, inst) in module.netlist.instances.iter() {
        if !matches!(inst.kind, InstanceKind::Cell(_)) {
            continue;
        }
        let size = design.instance_size(inst);
        if inst.is_fixed() {
            let rect = Rect64::from_size(inst.pos, size);
            for row in rows.iter_mut() {
                if row.rect.overlap_area(&rect) > 0 {
                    row.obstacles.push((rect.ll.x, rect.ur.x));
                    obstacle_area += (rect.ur.x.min(row.rect.ur.x)
                        - rect.ll.x.max(row.rect.ll.x))
                        * row.rect.height();
                }
            }
        } else {
            movables.push(MovableCell {
                inst: inst_key,
                name: inst.name.clone(),
                width: size.w.max(pitch),
                desired: inst.pos,
            });
            movable_area += size.w.max(pitch) * site.size.h;
        }
    }
    for row in rows.iter_mut() {
        row.obstacles.sort_unstable();
    }

    let available_area: i64 =
        rows.iter().map(|r| r.rect.area()).sum::<i64>() - obstacle_area;
    if movable_area > available_area {
        return Err(LegalizeError::Infeasible {
            required_area: movable_area,
            available_area,
        }
        .into());
    }

    // First pass: nearest row, left-to-right shifting within it.
    let mut per_row: Vec<Vec<MovableCell>> = vec![Vec::new(); rows.len()];
    for cell in movables {
        let row_idx = rows
            .iter()
            .enumerate()
            .min_by_key(|(_, r)| (r.bottom_y() - cell.desired.y).abs())
            .map(|(i, _)| i)
            .expect("rows are non-empty");
        per_row[row_idx].push(cell);
    }

    let mut spill: Vec<MovableCell> = Vec::new();
    for (row_idx, mut cells) in per_row.into_iter().enumerate() {
        cells.sort_by(|a, b| match a.desired.x.cmp(&b.desired.x) {
            Ordering::Equal => a.name.cmp(&b.name),
            other => other,
        });
        let row = &mut rows[row_idx];
        for cell in cells {
            let wanted = snap_nearest(cell.desired.x, row.rect.ll.x, pitch);
            match row.fit_from(wanted.max(row.cursor), cell.width, pitch) {
                Some(x) => row.place(cell.inst, x, cell.width),
                None => spill.push(cell),
            }
        }
    }

    // Second pass: push overflow to the nearest row with slack.
    let spilled = spill.len();
    for cell in spill {
        let mut candidates: Vec<usize> = (0..rows.len()).collect();
        candidates.sort_by_key(|&i| (rows[i].bottom_y() - cell.desired.y).abs());

        let mut placed = false;
        for row_idx in candidates {
            let row = &mut rows[row_idx];
            if let Some(x) = row.fit_from(row.cursor, cell.width, pitch) {
                row.place(cell.inst, x, cell.width);
                placed = true;
                break;
            }
        }
        if !placed {
            return Err(LegalizeError::NoRowWithSlack {
                instance: cell.name,
            }
            .into());
        }
    }

    // Write the legal positions back.
    let mut legalized = 0usize;
    let module = design
        .modules
        .get_mut(module_key)
        .ok_or_else(|| anyhow!("legalize: stale module key"))?;
    for row in &rows {
        for &(inst_key, x) in &row.placements {
            let inst = module
                .netlist
                .instances
                .get_mut(inst_key)
                .ok_or_else(|| anyhow!("legalize: instance vanished"))?;
            inst.pos = Coord64::new(x, row.rect.ll.y);
            inst.orientation = if row.flipped {
                Orientation::MX
            } else {
                Orientation::R0
            };
            legalized += 1;
        }
    }

    info!(
        "legalized {} cells ({} spilled to neighboring rows)",
        legalized, spilled
    );
    debug!(
        "row fill: {:?}",
        rows.iter()
            .map(|r| (r.cursor - r.rect.ll.x) as f64 / r.rect.width().max(1) as f64)
            .collect::<Vec<_>>()
    );

    Ok(LegalizeSummary { legalized, spilled })
}
