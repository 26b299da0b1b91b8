//! The global-routing cell grid. Each GCell tracks its routing capacity,
//! the scratch cost of the current wave expansion and a set of bit flags,
//! with the predecessor direction packed into the high byte.

use anyhow::{anyhow, ensure, Result};
use ashlar_common::database::{LayerDirection, TechLib};
use ashlar_common::geometry::{Coord64, Size64};
use ashlar_common::io::ppm::{Bitmap, Rgb};
use log::{info, warn};

pub type PathCost = i64;

/// Grid-space coordinate of a GCell.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GridCoord {
    pub x: i64,
    pub y: i64,
}

impl GridCoord {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn manhattan_distance(&self, other: &GridCoord) -> i64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn north(&self) -> GridCoord {
        GridCoord::new(self.x, self.y + 1)
    }

    pub fn south(&self) -> GridCoord {
        GridCoord::new(self.x, self.y - 1)
    }

    pub fn east(&self) -> GridCoord {
        GridCoord::new(self.x + 1, self.y)
    }

    pub fn west(&self) -> GridCoord {
        GridCoord::new(self.x - 1, self.y)
    }
}

impl std::fmt::Display for GridCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Direction pointing back toward the wave source, stored in the high
/// byte of the cell flags.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u16)]
pub enum Predecessor {
    #[default]
    Undefined = 0,
    North = 1 << 8,
    South = 2 << 8,
    East = 3 << 8,
    West = 4 << 8,
}

/// Travel direction of a backtracked segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub fn step(&self, p: GridCoord) -> GridCoord {
        match self {
            Direction::North => p.north(),
            Direction::South => p.south(),
            Direction::East => p.east(),
            Direction::West => p.west(),
        }
    }
}

impl Predecessor {
    pub fn to_direction(self) -> Option<Direction> {
        match self {
            Predecessor::North => Some(Direction::North),
            Predecessor::South => Some(Direction::South),
            Predecessor::East => Some(Direction::East),
            Predecessor::West => Some(Direction::West),
            Predecessor::Undefined => None,
        }
    }

    pub fn from_direction(dir: Direction) -> Predecessor {
        match dir {
            Direction::North => Predecessor::North,
            Direction::South => Predecessor::South,
            Direction::East => Predecessor::East,
            Direction::West => Predecessor::West,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct GCell {
    pub capacity: u16,
    pub cost: PathCost,
    flags: u16,
}

impl Default for GCell {
    fn default() -> Self {
        Self {
            capacity: 0,
            cost: PathCost::MAX,
            flags: 0,
        }
    }
}

impl GCell {
    pub const SOURCE: u16 = 1;
    pub const TARGET: u16 = 2;
    pub const REACHED: u16 = 4;
    pub const INVALID: u16 = 8;
    pub const BLOCKED: u16 = 16;
    pub const MARKED: u16 = 32;
    pub const TERMINAL: u16 = 64;
    pub const EXTRACTED: u16 = 128;
    const PREDECESSOR_MASK: u16 = 0xFF00;

    pub fn has(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    pub fn set(&mut self, flag: u16) {
        self.flags |= flag;
    }

    pub fn clear(&mut self, flag: u16) {
        self.flags &= !flag;
    }

    pub fn predecessor(&self) -> Predecessor {
        match self.flags & Self::PREDECESSOR_MASK {
            x if x == Predecessor::North as u16 => Predecessor::North,
            x if x == Predecessor::South as u16 => Predecessor::South,
            x if x == Predecessor::East as u16 => Predecessor::East,
            x if x == Predecessor::West as u16 => Predecessor::West,
            _ => Predecessor::Undefined,
        }
    }

    pub fn set_predecessor(&mut self, pred: Predecessor) {
        self.flags = (self.flags & !Self::PREDECESSOR_MASK) | pred as u16;
    }
}

/// Requested routing tracks through one grid cell.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub horizontal: i64,
    pub vertical: i64,
}

pub struct Grid {
    width: i64,
    height: i64,
    cell_size: Size64,
    max_capacity: u16,
    cells: Vec<GCell>,
}

impl Grid {
    pub fn new(width: i64, height: i64, cell_size: Size64, max_capacity: u16) -> Self {
        assert!(width > 0 && height > 0, "grid must have a positive size");
        assert!(!cell_size.is_null(), "grid cell size must be non-zero");
        Self {
            width,
            height,
            cell_size,
            max_capacity,
            cells: vec![GCell::default(); (width * height) as usize],
        }
    }

    pub fn width(&self) -> i64 {
        self.width
    }

    pub fn height(&self) -> i64 {
        self.height
    }

    pub fn cell_size(&self) -> Size64 {
        self.cell_size
    }

    pub fn max_capacity(&self) -> u16 {
        self.max_capacity
    }

    pub fn is_valid(&self, p: GridCoord) -> bool {
        p.x >= 0 && p.x < self.width && p.y >= 0 && p.y < self.height
    }

    /// Chip-space nm to grid coordinates.
    pub fn to_grid(&self, p: Coord64) -> GridCoord {
        GridCoord::new(p.x / self.cell_size.w, p.y / self.cell_size.h)
    }

    pub fn at(&self, p: GridCoord) -> Option<&GCell> {
        self.is_valid(p)
            .then(|| &self.cells[(p.y * self.width + p.x) as usize])
    }

    pub fn at_mut(&mut self, p: GridCoord) -> Option<&mut GCell> {
        self.is_valid(p)
            .then(|| &mut self.cells[(p.y * self.width + p.x) as usize])
    }

    /// Clear the wave-expansion scratch (reached flag and cost) so the
    /// next two-point route starts clean.
    pub fn clear_reached_and_reset_cost(&mut self) {
        for cell in &mut self.cells {
            cell.clear(GCell::REACHED);
            cell.cost = PathCost::MAX;
        }
    }

    /// Clear everything route-specific, keeping blockages and capacity.
    pub fn clear_transient_flags(&mut self) {
        for cell in &mut self.cells {
            cell.flags &= GCell::BLOCKED;
            cell.cost = PathCost::MAX;
        }
    }

    /// Drop the once-per-cell extraction markers after a capacity update.
    pub fn clear_marks(&mut self) {
        for cell in &mut self.cells {
            cell.clear(GCell::MARKED | GCell::EXTRACTED);
        }
    }

    pub fn set_blocked(&mut self, p: GridCoord) {
        if let Some(cell) = self.at_mut(p) {
            cell.set(GCell::BLOCKED);
        }
    }

    /// Sum of the capacity counters over the whole grid.
    pub fn total_capacity_used(&self) -> u64 {
        self.cells.iter().map(|c| c.capacity as u64).sum()
    }

    /// Green-to-red congestion image for debugging.
    pub fn congestion_bitmap(&self) -> Bitmap {
        let free = Rgb::new(0, 255, 0);
        let congested = Rgb::new(255, 0, 0);
        let blocked = Rgb::new(255, 255, 255);

        let mut bitmap = Bitmap::new(self.width as usize, self.height as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let cell = self.at(GridCoord::new(x, y)).expect("in-range cell");
                let pixel = if cell.has(GCell::BLOCKED) {
                    blocked
                } else {
                    free.interpolate(
                        &congested,
                        cell.capacity as f32 / self.max_capacity.max(1) as f32,
                    )
                };
                bitmap.set(x as usize, y as usize, pixel);
            }
        }
        bitmap
    }
}

/// Number of routing tracks crossing a region of `extents` given the
/// technology's routing-layer pitches.
pub fn track_counts(tech: &TechLib, extents: Size64) -> TrackInfo {
    let (horizontal, vertical) = track_counts_f(tech, extents);
    TrackInfo {
        horizontal: horizontal.floor() as i64,
        vertical: vertical.floor() as i64,
    }
}

/// Choose a grid-cell size, in multiples of the site dimensions, that
/// offers at least the requested number of horizontal and vertical
/// tracks per cell.
pub fn determine_cell_size(
    tech: &TechLib,
    site_name: &str,
    h_tracks: i64,
    v_tracks: i64,
) -> Result<Size64> {
    let site = tech
        .site_by_name(site_name)
        .ok_or_else(|| anyhow!("site {:?} not found in the technology library", site_name))?;
    ensure!(
        !site.size.is_null(),
        "site {:?} has an ill-defined size {}x{}",
        site_name,
        site.size.w,
        site.size.h
    );

    let per_site = track_counts_f(tech, site.size);
    ensure!(
        per_site.0 > 0.0 && per_site.1 > 0.0,
        "routing tracks per site are ill-defined (h={:.2}, v={:.2}); check the layer stack",
        per_site.0,
        per_site.1
    );

    let height_units = (h_tracks as f64 / per_site.0).ceil() as i64;
    let width_units = (v_tracks as f64 / per_site.1).ceil() as i64;
    let size = Size64::new(
        width_units.max(1) * site.size.w,
        height_units.max(1) * site.size.h,
    );

    info!("routing grid cell size: {}x{} nm", size.w, size.h);
    if size.w > 100 * site.size.w || size.h > 100 * site.size.h {
        warn!("routing grid cells are very coarse; check the requested track counts");
    }
    Ok(size)
}

fn track_counts_f(tech: &TechLib, extents: Size64) -> (f64, f64) {
    let mut horizontal = 0.0f64;
    let mut vertical = 0.0f64;
    for layer in tech.routing_layers() {
        match layer.direction {
            LayerDirection::Horizontal if layer.pitch.h > 0 => {
                horizontal += extents.h as f64 / layer.pitch.h as f64;
            }
            LayerDirection::Vertical if layer.pitch.w > 0 => {
                vertical += extents.w as f64 / layer.pitch.w as f64;
            }
            _ => {}
        }
    }
    (horizontal, vertical)
}
