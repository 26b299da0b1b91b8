//! Diffusion-based overlap removal.
//!
//! Cell area is binned into a regular grid and treated as a diffusing
//! fluid: the density gradient induces a velocity field and cells drift
//! along it until every bin falls below the target density. Density is
//! stepped with the forward-time centered-space scheme and periodically
//! renewed from the true cell positions to bound drift.

use crate::net_model::PlacerNetlist;
use ashlar_common::geometry::{Coord64, Rect64, Size64};
use log::{debug, warn};
use ndarray::Array2;


#[derive(Clone, Debug)]
pub struct DiffusionConfig {
    /// Bin edge length in average movable cell sizes.
    pub cells_per_bin: i64,
    /// Iterate until every bin is below this density.
    pub target_density: f64,
    /// Density read for bins beyond the placement boundary; acts as a
    /// reflecting wall.
    pub wall_density: f64,
    pub delta_t: f64,
    pub max_iterations: usize,
    /// Rebuild the density from true cell positions every this many
    /// iterations instead of propagating it.
    pub renew_interval: usize,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            cells_per_bin: 5,
            target_density: 0.75,
            wall_density: 1.5,
            delta_t: 0.1,
            max_iterations: 200,
            renew_interval: 5,
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct DiffusionStats {
    pub iterations: usize,
    pub max_density: f64,
    pub converged: bool,
}

/// The bin grid. Arrays are indexed `[x, y]`.
pub struct DiffusionSpreader {
    extents: Rect64,
    bin_size: Size64,
    nx: usize,
    ny: usize,
    wall_density: f64,

    pub density: Array2<f64>,
    next_density: Array2<f64>,
    pub vel_x: Array2<f64>,
    pub vel_y: Array2<f64>,
}

/// Round `value` up to the next multiple of `step`.
fn round_up(value: i64, step: i64) -> i64 {
    if step <= 0 {
        value
    } else {
        ((value + step - 1) / step) * step
    }
}

impl DiffusionSpreader {
    /// Bin edge: average movable cell size times `cells_per_bin`, rounded
    /// up to a whole number of sites.
    pub fn bin_size_for(
        netlist: &PlacerNetlist,
        site: Size64,
        config: &DiffusionConfig,
    ) -> Size64 {
        let avg = netlist.average_movable_size();
        Size64::new(
            round_up((avg.w * config.cells_per_bin).max(1), site.w).max(site.w),
            round_up((avg.h * config.cells_per_bin).max(1), site.h).max(site.h),
        )
    }

    pub fn new(extents: Rect64, bin_size: Size64, wall_density: f64) -> Self {
        assert!(!bin_size.is_null(), "diffusion bin size must be non-zero");
        let nx = ((extents.width() + bin_size.w - 1) / bin_size.w).max(1) as usize;
        let ny = ((extents.height() + bin_size.h - 1) / bin_size.h).max(1) as usize;
        debug!("diffusion grid: {}x{} bins of {}x{} nm", nx, ny, bin_size.w, bin_size.h);

        Self {
            extents,
            bin_size,
            nx,
            ny,
            wall_density,
            density: Array2::zeros((nx, ny)),
            next_density: Array2::zeros((nx, ny)),
            vel_x: Array2::zeros((nx, ny)),
            vel_y: Array2::zeros((nx, ny)),
        }
    }

    pub fn bin_count(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    /// Density with the wall rule applied outside the grid.
    pub fn density_at(&self, x: isize, y: isize) -> f64 {
        if x < 0 || y < 0 || x >= self.nx as isize || y >= self.ny as isize {
            self.wall_density
        } else {
            self.density[[x as usize, y as usize]]
        }
    }

    fn velocity_at(&self, x: isize, y: isize) -> (f64, f64) {
        if x < 0 || y < 0 || x >= self.nx as isize || y >= self.ny as isize {
            (0.0, 0.0)
        } else {
            let i = [x as usize, y as usize];
            (self.vel_x[i], self.vel_y[i])
        }
    }

    /// Rebuild the density map from the cell positions, distributing each
    /// cell's area over the bins it overlaps.
    pub fn splat(&mut self, netlist: &PlacerNetlist) {
        self.density.fill(0.0);
        let bin_area = self.bin_size.area() as f64;

        for node in &netlist.nodes {
            let rect = Rect64::from_size(node.pos, node.size);
            if rect.size().is_null() {
                continue;
            }

            let x0 = ((rect.ll.x - self.extents.ll.x) / self.bin_size.w)
                .clamp(0, self.nx as i64 - 1);
            let x1 = ((rect.ur.x - 1 - self.extents.ll.x) / self.bin_size.w)
                .clamp(0, self.nx as i64 - 1);
            let y0 = ((rect.ll.y - self.extents.ll.y) / self.bin_size.h)
                .clamp(0, self.ny as i64 - 1);
            let y1 = ((rect.ur.y - 1 - self.extents.ll.y) / self.bin_size.h)
                .clamp(0, self.ny as i64 - 1);

            for by in y0..=y1 {
                for bx in x0..=x1 {
                    let bin_ll = Coord64::new(
                        self.extents.ll.x + bx * self.bin_size.w,
                        self.extents.ll.y + by * self.bin_size.h,
                    );
                    let bin_rect = Rect64::from_size(bin_ll, self.bin_size);
                    let overlap = bin_rect.overlap_area(&rect) as f64;
                    self.density[[bx as usize, by as usize]] += overlap / bin_area;
                }
            }
        }
    }

    /// Velocity from the centered density gradient:
    /// `v_x = (d(x−1) − d(x+1)) / (2 d)`, zero in low-density bins and on
    /// the grid border.
    pub fn compute_velocities(&mut self) {
        for y in 0..self.ny {
            for x in 0..self.nx {
                let border = x == 0 || y == 0 || x == self.nx - 1 || y == self.ny - 1;
                let center = self.density[[x, y]];
                let i = [x, y];
                if border || center < 0.1 {
                    self.vel_x[i] = 0.0;
                    self.vel_y[i] = 0.0;
                    continue;
                }
                let (x, y) = (x as isize, y as isize);
                self.vel_x[i] =
                    (self.density_at(x - 1, y) - self.density_at(x + 1, y)) / (2.0 * center);
                self.vel_y[i] =
                    (self.density_at(x, y - 1) - self.density_at(x, y + 1)) / (2.0 * center);
            }
        }
    }

    /// One forward-time centered-space diffusion step of the density
    /// field itself.
    pub fn step_density(&mut self, dt: f64) {
        for y in 0..self.ny {
            for x in 0..self.nx {
                let (xi, yi) = (x as isize, y as isize);
                let center = self.density[[x, y]];
                let h_delta =
                    self.density_at(xi - 1, yi) + self.density_at(xi + 1, yi) - 2.0 * center;
                let v_delta =
                    self.density_at(xi, yi - 1) + self.density_at(xi, yi + 1) - 2.0 * center;
                self.next_density[[x, y]] = center + (dt / 2.0) * (h_delta + v_delta);
            }
        }
        std::mem::swap(&mut self.density, &mut self.next_density);
    }

    /// Move every movable cell along the bilinearly interpolated velocity
    /// field: `pos += Δt · v · bin_size`.
    pub fn advect(&self, netlist: &mut PlacerNetlist, dt: f64) {
        let mut clamped = 0usize;

        for node in netlist.nodes.iter_mut().filter(|n| !n.fixed) {
            let center = node.center();
            // Fractional bin coordinate relative to bin centers.
            let fx =
                (center.x - self.extents.ll.x) as f64 / self.bin_size.w as f64 - 0.5;
            let fy =
                (center.y - self.extents.ll.y) as f64 / self.bin_size.h as f64 - 0.5;
            let x0 = fx.floor() as isize;
            let y0 = fy.floor() as isize;
            let xfrac = fx - x0 as f64;
            let yfrac = fy - y0 as f64;

            let (v00x, v00y) = self.velocity_at(x0, y0);
            let (v10x, v10y) = self.velocity_at(x0 + 1, y0);
            let (v01x, v01y) = self.velocity_at(x0, y0 + 1);
            let (v11x, v11y) = self.velocity_at(x0 + 1, y0 + 1);

            let lerp2 = |v00: f64, v10: f64, v01: f64, v11: f64| {
                let a = v00 * (1.0 - xfrac) + v10 * xfrac;
                let b = v01 * (1.0 - xfrac) + v11 * xfrac;
                a * (1.0 - yfrac) + b * yfrac
            };
            let vx = lerp2(v00x, v10x, v01x, v11x);
            let vy = lerp2(v00y, v10y, v01y, v11y);

            node.pos.x += (vx * dt * self.bin_size.w as f64).round() as i64;
            node.pos.y += (vy * dt * self.bin_size.h as f64).round() as i64;

            // Keep cells inside the placement extents.
            let max_x = self.extents.ur.x - node.size.w;
            let max_y = self.extents.ur.y - node.size.h;
            let old = node.pos;
            node.pos.x = node.pos.x.clamp(self.extents.ll.x, max_x.max(self.extents.ll.x));
            node.pos.y = node.pos.y.clamp(self.extents.ll.y, max_y.max(self.extents.ll.y));
            if node.pos != old {
                clamped += 1;
            }
        }

        if clamped > 0 {
            debug!("advection clamped {} cells to the placement boundary", clamped);
        }
    }

    pub fn max_density(&self) -> f64 {
        self.density.iter().cloned().fold(0.0, f64::max)
    }

    /// Row-major copy of the density field for debug bitmap output.
    pub fn density_snapshot(&self) -> (usize, usize, Vec<f64>) {
        let mut data = Vec::with_capacity(self.nx * self.ny);
        for y in 0..self.ny {
            for x in 0..self.nx {
                data.push(self.density[[x, y]]);
            }
        }
        (self.nx, self.ny, data)
    }

    /// Run the spread loop until every bin is below the target density or
    /// the iteration budget runs out. Best effort: non-convergence is a
    /// warning, not an error.
    pub fn run(&mut self, netlist: &mut PlacerNetlist, config: &DiffusionConfig) -> DiffusionStats {
        let _span = tracing::info_span!("diffusion", bins = self.nx * self.ny).entered();

        self.splat(netlist);
        let mut stats = DiffusionStats {
            max_density: self.max_density(),
            ..Default::default()
        };

        for iteration in 0..config.max_iterations {
            if stats.max_density < config.target_density {
                stats.converged = true;
                break;
            }

            if iteration > 0 {
                if iteration % config.renew_interval.max(1) == 0 {
                    self.splat(netlist);
                } else {
                    self.step_density(config.delta_t);
                }
            }
            self.compute_velocities();
            self.advect(netlist, config.delta_t);

            stats.iterations = iteration + 1;
            stats.max_density = self.max_density();
        }

        if !stats.converged {
            // Re-check against the true positions before giving up.
            self.splat(netlist);
            stats.max_density = self.max_density();
            stats.converged = stats.max_density < config.target_density;
        }

        if stats.converged {
            debug!(
                "diffusion converged after {} iterations (max density {:.3})",
                stats.iterations, stats.max_density
            );
        } else {
            warn!(
                "diffusion did not reach target density {:.2} within {} iterations (max density {:.3})",
                config.target_density, config.max_iterations, stats.max_density
            );
        }
        stats
    }
}
