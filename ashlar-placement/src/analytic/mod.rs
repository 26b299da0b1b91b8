//! Quadratic wirelength placement.
//!
//! The placement minimizes the weighted quadratic error
//!
//! $$
//!   min_x \sum_e w_e (x_i - x_j)^2
//! $$
//!
//! over a star-decomposed net model, which reduces to two independent
//! sparse linear solves `A x = b_x` and `A y = b_y`. A two-endpoint net
//! contributes a single edge; a net with `k ≥ 3` endpoints is joined
//! through an auxiliary star row with per-edge weight `w / (k − 1)`.

use anyhow::{bail, ensure, Result};
use ashlar_common::algebra::{cg_solve, ComputeInfo, JacobiPreconditioner, SparseMatrix};
use ashlar_common::database::{Design, InstanceKind, ModuleKey, PlacementState, RegionKey};
use ashlar_common::geometry::Coord64;
use log::{debug, info, warn};
use ndarray::Array1;

use crate::net_model::PlacerNetlist;

#[cfg(test)]
mod tests;

/// Knobs of the quadratic formulation. The defaults reproduce the
/// observed production values; they are deliberately not re-derived.
#[derive(Clone, Debug)]
pub struct PlacerTunables {
    /// Extra scale on connections to pad/pin anchors.
    pub pad_weight: f64,
    /// Multiplier on fixed-node terms, pulling movable cells apart
    /// toward their fixed anchors.
    pub fixed_weight: f64,
    /// Nets with more endpoints than this are skipped with a warning.
    pub max_net_size: usize,
    /// Relative CG tolerance.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for PlacerTunables {
    fn default() -> Self {
        Self {
            pad_weight: 1.0,
            fixed_weight: 10.0,
            max_net_size: 30,
            tolerance: 1.0e-2,
            max_iterations: 500,
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct SolveStats {
    pub rows: usize,
    pub stars: usize,
    pub skipped_nets: usize,
    pub x: ComputeInfo,
    pub y: ComputeInfo,
}

pub struct AnalyticPlacer {
    tunables: PlacerTunables,
}

impl AnalyticPlacer {
    pub fn new(tunables: PlacerTunables) -> Self {
        Self { tunables }
    }

    /// Solve the quadratic placement for `netlist` and store the result
    /// as node centers. Fixed nodes are never moved.
    pub fn solve(&self, netlist: &mut PlacerNetlist) -> Result<SolveStats> {
        let _span = tracing::info_span!("analytic_solve", nodes = netlist.nodes.len()).entered();

        // Movable nodes take the first rows of the system, star nodes are
        // appended behind them.
        let mut row_of_node: Vec<Option<usize>> = vec![None; netlist.nodes.len()];
        let mut row_count = 0usize;
        for (id, node) in netlist.nodes.iter().enumerate() {
            if !node.fixed {
                row_of_node[id] = Some(row_count);
                row_count += 1;
            }
        }
        if row_count == 0 {
            bail!("nothing to place: every node is fixed");
        }

        let mut mat = SparseMatrix::new(row_count);
        let mut bx = vec![0.0f64; row_count];
        let mut by = vec![0.0f64; row_count];
        let fixed_scale = self.tunables.fixed_weight * self.tunables.pad_weight;

        let mut stars = 0usize;
        let mut skipped = 0usize;

        for net in &netlist.nets {
            let k = net.nodes.len();
            if k < 2 {
                continue;
            }
            let movable = net
                .nodes
                .iter()
                .filter(|&&n| !netlist.nodes[n].fixed)
                .count();
            if movable == 0 {
                continue;
            }
            if k > self.tunables.max_net_size {
                skipped += 1;
                continue;
            }

            let weight = net.weight / (k - 1) as f64;
            if k == 2 {
                let a = net.nodes[0];
                let b = net.nodes[1];
                self.add_edge(
                    &mut mat,
                    &mut bx,
                    &mut by,
                    &row_of_node,
                    netlist,
                    a,
                    b,
                    weight,
                    fixed_scale,
                );
            } else {
                // Star decomposition: one auxiliary row joined to every
                // endpoint.
                let star_row = row_count + stars;
                stars += 1;
                if bx.len() <= star_row {
                    bx.resize(star_row + 1, 0.0);
                    by.resize(star_row + 1, 0.0);
                }
                for &endpoint in &net.nodes {
                    let node = &netlist.nodes[endpoint];
                    if node.fixed {
                        let p = node.center();
                        mat.add(star_row, star_row, weight * fixed_scale);
                        bx[star_row] += weight * fixed_scale * p.x as f64;
                        by[star_row] += weight * fixed_scale * p.y as f64;
                    } else {
                        let row = row_of_node[endpoint].expect("movable node without a row");
                        mat.add(row, row, weight);
                        mat.add(star_row, star_row, weight);
                        mat.add(row, star_row, -weight);
                        mat.add(star_row, row, -weight);
                    }
                }
            }
        }

        let system_rows = row_count + stars;
        mat.resize(system_rows);
        bx.resize(system_rows, 0.0);
        by.resize(system_rows, 0.0);

        if skipped > 0 {
            warn!(
                "quadratic placement skipped {} nets above {} endpoints",
                skipped, self.tunables.max_net_size
            );
        }
        debug!(
            "quadratic system: {} rows ({} movable, {} stars)",
            system_rows, row_count, stars
        );

        let bx = Array1::from(bx);
        let by = Array1::from(by);
        let mut x = Array1::zeros(system_rows);
        let mut y = Array1::zeros(system_rows);

        let precon = JacobiPreconditioner::new(&mat);
        let info_x = tracing::info_span!("solve_x").in_scope(|| {
            cg_solve(
                &mat,
                &bx,
                &mut x,
                &precon,
                self.tunables.tolerance,
                self.tunables.max_iterations,
            )
        });
        let info_y = tracing::info_span!("solve_y").in_scope(|| {
            cg_solve(
                &mat,
                &by,
                &mut y,
                &precon,
                self.tunables.tolerance,
                self.tunables.max_iterations,
            )
        });
        debug!(
            "CG x: {} iterations (error {:.3e}); y: {} iterations (error {:.3e})",
            info_x.iterations, info_x.error, info_y.iterations, info_y.error
        );

        for (id, row) in row_of_node.iter().enumerate() {
            let Some(row) = row else { continue };
            netlist.nodes[id]
                .set_center(Coord64::new(x[*row].round() as i64, y[*row].round() as i64));
        }

        Ok(SolveStats {
            rows: row_count,
            stars,
            skipped_nets: skipped,
            x: info_x,
            y: info_y,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn add_edge(
        &self,
        mat: &mut SparseMatrix,
        bx: &mut [f64],
        by: &mut [f64],
        row_of_node: &[Option<usize>],
        netlist: &PlacerNetlist,
        a: usize,
        b: usize,
        weight: f64,
        fixed_scale: f64,
    ) {
        let node_a = &netlist.nodes[a];
        let node_b = &netlist.nodes[b];

        match (node_a.fixed, node_b.fixed) {
            (false, false) => {
                let ra = row_of_node[a].expect("movable node without a row");
                let rb = row_of_node[b].expect("movable node without a row");
                mat.add(ra, ra, weight);
                mat.add(rb, rb, weight);
                mat.add(ra, rb, -weight);
                mat.add(rb, ra, -weight);
            }
            (false, true) => {
                let ra = row_of_node[a].expect("movable node without a row");
                let p = node_b.center();
                mat.add(ra, ra, weight * fixed_scale);
                bx[ra] += weight * fixed_scale * p.x as f64;
                by[ra] += weight * fixed_scale * p.y as f64;
            }
            (true, false) => {
                let rb = row_of_node[b].expect("movable node without a row");
                let p = node_a.center();
                mat.add(rb, rb, weight * fixed_scale);
                bx[rb] += weight * fixed_scale * p.x as f64;
                by[rb] += weight * fixed_scale * p.y as f64;
            }
            (true, true) => {
                // Both endpoints pinned, no degree of freedom.
            }
        }
    }
}

/// Run the quadratic placement for one module inside a floorplan region
/// and write the result back to the database.
pub fn place_module(
    design: &mut Design,
    module_key: ModuleKey,
    region_key: RegionKey,
    tunables: &PlacerTunables,
) -> Result<SolveStats> {
    let region = design
        .floorplan
        .regions
        .get(region_key)
        .ok_or_else(|| anyhow::anyhow!("place_module: stale region key"))?;
    let region_area = region.placement_rect().area();
    ensure!(
        region_area > 0,
        "cannot place into region {:?}: placement area is empty",
        region.name
    );

    // Pin placeholders anchor the system; they must be locked down first.
    let module = design
        .modules
        .get(module_key)
        .ok_or_else(|| anyhow::anyhow!("place_module: stale module key"))?;
    let mut total_area = 0i64;
    for (_, inst) in module.netlist.instances.iter() {
        if matches!(inst.kind, InstanceKind::Pin(_))
            && inst.placement != PlacementState::PlacedAndFixed
        {
            bail!(
                "pin instance {:?} has not been placed and fixed",
                inst.name
            );
        }
        total_area += design.instance_size(inst).area();
    }

    if total_area > region_area {
        warn!(
            "region {:?} is smaller than the total instance area",
            region.name
        );
    }
    info!(
        "utilization: {:.1}%",
        100.0 * total_area as f64 / region_area as f64
    );

    let mut netlist = PlacerNetlist::from_module(design, module_key)?;
    let placer = AnalyticPlacer::new(tunables.clone());
    let stats = placer.solve(&mut netlist)?;
    netlist.write_back(design, module_key)?;

    info!(
        "quadratic placement done: {} rows, {} stars, residual x {:.2e} / y {:.2e}",
        stats.rows, stats.stars, stats.x.error, stats.y.error
    );
    Ok(stats)
}
