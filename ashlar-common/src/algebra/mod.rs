//! Sparse linear algebra for the analytical placer: a row-sorted sparse
//! matrix and a preconditioned conjugate-gradient solver over dense
//! [`ndarray`] vectors.

use ndarray::Array1;

#[cfg(test)]
mod tests;

/// One stored entry of a sparse-matrix row.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RowEntry {
    pub col: usize,
    pub value: f64,
}

/// Square sparse matrix with per-row `(col, value)` pairs kept sorted by
/// column. Write access through [`SparseMatrix::entry_mut`] creates a zero
/// entry on demand; reads never allocate.
#[derive(Clone, Debug, Default)]
pub struct SparseMatrix {
    rows: Vec<Vec<RowEntry>>,
    entries: usize,
}

impl SparseMatrix {
    pub fn new(row_count: usize) -> Self {
        Self {
            rows: vec![Vec::new(); row_count],
            entries: 0,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of stored (possibly zero-valued) entries.
    pub fn nonzero_count(&self) -> usize {
        self.entries
    }

    pub fn resize(&mut self, row_count: usize) {
        self.rows.resize(row_count, Vec::new());
    }

    /// Read the entry at `(row, col)`. Absent entries, including rows that
    /// were never touched, read as `None`.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        let entries = self.rows.get(row)?;
        entries
            .binary_search_by(|e| e.col.cmp(&col))
            .ok()
            .map(|idx| entries[idx].value)
    }

    /// Mutable access to the entry at `(row, col)`, creating a zero entry
    /// (and growing the matrix) when absent.
    pub fn entry_mut(&mut self, row: usize, col: usize) -> &mut f64 {
        if row >= self.rows.len() {
            self.rows.resize(row + 1, Vec::new());
        }
        let entries = &mut self.rows[row];
        let idx = match entries.binary_search_by(|e| e.col.cmp(&col)) {
            Ok(idx) => idx,
            Err(idx) => {
                entries.insert(idx, RowEntry { col, value: 0.0 });
                self.entries += 1;
                idx
            }
        };
        &mut entries[idx].value
    }

    /// Add `value` to the entry at `(row, col)`.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        *self.entry_mut(row, col) += value;
    }

    /// Number of stored entries in `row`; `None` for rows out of range.
    pub fn row_entry_count(&self, row: usize) -> Option<usize> {
        self.rows.get(row).map(|r| r.len())
    }

    /// Visit every stored entry in row-major order; columns within a row
    /// come out ascending.
    pub fn for_each_entry(&self, mut f: impl FnMut(usize, usize, f64)) {
        for (row, entries) in self.rows.iter().enumerate() {
            for e in entries {
                f(row, e.col, e.value);
            }
        }
    }

    /// Matrix-vector product `A·x`.
    pub fn mul_vec(&self, x: &Array1<f64>) -> Array1<f64> {
        debug_assert_eq!(self.row_count(), x.len());
        let mut result = Array1::zeros(x.len());
        for (row, entries) in self.rows.iter().enumerate() {
            let mut sum = 0.0;
            for e in entries {
                sum += e.value * x[e.col];
            }
            result[row] = sum;
        }
        result
    }

    /// The matrix diagonal as a dense vector; absent diagonal entries read
    /// as zero.
    pub fn diagonal(&self) -> Array1<f64> {
        Array1::from_iter((0..self.row_count()).map(|i| self.get(i, i).unwrap_or(0.0)))
    }
}

/// Result of an iterative solve. The solver never fails; the caller
/// decides whether the residual is acceptable.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ComputeInfo {
    pub iterations: usize,
    /// Relative residual ‖r‖ / ‖b‖ at exit.
    pub error: f64,
}

/// Approximation of `M⁻¹` applied to a vector.
pub trait Preconditioner {
    fn apply(&self, v: &Array1<f64>) -> Array1<f64>;
}

/// No preconditioning; mostly for debugging and comparison tests.
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, v: &Array1<f64>) -> Array1<f64> {
        v.clone()
    }
}

/// Jacobi (inverse diagonal) preconditioner. Near-zero diagonal entries
/// fall back to 1 so the preconditioner stays bounded.
pub struct JacobiPreconditioner {
    inv_diag: Array1<f64>,
}

impl JacobiPreconditioner {
    pub fn new(mat: &SparseMatrix) -> Self {
        let inv_diag = mat
            .diagonal()
            .mapv(|d| if d.abs() < 1.0e-10 { 1.0 } else { 1.0 / d });
        Self { inv_diag }
    }
}

impl Preconditioner for JacobiPreconditioner {
    fn apply(&self, v: &Array1<f64>) -> Array1<f64> {
        &self.inv_diag * v
    }
}

fn norm2(v: &Array1<f64>) -> f64 {
    v.dot(v)
}

/// Preconditioned conjugate-gradient solve of `A·x = b`, starting from the
/// value already in `x`.
///
/// `tolerance` bounds the relative residual ‖r‖/‖b‖. Convergence is not
/// guaranteed for matrices that are not symmetric positive definite; in
/// that case the returned [`ComputeInfo`] simply reports the residual
/// after `max_iter` iterations.
pub fn cg_solve(
    mat: &SparseMatrix,
    rhs: &Array1<f64>,
    x: &mut Array1<f64>,
    precon: &impl Preconditioner,
    tolerance: f64,
    max_iter: usize,
) -> ComputeInfo {
    let n = mat.row_count();
    debug_assert_eq!(rhs.len(), n);
    debug_assert_eq!(x.len(), n);

    let mut residual = rhs - &mat.mul_vec(x);

    // Trivial solution for an (almost) zero right-hand side.
    let rhs_l2 = norm2(rhs);
    if rhs_l2 < 1.0e-20 {
        x.fill(0.0);
        return ComputeInfo {
            iterations: 0,
            error: 0.0,
        };
    }

    let threshold = (tolerance * tolerance * rhs_l2).max(f64::MIN_POSITIVE);
    let mut residual_l2 = norm2(&residual);
    if residual_l2 < threshold {
        return ComputeInfo {
            iterations: 0,
            error: (residual_l2 / rhs_l2).sqrt(),
        };
    }

    let mut p = precon.apply(&residual);
    let mut rho_new = residual.dot(&p);

    let mut iteration = 0;
    while iteration < max_iter {
        let q = mat.mul_vec(&p);

        let p_dot_q = p.dot(&q);
        if p_dot_q.abs() < f64::MIN_POSITIVE {
            // Search direction collapsed; report what we have.
            break;
        }
        let alpha = rho_new / p_dot_q;
        x.scaled_add(alpha, &p);
        residual.scaled_add(-alpha, &q);

        residual_l2 = norm2(&residual);
        if residual_l2 < threshold {
            break;
        }

        let z = precon.apply(&residual);
        let rho_old = rho_new;
        rho_new = residual.dot(&z);
        let beta = rho_new / rho_old;
        p = z + beta * p;
        iteration += 1;
    }

    ComputeInfo {
        iterations: iteration,
        error: (residual_l2 / rhs_l2).sqrt(),
    }
}
