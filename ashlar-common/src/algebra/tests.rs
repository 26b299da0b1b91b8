use super::*;
use approx::assert_relative_eq;
use ndarray::array;

#[test]
fn sparse_set_get() {
    let mut mat = SparseMatrix::new(4);
    *mat.entry_mut(0, 3) = 7.0;
    *mat.entry_mut(2, 1) = -1.0;

    assert_eq!(mat.nonzero_count(), 2);
    assert_eq!(mat.get(0, 3), Some(7.0));
    assert_eq!(mat.get(2, 1), Some(-1.0));
    assert_eq!(mat.get(1, 1), None);
    assert_eq!(mat.get(5, 0), None);
}

#[test]
fn sparse_accumulate() {
    let mut mat = SparseMatrix::new(2);
    *mat.entry_mut(0, 0) = 3.0;
    *mat.entry_mut(1, 0) = 2.5;
    *mat.entry_mut(0, 1) = -1.0;
    *mat.entry_mut(1, 1) = mat.get(1, 0).unwrap() + mat.get(0, 1).unwrap();

    assert_eq!(mat.get(1, 1), Some(1.5));
}

#[test]
fn sparse_rows_iterate_in_column_order() {
    let mut mat = SparseMatrix::new(1);
    *mat.entry_mut(0, 9) = 9.0;
    *mat.entry_mut(0, 1) = 1.0;
    *mat.entry_mut(0, 4) = 4.0;

    let mut cols = Vec::new();
    mat.for_each_entry(|row, col, value| {
        assert_eq!(row, 0);
        assert_relative_eq!(value, col as f64);
        cols.push(col);
    });
    assert_eq!(cols, vec![1, 4, 9]);
}

#[test]
fn sparse_grows_on_write() {
    let mut mat = SparseMatrix::new(1);
    *mat.entry_mut(3, 0) = 1.0;
    assert_eq!(mat.row_count(), 4);
    assert_eq!(mat.row_entry_count(3), Some(1));
    assert_eq!(mat.row_entry_count(4), None);
}

#[test]
fn mat_vec_multiply() {
    // | 1 2 | |1|   | 5|
    // | 3 4 | |2| = |11|
    let mut mat = SparseMatrix::new(2);
    *mat.entry_mut(0, 0) = 1.0;
    *mat.entry_mut(0, 1) = 2.0;
    *mat.entry_mut(1, 0) = 3.0;
    *mat.entry_mut(1, 1) = 4.0;

    let y = mat.mul_vec(&array![1.0, 2.0]);
    assert_relative_eq!(y[0], 5.0);
    assert_relative_eq!(y[1], 11.0);
}

#[test]
fn cg_identity_is_trivial() {
    let mut mat = SparseMatrix::new(3);
    for i in 0..3 {
        *mat.entry_mut(i, i) = 1.0;
    }
    let b = array![1.0, 2.0, 3.0];
    let mut x = Array1::zeros(3);

    let info = cg_solve(&mat, &b, &mut x, &IdentityPreconditioner, 1.0e-6, 100);

    assert!(info.iterations <= 3);
    assert!(info.error < 1.0e-6);
    assert_relative_eq!(x[0], 1.0, epsilon = 1e-6);
    assert_relative_eq!(x[1], 2.0, epsilon = 1e-6);
    assert_relative_eq!(x[2], 3.0, epsilon = 1e-6);
}

#[test]
fn cg_zero_rhs_returns_zero() {
    let mut mat = SparseMatrix::new(2);
    *mat.entry_mut(0, 0) = 4.0;
    *mat.entry_mut(1, 1) = 2.0;
    let b = Array1::zeros(2);
    let mut x = array![5.0, -3.0];

    let info = cg_solve(&mat, &b, &mut x, &IdentityPreconditioner, 1.0e-6, 100);

    assert_eq!(info.iterations, 0);
    assert_relative_eq!(info.error, 0.0);
    assert_relative_eq!(x[0], 0.0);
    assert_relative_eq!(x[1], 0.0);
}

#[test]
fn cg_spd_system_converges() {
    // SPD 2x2 with a known solution: A = [[4, 1], [1, 3]], b = (1, 2),
    // x = (1/11, 7/11).
    let mut mat = SparseMatrix::new(2);
    *mat.entry_mut(0, 0) = 4.0;
    *mat.entry_mut(0, 1) = 1.0;
    *mat.entry_mut(1, 0) = 1.0;
    *mat.entry_mut(1, 1) = 3.0;
    let b = array![1.0, 2.0];
    let mut x = Array1::zeros(2);

    let info = cg_solve(&mat, &b, &mut x, &JacobiPreconditioner::new(&mat), 1.0e-8, 10);

    assert!(info.error < 1.0e-8, "residual {} too large", info.error);
    assert!(info.iterations <= 10);
    assert_relative_eq!(x[0], 1.0 / 11.0, epsilon = 1e-6);
    assert_relative_eq!(x[1], 7.0 / 11.0, epsilon = 1e-6);
}

#[test]
fn cg_small_general_system_terminates() {
    // Not symmetric, so no convergence guarantee; the solver must still
    // terminate and report its residual instead of failing.
    let mut mat = SparseMatrix::new(2);
    *mat.entry_mut(0, 0) = 1.0;
    *mat.entry_mut(0, 1) = 2.0;
    *mat.entry_mut(1, 0) = 3.0;
    *mat.entry_mut(1, 1) = 5.0;
    let b = array![1.0, 2.0];
    let mut x = Array1::zeros(2);

    let info = cg_solve(&mat, &b, &mut x, &IdentityPreconditioner, 1.0e-5, 10);

    assert!(info.iterations <= 10);
    assert!(info.error.is_finite());
    assert!(x.iter().all(|v| v.is_finite()));
}

#[test]
fn jacobi_guards_small_diagonals() {
    let mut mat = SparseMatrix::new(2);
    *mat.entry_mut(0, 0) = 2.0;
    // Row 1 diagonal left absent (reads as zero).
    *mat.entry_mut(1, 0) = 1.0;

    let precon = JacobiPreconditioner::new(&mat);
    let z = precon.apply(&array![2.0, 3.0]);

    assert_relative_eq!(z[0], 1.0);
    // Guarded entry substitutes 1.0 for the inverse diagonal.
    assert_relative_eq!(z[1], 3.0);
}

#[test]
fn cg_placement_like_chain() {
    // A 1-D chain of 3 movable nodes between fixed anchors at 0 and 40:
    //   A = tridiag(-1, 2, -1), b = (0, 0, 40). Solution is the even
    //   spread (10, 20, 30).
    let mut mat = SparseMatrix::new(3);
    for i in 0..3 {
        *mat.entry_mut(i, i) = 2.0;
    }
    *mat.entry_mut(0, 1) = -1.0;
    *mat.entry_mut(1, 0) = -1.0;
    *mat.entry_mut(1, 2) = -1.0;
    *mat.entry_mut(2, 1) = -1.0;
    let b = array![0.0, 0.0, 40.0];
    let mut x = Array1::zeros(3);

    let info = cg_solve(&mat, &b, &mut x, &JacobiPreconditioner::new(&mat), 1.0e-9, 50);

    assert!(info.error < 1.0e-8);
    assert_relative_eq!(x[0], 10.0, epsilon = 1e-5);
    assert_relative_eq!(x[1], 20.0, epsilon = 1e-5);
    assert_relative_eq!(x[2], 30.0, epsilon = 1e-5);
}
