//! Incrementally updated QR factorizations.
//!
//! The accelerator only ever touches its history through [`Factorization`],
//! so a different linear algebra backend can be dropped in by implementing
//! the trait. [`GivensQr`] keeps a full orthogonal `Q` and restores the upper
//! triangular shape of `R` with Givens rotations after every update.

use std::cmp::Ordering;

use nalgebra::{DMatrix, DVector};

/// A QR factorization `A = Q·R` of an `nrows × ncols` matrix that can be
/// updated in place when `A` gains or loses a row or a column.
///
/// # Panics
/// Update methods panic when the index is out of range or the vector length
/// does not match the corresponding dimension of `A`.
pub trait Factorization {
    /// The factorization of the `nrows × ncols` zero matrix.
    fn zeros(nrows: usize, ncols: usize) -> Self
    where
        Self: Sized;

    fn nrows(&self) -> usize;

    fn ncols(&self) -> usize;

    /// The orthogonal factor.
    fn q(&self) -> &DMatrix<f64>;

    /// The upper triangular (or trapezoidal) factor.
    fn r(&self) -> &DMatrix<f64>;

    /// Inserts `col` so that it becomes column `idx` of `A`.
    fn insert_column(&mut self, idx: usize, col: &DVector<f64>);

    /// Removes column `idx` of `A`.
    fn delete_column(&mut self, idx: usize);

    /// Inserts `row` so that it becomes row `idx` of `A`.
    fn insert_row(&mut self, idx: usize, row: &DVector<f64>);

    /// Removes row `idx` of `A`.
    fn delete_row(&mut self, idx: usize);

    /// Multiplies the factors back into `A`.
    fn reconstruct(&self) -> DMatrix<f64> {
        self.q() * self.r()
    }
}

/// Computes the rotation `(c, s)` mapping `(a, b)` onto `(hypot(a, b), 0)`.
///
/// Returns `None` when `b` already is zero.
fn givens(a: f64, b: f64) -> Option<(f64, f64)> {
    if b == 0.0 {
        return None;
    }

    let h = a.hypot(b);
    Some((a / h, b / h))
}

/// Full QR factorization maintained with Givens rotations.
#[derive(Debug, Clone)]
pub struct GivensQr {
    q: DMatrix<f64>,
    r: DMatrix<f64>,
}

impl GivensQr {
    /// Rotates rows `p` and `t` of `R` and columns `p` and `t` of `Q`,
    /// leaving the product untouched.
    fn rotate(&mut self, p: usize, t: usize, (c, s): (f64, f64)) {
        for j in 0..self.r.ncols() {
            let (a, b) = (self.r[(p, j)], self.r[(t, j)]);
            self.r[(p, j)] = c * a + s * b;
            self.r[(t, j)] = c * b - s * a;
        }

        for i in 0..self.q.nrows() {
            let (a, b) = (self.q[(i, p)], self.q[(i, t)]);
            self.q[(i, p)] = c * a + s * b;
            self.q[(i, t)] = c * b - s * a;
        }
    }

    /// Zeroes `R[t, j]` against `R[t - 1, j]`.
    fn annihilate(&mut self, t: usize, j: usize) {
        if let Some(rot) = givens(self.r[(t - 1, j)], self.r[(t, j)]) {
            self.rotate(t - 1, t, rot);
        }
    }
}

impl Factorization for GivensQr {
    fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            q: DMatrix::identity(nrows, nrows),
            r: DMatrix::zeros(nrows, ncols),
        }
    }

    fn nrows(&self) -> usize {
        self.r.nrows()
    }

    fn ncols(&self) -> usize {
        self.r.ncols()
    }

    fn q(&self) -> &DMatrix<f64> {
        &self.q
    }

    fn r(&self) -> &DMatrix<f64> {
        &self.r
    }

    fn insert_column(&mut self, idx: usize, col: &DVector<f64>) {
        let (m, n) = self.r.shape();
        assert!(idx <= n, "column {idx} out of range for {n} columns");
        assert_eq!(col.len(), m, "column length must match the row count");

        let w = self.q.tr_mul(col);
        let r = &self.r;
        self.r = DMatrix::from_fn(m, n + 1, |i, j| match j.cmp(&idx) {
            Ordering::Less => r[(i, j)],
            Ordering::Equal => w[i],
            Ordering::Greater => r[(i, j - 1)],
        });

        for t in (idx + 1..m).rev() {
            self.annihilate(t, idx);
        }
    }

    fn delete_column(&mut self, idx: usize) {
        let (m, n) = self.r.shape();
        assert!(idx < n, "column {idx} out of range for {n} columns");

        let r = &self.r;
        self.r = DMatrix::from_fn(m, n - 1, |i, j| {
            if j < idx { r[(i, j)] } else { r[(i, j + 1)] }
        });

        // Columns right of `idx` now carry one subdiagonal entry each.
        for j in idx..(n - 1).min(m.saturating_sub(1)) {
            self.annihilate(j + 1, j);
        }
    }

    fn insert_row(&mut self, idx: usize, row: &DVector<f64>) {
        let (m, n) = self.r.shape();
        assert!(idx <= m, "row {idx} out of range for {m} rows");
        assert_eq!(row.len(), n, "row length must match the column count");

        // With the new row on top of `R` and a unit first column in `Q`
        // the product already equals the extended matrix.
        let q = &self.q;
        self.q = DMatrix::from_fn(m + 1, m + 1, |i, j| match (i.cmp(&idx), j) {
            (Ordering::Equal, 0) => 1.0,
            (Ordering::Equal, _) | (_, 0) => 0.0,
            (Ordering::Less, j) => q[(i, j - 1)],
            (Ordering::Greater, j) => q[(i - 1, j - 1)],
        });

        let r = &self.r;
        self.r = DMatrix::from_fn(m + 1, n, |i, j| {
            if i == 0 { row[j] } else { r[(i - 1, j)] }
        });

        // `R` is upper Hessenberg now.
        for j in 0..m.min(n) {
            self.annihilate(j + 1, j);
        }
    }

    fn delete_row(&mut self, idx: usize) {
        let (m, n) = self.r.shape();
        assert!(idx < m, "row {idx} out of range for {m} rows");

        // Rotate row `idx` of `Q` onto the first unit vector, after which the
        // first row of `R` only feeds the deleted row.
        for t in (1..m).rev() {
            if let Some(rot) = givens(self.q[(idx, t - 1)], self.q[(idx, t)]) {
                self.rotate(t - 1, t, rot);
            }
        }

        let q = &self.q;
        self.q = DMatrix::from_fn(m - 1, m - 1, |i, j| {
            let i = if i < idx { i } else { i + 1 };
            q[(i, j + 1)]
        });

        let r = &self.r;
        self.r = DMatrix::from_fn(m - 1, n, |i, j| r[(i + 1, j)]);
    }
}

/// The 2-norm condition number of `matrix`, the ratio of its extreme
/// singular values.
///
/// An empty matrix counts as perfectly conditioned. A rank deficient matrix,
/// or one holding non-finite entries, is infinitely ill-conditioned.
pub fn condition_number(matrix: &DMatrix<f64>) -> f64 {
    if matrix.is_empty() {
        return 1.0;
    }

    if matrix.iter().any(|v| !v.is_finite()) {
        return f64::INFINITY;
    }

    let sv = matrix.singular_values();
    let (max, min) = (sv.max(), sv.min());
    if min <= 0.0 { f64::INFINITY } else { max / min }
}
