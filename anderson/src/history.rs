use std::collections::VecDeque;

use log::{debug, warn};
use nalgebra::DVector;

use crate::qr::{Factorization, condition_number};

/// The bounded window of past differences an accelerated step combines.
///
/// `F_d` (residual differences) is only held through its factorizations,
/// one of `F_d` and one of its transpose, while `X_d` (position differences)
/// is kept as plain columns. Columns are ordered oldest to newest.
///
/// Once more than `window` pairs have been pushed, every push drops the
/// oldest column first, so a history narrowed by trimming stays narrow.
pub(crate) struct History<F: Factorization> {
    dim: usize,
    window: usize,
    rcond: f64,
    pushes: usize,
    primary: F,
    transposed: F,
    steps: VecDeque<DVector<f64>>,
}

impl<F: Factorization> History<F> {
    pub(crate) fn new(dim: usize, window: usize, rcond: f64) -> Self {
        Self {
            dim,
            window,
            rcond,
            pushes: 0,
            primary: F::zeros(dim, 0),
            transposed: F::zeros(0, dim),
            steps: VecDeque::with_capacity(window),
        }
    }

    pub(crate) fn width(&self) -> usize {
        self.steps.len()
    }

    #[cfg(test)]
    pub(crate) fn primary(&self) -> &F {
        &self.primary
    }

    #[cfg(test)]
    pub(crate) fn transposed(&self) -> &F {
        &self.transposed
    }

    /// The condition number of the residual difference matrix.
    pub(crate) fn condition(&self) -> f64 {
        condition_number(&self.primary.reconstruct())
    }

    /// Appends a new pair of differences, dropping the oldest one first when
    /// more than `window` pairs were pushed, then trims until the history is
    /// conditioned well enough.
    pub(crate) fn push(&mut self, df: &DVector<f64>, dx: DVector<f64>) {
        self.pushes += 1;
        if self.pushes > self.window && self.width() > 0 {
            self.drop_oldest();
        }

        let k = self.width();
        self.primary.insert_column(k, df);
        self.transposed.insert_row(k, df);
        self.steps.push_back(dx);

        self.trim();
    }

    fn drop_oldest(&mut self) {
        self.primary.delete_column(0);
        self.transposed.delete_row(0);
        self.steps.pop_front();
    }

    fn trim(&mut self) {
        let mut trimmed = 0;
        while self.width() > 0 {
            let cond = self.condition();
            if cond.is_finite() && cond <= self.rcond {
                break;
            }

            self.drop_oldest();
            trimmed += 1;
        }

        if trimmed > 0 {
            debug!(trimmed = trimmed, width = self.width(); "trimmed ill-conditioned history");
        }
    }

    /// Finds the weights `gamma` that best explain `f` as a combination of
    /// the residual differences.
    ///
    /// An over-determined history is solved in the least squares sense
    /// through the primary factorization, an under-determined one gets the
    /// minimum norm solution through the transposed factorization.
    pub(crate) fn solve(&self, f: &DVector<f64>) -> DVector<f64> {
        let (n, k) = (self.dim, self.width());
        if k == 0 {
            return DVector::zeros(0);
        }

        let gamma = if n >= k {
            let q1 = self.primary.q().columns(0, k);
            let r1 = self.primary.r().view((0, 0), (k, k));
            r1.solve_upper_triangular(&q1.tr_mul(f))
        } else {
            let rt = self.transposed.r().rows(0, n).transpose();
            rt.solve_lower_triangular(f).map(|z| {
                let mut padded = DVector::zeros(k);
                padded.rows_mut(0, n).copy_from(&z);
                self.transposed.q() * padded
            })
        };

        gamma.unwrap_or_else(|| {
            warn!(width = k; "singular history, skipping the extrapolation");
            DVector::zeros(k)
        })
    }

    /// Computes `(X_d + F_d)·gamma`.
    pub(crate) fn correction(&self, gamma: &DVector<f64>) -> DVector<f64> {
        let mut out = self.primary.reconstruct() * gamma;
        for (dx, g) in self.steps.iter().zip(gamma.iter()) {
            out.axpy(*g, dx, 1.0);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;
    use crate::qr::GivensQr;

    fn random_vector(rng: &mut StdRng, len: usize) -> DVector<f64> {
        DVector::from_fn(len, |_, _| rng.random_range(-1.0..1.0))
    }

    #[test]
    fn width_and_conditioning_stay_bounded() {
        let mut rng = StdRng::seed_from_u64(3);
        let (n, window, rcond) = (6, 4, 25.0);
        let mut history = History::<GivensQr>::new(n, window, rcond);

        for _ in 0..60 {
            let mut df = random_vector(&mut rng, n);
            // Every so often push an almost repeated direction.
            if rng.random_bool(0.3) && history.width() > 0 {
                let last = history.primary().reconstruct().column(history.width() - 1).into_owned();
                df = &last + df * 1e-6;
            }

            history.push(&df, random_vector(&mut rng, n));

            assert!(history.width() <= window);
            assert!(history.width() >= 1);
            assert!(history.condition() <= rcond * (1.0 + 1e-9));

            let fd = history.primary().reconstruct();
            let fdt = history.transposed().reconstruct();
            assert!((fd.transpose() - fdt).amax() < 1e-10);
        }
    }

    #[test]
    fn overdetermined_solve_satisfies_normal_equations() {
        let mut rng = StdRng::seed_from_u64(5);
        let n = 5;
        let mut history = History::<GivensQr>::new(n, 3, f64::INFINITY);
        for _ in 0..3 {
            history.push(&random_vector(&mut rng, n), random_vector(&mut rng, n));
        }

        let f = random_vector(&mut rng, n);
        let gamma = history.solve(&f);
        let fd = history.primary().reconstruct();

        assert_eq!(gamma.len(), 3);
        assert!(fd.tr_mul(&(&fd * &gamma - &f)).amax() < 1e-10);
    }

    #[test]
    fn underdetermined_solve_is_the_minimum_norm_fit() {
        let mut rng = StdRng::seed_from_u64(9);
        let n = 2;
        let mut history = History::<GivensQr>::new(n, 4, f64::INFINITY);
        for _ in 0..4 {
            history.push(&random_vector(&mut rng, n), random_vector(&mut rng, n));
        }

        assert_eq!(history.width(), 4);

        let f = random_vector(&mut rng, n);
        let gamma = history.solve(&f);
        let fd: DMatrix<f64> = history.primary().reconstruct();

        assert!((&fd * &gamma - &f).amax() < 1e-10);

        // The minimum norm solution lies in the row space of `F_d`.
        let z = (&fd * fd.transpose())
            .lu()
            .solve(&f)
            .expect("F_d has full row rank");
        assert!((fd.tr_mul(&z) - &gamma).amax() < 1e-10);
    }

    #[test]
    fn repeated_difference_is_trimmed_away() {
        let mut history = History::<GivensQr>::new(3, 5, 1e6);
        let df = DVector::from_vec(vec![1.0, 2.0, 3.0]);

        history.push(&df, DVector::zeros(3));
        history.push(&df, DVector::zeros(3));

        assert_eq!(history.width(), 1);

        history.push(&DVector::zeros(3), DVector::zeros(3));
        assert_eq!(history.width(), 0);
        assert_eq!(history.solve(&df).len(), 0);
    }

    #[test]
    fn trimmed_history_does_not_grow_back() {
        let e1 = DVector::from_vec(vec![1.0, 0.0, 0.0]);
        let e2 = DVector::from_vec(vec![0.0, 1.0, 0.0]);
        let e3 = DVector::from_vec(vec![0.0, 0.0, 1.0]);
        let mut history = History::<GivensQr>::new(3, 2, 1e6);

        history.push(&e1, DVector::zeros(3));
        history.push(&e1, DVector::zeros(3));
        assert_eq!(history.width(), 1);

        // Past the window every push replaces the oldest column.
        history.push(&e2, DVector::zeros(3));
        assert_eq!(history.width(), 1);
        let fd = history.primary().reconstruct();
        assert!((fd.column(0).into_owned() - &e2).amax() < 1e-12);

        history.push(&e3, DVector::zeros(3));
        assert_eq!(history.width(), 1);
        let fd = history.primary().reconstruct();
        assert!((fd.column(0).into_owned() - &e3).amax() < 1e-12);
    }
}
