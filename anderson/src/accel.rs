use std::marker::PhantomData;

use log::{debug, trace};
use nalgebra::DVector;
use ndarray::Array1;

use crate::{
    config::AndersonConfig,
    error::AccelErr,
    history::History,
    map::{Evaluation, FixedPointMap},
    qr::{Factorization, GivensQr},
};

/// The result of an accelerated run.
#[derive(Debug, Clone)]
pub struct Accelerated<R> {
    /// The last accelerated point.
    pub x: Array1<f64>,
    /// The report of the last evaluation performed.
    pub report: R,
    /// How many times the map was evaluated.
    pub evaluations: usize,
    /// Whether the run ended because the map signalled a stop.
    pub stopped: bool,
}

/// Generalized Anderson acceleration of a fixed point map.
///
/// `F` is the factorization backend maintaining the history.
#[derive(Debug, Clone)]
pub struct Accelerator<F: Factorization = GivensQr> {
    config: AndersonConfig,
    _backend: PhantomData<F>,
}

impl<F: Factorization> Accelerator<F> {
    /// Creates a new `Accelerator`.
    ///
    /// # Arguments
    /// * `config` - The already validated run parameters.
    pub fn new(config: AndersonConfig) -> Self {
        Self {
            config,
            _backend: PhantomData,
        }
    }

    pub fn config(&self) -> &AndersonConfig {
        &self.config
    }

    /// Runs `config.max_iter()` accelerated iterations of `map` from `x0`.
    ///
    /// When the map signals stops the run returns as soon as an evaluation
    /// asks for it, the point returned being the one that was evaluated.
    /// Otherwise the final accelerated point is evaluated once more so the
    /// caller gets its report.
    ///
    /// # Errors
    /// Propagates the errors of `map`, and fails with a dimension mismatch
    /// when `map` returns a vector whose length differs from `x0`'s.
    pub async fn run<M>(
        &self,
        map: &mut M,
        x0: Array1<f64>,
    ) -> Result<Accelerated<M::Report>, M::Error>
    where
        M: FixedPointMap,
    {
        let n = x0.len();
        let stopping = map.signals_stop();
        let mut evaluations = 0;

        let first = evaluate(map, &x0, &mut evaluations).await?;
        if stopping && first.stopped {
            return Ok(Accelerated {
                x: x0,
                report: first.report,
                evaluations,
                stopped: true,
            });
        }

        let mut x_prev = to_dvector(&x0);
        let mut x = to_dvector(&first.value);
        let mut f_prev = &x - &x_prev;
        let mut report = first.report;
        let mut history = History::<F>::new(n, self.config.window(), self.config.rcond());

        for k in 1..=self.config.max_iter() {
            let current = to_array(&x);
            let eval = evaluate(map, &current, &mut evaluations).await?;
            if stopping && eval.stopped {
                debug!(iteration = k; "fixed point map signalled a stop");
                return Ok(Accelerated {
                    x: current,
                    report: eval.report,
                    evaluations,
                    stopped: true,
                });
            }

            report = eval.report;
            let f = to_dvector(&eval.value) - &x;

            history.push(&(&f - &f_prev), &x - &x_prev);
            let gamma = history.solve(&f);
            let next = &x + &f - history.correction(&gamma);

            trace!(iteration = k, width = history.width(); "accelerated step");
            x_prev = std::mem::replace(&mut x, next);
            f_prev = f;
        }

        let x = to_array(&x);
        if stopping {
            let last = evaluate(map, &x, &mut evaluations).await?;
            return Ok(Accelerated {
                x,
                report: last.report,
                evaluations,
                stopped: last.stopped,
            });
        }

        Ok(Accelerated {
            x,
            report,
            evaluations,
            stopped: false,
        })
    }
}

/// Accelerates `map` from `x0` with the default factorization backend.
pub async fn accelerate<M>(
    map: &mut M,
    x0: Array1<f64>,
    config: AndersonConfig,
) -> Result<Accelerated<M::Report>, M::Error>
where
    M: FixedPointMap,
{
    Accelerator::<GivensQr>::new(config).run(map, x0).await
}

async fn evaluate<M: FixedPointMap>(
    map: &mut M,
    x: &Array1<f64>,
    evaluations: &mut usize,
) -> Result<Evaluation<M::Report>, M::Error> {
    let eval = map.eval(x).await?;
    *evaluations += 1;

    if eval.value.len() != x.len() {
        return Err(AccelErr::DimensionMismatch {
            got: eval.value.len(),
            expected: x.len(),
        }
        .into());
    }

    Ok(eval)
}

fn to_dvector(x: &Array1<f64>) -> DVector<f64> {
    DVector::from_iterator(x.len(), x.iter().copied())
}

fn to_array(x: &DVector<f64>) -> Array1<f64> {
    x.iter().copied().collect()
}
