use ndarray::Array1;

use crate::error::AccelErr;

/// One evaluation of a fixed point map.
#[derive(Debug, Clone)]
pub struct Evaluation<R> {
    /// `g(x)`.
    pub value: Array1<f64>,
    /// Whatever side information the map produced along with `value`.
    pub report: R,
    /// Whether the map asks the iteration to stop at `x`.
    pub stopped: bool,
}

/// A map `g` whose fixed point is being searched for.
///
/// Evaluating the map may drive an arbitrary protocol, so `eval` is async
/// and fallible and the accelerator calls it exactly once per iteration.
#[allow(unused)]
#[trait_variant::make(FixedPointMap: Send)]
pub trait FixedPointMapTemplate {
    type Report: Send;
    type Error: From<AccelErr> + Send;

    /// Evaluates the map at `x`.
    ///
    /// # Arguments
    /// * `x` - The point to evaluate at.
    ///
    /// # Returns
    /// The evaluation, or the error that stopped the map from producing one.
    async fn eval(&mut self, x: &Array1<f64>) -> Result<Evaluation<Self::Report>, Self::Error>;

    /// Whether the `stopped` flag of the evaluations is meaningful.
    ///
    /// Maps signalling stops get checked after every evaluation and are
    /// evaluated once more at the final point of a run.
    fn signals_stop(&self) -> bool {
        false
    }
}

/// A plain function used as a fixed point map, it never stops on its own.
pub struct FnMap<G>(pub G);

impl<G> FixedPointMap for FnMap<G>
where
    G: FnMut(&Array1<f64>) -> Array1<f64> + Send,
{
    type Report = ();
    type Error = AccelErr;

    async fn eval(&mut self, x: &Array1<f64>) -> Result<Evaluation<()>, AccelErr> {
        Ok(Evaluation {
            value: (self.0)(x),
            report: (),
            stopped: false,
        })
    }
}
