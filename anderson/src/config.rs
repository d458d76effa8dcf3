use crate::error::{AccelErr, Result};

/// Validated parameters of an accelerated run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AndersonConfig {
    window: usize,
    max_iter: usize,
    rcond: f64,
}

impl AndersonConfig {
    /// The conditioning cap used when none is given, which never trims.
    pub const DEFAULT_RCOND: f64 = f64::INFINITY;

    /// Creates a new `AndersonConfig`.
    ///
    /// # Arguments
    /// * `window` - Maximum amount of past differences kept in the history.
    /// * `max_iter` - Amount of accelerated iterations to perform.
    /// * `rcond` - Upper bound for the condition number of the history.
    ///
    /// # Errors
    /// Fails when `window` or `max_iter` is zero, or when `rcond` is below 1 or NaN.
    pub fn new(window: usize, max_iter: usize, rcond: f64) -> Result<Self> {
        if window < 1 {
            return Err(AccelErr::InvalidWindow(window));
        }

        if max_iter < 1 {
            return Err(AccelErr::InvalidMaxIter(max_iter));
        }

        if !(rcond >= 1.0) {
            return Err(AccelErr::InvalidRcond(rcond));
        }

        Ok(Self {
            window,
            max_iter,
            rcond,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    pub fn rcond(&self) -> f64 {
        self.rcond
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_parameters() {
        assert_eq!(
            AndersonConfig::new(0, 10, 2.0),
            Err(AccelErr::InvalidWindow(0))
        );
        assert_eq!(
            AndersonConfig::new(5, 0, 2.0),
            Err(AccelErr::InvalidMaxIter(0))
        );
        assert_eq!(
            AndersonConfig::new(5, 10, 0.5),
            Err(AccelErr::InvalidRcond(0.5))
        );
        assert!(AndersonConfig::new(5, 10, f64::NAN).is_err());
    }

    #[test]
    fn accepts_unbounded_rcond() {
        let config = AndersonConfig::new(1, 1, AndersonConfig::DEFAULT_RCOND).unwrap();
        assert_eq!(config.window(), 1);
        assert_eq!(config.max_iter(), 1);
        assert!(config.rcond().is_infinite());
    }
}
