use log::trace;

use crate::{
    arch::LayerParameters,
    error::{LayerErr, Result},
};

/// The states of a `ParamsErrorsAccumulator`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccumulatorState {
    Idle,
    Accumulating,
    ReadyToUpdate,
}

/// Sums the parameter gradients of many layer instances so they can be averaged.
#[derive(Debug)]
pub struct ParamsErrorsAccumulator<P> {
    errors: Option<P>,
    count: usize,
    averaged: bool,
}

impl<P> Default for ParamsErrorsAccumulator<P> {
    fn default() -> Self {
        Self {
            errors: None,
            count: 0,
            averaged: false,
        }
    }
}

impl<P: LayerParameters> ParamsErrorsAccumulator<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AccumulatorState {
        match (&self.errors, self.averaged) {
            (None, _) => AccumulatorState::Idle,
            (Some(_), false) => AccumulatorState::Accumulating,
            (Some(_), true) => AccumulatorState::ReadyToUpdate,
        }
    }

    /// The amount of bundles accumulated since the last reset.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The running total, or the average once `average_errors` was called.
    pub fn errors(&self) -> Option<&P> {
        self.errors.as_ref()
    }

    /// Adds a bundle of gradients to the running total, copying it if it's the first one.
    ///
    /// # Returns
    /// An `IncompatibleParameters` error if `params_errors` doesn't match the bundles accumulated
    /// so far.
    pub fn accumulate(&mut self, params_errors: &P) -> Result<()> {
        match self.errors.as_mut() {
            Some(errors) => {
                errors.check_compatible(params_errors)?;
                Self::unaverage(errors, &mut self.averaged, self.count);
                errors.assign_sum(params_errors)?;
            }
            None => self.errors = Some(params_errors.clone()),
        }

        self.count += 1;
        trace!(count = self.count; "Accumulated parameter errors");
        Ok(())
    }

    /// Same as `accumulate` but takes ownership of the bundle, avoiding the first copy.
    pub fn accumulate_owned(&mut self, params_errors: P) -> Result<()> {
        if self.errors.is_some() {
            return self.accumulate(&params_errors);
        }

        self.errors = Some(params_errors);
        self.count = 1;
        trace!(count = self.count; "Accumulated parameter errors");
        Ok(())
    }

    /// Divides the running total by the amount of accumulated bundles.
    ///
    /// Calling it again without accumulating in between doesn't divide twice.
    ///
    /// # Returns
    /// The averaged gradients or an `UninitializedState` error if nothing was accumulated.
    pub fn average_errors(&mut self) -> Result<&P> {
        let count = self.count;
        let errors = self.errors.as_mut().ok_or(LayerErr::UninitializedState {
            what: "the accumulated errors",
        })?;

        if !self.averaged {
            errors.scale(1. / count as f64);
            self.averaged = true;
        }

        Ok(errors)
    }

    /// Drops the running total and goes back to `Idle`.
    pub fn reset(&mut self) {
        self.errors = None;
        self.count = 0;
        self.averaged = false;
    }

    fn unaverage(errors: &mut P, averaged: &mut bool, count: usize) {
        if *averaged {
            errors.scale(count as f64);
            *averaged = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::LinearParams;

    fn bundle(w: f64, b: f64) -> LinearParams {
        let mut params = LinearParams::new(2, 1).unwrap();
        params.weights.values_mut().fill(w);
        params.biases.values_mut().fill(b);
        params
    }

    #[test]
    fn single_bundle_averages_to_itself() {
        let g = bundle(0.3, -1.2);
        let mut accumulator = ParamsErrorsAccumulator::new();

        accumulator.accumulate(&g).unwrap();
        let averaged = accumulator.average_errors().unwrap();

        assert_eq!(averaged.weights.values(), g.weights.values());
        assert_eq!(averaged.biases.values(), g.biases.values());
    }

    #[test]
    fn two_bundles_average_element_wise() {
        let mut accumulator = ParamsErrorsAccumulator::new();
        accumulator.accumulate(&bundle(1., 2.)).unwrap();
        accumulator.accumulate_owned(bundle(3., -4.)).unwrap();

        assert_eq!(accumulator.count(), 2);
        let averaged = accumulator.average_errors().unwrap();

        assert!(averaged.weights.values().iter().all(|&v| v == 2.));
        assert!(averaged.biases.values().iter().all(|&v| v == -1.));
    }

    #[test]
    fn states_follow_the_protocol() {
        let mut accumulator = ParamsErrorsAccumulator::new();
        assert_eq!(accumulator.state(), AccumulatorState::Idle);
        assert!(accumulator.average_errors().is_err());

        accumulator.accumulate(&bundle(1., 1.)).unwrap();
        assert_eq!(accumulator.state(), AccumulatorState::Accumulating);

        accumulator.average_errors().unwrap();
        accumulator.average_errors().unwrap();
        assert_eq!(accumulator.state(), AccumulatorState::ReadyToUpdate);

        accumulator.accumulate(&bundle(3., 3.)).unwrap();
        let averaged = accumulator.average_errors().unwrap();
        assert!(averaged.weights.values().iter().all(|&v| v == 2.));

        accumulator.reset();
        assert_eq!(accumulator.state(), AccumulatorState::Idle);
    }

    #[test]
    fn incompatible_bundles_are_rejected() {
        let mut accumulator = ParamsErrorsAccumulator::new();
        accumulator.accumulate(&bundle(1., 1.)).unwrap();

        let other = LinearParams::new(3, 1).unwrap();
        assert!(matches!(
            accumulator.accumulate(&other),
            Err(LayerErr::IncompatibleParameters { .. })
        ));
        assert_eq!(accumulator.count(), 1);
        assert_eq!(accumulator.errors().unwrap().weights.shape(), &[1, 2]);
    }
}
