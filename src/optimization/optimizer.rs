use log::debug;

use super::{AccumulatorState, ParamsErrorsAccumulator, UpdateMethod};
use crate::{
    arch::{LayerParameters, SharedParams},
    error::{LayerErr, Result},
};

/// Collects the gradients of every layer instance tied to some parameters and applies an update
/// method to those parameters.
///
/// `update` is the only writer of the shared parameter values.
pub struct Optimizer<P, M> {
    params: SharedParams<P>,
    accumulator: ParamsErrorsAccumulator<P>,
    method: M,
}

impl<P: LayerParameters, M: UpdateMethod> Optimizer<P, M> {
    /// Creates a new `Optimizer`.
    ///
    /// # Arguments
    /// * `params` - The parameters to update, shared with the layers.
    /// * `method` - The update rule.
    pub fn new(params: SharedParams<P>, method: M) -> Self {
        Self {
            params,
            accumulator: ParamsErrorsAccumulator::new(),
            method,
        }
    }

    pub fn params(&self) -> &SharedParams<P> {
        &self.params
    }

    pub fn method(&self) -> &M {
        &self.method
    }

    pub fn accumulator(&self) -> &ParamsErrorsAccumulator<P> {
        &self.accumulator
    }

    /// Accumulates the gradients of one layer instance.
    ///
    /// # Returns
    /// An `IncompatibleParameters` error if `params_errors` doesn't mirror the optimized
    /// parameters.
    pub fn accumulate(&mut self, params_errors: &P) -> Result<()> {
        self.params.borrow().check_compatible(params_errors)?;
        self.accumulator.accumulate(params_errors)
    }

    /// Same as `accumulate` but takes ownership of the bundle.
    pub fn accumulate_owned(&mut self, params_errors: P) -> Result<()> {
        self.params.borrow().check_compatible(&params_errors)?;
        self.accumulator.accumulate_owned(params_errors)
    }

    /// Averages the accumulated gradients and applies the update method to every parameter.
    ///
    /// Does nothing if nothing was accumulated since the last update.
    ///
    /// # Returns
    /// An error if the parameters are still borrowed by a layer or the update method fails.
    pub fn update(&mut self) -> Result<()> {
        if self.accumulator.state() == AccumulatorState::Idle {
            return Ok(());
        }

        let count = self.accumulator.count();
        let gradients = self.accumulator.average_errors()?;
        let mut params = self
            .params
            .try_borrow_mut()
            .map_err(|_| LayerErr::invalid("the parameters are borrowed during the update"))?;

        params.check_compatible(gradients)?;

        for (param, grad) in params.params_mut().into_iter().zip(gradients.params()) {
            param.errors_mut().assign(grad.values());

            let (values, errors, support) = param.update_parts();
            self.method.update(values, errors, support)?;

            param.errors_mut().fill(0.);
        }

        drop(params);
        self.accumulator.reset();

        debug!(contributions = count; "Updated the layer parameters");
        Ok(())
    }

    pub fn new_epoch(&mut self) {
        if self.method.schedule().epoch {
            self.method.new_epoch();
        }
    }

    pub fn new_batch(&mut self) {
        if self.method.schedule().batch {
            self.method.new_batch();
        }
    }

    pub fn new_example(&mut self) {
        if self.method.schedule().example {
            self.method.new_example();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        arch::{LinearParams, share},
        optimization::{Adam, GradientDescent},
    };

    fn gradients(w: f64, b: f64) -> LinearParams {
        let mut params = LinearParams::new(2, 1).unwrap();
        params.weights.values_mut().fill(w);
        params.biases.values_mut().fill(b);
        params
    }

    #[test]
    fn update_applies_the_average_to_the_owner() {
        let params = share(gradients(1., 1.));
        let mut optimizer = Optimizer::new(params.clone(), GradientDescent::new(0.5));

        optimizer.accumulate(&gradients(1., 2.)).unwrap();
        optimizer.accumulate(&gradients(3., 4.)).unwrap();
        optimizer.update().unwrap();

        let params = params.borrow();
        assert!(params.weights.values().iter().all(|&v| v == 0.));
        assert!(params.biases.values().iter().all(|&v| v == -0.5));
        assert!(params.weights.errors().iter().all(|&e| e == 0.));
        assert_eq!(optimizer.accumulator().state(), AccumulatorState::Idle);
    }

    #[test]
    fn update_without_gradients_is_a_no_op() {
        let params = share(gradients(1., 1.));
        let mut optimizer = Optimizer::new(params.clone(), GradientDescent::new(0.5));

        optimizer.update().unwrap();
        assert!(params.borrow().weights.values().iter().all(|&v| v == 1.));
    }

    #[test]
    fn update_fails_while_a_layer_holds_the_params() {
        let params = share(gradients(1., 1.));
        let mut optimizer = Optimizer::new(params.clone(), GradientDescent::new(0.5));
        optimizer.accumulate(&gradients(1., 1.)).unwrap();

        let _reading = params.borrow();
        assert!(optimizer.update().is_err());
    }

    #[test]
    fn hooks_only_reach_interested_methods() {
        let params = share(gradients(0., 0.));
        let mut optimizer = Optimizer::new(params, Adam::new(0.1, 0.9, 0.999, 1e-8));

        optimizer.new_epoch();
        optimizer.new_example();
        optimizer.new_batch();

        assert_eq!(optimizer.method().timestep(), 1);
    }

    #[test]
    fn foreign_bundles_are_rejected() {
        let params = share(gradients(0., 0.));
        let mut optimizer = Optimizer::new(params, GradientDescent::new(0.5));

        assert!(optimizer.accumulate(&LinearParams::new(3, 1).unwrap()).is_err());
    }
}
