use ndarray::{Array1, Array2, Axis};

use super::{NormParams, assign_activated, layer_norm::NORM_EPS, pre_activation_errors};
use crate::{
    arch::{Layer, LayerState, SharedParams, TemporalWindow, ValueErrorArray, activations::ActFn},
    error::{LayerErr, Result},
};

/// Normalizes every feature across a batch of inputs, one output per input.
///
/// ```text
/// μ = mean_k x_k, σ² = mean_k (x_k - μ)²
/// y_k = f(γ ⊙ (x_k - μ) / σ + β)
/// ```
#[derive(Debug)]
pub struct BatchNorm {
    inputs: Vec<ValueErrorArray>,
    outputs: Vec<ValueErrorArray>,
    normalized: Array2<f64>,
    std_dev: Array1<f64>,
    state: LayerState<NormParams>,
}

impl BatchNorm {
    /// Creates a new `BatchNorm` over `batch_size` zeroed inputs.
    ///
    /// # Returns
    /// An `InvalidConfiguration` error if `batch_size` is zero.
    pub fn new(
        params: SharedParams<NormParams>,
        batch_size: usize,
        act_fn: Option<ActFn>,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(LayerErr::invalid("batch normalization over an empty batch"));
        }

        let size = params.borrow().size();

        Ok(Self {
            inputs: (0..batch_size).map(|_| ValueErrorArray::zeros(size)).collect(),
            outputs: (0..batch_size)
                .map(|_| ValueErrorArray::zeros(size).with_activation(act_fn))
                .collect(),
            normalized: Array2::zeros((batch_size, size)),
            std_dev: Array1::ones(size),
            state: LayerState::new(params),
        })
    }

    pub fn batch_size(&self) -> usize {
        self.inputs.len()
    }
}

impl Layer for BatchNorm {
    type Params = NormParams;
    const KIND: &'static str = "batch norm";

    fn inputs(&self) -> &[ValueErrorArray] {
        &self.inputs
    }

    fn inputs_mut(&mut self) -> &mut [ValueErrorArray] {
        &mut self.inputs
    }

    fn outputs(&self) -> &[ValueErrorArray] {
        &self.outputs
    }

    fn outputs_mut(&mut self) -> &mut [ValueErrorArray] {
        &mut self.outputs
    }

    fn state(&self) -> &LayerState<NormParams> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayerState<NormParams> {
        &mut self.state
    }

    fn forward_values(&mut self, _window: &dyn TemporalWindow<Self>) -> Result<()> {
        let params = self.state.params();
        let (gains, biases) = (params.gains.vector()?, params.biases.vector()?);

        let mut x = Array2::<f64>::zeros(self.normalized.raw_dim());
        for (mut row, input) in x.rows_mut().into_iter().zip(&self.inputs) {
            row.assign(input.values());
        }

        let mean = x.mean_axis(Axis(0)).ok_or_else(empty_batch)?;
        let centered = x - &mean;
        let variance = centered.mapv(|v| v * v).mean_axis(Axis(0)).ok_or_else(empty_batch)?;

        self.std_dev = variance.mapv(|v| (v + NORM_EPS).sqrt());
        self.normalized = centered / &self.std_dev;

        for (output, normalized) in self.outputs.iter_mut().zip(self.normalized.rows()) {
            assign_activated(output, &(&gains * &normalized + &biases))?;
        }

        Ok(())
    }

    fn backward_errors(
        &mut self,
        params_errors: &mut NormParams,
        propagate_to_input: bool,
        _window: &dyn TemporalWindow<Self>,
    ) -> Result<()> {
        let params = self.state.params();

        let mut gz = Array2::<f64>::zeros(self.normalized.raw_dim());
        for (mut row, output) in gz.rows_mut().into_iter().zip(&self.outputs) {
            row.assign(&pre_activation_errors(output)?);
        }

        params_errors.gains.vector_mut()?.assign(&(&gz * &self.normalized).sum_axis(Axis(0)));
        params_errors.biases.vector_mut()?.assign(&gz.sum_axis(Axis(0)));

        if propagate_to_input {
            let g_normalized = gz * &params.gains.vector()?;
            let mean = g_normalized.mean_axis(Axis(0)).ok_or_else(empty_batch)?;
            let projection = (&g_normalized * &self.normalized)
                .mean_axis(Axis(0))
                .ok_or_else(empty_batch)?;

            let gx = (g_normalized - &mean - &self.normalized * &projection) / &self.std_dev;
            for (input, row) in self.inputs.iter_mut().zip(gx.rows()) {
                input.assign_errors(&row)?;
            }
        }

        Ok(())
    }
}

fn empty_batch() -> LayerErr {
    LayerErr::invalid("batch normalization over an empty batch")
}

#[cfg(test)]
mod tests {
    use ndarray::prelude::*;

    use super::*;
    use crate::arch::{Detached, share};

    fn layer() -> BatchNorm {
        let mut layer = BatchNorm::new(share(NormParams::new(2).unwrap()), 3, None).unwrap();
        layer.assign_input(0, &arr1(&[1., 10.])).unwrap();
        layer.assign_input(1, &arr1(&[2., 20.])).unwrap();
        layer.assign_input(2, &arr1(&[3., 60.])).unwrap();
        layer
    }

    #[test]
    fn normalizes_each_feature_across_the_batch() {
        let mut layer = layer();
        layer.forward(&Detached).unwrap();

        for feature in 0..2 {
            let column: Array1<f64> = layer.outputs().iter().map(|y| y.values()[feature]).collect();
            assert!(column.mean().unwrap().abs() < 1e-12);
            assert!((column.mapv(|v| v * v).mean().unwrap() - 1.).abs() < 1e-4);
        }
    }

    #[test]
    fn gradients_sum_over_the_batch() {
        let mut layer = layer();
        layer.forward(&Detached).unwrap();
        for (i, output) in layer.outputs_mut().iter_mut().enumerate() {
            output.assign_errors(&arr1(&[1., i as f64])).unwrap();
        }

        let mut errors = layer.errors_bundle();
        layer.backward(&mut errors, true, &Detached).unwrap();

        assert_eq!(errors.biases.values(), &arr1(&[3., 3.]).into_dyn());
        // Constant errors carry no information about a single example.
        assert!(layer.inputs().iter().all(|x| x.errors()[0].abs() < 1e-9));
    }

    #[test]
    fn empty_batches_are_rejected() {
        let params = share(NormParams::new(2).unwrap());

        assert!(matches!(
            BatchNorm::new(params, 0, None),
            Err(LayerErr::InvalidConfiguration(_))
        ));
    }
}
