use std::slice;

use super::{assign_activated, pre_activation_errors};
use crate::{
    arch::{
        Contributions, Layer, LayerParameters, LayerState, SharedParams, TemporalWindow,
        TrainableParameter, ValueErrorArray, activations::ActFn,
    },
    error::{LayerErr, Result},
    tensor,
};

/// The parameters of an `Affine` layer, one weight matrix per input.
#[derive(Clone, Debug)]
pub struct AffineParams {
    pub weights: Vec<TrainableParameter>,
    pub biases: TrainableParameter,
}

impl AffineParams {
    /// Creates new zeroed `AffineParams`.
    ///
    /// # Arguments
    /// * `input_sizes` - The size of each input.
    /// * `output_size` - The number of output units.
    ///
    /// # Returns
    /// An `InvalidConfiguration` error if there are no inputs or any size is zero.
    pub fn new(input_sizes: &[usize], output_size: usize) -> Result<Self> {
        if input_sizes.is_empty() {
            return Err(LayerErr::invalid("an affine layer needs at least one input"));
        }

        let weights = input_sizes
            .iter()
            .map(|&size| TrainableParameter::matrix_of("weights", output_size, size))
            .collect::<Result<_>>()?;

        Ok(Self {
            weights,
            biases: TrainableParameter::biases_of("biases", output_size)?,
        })
    }

    pub fn input_sizes(&self) -> Vec<usize> {
        self.weights.iter().map(|w| w.shape()[1]).collect()
    }

    pub fn output_size(&self) -> usize {
        self.biases.shape()[0]
    }
}

impl LayerParameters for AffineParams {
    fn params(&self) -> Vec<&TrainableParameter> {
        self.weights.iter().chain([&self.biases]).collect()
    }

    fn params_mut(&mut self) -> Vec<&mut TrainableParameter> {
        self.weights.iter_mut().chain([&mut self.biases]).collect()
    }
}

/// Merges several inputs into one output, `y = f(Σ_k W_k x_k + b)`.
#[derive(Debug)]
pub struct Affine {
    inputs: Vec<ValueErrorArray>,
    output: ValueErrorArray,
    contributions: Option<Contributions>,
    state: LayerState<AffineParams>,
}

impl Affine {
    /// Creates a new `Affine` layer with zeroed inputs of the sizes given by `params`.
    pub fn new(params: SharedParams<AffineParams>, act_fn: Option<ActFn>) -> Result<Self> {
        let inputs = params
            .borrow()
            .input_sizes()
            .into_iter()
            .map(ValueErrorArray::zeros)
            .collect();

        Self::with_inputs(params, inputs, act_fn)
    }

    /// Creates a new `Affine` layer reading from the given input arrays.
    ///
    /// # Returns
    /// An `InvalidConfiguration` error if the number or sizes of `inputs` don't match `params`.
    pub fn with_inputs(
        params: SharedParams<AffineParams>,
        inputs: Vec<ValueErrorArray>,
        act_fn: Option<ActFn>,
    ) -> Result<Self> {
        let (input_sizes, output_size) = {
            let params = params.borrow();
            (params.input_sizes(), params.output_size())
        };

        let sizes: Vec<_> = inputs.iter().map(ValueErrorArray::len).collect();
        if sizes != input_sizes {
            return Err(LayerErr::invalid(format!(
                "the affine parameters expect inputs of sizes {input_sizes:?}, got {sizes:?}"
            )));
        }

        Ok(Self {
            inputs,
            output: ValueErrorArray::zeros(output_size).with_activation(act_fn),
            contributions: None,
            state: LayerState::new(params),
        })
    }
}

impl Layer for Affine {
    type Params = AffineParams;
    const KIND: &'static str = "affine";

    fn inputs(&self) -> &[ValueErrorArray] {
        &self.inputs
    }

    fn inputs_mut(&mut self) -> &mut [ValueErrorArray] {
        &mut self.inputs
    }

    fn outputs(&self) -> &[ValueErrorArray] {
        slice::from_ref(&self.output)
    }

    fn outputs_mut(&mut self) -> &mut [ValueErrorArray] {
        slice::from_mut(&mut self.output)
    }

    fn state(&self) -> &LayerState<AffineParams> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayerState<AffineParams> {
        &mut self.state
    }

    fn forward_values(&mut self, _window: &dyn TemporalWindow<Self>) -> Result<()> {
        let params = self.state.params();
        let mut z = params.biases.vector()?.to_owned();

        for (w, x) in params.weights.iter().zip(&self.inputs) {
            z += &w.matrix()?.dot(x.values());
        }

        self.contributions = None;
        self.output.clear_relevance();
        assign_activated(&mut self.output, &z)
    }

    fn backward_errors(
        &mut self,
        params_errors: &mut AffineParams,
        propagate_to_input: bool,
        _window: &dyn TemporalWindow<Self>,
    ) -> Result<()> {
        let params = self.state.params();
        let gz = pre_activation_errors(&self.output)?;

        for (gw, x) in params_errors.weights.iter_mut().zip(&self.inputs) {
            tensor::assign_outer(gw.matrix_mut()?, &gz, x)?;
        }
        params_errors.biases.vector_mut()?.assign(&gz);

        if propagate_to_input {
            for (w, x) in params.weights.iter().zip(&mut self.inputs) {
                x.assign_errors(&tensor::transposed_dot(&w.matrix()?, &gz))?;
            }
        }

        Ok(())
    }

    fn forward_contributions(&mut self, _window: &dyn TemporalWindow<Self>) -> Result<()> {
        let params = self.state.params();
        let mut inputs = Vec::with_capacity(self.inputs.len());

        for (w, x) in params.weights.iter().zip(&self.inputs) {
            inputs.push(Contributions::of_linear(&w.matrix()?, x.values()));
        }

        let contributions = Contributions {
            inputs,
            recurrent: None,
            biases: params.biases.vector()?.to_owned(),
        };

        self.output.clear_relevance();
        assign_activated(&mut self.output, &contributions.pre_activation())?;
        self.contributions = Some(contributions);
        Ok(())
    }

    fn relevance_of_inputs(&mut self, _window: &dyn TemporalWindow<Self>) -> Result<()> {
        let contributions = self.contributions.as_ref().ok_or(LayerErr::UninitializedState {
            what: "the contributions",
        })?;

        let (relevance, _) = contributions.distribute(self.output.relevance()?);
        for (x, r) in self.inputs.iter_mut().zip(&relevance) {
            x.assign_relevance(r)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::prelude::*;

    use super::*;
    use crate::arch::{Detached, share};

    fn params() -> AffineParams {
        let mut params = AffineParams::new(&[2, 1], 2).unwrap();
        params.weights[0].values_mut().assign(&arr2(&[[1., 2.], [0., -1.]]).into_dyn());
        params.weights[1].values_mut().assign(&arr2(&[[0.5], [3.]]).into_dyn());
        params.biases.values_mut().assign(&arr1(&[0.1, 0.2]).into_dyn());
        params
    }

    #[test]
    fn sums_every_input_map() {
        let mut layer = Affine::new(share(params()), None).unwrap();
        layer.assign_input(0, &arr1(&[1., 1.])).unwrap();
        layer.assign_input(1, &arr1(&[2.])).unwrap();
        layer.forward(&Detached).unwrap();

        let expected = arr1(&[4.1, 5.2]);
        assert!((layer.output().values() - &expected).iter().all(|d| d.abs() < 1e-12));
    }

    #[test]
    fn each_input_gets_its_own_errors() {
        let mut layer = Affine::new(share(params()), None).unwrap();
        layer.assign_input(0, &arr1(&[1., 1.])).unwrap();
        layer.assign_input(1, &arr1(&[2.])).unwrap();
        layer.forward(&Detached).unwrap();
        layer.output_mut().assign_errors(&arr1(&[1., -1.])).unwrap();

        let mut errors = layer.errors_bundle();
        layer.backward(&mut errors, true, &Detached).unwrap();

        assert_eq!(layer.inputs()[0].errors(), &arr1(&[1., 3.]));
        assert_eq!(layer.inputs()[1].errors(), &arr1(&[-2.5]));
        assert_eq!(errors.weights[1].values(), &arr2(&[[2.], [-2.]]).into_dyn());
    }

    #[test]
    fn relevance_follows_the_latest_forward() {
        let mut layer = Affine::new(share(params()), None).unwrap();
        layer.assign_input(0, &arr1(&[1., 0.])).unwrap();
        layer.assign_input(1, &arr1(&[0.])).unwrap();
        layer.forward_with_contributions(&Detached).unwrap();

        layer.assign_input(0, &arr1(&[0., 1.])).unwrap();
        layer.forward(&Detached).unwrap();
        layer.output_mut().assign_relevance(&arr1(&[1., 1.])).unwrap();
        assert!(matches!(
            layer.relevance(&Detached),
            Err(LayerErr::UninitializedState { .. })
        ));

        layer.forward_with_contributions(&Detached).unwrap();
        layer.output_mut().assign_relevance(&arr1(&[1., 1.])).unwrap();
        layer.relevance(&Detached).unwrap();
        assert_eq!(layer.inputs()[0].relevance().unwrap()[0], 0.);
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let params = share(params());

        assert!(matches!(
            Affine::with_inputs(params.clone(), vec![ValueErrorArray::zeros(2)], None),
            Err(LayerErr::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Affine::with_inputs(
                params,
                vec![ValueErrorArray::zeros(2), ValueErrorArray::zeros(3)],
                None
            ),
            Err(LayerErr::InvalidConfiguration(_))
        ));
        assert!(AffineParams::new(&[], 2).is_err());
    }
}
