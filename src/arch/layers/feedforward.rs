use std::slice;

use super::{assign_activated, pre_activation_errors};
use crate::{
    arch::{
        Contributions, Layer, LayerState, LinearParams, SharedParams, TemporalWindow,
        ValueErrorArray, activations::ActFn,
    },
    error::{LayerErr, Result},
};

/// A fully connected layer, `y = f(W x + b)`.
#[derive(Debug)]
pub struct Feedforward {
    input: ValueErrorArray,
    output: ValueErrorArray,
    contributions: Option<Contributions>,
    state: LayerState<LinearParams>,
}

impl Feedforward {
    /// Creates a new `Feedforward` layer with sizes given by `params`.
    ///
    /// # Arguments
    /// * `params` - The weights and biases, shared with the other instances.
    /// * `act_fn` - The activation of the output, if any.
    pub fn new(params: SharedParams<LinearParams>, act_fn: Option<ActFn>) -> Result<Self> {
        let (input_size, output_size) = {
            let params = params.borrow();
            (params.input_size(), params.output_size())
        };

        Ok(Self {
            input: ValueErrorArray::zeros(input_size),
            output: ValueErrorArray::zeros(output_size).with_activation(act_fn),
            contributions: None,
            state: LayerState::new(params),
        })
    }

    /// The contributions recorded by the last `forward_with_contributions`.
    pub fn contributions(&self) -> Result<&Contributions> {
        self.contributions.as_ref().ok_or(LayerErr::UninitializedState {
            what: "the contributions",
        })
    }
}

impl Layer for Feedforward {
    type Params = LinearParams;
    const KIND: &'static str = "feedforward";

    fn inputs(&self) -> &[ValueErrorArray] {
        slice::from_ref(&self.input)
    }

    fn inputs_mut(&mut self) -> &mut [ValueErrorArray] {
        slice::from_mut(&mut self.input)
    }

    fn outputs(&self) -> &[ValueErrorArray] {
        slice::from_ref(&self.output)
    }

    fn outputs_mut(&mut self) -> &mut [ValueErrorArray] {
        slice::from_mut(&mut self.output)
    }

    fn state(&self) -> &LayerState<LinearParams> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayerState<LinearParams> {
        &mut self.state
    }

    fn forward_values(&mut self, _window: &dyn TemporalWindow<Self>) -> Result<()> {
        let params = self.state.params();
        let z = params.pre_activation(self.input.values())?;

        self.contributions = None;
        self.output.clear_relevance();
        assign_activated(&mut self.output, &z)
    }

    fn backward_errors(
        &mut self,
        params_errors: &mut LinearParams,
        propagate_to_input: bool,
        _window: &dyn TemporalWindow<Self>,
    ) -> Result<()> {
        let params = self.state.params();
        let gz = pre_activation_errors(&self.output)?;

        params_errors.assign_gradients(&gz, &self.input)?;

        if propagate_to_input {
            self.input.assign_errors(&params.input_errors(&gz)?)?;
        }

        Ok(())
    }

    fn forward_contributions(&mut self, _window: &dyn TemporalWindow<Self>) -> Result<()> {
        let params = self.state.params();
        let contributions = Contributions {
            inputs: vec![Contributions::of_linear(
                &params.weights.matrix()?,
                self.input.values(),
            )],
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

        let (inputs, _) = contributions.distribute(self.output.relevance()?);
        self.input.assign_relevance(&inputs[0])
    }
}

#[cfg(test)]
mod tests {
    use ndarray::prelude::*;

    use super::*;
    use crate::arch::{Detached, LayerParameters, Phase, share};

    fn layer() -> Feedforward {
        let mut params = LinearParams::new(4, 2).unwrap();
        params
            .weights
            .values_mut()
            .assign(&arr2(&[[0.3, 0.4, 0.2, -0.2], [0.2, -0.1, 0.1, 0.6]]).into_dyn());
        params.biases.values_mut().assign(&arr1(&[0.3, -0.4]).into_dyn());

        let mut layer = Feedforward::new(share(params), Some(ActFn::Tanh)).unwrap();
        layer.assign_input(0, &arr1(&[-0.4, 0.7, 0.9, 0.6])).unwrap();
        layer
    }

    fn assert_close(a: &Array1<f64>, b: &Array1<f64>) {
        assert!((a - b).iter().all(|d| d.abs() < 1e-6), "{a} != {b}");
    }

    #[test]
    fn forward_then_backward() {
        let mut layer = layer();
        layer.forward(&Detached).unwrap();

        let y = arr1(&[0.52f64.tanh(), (-0.1f64).tanh()]);
        assert_close(layer.output().values(), &y);

        let gy = arr1(&[-0.2, 0.5]);
        layer.output_mut().assign_errors(&gy).unwrap();

        let mut errors = layer.errors_bundle();
        layer.backward(&mut errors, true, &Detached).unwrap();

        let gz = &gy * &y.mapv(|y| 1. - y * y);
        assert_close(&errors.biases.vector().unwrap().to_owned(), &gz);

        let x = arr1(&[-0.4, 0.7, 0.9, 0.6]);
        let gw = errors.weights.matrix().unwrap();
        for i in 0..2 {
            assert_close(&gw.row(i).to_owned(), &(&x * gz[i]));
        }

        let w = layer.params().weights.matrix().unwrap().to_owned();
        assert_close(layer.inputs()[0].errors(), &w.t().dot(&gz));
        assert_eq!(layer.phase(), Phase::Backwarded);
    }

    #[test]
    fn contributions_reproduce_the_forward() {
        let mut a = layer();
        let mut b = layer();
        a.forward(&Detached).unwrap();
        b.forward_with_contributions(&Detached).unwrap();

        assert_close(a.output().values(), b.output().values());
        assert_eq!(b.contributions().unwrap().inputs[0].dim(), (2, 4));
    }

    #[test]
    fn relevance_needs_contributions() {
        let mut layer = layer();
        layer.forward(&Detached).unwrap();
        layer.output_mut().assign_relevance(&arr1(&[1., 1.])).unwrap();

        assert!(matches!(
            layer.relevance(&Detached),
            Err(LayerErr::UninitializedState { .. })
        ));
    }

    #[test]
    fn plain_forward_drops_earlier_contributions() {
        let mut layer = layer();
        layer.forward_with_contributions(&Detached).unwrap();
        layer.output_mut().assign_relevance(&arr1(&[1., 1.])).unwrap();

        layer.assign_input(0, &arr1(&[0., 1., 0., 0.])).unwrap();
        layer.forward(&Detached).unwrap();

        assert!(layer.contributions().is_err());
        assert!(layer.output().relevance().is_err());

        layer.output_mut().assign_relevance(&arr1(&[1., 1.])).unwrap();
        assert!(matches!(
            layer.relevance(&Detached),
            Err(LayerErr::UninitializedState { .. })
        ));
    }

    #[test]
    fn sparse_inputs_give_the_same_gradients() {
        let mut dense = layer();
        let mut sparse = layer();
        let entries = [(1, 0.7), (2, 0.9)];
        let values = arr1(&[0., 0.7, 0.9, 0.]);

        dense.assign_input(0, &values).unwrap();
        sparse
            .replace_input(0, ValueErrorArray::sparse(4, &entries).unwrap())
            .unwrap();

        let mut gradients = Vec::new();
        for layer in [&mut dense, &mut sparse] {
            layer.forward(&Detached).unwrap();
            layer.output_mut().assign_errors(&arr1(&[0.3, -0.1])).unwrap();

            let mut errors = layer.errors_bundle();
            layer.backward(&mut errors, false, &Detached).unwrap();
            gradients.push(errors);
        }

        assert!(gradients[0].check_compatible(&gradients[1]).is_ok());
        assert_eq!(gradients[0].weights.values(), gradients[1].weights.values());
    }
}
