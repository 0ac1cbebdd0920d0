use std::cell::Ref;

use log::warn;
use ndarray::Array1;
use rand::Rng;

use super::{LayerParameters, SharedParams, TemporalWindow, ValueErrorArray};
use crate::error::{LayerErr, Result};

/// Where a layer instance is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Constructed,
    Forwarded,
    Backwarded,
}

/// The state every layer instance carries besides its arrays.
#[derive(Debug)]
pub struct LayerState<P> {
    params: SharedParams<P>,
    id: Option<usize>,
    dropout: f64,
    masks: Option<Vec<Array1<f64>>>,
    unmasked: Option<Vec<Array1<f64>>>,
    phase: Phase,
}

impl<P> LayerState<P> {
    /// Creates a new `LayerState` referencing `params`.
    pub fn new(params: SharedParams<P>) -> Self {
        Self {
            params,
            id: None,
            dropout: 0.,
            masks: None,
            unmasked: None,
            phase: Phase::Constructed,
        }
    }

    /// Borrows the shared parameters for reading.
    pub fn params(&self) -> Ref<'_, P> {
        self.params.borrow()
    }

    pub fn shared_params(&self) -> &SharedParams<P> {
        &self.params
    }

    pub fn id(&self) -> Option<usize> {
        self.id
    }

    pub fn set_id(&mut self, id: usize) {
        self.id = Some(id);
    }

    pub fn dropout(&self) -> f64 {
        self.dropout
    }

    /// Sets the probability of dropping each input value.
    ///
    /// # Returns
    /// An `InvalidConfiguration` error if `p` is not in `[0, 1)`.
    pub fn set_dropout(&mut self, p: f64) -> Result<()> {
        if !(0. ..1.).contains(&p) {
            return Err(LayerErr::invalid(format!(
                "the dropout probability must be in [0, 1), got {p}"
            )));
        }

        self.dropout = p;
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn forget_dropout(&mut self) {
        self.masks = None;
        self.unmasked = None;
    }
}

/// A layer instance: input arrays, output arrays and a reference to shared parameters.
///
/// Implementors provide the math in `forward_values` and `backward_errors`, callers go through
/// `forward` and `backward` which keep track of the lifecycle.
///
/// Gradients are assigned into the values of the `params_errors` bundle given to `backward`,
/// summing them over instances is up to the optimizer.
pub trait Layer: Sized {
    type Params: LayerParameters;

    /// A name for this kind of layer, used in errors and logs.
    const KIND: &'static str;

    fn inputs(&self) -> &[ValueErrorArray];
    fn inputs_mut(&mut self) -> &mut [ValueErrorArray];
    fn outputs(&self) -> &[ValueErrorArray];
    fn outputs_mut(&mut self) -> &mut [ValueErrorArray];
    fn state(&self) -> &LayerState<Self::Params>;
    fn state_mut(&mut self) -> &mut LayerState<Self::Params>;

    /// Computes the output values from the input values and the parameters.
    fn forward_values(&mut self, window: &dyn TemporalWindow<Self>) -> Result<()>;

    /// Computes the parameter gradients and, if `propagate_to_input`, the input errors from the
    /// errors already assigned to the outputs.
    fn backward_errors(
        &mut self,
        params_errors: &mut Self::Params,
        propagate_to_input: bool,
        window: &dyn TemporalWindow<Self>,
    ) -> Result<()>;

    /// Same as `forward_values` but also records the contributions needed by `relevance`.
    fn forward_contributions(&mut self, _window: &dyn TemporalWindow<Self>) -> Result<()> {
        Err(LayerErr::NotImplemented {
            layer: Self::KIND,
            operation: "forward with contributions",
        })
    }

    /// Distributes the relevance assigned to the outputs onto the inputs.
    fn relevance_of_inputs(&mut self, _window: &dyn TemporalWindow<Self>) -> Result<()> {
        Err(LayerErr::NotImplemented {
            layer: Self::KIND,
            operation: "relevance propagation",
        })
    }

    fn output(&self) -> &ValueErrorArray {
        &self.outputs()[0]
    }

    fn output_mut(&mut self) -> &mut ValueErrorArray {
        &mut self.outputs_mut()[0]
    }

    fn params(&self) -> Ref<'_, Self::Params> {
        self.state().params()
    }

    fn id(&self) -> Option<usize> {
        self.state().id()
    }

    fn phase(&self) -> Phase {
        self.state().phase()
    }

    /// A zeroed mirror of this layer's parameters to receive its gradients.
    fn errors_bundle(&self) -> Self::Params {
        self.params().errors_like()
    }

    /// Overwrites the values of the `i`-th input.
    ///
    /// # Returns
    /// An `InvalidConfiguration` error if there is no such input, or a `SizeMismatch` error if
    /// `values` doesn't have the input's size.
    fn assign_input(&mut self, i: usize, values: &Array1<f64>) -> Result<()> {
        let input = self
            .inputs_mut()
            .get_mut(i)
            .ok_or_else(|| missing_input(Self::KIND, i))?;

        input.assign_values(values)?;
        self.state_mut().forget_dropout();
        Ok(())
    }

    /// Replaces the `i`-th input with `array`, to feed sparse inputs.
    fn replace_input(&mut self, i: usize, array: ValueErrorArray) -> Result<()> {
        let input = self
            .inputs_mut()
            .get_mut(i)
            .ok_or_else(|| missing_input(Self::KIND, i))?;

        if input.shape() != array.shape() {
            return Err(LayerErr::size_mismatch(
                "input",
                "layer input",
                array.shape(),
                input.shape(),
            ));
        }

        *input = array;
        self.state_mut().forget_dropout();
        Ok(())
    }

    fn forward(&mut self, window: &dyn TemporalWindow<Self>) -> Result<()> {
        self.forward_values(window)?;
        self.state_mut().phase = Phase::Forwarded;
        Ok(())
    }

    fn forward_with_contributions(&mut self, window: &dyn TemporalWindow<Self>) -> Result<()> {
        self.forward_contributions(window)?;
        self.state_mut().phase = Phase::Forwarded;
        Ok(())
    }

    /// Runs the backward pass of this instance.
    ///
    /// # Arguments
    /// * `params_errors` - The bundle the parameter gradients are assigned to.
    /// * `propagate_to_input` - Whether to compute the errors of the inputs.
    /// * `window` - The neighbors of this instance, the next step must already be backwarded.
    ///
    /// # Returns
    /// An `IncompatibleParameters` error if `params_errors` doesn't mirror the layer's parameters.
    fn backward(
        &mut self,
        params_errors: &mut Self::Params,
        propagate_to_input: bool,
        window: &dyn TemporalWindow<Self>,
    ) -> Result<()> {
        if self.phase() == Phase::Constructed {
            warn!(layer = Self::KIND; "Backward called on a layer that was never forwarded");
        }

        self.params().check_compatible(params_errors)?;
        self.backward_errors(params_errors, propagate_to_input, window)?;

        if let Some(masks) = self.state_mut().masks.take()
            && propagate_to_input
        {
            for (input, mask) in self.inputs_mut().iter_mut().zip(&masks) {
                *input.errors_mut() *= mask;
            }
        }

        self.state_mut().phase = Phase::Backwarded;
        Ok(())
    }

    fn relevance(&mut self, window: &dyn TemporalWindow<Self>) -> Result<()> {
        self.relevance_of_inputs(window)
    }

    /// Drops input values with the layer's dropout probability, scaling the kept ones.
    ///
    /// The same masks are applied to the input errors by the next `backward`. Calling it again
    /// before new inputs are assigned draws new masks over the values as they were assigned.
    fn apply_dropout<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        if let Some(unmasked) = self.state_mut().unmasked.take() {
            for (input, values) in self.inputs_mut().iter_mut().zip(&unmasked) {
                input.values_mut().assign(values);
            }
        }

        let p = self.state().dropout();

        if p == 0. {
            self.state_mut().masks = None;
            return Ok(());
        }

        let unmasked: Vec<_> = self.inputs().iter().map(|x| x.values().clone()).collect();

        let scale = 1. / (1. - p);
        let masks: Vec<_> = self
            .inputs()
            .iter()
            .map(|input| {
                Array1::from_shape_fn(input.len(), |_| {
                    if rng.random::<f64>() < p { 0. } else { scale }
                })
            })
            .collect();

        for (input, mask) in self.inputs_mut().iter_mut().zip(&masks) {
            *input.values_mut() *= mask;
        }

        self.state_mut().masks = Some(masks);
        self.state_mut().unmasked = Some(unmasked);
        Ok(())
    }
}

fn missing_input(kind: &str, i: usize) -> LayerErr {
    LayerErr::invalid(format!("the {kind} layer has no input {i}"))
}
