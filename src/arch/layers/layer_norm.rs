use std::{cell::RefCell, rc::Rc, slice};

use ndarray::Array1;
use rand::Rng;

use super::{assign_activated, pre_activation_errors};
use crate::{
    arch::{
        Layer, LayerParameters, LayerState, ParamKind, SharedParams, TemporalWindow,
        TrainableParameter, ValueErrorArray, activations::ActFn,
    },
    error::{LayerErr, Result},
    initialization::{ConstParamGen, ParamGen, Scaling},
};

/// Added to the variance before taking its square root.
pub(super) const NORM_EPS: f64 = 1e-5;

/// The gains `γ` and biases `β` of a normalization layer.
#[derive(Clone, Debug)]
pub struct NormParams {
    pub gains: TrainableParameter,
    pub biases: TrainableParameter,
}

impl NormParams {
    /// Creates new `NormParams` with unit gains and zero biases.
    pub fn new(size: usize) -> Result<Self> {
        let mut params = Self {
            gains: TrainableParameter::new("gains", ParamKind::Weights, &[size])?,
            biases: TrainableParameter::biases_of("biases", size)?,
        };

        params.gains.values_mut().fill(1.);
        Ok(params)
    }

    pub fn size(&self) -> usize {
        self.gains.shape()[0]
    }

    fn reset(&mut self) -> Result<()> {
        ConstParamGen::for_param(1., &self.gains).fill(self.gains.values_mut())?;
        ConstParamGen::for_param(0., &self.biases).fill(self.biases.values_mut())
    }
}

impl LayerParameters for NormParams {
    fn params(&self) -> Vec<&TrainableParameter> {
        vec![&self.gains, &self.biases]
    }

    fn params_mut(&mut self) -> Vec<&mut TrainableParameter> {
        vec![&mut self.gains, &mut self.biases]
    }

    /// Resets the gains to one and the biases to zero, the generators are not used.
    fn initialize(&mut self, _: &mut dyn ParamGen, _: &mut dyn ParamGen) -> Result<()> {
        self.reset()
    }

    /// Same as `initialize`, normalization starts from the identity transform.
    fn initialize_scaled<R: Rng>(&mut self, _: Rc<RefCell<R>>, _: Scaling) -> Result<()> {
        self.reset()
    }
}

/// Normalizes the features of its input, `y = f(γ ⊙ (x - μ) / σ + β)`.
#[derive(Debug)]
pub struct LayerNorm {
    input: ValueErrorArray,
    output: ValueErrorArray,
    normalized: Array1<f64>,
    std_dev: f64,
    state: LayerState<NormParams>,
}

impl LayerNorm {
    pub fn new(params: SharedParams<NormParams>, act_fn: Option<ActFn>) -> Result<Self> {
        let size = params.borrow().size();

        Ok(Self {
            input: ValueErrorArray::zeros(size),
            output: ValueErrorArray::zeros(size).with_activation(act_fn),
            normalized: Array1::zeros(size),
            std_dev: 1.,
            state: LayerState::new(params),
        })
    }
}

impl Layer for LayerNorm {
    type Params = NormParams;
    const KIND: &'static str = "layer norm";

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

    fn state(&self) -> &LayerState<NormParams> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayerState<NormParams> {
        &mut self.state
    }

    fn forward_values(&mut self, _window: &dyn TemporalWindow<Self>) -> Result<()> {
        let params = self.state.params();
        let x = self.input.values();
        let mean = x.mean().ok_or_else(|| LayerErr::invalid("normalizing an empty input"))?;
        let centered = x - mean;
        let variance = centered.mapv(|v| v * v).sum() / x.len() as f64;

        self.std_dev = (variance + NORM_EPS).sqrt();
        self.normalized = centered / self.std_dev;

        let z = &params.gains.vector()? * &self.normalized + &params.biases.vector()?;
        assign_activated(&mut self.output, &z)
    }

    fn backward_errors(
        &mut self,
        params_errors: &mut NormParams,
        propagate_to_input: bool,
        _window: &dyn TemporalWindow<Self>,
    ) -> Result<()> {
        let params = self.state.params();
        let gz = pre_activation_errors(&self.output)?;

        params_errors.gains.vector_mut()?.assign(&(&gz * &self.normalized));
        params_errors.biases.vector_mut()?.assign(&gz);

        if propagate_to_input {
            let n = gz.len() as f64;
            let g_normalized = &gz * &params.gains.vector()?;
            let mean = g_normalized.sum() / n;
            let projection = (&g_normalized * &self.normalized).sum() / n;

            let gx = (g_normalized - mean - &self.normalized * projection) / self.std_dev;
            self.input.assign_errors(&gx)?;
        }

        Ok(())
    }
}
