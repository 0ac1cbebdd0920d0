use std::slice;

use ndarray::Array1;

use super::{assign_activated, pre_activation_errors};
use crate::{
    arch::{
        Layer, LayerParameters, LayerState, ParamKind, SharedParams, TemporalWindow,
        TrainableParameter, ValueErrorArray, activations::ActFn,
    },
    error::Result,
    tensor,
};

/// The parameters of a `DeltaRnn`.
///
/// `alpha`, `beta1` and `beta2` scale the multiplicative and additive interactions between the
/// input and the previous output.
#[derive(Clone, Debug)]
pub struct DeltaRnnParams {
    pub weights: TrainableParameter,
    pub recurrent: TrainableParameter,
    pub candidate_biases: TrainableParameter,
    pub partition_biases: TrainableParameter,
    pub alpha: TrainableParameter,
    pub beta1: TrainableParameter,
    pub beta2: TrainableParameter,
}

impl DeltaRnnParams {
    pub fn new(input_size: usize, output_size: usize) -> Result<Self> {
        let scale = |name| TrainableParameter::new(name, ParamKind::Weights, &[output_size]);

        Ok(Self {
            weights: TrainableParameter::matrix_of("weights", output_size, input_size)?,
            recurrent: TrainableParameter::matrix_of("recurrent", output_size, output_size)?,
            candidate_biases: TrainableParameter::biases_of("candidate biases", output_size)?,
            partition_biases: TrainableParameter::biases_of("partition biases", output_size)?,
            alpha: scale("alpha")?,
            beta1: scale("beta1")?,
            beta2: scale("beta2")?,
        })
    }

    pub fn input_size(&self) -> usize {
        self.weights.shape()[1]
    }

    pub fn output_size(&self) -> usize {
        self.weights.shape()[0]
    }
}

impl LayerParameters for DeltaRnnParams {
    fn params(&self) -> Vec<&TrainableParameter> {
        vec![
            &self.weights,
            &self.recurrent,
            &self.candidate_biases,
            &self.partition_biases,
            &self.alpha,
            &self.beta1,
            &self.beta2,
        ]
    }

    fn params_mut(&mut self) -> Vec<&mut TrainableParameter> {
        vec![
            &mut self.weights,
            &mut self.recurrent,
            &mut self.candidate_biases,
            &mut self.partition_biases,
            &mut self.alpha,
            &mut self.beta1,
            &mut self.beta2,
        ]
    }
}

/// A delta recurrent layer.
///
/// ```text
/// wx = W x, wh = U yPrev
/// c = tanh(α ⊙ wx ⊙ wh + β1 ⊙ wh + β2 ⊙ wx + bc)
/// p = σ(wx + bp)
/// y = f(p ⊙ yPrev + (1 - p) ⊙ c)
/// ```
#[derive(Debug)]
pub struct DeltaRnn {
    input: ValueErrorArray,
    output: ValueErrorArray,
    wx: Array1<f64>,
    wh: Array1<f64>,
    candidate: ValueErrorArray,
    partition: ValueErrorArray,
    gz: Array1<f64>,
    wh_errors: Array1<f64>,
    state: LayerState<DeltaRnnParams>,
}

impl DeltaRnn {
    pub fn new(params: SharedParams<DeltaRnnParams>, act_fn: Option<ActFn>) -> Result<Self> {
        let (input_size, output_size) = {
            let params = params.borrow();
            (params.input_size(), params.output_size())
        };

        Ok(Self {
            input: ValueErrorArray::zeros(input_size),
            output: ValueErrorArray::zeros(output_size).with_activation(act_fn),
            wx: Array1::zeros(output_size),
            wh: Array1::zeros(output_size),
            candidate: ValueErrorArray::zeros(output_size).with_activation(Some(ActFn::Tanh)),
            partition: ValueErrorArray::zeros(output_size)
                .with_activation(Some(ActFn::sigmoid(1.))),
            gz: Array1::zeros(output_size),
            wh_errors: Array1::zeros(output_size),
            state: LayerState::new(params),
        })
    }
}

impl Layer for DeltaRnn {
    type Params = DeltaRnnParams;
    const KIND: &'static str = "delta rnn";

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

    fn state(&self) -> &LayerState<DeltaRnnParams> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayerState<DeltaRnnParams> {
        &mut self.state
    }

    fn forward_values(&mut self, window: &dyn TemporalWindow<Self>) -> Result<()> {
        let params = self.state.params();
        let y_prev = window.previous().map(|prev| prev.output.values());

        self.wx = params.weights.matrix()?.dot(self.input.values());
        self.wh = match y_prev {
            Some(y_prev) => params.recurrent.matrix()?.dot(y_prev),
            None => Array1::zeros(self.wx.len()),
        };

        let alpha = params.alpha.vector()?;
        let d1 = &alpha * &self.wx * &self.wh;
        let d2 = &params.beta1.vector()? * &self.wh + &params.beta2.vector()? * &self.wx;
        assign_activated(
            &mut self.candidate,
            &(d1 + d2 + &params.candidate_biases.vector()?),
        )?;
        assign_activated(
            &mut self.partition,
            &(&self.wx + &params.partition_biases.vector()?),
        )?;

        let p = self.partition.values();
        let mut z = p.mapv(|p| 1. - p) * self.candidate.values();

        if let Some(y_prev) = y_prev {
            z += &(p * y_prev);
        }

        assign_activated(&mut self.output, &z)
    }

    fn backward_errors(
        &mut self,
        params_errors: &mut DeltaRnnParams,
        propagate_to_input: bool,
        window: &dyn TemporalWindow<Self>,
    ) -> Result<()> {
        let params = self.state.params();

        if let Some(next) = window.next() {
            let errors = tensor::transposed_dot(&params.recurrent.matrix()?, &next.wh_errors)
                + next.partition.values() * &next.gz;
            self.output.add_errors(&errors)?;
        }

        let y_prev = window.previous().map(|prev| prev.output.values());
        let gz = pre_activation_errors(&self.output)?;

        let mut delta = -self.candidate.values();
        if let Some(y_prev) = y_prev {
            delta += y_prev;
        }

        let g_partition = &gz * &delta * &self.partition.activation_deriv()?;
        let g_candidate = &gz
            * &self.partition.values().mapv(|p| 1. - p)
            * &self.candidate.activation_deriv()?;

        let alpha = params.alpha.vector()?;
        let g_wx = &g_candidate * &(&alpha * &self.wh + &params.beta2.vector()?) + &g_partition;
        let g_wh = match y_prev {
            Some(_) => &g_candidate * &(&alpha * &self.wx + &params.beta1.vector()?),
            None => Array1::zeros(gz.len()),
        };

        tensor::assign_outer(params_errors.weights.matrix_mut()?, &g_wx, &self.input)?;
        match y_prev {
            Some(y_prev) => {
                tensor::assign_dense_outer(params_errors.recurrent.matrix_mut()?, &g_wh, y_prev)?
            }
            None => params_errors.recurrent.values_mut().fill(0.),
        }
        params_errors.candidate_biases.vector_mut()?.assign(&g_candidate);
        params_errors.partition_biases.vector_mut()?.assign(&g_partition);
        params_errors
            .alpha
            .vector_mut()?
            .assign(&(&g_candidate * &self.wx * &self.wh));
        params_errors.beta1.vector_mut()?.assign(&(&g_candidate * &self.wh));
        params_errors.beta2.vector_mut()?.assign(&(&g_candidate * &self.wx));

        if propagate_to_input {
            let gx = tensor::transposed_dot(&params.weights.matrix()?, &g_wx);
            self.input.assign_errors(&gx)?;
        }

        self.gz = gz;
        self.wh_errors = g_wh;
        Ok(())
    }
}
