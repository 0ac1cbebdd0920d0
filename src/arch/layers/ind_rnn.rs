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

/// The parameters of an `IndRnn`, each unit has a single recurrent weight.
#[derive(Clone, Debug)]
pub struct IndRnnParams {
    pub weights: TrainableParameter,
    pub biases: TrainableParameter,
    pub recurrent: TrainableParameter,
}

impl IndRnnParams {
    pub fn new(input_size: usize, output_size: usize) -> Result<Self> {
        Ok(Self {
            weights: TrainableParameter::matrix_of("weights", output_size, input_size)?,
            biases: TrainableParameter::biases_of("biases", output_size)?,
            recurrent: TrainableParameter::new("recurrent", ParamKind::Weights, &[output_size])?,
        })
    }

    pub fn input_size(&self) -> usize {
        self.weights.shape()[1]
    }

    pub fn output_size(&self) -> usize {
        self.weights.shape()[0]
    }
}

impl LayerParameters for IndRnnParams {
    fn params(&self) -> Vec<&TrainableParameter> {
        vec![&self.weights, &self.biases, &self.recurrent]
    }

    fn params_mut(&mut self) -> Vec<&mut TrainableParameter> {
        vec![&mut self.weights, &mut self.biases, &mut self.recurrent]
    }
}

/// An independently recurrent layer, `y = f(W x + b + u ⊙ yPrev)`.
#[derive(Debug)]
pub struct IndRnn {
    input: ValueErrorArray,
    output: ValueErrorArray,
    gz: Array1<f64>,
    state: LayerState<IndRnnParams>,
}

impl IndRnn {
    pub fn new(params: SharedParams<IndRnnParams>, act_fn: Option<ActFn>) -> Result<Self> {
        let (input_size, output_size) = {
            let params = params.borrow();
            (params.input_size(), params.output_size())
        };

        Ok(Self {
            input: ValueErrorArray::zeros(input_size),
            output: ValueErrorArray::zeros(output_size).with_activation(act_fn),
            gz: Array1::zeros(output_size),
            state: LayerState::new(params),
        })
    }
}

impl Layer for IndRnn {
    type Params = IndRnnParams;
    const KIND: &'static str = "ind rnn";

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

    fn state(&self) -> &LayerState<IndRnnParams> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayerState<IndRnnParams> {
        &mut self.state
    }

    fn forward_values(&mut self, window: &dyn TemporalWindow<Self>) -> Result<()> {
        let params = self.state.params();
        let mut z = params.weights.matrix()?.dot(self.input.values()) + &params.biases.vector()?;

        if let Some(prev) = window.previous() {
            z += &(&params.recurrent.vector()? * prev.output.values());
        }

        assign_activated(&mut self.output, &z)
    }

    fn backward_errors(
        &mut self,
        params_errors: &mut IndRnnParams,
        propagate_to_input: bool,
        window: &dyn TemporalWindow<Self>,
    ) -> Result<()> {
        let params = self.state.params();

        if let Some(next) = window.next() {
            self.output.add_errors(&(&params.recurrent.vector()? * &next.gz))?;
        }

        let gz = pre_activation_errors(&self.output)?;

        tensor::assign_outer(params_errors.weights.matrix_mut()?, &gz, &self.input)?;
        params_errors.biases.vector_mut()?.assign(&gz);
        match window.previous() {
            Some(prev) => params_errors
                .recurrent
                .vector_mut()?
                .assign(&(&gz * prev.output.values())),
            None => params_errors.recurrent.values_mut().fill(0.),
        }

        if propagate_to_input {
            let gx = tensor::transposed_dot(&params.weights.matrix()?, &gz);
            self.input.assign_errors(&gx)?;
        }

        self.gz = gz;
        Ok(())
    }
}
