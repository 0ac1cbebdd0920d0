use std::slice;

use ndarray::Array1;

use super::assign_activated;
use crate::{
    arch::{
        GateParams, Layer, LayerParameters, LayerState, SharedParams, TemporalWindow,
        TrainableParameter, ValueErrorArray, activations::ActFn,
    },
    error::Result,
};

/// The parameters of the three units of a `Gru`.
#[derive(Clone, Debug)]
pub struct GruParams {
    pub reset_gate: GateParams,
    pub partition_gate: GateParams,
    pub candidate: GateParams,
}

impl GruParams {
    pub fn new(input_size: usize, output_size: usize) -> Result<Self> {
        Ok(Self {
            reset_gate: GateParams::new(input_size, output_size)?,
            partition_gate: GateParams::new(input_size, output_size)?,
            candidate: GateParams::new(input_size, output_size)?,
        })
    }
}

impl LayerParameters for GruParams {
    fn params(&self) -> Vec<&TrainableParameter> {
        let mut params = self.reset_gate.params();
        params.extend(self.partition_gate.params());
        params.extend(self.candidate.params());
        params
    }

    fn params_mut(&mut self) -> Vec<&mut TrainableParameter> {
        let mut params = self.reset_gate.params_mut();
        params.extend(self.partition_gate.params_mut());
        params.extend(self.candidate.params_mut());
        params
    }
}

/// A gated recurrent unit layer.
///
/// ```text
/// r = σ(Wr x + br + Ur yPrev)
/// p = σ(Wp x + bp + Up yPrev)
/// c = g(Wc x + bc + Uc (r ⊙ yPrev))
/// y = p ⊙ c + (1 - p) ⊙ yPrev
/// ```
#[derive(Debug)]
pub struct Gru {
    input: ValueErrorArray,
    output: ValueErrorArray,
    reset_gate: ValueErrorArray,
    partition_gate: ValueErrorArray,
    candidate: ValueErrorArray,
    state: LayerState<GruParams>,
}

impl Gru {
    /// Creates a new `Gru` with `tanh` as the candidate activation.
    pub fn new(params: SharedParams<GruParams>) -> Result<Self> {
        Self::with_activation(params, ActFn::Tanh)
    }

    pub fn with_activation(params: SharedParams<GruParams>, candidate_fn: ActFn) -> Result<Self> {
        let (input_size, output_size) = {
            let params = params.borrow();
            (params.candidate.input_size(), params.candidate.output_size())
        };

        let gate = || ValueErrorArray::zeros(output_size).with_activation(Some(ActFn::sigmoid(1.)));

        Ok(Self {
            input: ValueErrorArray::zeros(input_size),
            output: ValueErrorArray::zeros(output_size),
            reset_gate: gate(),
            partition_gate: gate(),
            candidate: ValueErrorArray::zeros(output_size).with_activation(Some(candidate_fn)),
            state: LayerState::new(params),
        })
    }

    /// The errors this step sends back to the previous output.
    fn recurrent_errors(&self, params: &GruParams) -> Result<Array1<f64>> {
        let keep = self.partition_gate.values().mapv(|p| 1. - p);
        let mut errors = keep * self.output.errors();
        errors += &params.partition_gate.recurrent_errors(self.partition_gate.errors())?;
        errors += &(self.reset_gate.values()
            * &params.candidate.recurrent_errors(self.candidate.errors())?);
        errors += &params.reset_gate.recurrent_errors(self.reset_gate.errors())?;
        Ok(errors)
    }
}

impl Layer for Gru {
    type Params = GruParams;
    const KIND: &'static str = "gru";

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

    fn state(&self) -> &LayerState<GruParams> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayerState<GruParams> {
        &mut self.state
    }

    fn forward_values(&mut self, window: &dyn TemporalWindow<Self>) -> Result<()> {
        let params = self.state.params();
        let x = self.input.values();
        let y_prev = window.previous().map(|prev| prev.output.values());

        assign_activated(&mut self.reset_gate, &params.reset_gate.pre_activation(x, y_prev)?)?;
        assign_activated(
            &mut self.partition_gate,
            &params.partition_gate.pre_activation(x, y_prev)?,
        )?;

        let reset = y_prev.map(|y_prev| self.reset_gate.values() * y_prev);
        assign_activated(
            &mut self.candidate,
            &params.candidate.pre_activation(x, reset.as_ref())?,
        )?;

        let p = self.partition_gate.values();
        let mut y = p * self.candidate.values();

        if let Some(y_prev) = y_prev {
            y += &(p.mapv(|p| 1. - p) * y_prev);
        }

        self.output.assign_values(&y)
    }

    fn backward_errors(
        &mut self,
        params_errors: &mut GruParams,
        propagate_to_input: bool,
        window: &dyn TemporalWindow<Self>,
    ) -> Result<()> {
        let params = self.state.params();

        if let Some(next) = window.next() {
            self.output.add_errors(&next.recurrent_errors(&params)?)?;
        }

        let y_prev = window.previous().map(|prev| prev.output.values());
        let gy = self.output.errors();

        let g_candidate =
            gy * self.partition_gate.values() * &self.candidate.activation_deriv()?;

        let mut delta = self.candidate.values().clone();
        if let Some(y_prev) = y_prev {
            delta -= y_prev;
        }
        let g_partition = gy * &delta * &self.partition_gate.activation_deriv()?;

        let g_reset = match y_prev {
            Some(y_prev) => {
                params.candidate.recurrent_errors(&g_candidate)?
                    * y_prev
                    * &self.reset_gate.activation_deriv()?
            }
            None => Array1::zeros(g_candidate.len()),
        };

        self.reset_gate.assign_errors(&g_reset)?;
        self.partition_gate.assign_errors(&g_partition)?;
        self.candidate.assign_errors(&g_candidate)?;

        let reset = y_prev.map(|y_prev| self.reset_gate.values() * y_prev);
        params_errors.reset_gate.assign_gradients(&g_reset, &self.input, y_prev)?;
        params_errors.partition_gate.assign_gradients(&g_partition, &self.input, y_prev)?;
        params_errors.candidate.assign_gradients(&g_candidate, &self.input, reset.as_ref())?;

        if propagate_to_input {
            let mut gx = params.reset_gate.input_errors(&g_reset)?;
            gx += &params.partition_gate.input_errors(&g_partition)?;
            gx += &params.candidate.input_errors(&g_candidate)?;
            self.input.assign_errors(&gx)?;
        }

        Ok(())
    }
}
