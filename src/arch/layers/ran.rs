use std::slice;

use ndarray::Array1;

use super::assign_activated;
use crate::{
    arch::{
        GateParams, Layer, LayerParameters, LayerState, LinearParams, SharedParams,
        TemporalWindow, TrainableParameter, ValueErrorArray, activations::ActFn,
    },
    error::Result,
};

/// The parameters of a `Ran`, the candidate has no recurrent term.
#[derive(Clone, Debug)]
pub struct RanParams {
    pub input_gate: GateParams,
    pub forget_gate: GateParams,
    pub candidate: LinearParams,
}

impl RanParams {
    pub fn new(input_size: usize, output_size: usize) -> Result<Self> {
        Ok(Self {
            input_gate: GateParams::new(input_size, output_size)?,
            forget_gate: GateParams::new(input_size, output_size)?,
            candidate: LinearParams::new(input_size, output_size)?,
        })
    }
}

impl LayerParameters for RanParams {
    fn params(&self) -> Vec<&TrainableParameter> {
        let mut params = self.input_gate.params();
        params.extend(self.forget_gate.params());
        params.extend(self.candidate.params());
        params
    }

    fn params_mut(&mut self) -> Vec<&mut TrainableParameter> {
        let mut params = self.input_gate.params_mut();
        params.extend(self.forget_gate.params_mut());
        params.extend(self.candidate.params_mut());
        params
    }
}

/// A recurrent additive network layer.
///
/// ```text
/// i = σ(Wi x + bi + Ui yPrev)
/// f = σ(Wf x + bf + Uf yPrev)
/// cell = i ⊙ (Wc x + bc) + f ⊙ cellPrev
/// y = g(cell)
/// ```
///
/// The cell is the output before its activation.
#[derive(Debug)]
pub struct Ran {
    input: ValueErrorArray,
    output: ValueErrorArray,
    input_gate: ValueErrorArray,
    forget_gate: ValueErrorArray,
    candidate: Array1<f64>,
    cell_errors: Array1<f64>,
    state: LayerState<RanParams>,
}

impl Ran {
    pub fn new(params: SharedParams<RanParams>, act_fn: Option<ActFn>) -> Result<Self> {
        let (input_size, output_size) = {
            let params = params.borrow();
            (params.candidate.input_size(), params.candidate.output_size())
        };

        let gate = || ValueErrorArray::zeros(output_size).with_activation(Some(ActFn::sigmoid(1.)));

        Ok(Self {
            input: ValueErrorArray::zeros(input_size),
            output: ValueErrorArray::zeros(output_size).with_activation(act_fn),
            input_gate: gate(),
            forget_gate: gate(),
            candidate: Array1::zeros(output_size),
            cell_errors: Array1::zeros(output_size),
            state: LayerState::new(params),
        })
    }

    /// The gradient with respect to the cell, valid after `backward`.
    pub fn cell_errors(&self) -> &Array1<f64> {
        &self.cell_errors
    }
}

impl Layer for Ran {
    type Params = RanParams;
    const KIND: &'static str = "ran";

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

    fn state(&self) -> &LayerState<RanParams> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayerState<RanParams> {
        &mut self.state
    }

    fn forward_values(&mut self, window: &dyn TemporalWindow<Self>) -> Result<()> {
        let params = self.state.params();
        let x = self.input.values();
        let prev = window.previous();
        let y_prev = prev.map(|prev| prev.output.values());

        assign_activated(&mut self.input_gate, &params.input_gate.pre_activation(x, y_prev)?)?;
        assign_activated(&mut self.forget_gate, &params.forget_gate.pre_activation(x, y_prev)?)?;
        self.candidate = params.candidate.pre_activation(x)?;

        let mut cell = self.input_gate.values() * &self.candidate;

        if let Some(prev) = prev {
            cell += &(self.forget_gate.values() * prev.output.not_activated()?);
        }

        assign_activated(&mut self.output, &cell)
    }

    fn backward_errors(
        &mut self,
        params_errors: &mut RanParams,
        propagate_to_input: bool,
        window: &dyn TemporalWindow<Self>,
    ) -> Result<()> {
        let params = self.state.params();
        let (prev, next) = (window.previous(), window.next());

        if let Some(next) = next {
            let mut errors = params.input_gate.recurrent_errors(next.input_gate.errors())?;
            errors += &params.forget_gate.recurrent_errors(next.forget_gate.errors())?;
            self.output.add_errors(&errors)?;
        }

        let mut g_cell = self.output.errors() * &self.output.activation_deriv()?;

        if let Some(next) = next {
            g_cell += &(next.forget_gate.values() * &next.cell_errors);
        }

        let g_input = &g_cell * &self.candidate * &self.input_gate.activation_deriv()?;
        let g_candidate = &g_cell * self.input_gate.values();
        let g_forget = match prev {
            Some(prev) => {
                &g_cell * prev.output.not_activated()? * &self.forget_gate.activation_deriv()?
            }
            None => Array1::zeros(g_cell.len()),
        };

        self.input_gate.assign_errors(&g_input)?;
        self.forget_gate.assign_errors(&g_forget)?;

        let y_prev = prev.map(|prev| prev.output.values());
        params_errors.input_gate.assign_gradients(&g_input, &self.input, y_prev)?;
        params_errors.forget_gate.assign_gradients(&g_forget, &self.input, y_prev)?;
        params_errors.candidate.assign_gradients(&g_candidate, &self.input)?;

        if propagate_to_input {
            let mut gx = params.input_gate.input_errors(&g_input)?;
            gx += &params.forget_gate.input_errors(&g_forget)?;
            gx += &params.candidate.input_errors(&g_candidate)?;
            self.input.assign_errors(&gx)?;
        }

        self.cell_errors = g_cell;
        Ok(())
    }
}
