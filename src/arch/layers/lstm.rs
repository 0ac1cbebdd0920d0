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

/// The parameters of the four units of an `Lstm`.
#[derive(Clone, Debug)]
pub struct LstmParams {
    pub input_gate: GateParams,
    pub forget_gate: GateParams,
    pub output_gate: GateParams,
    pub candidate: GateParams,
}

impl LstmParams {
    pub fn new(input_size: usize, output_size: usize) -> Result<Self> {
        Ok(Self {
            input_gate: GateParams::new(input_size, output_size)?,
            forget_gate: GateParams::new(input_size, output_size)?,
            output_gate: GateParams::new(input_size, output_size)?,
            candidate: GateParams::new(input_size, output_size)?,
        })
    }

    fn units(&self) -> [&GateParams; 4] {
        [
            &self.input_gate,
            &self.forget_gate,
            &self.output_gate,
            &self.candidate,
        ]
    }
}

impl LayerParameters for LstmParams {
    fn params(&self) -> Vec<&TrainableParameter> {
        self.units().into_iter().flat_map(|u| u.params()).collect()
    }

    fn params_mut(&mut self) -> Vec<&mut TrainableParameter> {
        let mut params = self.input_gate.params_mut();
        params.extend(self.forget_gate.params_mut());
        params.extend(self.output_gate.params_mut());
        params.extend(self.candidate.params_mut());
        params
    }
}

/// A long short-term memory layer.
///
/// ```text
/// i = σ(Wi x + bi + Ui yPrev)
/// f = σ(Wf x + bf + Uf yPrev)
/// o = σ(Wo x + bo + Uo yPrev)
/// c = g(Wc x + bc + Uc yPrev)
/// cell = f ⊙ cellPrev + i ⊙ c
/// y = o ⊙ h(cell)
/// ```
///
/// The errors of every gate hold the gradient with respect to its pre-activation after
/// `backward`, the previous step reads them to receive its recurrent errors.
#[derive(Debug)]
pub struct Lstm {
    input: ValueErrorArray,
    output: ValueErrorArray,
    input_gate: ValueErrorArray,
    forget_gate: ValueErrorArray,
    output_gate: ValueErrorArray,
    candidate: ValueErrorArray,
    cell: ValueErrorArray,
    state: LayerState<LstmParams>,
}

impl Lstm {
    /// Creates a new `Lstm` with `tanh` as both the candidate and the cell activations.
    pub fn new(params: SharedParams<LstmParams>) -> Result<Self> {
        Self::with_activations(params, ActFn::Tanh, ActFn::Tanh)
    }

    /// Creates a new `Lstm`.
    ///
    /// # Arguments
    /// * `params` - The parameters shared with the other instances.
    /// * `candidate_fn` - The activation `g` of the candidate.
    /// * `cell_fn` - The activation `h` applied to the cell.
    pub fn with_activations(
        params: SharedParams<LstmParams>,
        candidate_fn: ActFn,
        cell_fn: ActFn,
    ) -> Result<Self> {
        let (input_size, output_size) = {
            let params = params.borrow();
            (params.input_gate.input_size(), params.input_gate.output_size())
        };

        let gate = || ValueErrorArray::zeros(output_size).with_activation(Some(ActFn::sigmoid(1.)));

        Ok(Self {
            input: ValueErrorArray::zeros(input_size),
            output: ValueErrorArray::zeros(output_size),
            input_gate: gate(),
            forget_gate: gate(),
            output_gate: gate(),
            candidate: ValueErrorArray::zeros(output_size).with_activation(Some(candidate_fn)),
            cell: ValueErrorArray::zeros(output_size).with_activation(Some(cell_fn)),
            state: LayerState::new(params),
        })
    }

    /// The cell after `h` was applied, its errors hold the cell gradient after `backward`.
    pub fn cell(&self) -> &ValueErrorArray {
        &self.cell
    }

    /// The errors this step sends back to the previous output.
    fn recurrent_errors(&self, params: &LstmParams) -> Result<Array1<f64>> {
        let mut errors = params.input_gate.recurrent_errors(self.input_gate.errors())?;
        errors += &params.forget_gate.recurrent_errors(self.forget_gate.errors())?;
        errors += &params.output_gate.recurrent_errors(self.output_gate.errors())?;
        errors += &params.candidate.recurrent_errors(self.candidate.errors())?;
        Ok(errors)
    }
}

impl Layer for Lstm {
    type Params = LstmParams;
    const KIND: &'static str = "lstm";

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

    fn state(&self) -> &LayerState<LstmParams> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayerState<LstmParams> {
        &mut self.state
    }

    fn forward_values(&mut self, window: &dyn TemporalWindow<Self>) -> Result<()> {
        let params = self.state.params();
        let x = self.input.values();
        let prev = window.previous();
        let y_prev = prev.map(|prev| prev.output.values());

        assign_activated(&mut self.input_gate, &params.input_gate.pre_activation(x, y_prev)?)?;
        assign_activated(&mut self.forget_gate, &params.forget_gate.pre_activation(x, y_prev)?)?;
        assign_activated(&mut self.output_gate, &params.output_gate.pre_activation(x, y_prev)?)?;
        assign_activated(&mut self.candidate, &params.candidate.pre_activation(x, y_prev)?)?;

        let mut cell = self.input_gate.values() * self.candidate.values();

        if let Some(prev) = prev {
            cell += &(self.forget_gate.values() * prev.cell.not_activated()?);
        }

        assign_activated(&mut self.cell, &cell)?;

        let y = self.output_gate.values() * self.cell.values();
        self.output.assign_values(&y)
    }

    fn backward_errors(
        &mut self,
        params_errors: &mut LstmParams,
        propagate_to_input: bool,
        window: &dyn TemporalWindow<Self>,
    ) -> Result<()> {
        let params = self.state.params();
        let (prev, next) = (window.previous(), window.next());

        if let Some(next) = next {
            self.output.add_errors(&next.recurrent_errors(&params)?)?;
        }

        let gy = self.output.errors();

        let mut g_cell = self.output_gate.values() * &self.cell.activation_deriv()? * gy;

        if let Some(next) = next {
            g_cell += &(next.forget_gate.values() * next.cell.errors());
        }

        let g_output = self.cell.values() * &self.output_gate.activation_deriv()? * gy;
        let g_input = &g_cell * self.candidate.values() * &self.input_gate.activation_deriv()?;
        let g_candidate = &g_cell * self.input_gate.values() * &self.candidate.activation_deriv()?;
        let g_forget = match prev {
            Some(prev) => {
                &g_cell * prev.cell.not_activated()? * &self.forget_gate.activation_deriv()?
            }
            None => Array1::zeros(g_cell.len()),
        };

        self.cell.assign_errors(&g_cell)?;
        self.input_gate.assign_errors(&g_input)?;
        self.forget_gate.assign_errors(&g_forget)?;
        self.output_gate.assign_errors(&g_output)?;
        self.candidate.assign_errors(&g_candidate)?;

        let y_prev = prev.map(|prev| prev.output.values());
        params_errors.input_gate.assign_gradients(&g_input, &self.input, y_prev)?;
        params_errors.forget_gate.assign_gradients(&g_forget, &self.input, y_prev)?;
        params_errors.output_gate.assign_gradients(&g_output, &self.input, y_prev)?;
        params_errors.candidate.assign_gradients(&g_candidate, &self.input, y_prev)?;

        if propagate_to_input {
            let mut gx = params.input_gate.input_errors(&g_input)?;
            gx += &params.forget_gate.input_errors(&g_forget)?;
            gx += &params.output_gate.input_errors(&g_output)?;
            gx += &params.candidate.input_errors(&g_candidate)?;
            self.input.assign_errors(&gx)?;
        }

        Ok(())
    }
}
