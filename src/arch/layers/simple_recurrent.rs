use std::slice;

use ndarray::Array1;

use super::{assign_activated, pre_activation_errors};
use crate::{
    arch::{
        Contributions, GateParams, Layer, LayerState, SharedParams, TemporalWindow,
        ValueErrorArray, activations::ActFn,
    },
    error::{LayerErr, Result},
};

/// An Elman recurrent layer, `y = f(W x + b + U yPrev)`.
#[derive(Debug)]
pub struct SimpleRecurrent {
    input: ValueErrorArray,
    output: ValueErrorArray,
    gz: Array1<f64>,
    contributions: Option<Contributions>,
    recurrent_relevance: Option<Array1<f64>>,
    state: LayerState<GateParams>,
}

impl SimpleRecurrent {
    pub fn new(params: SharedParams<GateParams>, act_fn: Option<ActFn>) -> Result<Self> {
        let (input_size, output_size) = {
            let params = params.borrow();
            (params.input_size(), params.output_size())
        };

        Ok(Self {
            input: ValueErrorArray::zeros(input_size),
            output: ValueErrorArray::zeros(output_size).with_activation(act_fn),
            gz: Array1::zeros(output_size),
            contributions: None,
            recurrent_relevance: None,
            state: LayerState::new(params),
        })
    }

    /// The relevance this step sends back to the previous output.
    pub fn recurrent_relevance(&self) -> Result<&Array1<f64>> {
        self.recurrent_relevance
            .as_ref()
            .ok_or(LayerErr::UninitializedState {
                what: "the recurrent relevance",
            })
    }
}

impl Layer for SimpleRecurrent {
    type Params = GateParams;
    const KIND: &'static str = "simple recurrent";

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

    fn state(&self) -> &LayerState<GateParams> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayerState<GateParams> {
        &mut self.state
    }

    fn forward_values(&mut self, window: &dyn TemporalWindow<Self>) -> Result<()> {
        let params = self.state.params();
        let y_prev = window.previous().map(|prev| prev.output.values());
        let z = params.pre_activation(self.input.values(), y_prev)?;

        self.contributions = None;
        self.recurrent_relevance = None;
        self.output.clear_relevance();
        assign_activated(&mut self.output, &z)
    }

    fn backward_errors(
        &mut self,
        params_errors: &mut GateParams,
        propagate_to_input: bool,
        window: &dyn TemporalWindow<Self>,
    ) -> Result<()> {
        let params = self.state.params();

        if let Some(next) = window.next() {
            self.output.add_errors(&params.recurrent_errors(&next.gz)?)?;
        }

        let gz = pre_activation_errors(&self.output)?;
        let y_prev = window.previous().map(|prev| prev.output.values());
        params_errors.assign_gradients(&gz, &self.input, y_prev)?;

        if propagate_to_input {
            self.input.assign_errors(&params.input_errors(&gz)?)?;
        }

        self.gz = gz;
        Ok(())
    }

    fn forward_contributions(&mut self, window: &dyn TemporalWindow<Self>) -> Result<()> {
        let params = self.state.params();
        let recurrent = match window.previous() {
            Some(prev) => Some(Contributions::of_linear(
                &params.recurrent.matrix()?,
                prev.output.values(),
            )),
            None => None,
        };

        let contributions = Contributions {
            inputs: vec![Contributions::of_linear(
                &params.weights.matrix()?,
                self.input.values(),
            )],
            recurrent,
            biases: params.biases.vector()?.to_owned(),
        };

        self.recurrent_relevance = None;
        self.output.clear_relevance();
        assign_activated(&mut self.output, &contributions.pre_activation())?;
        self.contributions = Some(contributions);
        Ok(())
    }

    /// Distributes the output relevance, plus what the next step sent back, onto the input and
    /// the previous output.
    ///
    /// Must run right to left over the sequence, like `backward`. Steps other than the last may
    /// leave their output relevance unassigned, it counts as zero. The output relevance itself is
    /// never modified, so running it again gives the same result.
    fn relevance_of_inputs(&mut self, window: &dyn TemporalWindow<Self>) -> Result<()> {
        let contributions = self.contributions.as_ref().ok_or(LayerErr::UninitializedState {
            what: "the contributions",
        })?;

        let relevance = match window.next() {
            Some(next) => {
                let mut relevance = next.recurrent_relevance()?.clone();
                if let Ok(own) = self.output.relevance() {
                    relevance += own;
                }
                relevance
            }
            None => self.output.relevance()?.clone(),
        };

        let (inputs, recurrent) = contributions.distribute(&relevance);
        self.input.assign_relevance(&inputs[0])?;
        self.recurrent_relevance = recurrent;
        Ok(())
    }
}
