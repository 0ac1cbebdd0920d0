use std::slice;

use ndarray::Array1;

use crate::{
    arch::{
        Layer, LayerParameters, LayerState, ParamKind, SharedParams, TemporalWindow,
        TrainableParameter, ValueErrorArray,
    },
    error::{LayerErr, Result},
    tensor,
};

/// The context vector an `Attention` layer scores its attention arrays against.
#[derive(Clone, Debug)]
pub struct AttentionParams {
    pub context: TrainableParameter,
}

impl AttentionParams {
    pub fn new(attention_size: usize) -> Result<Self> {
        Ok(Self {
            context: TrainableParameter::new("context", ParamKind::Weights, &[attention_size])?,
        })
    }

    pub fn attention_size(&self) -> usize {
        self.context.shape()[0]
    }
}

impl LayerParameters for AttentionParams {
    fn params(&self) -> Vec<&TrainableParameter> {
        vec![&self.context]
    }

    fn params_mut(&mut self) -> Vec<&mut TrainableParameter> {
        vec![&mut self.context]
    }
}

/// Pools a sequence of inputs into one output weighted by softmax attention.
///
/// ```text
/// s_i = v · a_i
/// α = softmax(s)
/// y = Σ α_i x_i
/// ```
///
/// Each input `x_i` comes with its attention array `a_i`, both receive errors on `backward`.
#[derive(Debug)]
pub struct Attention {
    inputs: Vec<ValueErrorArray>,
    attention: Vec<ValueErrorArray>,
    output: ValueErrorArray,
    importance: Option<Array1<f64>>,
    state: LayerState<AttentionParams>,
}

impl Attention {
    /// Creates a new `Attention` layer over `len` zeroed inputs of `input_size` elements.
    pub fn new(
        params: SharedParams<AttentionParams>,
        input_size: usize,
        len: usize,
    ) -> Result<Self> {
        let attention_size = params.borrow().attention_size();
        let inputs = (0..len).map(|_| ValueErrorArray::zeros(input_size)).collect();
        let attention = (0..len).map(|_| ValueErrorArray::zeros(attention_size)).collect();

        Self::from_arrays(params, inputs, attention)
    }

    /// Creates a new `Attention` layer over the given inputs and attention arrays.
    ///
    /// # Returns
    /// An `InvalidConfiguration` error if there are no inputs, the inputs have different sizes,
    /// an attention array doesn't have the context's size or the counts differ.
    pub fn from_arrays(
        params: SharedParams<AttentionParams>,
        inputs: Vec<ValueErrorArray>,
        attention: Vec<ValueErrorArray>,
    ) -> Result<Self> {
        let Some(input_size) = inputs.first().map(ValueErrorArray::len) else {
            return Err(LayerErr::invalid("attention over an empty sequence"));
        };

        if input_size == 0 || inputs.iter().any(|x| x.len() != input_size) {
            return Err(LayerErr::invalid(
                "the inputs of an attention layer must share a non zero size",
            ));
        }

        if attention.len() != inputs.len() {
            return Err(LayerErr::invalid(format!(
                "{} attention arrays for {} inputs",
                attention.len(),
                inputs.len()
            )));
        }

        let attention_size = params.borrow().attention_size();
        if let Some(a) = attention.iter().find(|a| a.len() != attention_size) {
            return Err(LayerErr::invalid(format!(
                "attention arrays must have size {attention_size}, got {}",
                a.len()
            )));
        }

        Ok(Self {
            inputs,
            attention,
            output: ValueErrorArray::zeros(input_size),
            importance: None,
            state: LayerState::new(params),
        })
    }

    pub fn attention_arrays(&self) -> &[ValueErrorArray] {
        &self.attention
    }

    pub fn attention_arrays_mut(&mut self) -> &mut [ValueErrorArray] {
        &mut self.attention
    }

    /// The attention scores `α` of the last `forward`.
    pub fn importance(&self) -> Result<&Array1<f64>> {
        self.importance.as_ref().ok_or(LayerErr::UninitializedState {
            what: "the attention scores",
        })
    }
}

impl Layer for Attention {
    type Params = AttentionParams;
    const KIND: &'static str = "attention";

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

    fn state(&self) -> &LayerState<AttentionParams> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayerState<AttentionParams> {
        &mut self.state
    }

    fn forward_values(&mut self, _window: &dyn TemporalWindow<Self>) -> Result<()> {
        let params = self.state.params();
        let v = params.context.vector()?;

        let scores: Array1<f64> = self.attention.iter().map(|a| a.values().dot(&v)).collect();
        let importance = tensor::softmax(&scores);

        let mut y = Array1::<f64>::zeros(self.output.len());
        for (&alpha, x) in importance.iter().zip(&self.inputs) {
            y.scaled_add(alpha, x.values());
        }

        self.output.assign_values(&y)?;
        self.importance = Some(importance);
        Ok(())
    }

    fn backward_errors(
        &mut self,
        params_errors: &mut AttentionParams,
        propagate_to_input: bool,
        _window: &dyn TemporalWindow<Self>,
    ) -> Result<()> {
        let params = self.state.params();
        let importance = self.importance.as_ref().ok_or(LayerErr::UninitializedState {
            what: "the attention scores",
        })?;

        let gy = self.output.errors();
        let g_importance: Array1<f64> = self.inputs.iter().map(|x| gy.dot(x.values())).collect();
        let mean = importance.dot(&g_importance);
        let g_scores = importance * &(g_importance - mean);

        let mut gv = params_errors.context.vector_mut()?;
        gv.fill(0.);
        for (&gs, a) in g_scores.iter().zip(&self.attention) {
            gv.scaled_add(gs, a.values());
        }

        if propagate_to_input {
            let v = params.context.vector()?;
            for (&gs, a) in g_scores.iter().zip(&mut self.attention) {
                a.assign_errors(&(&v * gs))?;
            }
            for (&alpha, x) in importance.iter().zip(&mut self.inputs) {
                x.assign_errors(&(gy * alpha))?;
            }
        }

        Ok(())
    }
}
