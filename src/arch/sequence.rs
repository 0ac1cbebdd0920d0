use log::debug;
use ndarray::Array1;

use super::{Layer, LayerPool, SharedParams, split_at_step};
use crate::{
    error::{LayerErr, Result},
    optimization::{Optimizer, UpdateMethod},
};

/// Runs a single-input recurrent layer over whole sequences.
///
/// Forward goes left to right and backward right to left over one pooled instance per step, every
/// step's gradients are accumulated into the given optimizer.
pub struct SequenceEncoder<L: Layer, F> {
    pool: LayerPool<L, F>,
}

impl<L, F> SequenceEncoder<L, F>
where
    L: Layer,
    F: FnMut(SharedParams<L::Params>) -> Result<L>,
{
    pub fn new(pool: LayerPool<L, F>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &LayerPool<L, F> {
        &self.pool
    }

    /// The instances of the last encoded sequence.
    pub fn steps(&self) -> &[L] {
        self.pool.in_use()
    }

    /// Encodes a sequence.
    ///
    /// # Arguments
    /// * `sequence` - The input of each step.
    ///
    /// # Returns
    /// The output of each step, or an `InvalidConfiguration` error if `sequence` is empty.
    pub fn forward(&mut self, sequence: &[Array1<f64>]) -> Result<Vec<Array1<f64>>> {
        if sequence.is_empty() {
            return Err(LayerErr::invalid("can't encode an empty sequence"));
        }

        debug!(layer = L::KIND, len = sequence.len(); "Encoding a sequence");

        for (t, x) in sequence.iter().enumerate() {
            self.pool.acquire(t)?.assign_input(0, x)?;
        }

        let steps = self.pool.in_use_mut();

        for t in 0..steps.len() {
            let (layer, window) = split_step(steps, t)?;
            layer.forward(&window)?;
        }

        Ok(steps.iter().map(|l| l.output().values().clone()).collect())
    }

    /// Back-propagates the errors of the last encoded sequence.
    ///
    /// # Arguments
    /// * `output_errors` - The errors of each step's output.
    /// * `propagate_to_input` - Whether to compute the input errors.
    /// * `optimizer` - Receives the gradients of every step.
    ///
    /// # Returns
    /// The errors of each step's input, empty if `propagate_to_input` is false.
    pub fn backward<M: UpdateMethod>(
        &mut self,
        output_errors: &[Array1<f64>],
        propagate_to_input: bool,
        optimizer: &mut Optimizer<L::Params, M>,
    ) -> Result<Vec<Array1<f64>>> {
        let steps = self.pool.in_use_mut();

        if steps.is_empty() {
            return Err(LayerErr::UninitializedState {
                what: "the encoded sequence",
            });
        }

        if output_errors.len() != steps.len() {
            return Err(LayerErr::invalid(format!(
                "got {} output errors for a sequence of {} steps",
                output_errors.len(),
                steps.len()
            )));
        }

        for (layer, errors) in steps.iter_mut().zip(output_errors) {
            layer.output_mut().assign_errors(errors)?;
        }

        let mut params_errors = steps[0].errors_bundle();

        for t in (0..steps.len()).rev() {
            let (layer, window) = split_step(steps, t)?;
            layer.backward(&mut params_errors, propagate_to_input, &window)?;
            optimizer.accumulate(&params_errors)?;
        }

        if !propagate_to_input {
            return Ok(Vec::new());
        }

        Ok(steps.iter().map(|l| l.inputs()[0].errors().clone()).collect())
    }
}

fn split_step<L>(steps: &mut [L], t: usize) -> Result<(&mut L, super::Neighbors<'_, L>)> {
    split_at_step(steps, t).ok_or_else(|| LayerErr::invalid(format!("there's no step {t}")))
}
