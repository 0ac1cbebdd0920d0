mod affine;
mod attention;
mod batch_norm;
mod biaffine;
mod delta_rnn;
mod feedforward;
mod gru;
mod ind_rnn;
mod layer_norm;
mod lstm;
mod ran;
mod simple_recurrent;

pub use affine::{Affine, AffineParams};
pub use attention::{Attention, AttentionParams};
pub use batch_norm::BatchNorm;
pub use biaffine::{Biaffine, BiaffineParams};
pub use delta_rnn::{DeltaRnn, DeltaRnnParams};
pub use feedforward::Feedforward;
pub use gru::{Gru, GruParams};
pub use ind_rnn::{IndRnn, IndRnnParams};
pub use layer_norm::{LayerNorm, NormParams};
pub use lstm::{Lstm, LstmParams};
pub use ran::{Ran, RanParams};
pub use simple_recurrent::SimpleRecurrent;

use ndarray::Array1;

use super::ValueErrorArray;
use crate::error::Result;

/// Assigns the pre-activation `z` to `array` and activates it.
fn assign_activated(array: &mut ValueErrorArray, z: &Array1<f64>) -> Result<()> {
    array.assign_values(z)?;
    array.activate();
    Ok(())
}

/// The gradient with respect to the pre-activation of `array`, given the errors it holds.
fn pre_activation_errors(array: &ValueErrorArray) -> Result<Array1<f64>> {
    Ok(array.errors() * &array.activation_deriv()?)
}
