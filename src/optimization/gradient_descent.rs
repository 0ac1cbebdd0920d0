use ndarray::ArrayD;

use super::{Schedule, Support, UpdateMethod, update_method::check_sizes};
use crate::error::Result;

/// Plain gradient descent with an optional per-epoch learning rate decay.
#[derive(Clone, Debug)]
pub struct GradientDescent {
    learning_rate: f64,
    decay: f64,
    epoch: usize,
}

impl GradientDescent {
    /// Creates a new `GradientDescent` update method.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    pub fn new(learning_rate: f64) -> Self {
        Self::with_decay(learning_rate, 0.)
    }

    /// Creates a new `GradientDescent` whose learning rate is `learning_rate / (1 + decay * epoch)`.
    pub fn with_decay(learning_rate: f64, decay: f64) -> Self {
        Self {
            learning_rate,
            decay,
            epoch: 0,
        }
    }

    /// The learning rate for the current epoch.
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate / (1. + self.decay * self.epoch as f64)
    }
}

impl UpdateMethod for GradientDescent {
    fn update(
        &mut self,
        values: &mut ArrayD<f64>,
        grad: &ArrayD<f64>,
        _support: &mut Option<Support>,
    ) -> Result<()> {
        check_sizes(values, grad)?;

        let lr = self.learning_rate();
        values.zip_mut_with(grad, |p, &g| *p -= lr * g);
        Ok(())
    }

    fn schedule(&self) -> Schedule {
        Schedule {
            epoch: self.decay > 0.,
            ..Default::default()
        }
    }

    fn new_epoch(&mut self) {
        self.epoch += 1;
    }
}
