use ndarray::{ArrayD, Zip};

use super::{Support, UpdateMethod, update_method::check_sizes};
use crate::error::Result;

/// Gradient descent accumulating a velocity per parameter.
#[derive(Clone, Debug)]
pub struct GradientDescentWithMomentum {
    learning_rate: f64,
    momentum: f64,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` update method.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - Hyperparameter to the optimization algorithm.
    pub fn new(learning_rate: f64, momentum: f64) -> Self {
        Self {
            learning_rate,
            momentum,
        }
    }
}

impl UpdateMethod for GradientDescentWithMomentum {
    fn update(
        &mut self,
        values: &mut ArrayD<f64>,
        grad: &ArrayD<f64>,
        support: &mut Option<Support>,
    ) -> Result<()> {
        check_sizes(values, grad)?;

        let lr = self.learning_rate;
        let mu = self.momentum;
        let velocity = Support::velocity(support, values)?;

        Zip::from(values)
            .and(grad)
            .and(velocity)
            .for_each(|p, &g, v| {
                *v = (mu * *v) + g;
                *p -= lr * *v;
            });

        Ok(())
    }
}
