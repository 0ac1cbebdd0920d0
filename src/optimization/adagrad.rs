use ndarray::{ArrayD, Zip};

use super::{Support, UpdateMethod, update_method::check_sizes};
use crate::error::Result;

/// Gradient descent scaled by the running sum of squared gradients.
#[derive(Clone, Debug)]
pub struct AdaGrad {
    learning_rate: f64,
    epsilon: f64,
}

impl AdaGrad {
    pub fn new(learning_rate: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            epsilon,
        }
    }
}

impl UpdateMethod for AdaGrad {
    fn update(
        &mut self,
        values: &mut ArrayD<f64>,
        grad: &ArrayD<f64>,
        support: &mut Option<Support>,
    ) -> Result<()> {
        check_sizes(values, grad)?;

        let lr = self.learning_rate;
        let eps = self.epsilon;
        let squared_sum = Support::squared_sum(support, values)?;

        Zip::from(values)
            .and(grad)
            .and(squared_sum)
            .for_each(|p, &g, s| {
                *s += g.powi(2);
                *p -= lr * g / (s.sqrt() + eps);
            });

        Ok(())
    }
}
