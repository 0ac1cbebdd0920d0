use ndarray::{ArrayD, Zip};

use super::{Support, UpdateMethod, update_method::check_sizes};
use crate::error::Result;

/// Gradient descent scaled by a decaying mean of squared gradients.
#[derive(Clone, Debug)]
pub struct RmsProp {
    learning_rate: f64,
    decay: f64,
    epsilon: f64,
}

impl RmsProp {
    /// Creates a new `RmsProp` update method.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `decay` - How much of the previous mean square is kept on each update.
    /// * `epsilon` - Avoids dividing by zero.
    pub fn new(learning_rate: f64, decay: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            decay,
            epsilon,
        }
    }
}

impl UpdateMethod for RmsProp {
    fn update(
        &mut self,
        values: &mut ArrayD<f64>,
        grad: &ArrayD<f64>,
        support: &mut Option<Support>,
    ) -> Result<()> {
        check_sizes(values, grad)?;

        let Self {
            learning_rate: lr,
            decay: rho,
            epsilon: eps,
        } = *self;
        let mean_square = Support::mean_square(support, values)?;

        Zip::from(values)
            .and(grad)
            .and(mean_square)
            .for_each(|p, &g, s| {
                *s = rho * *s + (1. - rho) * g.powi(2);
                *p -= lr * g / (s.sqrt() + eps);
            });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    #[test]
    fn first_step_is_normalized() {
        let mut rmsprop = RmsProp::new(0.01, 0.75, 0.);
        let mut values = arr1(&[1., 1.]).into_dyn();
        let grad = arr1(&[4., -0.5]).into_dyn();

        rmsprop.update(&mut values, &grad, &mut None).unwrap();

        // s = g² / 4, so every step is lr * sign(g) * 2
        assert!((values[[0]] - 0.98).abs() < 1e-12);
        assert!((values[[1]] - 1.02).abs() < 1e-12);
    }
}
