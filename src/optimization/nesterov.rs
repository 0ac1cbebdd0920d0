use ndarray::{ArrayD, Zip};

use super::{Support, UpdateMethod, update_method::check_sizes};
use crate::error::Result;

/// Gradient descent with Nesterov accelerated momentum.
///
/// Uses the reformulation that looks ahead through the velocity, so the gradient is still the one
/// of the current values.
#[derive(Clone, Debug)]
pub struct Nesterov {
    learning_rate: f64,
    momentum: f64,
}

impl Nesterov {
    pub fn new(learning_rate: f64, momentum: f64) -> Self {
        Self {
            learning_rate,
            momentum,
        }
    }
}

impl UpdateMethod for Nesterov {
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
                let prev = *v;
                *v = mu * prev - lr * g;
                *p += -mu * prev + (1. + mu) * *v;
            });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    #[test]
    fn looks_ahead_through_the_velocity() {
        let mut nesterov = Nesterov::new(0.1, 0.9);
        let mut values = arr1(&[1.]).into_dyn();
        let grad = arr1(&[1.]).into_dyn();
        let mut support = None;

        nesterov.update(&mut values, &grad, &mut support).unwrap();
        // v = -0.1, p = 1 + 1.9 * -0.1
        assert!((values[[0]] - 0.81).abs() < 1e-12);

        nesterov.update(&mut values, &grad, &mut support).unwrap();
        // v = -0.19, p = 0.81 + 0.09 - 0.361
        assert!((values[[0]] - 0.539).abs() < 1e-12);
    }
}
