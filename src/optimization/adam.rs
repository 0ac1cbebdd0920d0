use ndarray::{ArrayD, Zip};

use super::{Schedule, Support, UpdateMethod, update_method::check_sizes};
use crate::error::Result;

/// The Adam update method, its time step advances once per batch.
#[derive(Clone, Debug)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    timestep: i32,
}

impl Adam {
    /// Creates a new `Adam` update method.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization algorithm.
    ///
    /// # Returns
    /// A new `Adam` instance.
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            timestep: 0,
        }
    }

    pub fn timestep(&self) -> i32 {
        self.timestep
    }
}

impl UpdateMethod for Adam {
    fn update(
        &mut self,
        values: &mut ArrayD<f64>,
        grad: &ArrayD<f64>,
        support: &mut Option<Support>,
    ) -> Result<()> {
        check_sizes(values, grad)?;

        let Self {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            ..
        } = *self;

        let t = self.timestep.max(1);
        let bc1 = 1. - b1.powi(t);
        let bc2 = 1. - b2.powi(t);
        let step_size = lr * (bc2.sqrt() / bc1);

        let (first, second) = Support::moments(support, values)?;

        Zip::from(values)
            .and(grad)
            .and(first)
            .and(second)
            .for_each(|p, &g, v, s| {
                *v = b1 * *v + (1. - b1) * g;
                *s = b2 * *s + (1. - b2) * g.powi(2);
                *p -= step_size * *v / (s.sqrt() + eps);
            });

        Ok(())
    }

    fn schedule(&self) -> Schedule {
        Schedule {
            batch: true,
            ..Default::default()
        }
    }

    fn new_batch(&mut self) {
        self.timestep += 1;
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    #[test]
    fn first_step_moves_by_the_learning_rate() {
        let mut adam = Adam::new(0.01, 0.9, 0.999, 0.);
        adam.new_batch();

        let mut values = arr1(&[1., 1.]).into_dyn();
        let grad = arr1(&[3., -0.2]).into_dyn();
        adam.update(&mut values, &grad, &mut None).unwrap();

        assert!((values[[0]] - 0.99).abs() < 1e-9);
        assert!((values[[1]] - 1.01).abs() < 1e-9);
    }

    #[test]
    fn time_step_follows_batches() {
        let mut adam = Adam::new(0.01, 0.9, 0.999, 1e-8);
        assert!(adam.schedule().batch);

        adam.new_batch();
        adam.new_batch();
        assert_eq!(adam.timestep(), 2);
    }
}
