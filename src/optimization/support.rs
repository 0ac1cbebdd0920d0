use ndarray::ArrayD;

use crate::error::{LayerErr, Result};

/// The per-parameter state an update method keeps between updates.
///
/// It is created lazily by the update method the first time it updates a parameter and belongs to
/// that parameter alone.
#[derive(Clone, Debug)]
pub enum Support {
    Velocity(ArrayD<f64>),
    SquaredSum(ArrayD<f64>),
    MeanSquare(ArrayD<f64>),
    Moments {
        first: ArrayD<f64>,
        second: ArrayD<f64>,
    },
}

impl Support {
    fn kind(&self) -> &'static str {
        match self {
            Support::Velocity(_) => "velocity",
            Support::SquaredSum(_) => "squared sum",
            Support::MeanSquare(_) => "mean square",
            Support::Moments { .. } => "moments",
        }
    }

    /// Gets the velocity of a parameter, creating it zeroed on first use.
    pub fn velocity<'a>(
        support: &'a mut Option<Support>,
        like: &ArrayD<f64>,
    ) -> Result<&'a mut ArrayD<f64>> {
        let support =
            support.get_or_insert_with(|| Support::Velocity(ArrayD::zeros(like.raw_dim())));

        match support {
            Support::Velocity(v) => Ok(v),
            other => Err(mismatch(other, "velocity")),
        }
    }

    /// Gets the running sum of squared gradients, creating it zeroed on first use.
    pub fn squared_sum<'a>(
        support: &'a mut Option<Support>,
        like: &ArrayD<f64>,
    ) -> Result<&'a mut ArrayD<f64>> {
        let support =
            support.get_or_insert_with(|| Support::SquaredSum(ArrayD::zeros(like.raw_dim())));

        match support {
            Support::SquaredSum(s) => Ok(s),
            other => Err(mismatch(other, "squared sum")),
        }
    }

    /// Gets the decaying mean of squared gradients, creating it zeroed on first use.
    pub fn mean_square<'a>(
        support: &'a mut Option<Support>,
        like: &ArrayD<f64>,
    ) -> Result<&'a mut ArrayD<f64>> {
        let support =
            support.get_or_insert_with(|| Support::MeanSquare(ArrayD::zeros(like.raw_dim())));

        match support {
            Support::MeanSquare(s) => Ok(s),
            other => Err(mismatch(other, "mean square")),
        }
    }

    /// Gets the first and second moment estimates, creating them zeroed on first use.
    pub fn moments<'a>(
        support: &'a mut Option<Support>,
        like: &ArrayD<f64>,
    ) -> Result<(&'a mut ArrayD<f64>, &'a mut ArrayD<f64>)> {
        let support = support.get_or_insert_with(|| Support::Moments {
            first: ArrayD::zeros(like.raw_dim()),
            second: ArrayD::zeros(like.raw_dim()),
        });

        match support {
            Support::Moments { first, second } => Ok((first, second)),
            other => Err(mismatch(other, "moments")),
        }
    }
}

fn mismatch(got: &Support, expected: &str) -> LayerErr {
    LayerErr::IncompatibleParameters {
        position: 0,
        reason: format!(
            "the support structure holds {} but the update method needs {expected}",
            got.kind()
        ),
    }
}
