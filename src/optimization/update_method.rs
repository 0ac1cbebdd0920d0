use ndarray::ArrayD;

use super::Support;
use crate::error::{LayerErr, Result};

/// The granularities an update method wants to be notified of.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Schedule {
    pub epoch: bool,
    pub batch: bool,
    pub example: bool,
}

/// Defines the rule for updating a parameter given its gradient.
pub trait UpdateMethod {
    /// Updates `values` using the averaged gradient.
    ///
    /// # Arguments
    /// * `values` - The values of the parameter to update.
    /// * `grad` - The gradient of the parameter.
    /// * `support` - The parameter's support structure, created here on first use.
    ///
    /// # Returns
    /// An error if there's a mismatch in the shapes of `grad` and `values`, or if the support
    /// structure was created by another update method.
    fn update(
        &mut self,
        values: &mut ArrayD<f64>,
        grad: &ArrayD<f64>,
        support: &mut Option<Support>,
    ) -> Result<()>;

    /// Which of the scheduling hooks this method cares about, none by default.
    fn schedule(&self) -> Schedule {
        Schedule::default()
    }

    fn new_epoch(&mut self) {}

    fn new_batch(&mut self) {}

    fn new_example(&mut self) {}
}

impl<M: UpdateMethod + ?Sized> UpdateMethod for Box<M> {
    fn update(
        &mut self,
        values: &mut ArrayD<f64>,
        grad: &ArrayD<f64>,
        support: &mut Option<Support>,
    ) -> Result<()> {
        (**self).update(values, grad, support)
    }

    fn schedule(&self) -> Schedule {
        (**self).schedule()
    }

    fn new_epoch(&mut self) {
        (**self).new_epoch()
    }

    fn new_batch(&mut self) {
        (**self).new_batch()
    }

    fn new_example(&mut self) {
        (**self).new_example()
    }
}

pub(super) fn check_sizes(values: &ArrayD<f64>, grad: &ArrayD<f64>) -> Result<()> {
    if values.shape() != grad.shape() {
        return Err(LayerErr::size_mismatch(
            "gradient",
            "parameter",
            grad.shape(),
            values.shape(),
        ));
    }

    Ok(())
}
