use ndarray::{IxDyn, prelude::*};

use super::ValueErrorArray;
use crate::{
    error::{LayerErr, Result},
    optimization::Support,
};

/// Whether a parameter is initialized as a weight or as a bias.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Weights,
    Biases,
}

/// A `ValueErrorArray` tagged as a model parameter.
///
/// The errors of a parameter accumulate its gradient during an update. The optimizer support
/// structure is created by the update method on first use and never shared nor cloned.
#[derive(Debug)]
pub struct TrainableParameter {
    name: &'static str,
    kind: ParamKind,
    array: ValueErrorArray<IxDyn>,
    support: Option<Support>,
}

impl TrainableParameter {
    /// Creates a new zeroed parameter.
    ///
    /// # Arguments
    /// * `name` - A name used to identify the parameter in errors.
    /// * `kind` - The initialization policy of the parameter.
    /// * `shape` - The shape of the parameter, no dimension can be zero.
    ///
    /// # Returns
    /// An `InvalidConfiguration` error if the shape is empty.
    pub fn new(name: &'static str, kind: ParamKind, shape: &[usize]) -> Result<Self> {
        if shape.is_empty() || shape.contains(&0) {
            return Err(LayerErr::invalid(format!(
                "the parameter {name} can't have shape {shape:?}"
            )));
        }

        Ok(Self {
            name,
            kind,
            array: ValueErrorArray::zeros(IxDyn(shape)),
            support: None,
        })
    }

    /// Creates a new zeroed weights matrix of `rows` x `cols`.
    pub fn matrix_of(name: &'static str, rows: usize, cols: usize) -> Result<Self> {
        Self::new(name, ParamKind::Weights, &[rows, cols])
    }

    /// Creates a new zeroed biases vector of length `len`.
    pub fn biases_of(name: &'static str, len: usize) -> Result<Self> {
        Self::new(name, ParamKind::Biases, &[len])
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn array(&self) -> &ValueErrorArray<IxDyn> {
        &self.array
    }

    pub fn values(&self) -> &ArrayD<f64> {
        self.array.values()
    }

    pub fn values_mut(&mut self) -> &mut ArrayD<f64> {
        self.array.values_mut()
    }

    pub fn errors(&self) -> &ArrayD<f64> {
        self.array.errors()
    }

    pub fn errors_mut(&mut self) -> &mut ArrayD<f64> {
        self.array.errors_mut()
    }

    pub fn shape(&self) -> &[usize] {
        self.array.shape()
    }

    pub fn support(&self) -> Option<&Support> {
        self.support.as_ref()
    }

    pub fn vector(&self) -> Result<ArrayView1<'_, f64>> {
        Ok(self.values().view().into_dimensionality()?)
    }

    pub fn matrix(&self) -> Result<ArrayView2<'_, f64>> {
        Ok(self.values().view().into_dimensionality()?)
    }

    pub fn tensor3(&self) -> Result<ArrayView3<'_, f64>> {
        Ok(self.values().view().into_dimensionality()?)
    }

    pub fn vector_mut(&mut self) -> Result<ArrayViewMut1<'_, f64>> {
        Ok(self.values_mut().view_mut().into_dimensionality()?)
    }

    pub fn matrix_mut(&mut self) -> Result<ArrayViewMut2<'_, f64>> {
        Ok(self.values_mut().view_mut().into_dimensionality()?)
    }

    pub fn tensor3_mut(&mut self) -> Result<ArrayViewMut3<'_, f64>> {
        Ok(self.values_mut().view_mut().into_dimensionality()?)
    }

    /// Splits the parameter into what an update method needs.
    ///
    /// # Returns
    /// The values to update, the gradient held in the errors and the support structure.
    pub fn update_parts(&mut self) -> (&mut ArrayD<f64>, &ArrayD<f64>, &mut Option<Support>) {
        let (values, errors) = self.array.split_mut();
        (values, errors, &mut self.support)
    }
}

impl Clone for TrainableParameter {
    /// Deep copies the values and errors, the support structure stays with the original.
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            kind: self.kind,
            array: self.array.clone(),
            support: None,
        }
    }
}
