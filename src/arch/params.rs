use std::{cell::RefCell, rc::Rc};

use ndarray::Array1;
use rand::Rng;

use super::{ParamKind, TrainableParameter, ValueErrorArray};
use crate::{
    error::{LayerErr, Result},
    initialization::{ConstParamGen, ParamGen, RandParamGen, Scaling},
    tensor,
};

/// Parameters shared by every layer instance tied to them.
pub type SharedParams<P> = Rc<RefCell<P>>;

/// Wraps `params` to be shared between layer instances.
pub fn share<P>(params: P) -> SharedParams<P> {
    Rc::new(RefCell::new(params))
}

/// An ordered bundle of trainable parameters belonging to one logical layer.
///
/// The ordering returned by `params` and `params_mut` is fixed at construction, a bundle of errors
/// built with `errors_like` mirrors it exactly.
pub trait LayerParameters: Clone {
    /// The parameters of this bundle in their fixed order.
    fn params(&self) -> Vec<&TrainableParameter>;

    /// Mutable version of `params`, same order.
    fn params_mut(&mut self) -> Vec<&mut TrainableParameter>;

    fn len(&self) -> usize {
        self.params().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The parameters initialized as weights.
    fn weights(&self) -> Vec<&TrainableParameter> {
        self.params()
            .into_iter()
            .filter(|p| p.kind() == ParamKind::Weights)
            .collect()
    }

    /// The parameters initialized as biases.
    fn biases(&self) -> Vec<&TrainableParameter> {
        self.params()
            .into_iter()
            .filter(|p| p.kind() == ParamKind::Biases)
            .collect()
    }

    /// Sets every value and every error to zero.
    fn zero(&mut self) {
        for param in self.params_mut() {
            param.values_mut().fill(0.);
            param.errors_mut().fill(0.);
        }
    }

    /// Builds a zeroed bundle with the same ordering and shapes, used as a gradient target.
    fn errors_like(&self) -> Self {
        let mut errors = self.clone();
        errors.zero();
        errors
    }

    /// Fills the weights and the biases with values sampled from the given generators.
    ///
    /// # Arguments
    /// * `weights_gen` - The generator for the parameters of kind `Weights`.
    /// * `biases_gen` - The generator for the parameters of kind `Biases`.
    ///
    /// # Returns
    /// An `InvalidConfiguration` error if a generator runs out of values.
    fn initialize(
        &mut self,
        weights_gen: &mut dyn ParamGen,
        biases_gen: &mut dyn ParamGen,
    ) -> Result<()> {
        for param in self.params_mut() {
            match param.kind() {
                ParamKind::Weights => weights_gen.fill(param.values_mut())?,
                ParamKind::Biases => biases_gen.fill(param.values_mut())?,
            }
        }

        Ok(())
    }

    /// Fills every weight from a `scaling` distribution whose fans are read off that weight's own
    /// shape, and zeroes the biases.
    ///
    /// # Returns
    /// An `InvalidConfiguration` error if a weight has no fans for the scheme.
    fn initialize_scaled<R: Rng>(&mut self, rng: Rc<RefCell<R>>, scaling: Scaling) -> Result<()> {
        for param in self.params_mut() {
            match param.kind() {
                ParamKind::Weights => {
                    let mut param_gen = RandParamGen::for_param(Rc::clone(&rng), scaling, param)?;
                    param_gen.fill(param.values_mut())?;
                }
                ParamKind::Biases => {
                    ConstParamGen::for_param(0., param).fill(param.values_mut())?;
                }
            }
        }

        Ok(())
    }

    /// Checks that `other` has the same ordering and shapes as this bundle.
    ///
    /// # Returns
    /// An `IncompatibleParameters` error pointing to the first mismatching position.
    fn check_compatible(&self, other: &Self) -> Result<()> {
        let (ours, theirs) = (self.params(), other.params());

        if ours.len() != theirs.len() {
            return Err(LayerErr::IncompatibleParameters {
                position: ours.len().min(theirs.len()),
                reason: format!("expected {} parameters, got {}", ours.len(), theirs.len()),
            });
        }

        for (position, (a, b)) in ours.iter().zip(&theirs).enumerate() {
            if a.name() != b.name() || a.shape() != b.shape() {
                return Err(LayerErr::IncompatibleParameters {
                    position,
                    reason: format!(
                        "expected {} {:?}, got {} {:?}",
                        a.name(),
                        a.shape(),
                        b.name(),
                        b.shape()
                    ),
                });
            }
        }

        Ok(())
    }

    /// Copies the values of `other` into this bundle.
    fn assign_values(&mut self, other: &Self) -> Result<()> {
        self.check_compatible(other)?;

        for (param, src) in self.params_mut().into_iter().zip(other.params()) {
            param.values_mut().assign(src.values());
        }

        Ok(())
    }

    /// Sums the values of `other` into this bundle element-wise.
    fn assign_sum(&mut self, other: &Self) -> Result<()> {
        self.check_compatible(other)?;

        for (param, src) in self.params_mut().into_iter().zip(other.params()) {
            *param.values_mut() += src.values();
        }

        Ok(())
    }

    /// Multiplies every value by `factor`.
    fn scale(&mut self, factor: f64) {
        for param in self.params_mut() {
            param.values_mut().mapv_inplace(|v| v * factor);
        }
    }
}

/// The weights and biases of an affine map `W x + b`.
#[derive(Clone, Debug)]
pub struct LinearParams {
    pub weights: TrainableParameter,
    pub biases: TrainableParameter,
}

impl LinearParams {
    /// Creates new zeroed `LinearParams` mapping `input_size` to `output_size` units.
    pub fn new(input_size: usize, output_size: usize) -> Result<Self> {
        Ok(Self {
            weights: TrainableParameter::matrix_of("weights", output_size, input_size)?,
            biases: TrainableParameter::biases_of("biases", output_size)?,
        })
    }

    pub fn input_size(&self) -> usize {
        self.weights.shape()[1]
    }

    pub fn output_size(&self) -> usize {
        self.weights.shape()[0]
    }

    /// Computes `W x + b`.
    pub fn pre_activation(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(self.weights.matrix()?.dot(x) + &self.biases.vector()?)
    }

    /// Assigns the gradients of `W x + b` given the gradient `g` of its result.
    pub fn assign_gradients(&mut self, g: &Array1<f64>, x: &ValueErrorArray) -> Result<()> {
        tensor::assign_outer(self.weights.matrix_mut()?, g, x)?;
        self.biases.vector_mut()?.assign(g);
        Ok(())
    }

    /// The errors `Wᵀ g` sent back to the input.
    pub fn input_errors(&self, g: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(tensor::transposed_dot(&self.weights.matrix()?, g))
    }
}

impl LayerParameters for LinearParams {
    fn params(&self) -> Vec<&TrainableParameter> {
        vec![&self.weights, &self.biases]
    }

    fn params_mut(&mut self) -> Vec<&mut TrainableParameter> {
        vec![&mut self.weights, &mut self.biases]
    }
}

/// The parameters of a recurrent unit, `W x + b + U yPrev`.
#[derive(Clone, Debug)]
pub struct GateParams {
    pub weights: TrainableParameter,
    pub biases: TrainableParameter,
    pub recurrent: TrainableParameter,
}

impl GateParams {
    /// Creates new zeroed `GateParams` mapping `input_size` to `output_size` units.
    pub fn new(input_size: usize, output_size: usize) -> Result<Self> {
        Ok(Self {
            weights: TrainableParameter::matrix_of("weights", output_size, input_size)?,
            biases: TrainableParameter::biases_of("biases", output_size)?,
            recurrent: TrainableParameter::matrix_of("recurrent", output_size, output_size)?,
        })
    }

    pub fn input_size(&self) -> usize {
        self.weights.shape()[1]
    }

    pub fn output_size(&self) -> usize {
        self.weights.shape()[0]
    }

    /// Computes `W x + b + U yPrev`, the last term only if there is a previous output.
    pub fn pre_activation(
        &self,
        x: &Array1<f64>,
        y_prev: Option<&Array1<f64>>,
    ) -> Result<Array1<f64>> {
        let mut z = self.weights.matrix()?.dot(x) + &self.biases.vector()?;

        if let Some(y_prev) = y_prev {
            z += &self.recurrent.matrix()?.dot(y_prev);
        }

        Ok(z)
    }

    /// Assigns the gradients of `pre_activation` given the gradient `g` of its result.
    ///
    /// The recurrent gradient is zero without a previous output.
    pub fn assign_gradients(
        &mut self,
        g: &Array1<f64>,
        x: &ValueErrorArray,
        y_prev: Option<&Array1<f64>>,
    ) -> Result<()> {
        tensor::assign_outer(self.weights.matrix_mut()?, g, x)?;
        self.biases.vector_mut()?.assign(g);

        match y_prev {
            Some(y_prev) => tensor::assign_dense_outer(self.recurrent.matrix_mut()?, g, y_prev)?,
            None => self.recurrent.values_mut().fill(0.),
        }

        Ok(())
    }

    /// The errors `Wᵀ g` sent back to the input.
    pub fn input_errors(&self, g: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(tensor::transposed_dot(&self.weights.matrix()?, g))
    }

    /// The errors `Uᵀ g` sent back to the previous output.
    pub fn recurrent_errors(&self, g: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(tensor::transposed_dot(&self.recurrent.matrix()?, g))
    }
}

impl LayerParameters for GateParams {
    fn params(&self) -> Vec<&TrainableParameter> {
        vec![&self.weights, &self.biases, &self.recurrent]
    }

    fn params_mut(&mut self) -> Vec<&mut TrainableParameter> {
        vec![&mut self.weights, &mut self.biases, &mut self.recurrent]
    }
}
