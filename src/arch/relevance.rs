use ndarray::{Data, prelude::*};

use crate::tensor;

/// The stabilizer of the epsilon rule used to distribute relevance.
pub const RELEVANCE_EPS: f64 = 0.01;

/// The decomposition of a linear layer's pre-activation into what each input element contributed.
///
/// Row `i` of every matrix holds the contributions to output unit `i`.
#[derive(Clone, Debug)]
pub struct Contributions {
    pub inputs: Vec<Array2<f64>>,
    pub recurrent: Option<Array2<f64>>,
    pub biases: Array1<f64>,
}

impl Contributions {
    /// The contributions `W_ij x_j` of a linear map.
    pub fn of_linear<S1, S2>(w: &ArrayBase<S1, Ix2>, x: &ArrayBase<S2, Ix1>) -> Array2<f64>
    where
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
    {
        w * &x.view().insert_axis(Axis(0))
    }

    /// The pre-activation the contributions add up to.
    pub fn pre_activation(&self) -> Array1<f64> {
        let mut z = self.biases.clone();

        for c in self.inputs.iter().chain(&self.recurrent) {
            z += &c.sum_axis(Axis(1));
        }

        z
    }

    /// Distributes the relevance of the output units onto the inputs with the epsilon rule.
    ///
    /// # Arguments
    /// * `relevance` - The relevance of each output unit.
    ///
    /// # Returns
    /// The relevance of every input array and of the recurrent input, if any.
    pub fn distribute<S>(
        &self,
        relevance: &ArrayBase<S, Ix1>,
    ) -> (Vec<Array1<f64>>, Option<Array1<f64>>)
    where
        S: Data<Elem = f64>,
    {
        let z = tensor::stabilize(&self.pre_activation(), RELEVANCE_EPS);
        let ratio = relevance / &z;

        let inputs = self.inputs.iter().map(|c| c.t().dot(&ratio)).collect();
        let recurrent = self.recurrent.as_ref().map(|c| c.t().dot(&ratio));
        (inputs, recurrent)
    }
}
