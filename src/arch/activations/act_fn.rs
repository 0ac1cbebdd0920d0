use ndarray::{Array, ArrayBase, Data, Dimension};

use super::Sigmoid;

/// An element-wise activation function.
///
/// `df` always takes the pre-activation value, never the activated one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ActFn {
    Sigmoid(Sigmoid),
    Tanh,
    Relu,
    LeakyRelu { slope: f64 },
    HardTanh,
    Softsign,
    Elu { alpha: f64 },
}

impl ActFn {
    pub fn sigmoid(amp: f64) -> Self {
        Self::Sigmoid(Sigmoid::new(amp))
    }

    pub fn f(&self, x: f64) -> f64 {
        match self {
            ActFn::Sigmoid(a) => a.f(x),
            ActFn::Tanh => x.tanh(),
            ActFn::Relu => x.max(0.),
            ActFn::LeakyRelu { slope } if x < 0. => slope * x,
            ActFn::LeakyRelu { .. } => x,
            ActFn::HardTanh => x.clamp(-1., 1.),
            ActFn::Softsign => x / (1. + x.abs()),
            ActFn::Elu { alpha } if x < 0. => alpha * (x.exp() - 1.),
            ActFn::Elu { .. } => x,
        }
    }

    pub fn df(&self, x: f64) -> f64 {
        match self {
            ActFn::Sigmoid(a) => a.df(x),
            ActFn::Tanh => 1. - x.tanh().powi(2),
            ActFn::Relu if x > 0. => 1.,
            ActFn::Relu => 0.,
            ActFn::LeakyRelu { slope } if x < 0. => *slope,
            ActFn::LeakyRelu { .. } => 1.,
            ActFn::HardTanh if (-1. ..=1.).contains(&x) => 1.,
            ActFn::HardTanh => 0.,
            ActFn::Softsign => 1. / (1. + x.abs()).powi(2),
            ActFn::Elu { alpha } if x < 0. => alpha * x.exp(),
            ActFn::Elu { .. } => 1.,
        }
    }

    /// Applies the function to every element of `z`.
    pub fn apply<S, D>(&self, z: &ArrayBase<S, D>) -> Array<f64, D>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        z.mapv(|z| self.f(z))
    }

    /// Computes the derivative at every element of the pre-activation `z`.
    pub fn derivative<S, D>(&self, z: &ArrayBase<S, D>) -> Array<f64, D>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        z.mapv(|z| self.df(z))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    const H: f64 = 1e-6;

    fn numeric_df(act_fn: ActFn, x: f64) -> f64 {
        (act_fn.f(x + H) - act_fn.f(x - H)) / (2. * H)
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let act_fns = [
            ActFn::sigmoid(1.),
            ActFn::Tanh,
            ActFn::Relu,
            ActFn::LeakyRelu { slope: 0.1 },
            ActFn::HardTanh,
            ActFn::Softsign,
            ActFn::Elu { alpha: 0.5 },
        ];

        for act_fn in act_fns {
            for x in [-1.7, -0.3, 0.4, 0.9] {
                let expected = numeric_df(act_fn, x);
                assert!(
                    (act_fn.df(x) - expected).abs() < 1e-6,
                    "{act_fn:?} at {x}: {} vs {expected}",
                    act_fn.df(x)
                );
            }
        }
    }

    #[test]
    fn apply_is_element_wise() {
        let z = array![-2., 0., 3.];

        assert_eq!(ActFn::Relu.apply(&z), array![0., 0., 3.]);
        assert_eq!(ActFn::HardTanh.apply(&z), array![-1., 0., 1.]);
        assert_eq!(ActFn::Relu.derivative(&z), array![0., 0., 1.]);
    }
}
