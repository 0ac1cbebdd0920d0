use std::{cell::RefCell, rc::Rc};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    arch::activations::ActFn,
    error::Result,
    initialization::{ChainedParamGen, ConstParamGen, Fans, ParamGen, RandParamGen, Scaling},
    optimization::{
        AdaGrad, Adam, GradientDescent, GradientDescentWithMomentum, Nesterov, RmsProp,
        UpdateMethod,
    },
};

/// The specification for the `ActFn` enum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActFnSpec {
    Sigmoid { amp: f64 },
    Tanh,
    Relu,
    LeakyRelu { slope: f64 },
    HardTanh,
    Softsign,
    Elu { alpha: f64 },
}

impl From<ActFnSpec> for ActFn {
    fn from(spec: ActFnSpec) -> Self {
        match spec {
            ActFnSpec::Sigmoid { amp } => ActFn::sigmoid(amp),
            ActFnSpec::Tanh => ActFn::Tanh,
            ActFnSpec::Relu => ActFn::Relu,
            ActFnSpec::LeakyRelu { slope } => ActFn::LeakyRelu { slope },
            ActFnSpec::HardTanh => ActFn::HardTanh,
            ActFnSpec::Softsign => ActFn::Softsign,
            ActFnSpec::Elu { alpha } => ActFn::Elu { alpha },
        }
    }
}

/// The specification for the distribution of a `RandParamGen`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionSpec {
    Uniform { low: f64, high: f64 },
    UniformInclusive { low: f64, high: f64 },
    XavierUniform { fan_in: usize, fan_out: usize },
    LecunUniform { fan_in: usize },
    Normal { mean: f64, std_dev: f64 },
    Kaiming { fan_in: usize },
    Xavier { fan_in: usize, fan_out: usize },
    Lecun { fan_in: usize },
}

/// The specification for the `ParamGen` trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamGenSpec {
    Const {
        value: f64,
        limit: usize,
    },
    Rand {
        distribution: DistributionSpec,
        limit: usize,
    },
    Chained {
        specs: Vec<ParamGenSpec>,
    },
}

/// Builds a `RandParamGen` for the given distribution and hands it to `$callback`.
macro_rules! with_distribution {
    ($rng:expr, $dist_spec:expr, $limit:expr, $callback:expr) => {
        match $dist_spec {
            DistributionSpec::Uniform { low, high } => {
                let param_gen = RandParamGen::uniform($rng, $limit, low, high)?;
                ($callback)(Box::new(param_gen))
            }
            DistributionSpec::UniformInclusive { low, high } => {
                let param_gen = RandParamGen::uniform_inclusive($rng, $limit, low, high)?;
                ($callback)(Box::new(param_gen))
            }
            DistributionSpec::XavierUniform { fan_in, fan_out } => {
                let fans = Fans::new(fan_in, fan_out);
                let param_gen = RandParamGen::scaled($rng, $limit, Scaling::XavierUniform, fans)?;
                ($callback)(Box::new(param_gen))
            }
            DistributionSpec::LecunUniform { fan_in } => {
                let fans = Fans::new(fan_in, 0);
                let param_gen = RandParamGen::scaled($rng, $limit, Scaling::LecunUniform, fans)?;
                ($callback)(Box::new(param_gen))
            }
            DistributionSpec::Normal { mean, std_dev } => {
                let param_gen = RandParamGen::normal($rng, $limit, mean, std_dev)?;
                ($callback)(Box::new(param_gen))
            }
            DistributionSpec::Kaiming { fan_in } => {
                let fans = Fans::new(fan_in, 0);
                let param_gen = RandParamGen::scaled($rng, $limit, Scaling::Kaiming, fans)?;
                ($callback)(Box::new(param_gen))
            }
            DistributionSpec::Xavier { fan_in, fan_out } => {
                let fans = Fans::new(fan_in, fan_out);
                let param_gen = RandParamGen::scaled($rng, $limit, Scaling::Xavier, fans)?;
                ($callback)(Box::new(param_gen))
            }
            DistributionSpec::Lecun { fan_in } => {
                let fans = Fans::new(fan_in, 0);
                let param_gen = RandParamGen::scaled($rng, $limit, Scaling::Lecun, fans)?;
                ($callback)(Box::new(param_gen))
            }
        }
    };
}

impl ParamGenSpec {
    /// Resolves the parameter generator described by this spec.
    ///
    /// # Arguments
    /// * `rng` - The random number generator shared by every random generator built from it.
    ///
    /// # Returns
    /// An `InvalidConfiguration` error if one of the distributions can't be built.
    pub fn build<R>(&self, rng: Rc<RefCell<R>>) -> Result<Box<dyn ParamGen>>
    where
        R: Rng + 'static,
    {
        match *self {
            ParamGenSpec::Const { value, limit } => Ok(Box::new(ConstParamGen::new(value, limit))),
            ParamGenSpec::Rand {
                distribution,
                limit,
            } => with_distribution!(rng, distribution, limit, |param_gen: Box<dyn ParamGen>| {
                Ok(param_gen)
            }),
            ParamGenSpec::Chained { ref specs } => {
                let mut param_gens = Vec::with_capacity(specs.len());

                for spec in specs {
                    param_gens.push(spec.build(rng.clone())?);
                }

                Ok(Box::new(ChainedParamGen::new(param_gens)))
            }
        }
    }
}

/// The specification for the `UpdateMethod` trait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerSpec {
    GradientDescent {
        learning_rate: f64,
        #[serde(default)]
        decay: f64,
    },
    GradientDescentWithMomentum {
        learning_rate: f64,
        momentum: f64,
    },
    Nesterov {
        learning_rate: f64,
        momentum: f64,
    },
    AdaGrad {
        learning_rate: f64,
        epsilon: f64,
    },
    RmsProp {
        learning_rate: f64,
        decay: f64,
        epsilon: f64,
    },
    Adam {
        learning_rate: f64,
        beta1: f64,
        beta2: f64,
        epsilon: f64,
    },
}

impl OptimizerSpec {
    /// Resolves the update method described by this spec.
    pub fn build(self) -> Box<dyn UpdateMethod> {
        match self {
            OptimizerSpec::GradientDescent {
                learning_rate,
                decay,
            } => Box::new(GradientDescent::with_decay(learning_rate, decay)),
            OptimizerSpec::GradientDescentWithMomentum {
                learning_rate,
                momentum,
            } => Box::new(GradientDescentWithMomentum::new(learning_rate, momentum)),
            OptimizerSpec::Nesterov {
                learning_rate,
                momentum,
            } => Box::new(Nesterov::new(learning_rate, momentum)),
            OptimizerSpec::AdaGrad {
                learning_rate,
                epsilon,
            } => Box::new(AdaGrad::new(learning_rate, epsilon)),
            OptimizerSpec::RmsProp {
                learning_rate,
                decay,
                epsilon,
            } => Box::new(RmsProp::new(learning_rate, decay, epsilon)),
            OptimizerSpec::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Box::new(Adam::new(learning_rate, beta1, beta2, epsilon)),
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, IxDyn};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::error::LayerErr;

    fn rng() -> Rc<RefCell<StdRng>> {
        Rc::new(RefCell::new(StdRng::seed_from_u64(42)))
    }

    #[test]
    fn act_fn_from_json() {
        let spec: ActFnSpec = serde_json::from_str(r#"{"leaky_relu":{"slope":0.1}}"#).unwrap();
        assert_eq!(ActFn::from(spec), ActFn::LeakyRelu { slope: 0.1 });

        let spec: ActFnSpec = serde_json::from_str(r#""tanh""#).unwrap();
        assert_eq!(ActFn::from(spec), ActFn::Tanh);
    }

    #[test]
    fn chained_generators_follow_their_order() {
        let spec: ParamGenSpec = serde_json::from_str(
            r#"{"chained":{"specs":[
                {"const":{"value":1.0,"limit":2}},
                {"rand":{"distribution":{"uniform":{"low":5.0,"high":6.0}},"limit":3}}
            ]}}"#,
        )
        .unwrap();

        let mut param_gen = spec.build(rng()).unwrap();
        let mut values = ArrayD::zeros(IxDyn(&[5]));
        param_gen.fill(&mut values).unwrap();

        let values: Vec<_> = values.iter().copied().collect();
        assert_eq!(values[..2], [1., 1.]);
        assert!(values[2..].iter().all(|v| (5. ..6.).contains(v)));
        assert!(param_gen.sample(1).is_none());
    }

    #[test]
    fn invalid_distributions_are_configuration_errors() {
        let spec = ParamGenSpec::Rand {
            distribution: DistributionSpec::Uniform { low: 1., high: 0. },
            limit: 4,
        };

        assert!(matches!(
            spec.build(rng()),
            Err(LayerErr::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn optimizer_defaults_to_no_decay() {
        let spec: OptimizerSpec =
            serde_json::from_str(r#"{"gradient_descent":{"learning_rate":0.5}}"#).unwrap();

        assert_eq!(
            spec,
            OptimizerSpec::GradientDescent {
                learning_rate: 0.5,
                decay: 0.
            }
        );
        assert!(!spec.build().schedule().epoch);
    }

    #[test]
    fn adam_schedules_batches() {
        let spec: OptimizerSpec = serde_json::from_str(
            r#"{"adam":{"learning_rate":0.001,"beta1":0.9,"beta2":0.999,"epsilon":1e-8}}"#,
        )
        .unwrap();

        assert!(spec.build().schedule().batch);
    }
}
