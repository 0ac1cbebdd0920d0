use std::{cell::RefCell, rc::Rc};

use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use super::{ParamGen, RandErr, Result};
use crate::arch::TrainableParameter;

/// The units feeding into and out of a parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fans {
    pub fan_in: usize,
    pub fan_out: usize,
}

impl Fans {
    pub fn new(fan_in: usize, fan_out: usize) -> Self {
        Self { fan_in, fan_out }
    }

    /// Reads the fans off a parameter laid out as `[out, in...]`.
    ///
    /// A vector is taken as a single unit fed by all of its elements, like the context of an
    /// attention layer.
    pub fn of(param: &TrainableParameter) -> Self {
        match param.shape() {
            [] => Self::new(1, 1),
            [len] => Self::new(*len, 1),
            [out, rest @ ..] => Self::new(rest.iter().product(), *out),
        }
    }
}

/// The initialization schemes whose spread is scaled by the fans of the parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scaling {
    XavierUniform,
    LecunUniform,
    Kaiming,
    Xavier,
    Lecun,
}

impl Scaling {
    /// The half width of the uniform schemes or the standard deviation of the normal ones.
    fn spread(self, fans: Fans) -> Result<f64> {
        let (gain, fan) = match self {
            Scaling::XavierUniform => (6., fans.fan_in + fans.fan_out),
            Scaling::LecunUniform => (3., fans.fan_in),
            Scaling::Kaiming => (2., fans.fan_in),
            Scaling::Xavier => (2., fans.fan_in + fans.fan_out),
            Scaling::Lecun => (1., fans.fan_in),
        };

        if fan == 0 {
            return Err(RandErr::EmptyFan);
        }

        Ok((gain / fan as f64).sqrt())
    }

    fn is_uniform(self) -> bool {
        matches!(self, Scaling::XavierUniform | Scaling::LecunUniform)
    }
}

/// The distribution behind a fan-scaled generator.
#[derive(Clone, Copy, Debug)]
pub enum Scaled {
    Uniform(Uniform<f64>),
    Normal(Normal<f64>),
}

impl Distribution<f64> for Scaled {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Scaled::Uniform(d) => d.sample(rng),
            Scaled::Normal(d) => d.sample(rng),
        }
    }
}

/// Samples parameters from a distribution, at most `limit` of them in total.
///
/// The random number generator is shared so that every generator built for one bundle draws
/// from the same seeded stream.
pub struct RandParamGen<R: Rng, D: Distribution<f64>> {
    rng: Rc<RefCell<R>>,
    distribution: D,
    remaining: usize,
}

impl<R: Rng, D: Distribution<f64>> RandParamGen<R, D> {
    pub fn new(rng: Rc<RefCell<R>>, distribution: D, limit: usize) -> Self {
        Self {
            rng,
            distribution,
            remaining: limit,
        }
    }
}

impl<R: Rng> RandParamGen<R, Uniform<f64>> {
    /// Samples uniformly from `[low, high)`.
    ///
    /// # Returns
    /// A `RandErr` if `low >= high`.
    pub fn uniform(rng: Rc<RefCell<R>>, limit: usize, low: f64, high: f64) -> Result<Self> {
        Ok(Self::new(rng, Uniform::new(low, high)?, limit))
    }

    /// Samples uniformly from `[low, high]`.
    pub fn uniform_inclusive(
        rng: Rc<RefCell<R>>,
        limit: usize,
        low: f64,
        high: f64,
    ) -> Result<Self> {
        Ok(Self::new(rng, Uniform::new_inclusive(low, high)?, limit))
    }
}

impl<R: Rng> RandParamGen<R, Normal<f64>> {
    /// # Returns
    /// A `RandErr` if `std_dev` is negative or not finite.
    pub fn normal(rng: Rc<RefCell<R>>, limit: usize, mean: f64, std_dev: f64) -> Result<Self> {
        Ok(Self::new(rng, Normal::new(mean, std_dev)?, limit))
    }
}

impl<R: Rng> RandParamGen<R, Scaled> {
    /// Samples around zero with the spread `scaling` gives for `fans`.
    ///
    /// # Returns
    /// A `RandErr::EmptyFan` if the fans the scheme reads add up to zero.
    pub fn scaled(
        rng: Rc<RefCell<R>>,
        limit: usize,
        scaling: Scaling,
        fans: Fans,
    ) -> Result<Self> {
        let spread = scaling.spread(fans)?;
        let distribution = if scaling.is_uniform() {
            Scaled::Uniform(Uniform::new(-spread, spread)?)
        } else {
            Scaled::Normal(Normal::new(0., spread)?)
        };

        Ok(Self::new(rng, distribution, limit))
    }

    /// A scaled generator for exactly the values of `param`, with the fans read off its shape.
    pub fn for_param(
        rng: Rc<RefCell<R>>,
        scaling: Scaling,
        param: &TrainableParameter,
    ) -> Result<Self> {
        Self::scaled(rng, param.values().len(), scaling, Fans::of(param))
    }
}

impl<R: Rng, D: Distribution<f64>> ParamGen for RandParamGen<R, D> {
    fn sample(&mut self, n: usize) -> Option<Vec<f64>> {
        if self.remaining == 0 {
            return None;
        }

        let taken = n.min(self.remaining);
        self.remaining -= taken;

        let mut rng = self.rng.borrow_mut();
        Some((&self.distribution).sample_iter(&mut *rng).take(taken).collect())
    }
}
