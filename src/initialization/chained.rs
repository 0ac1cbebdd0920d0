use std::collections::VecDeque;

use super::ParamGen;

/// Draws from a sequence of generators, moving on to the next one once the current runs out.
///
/// Each generator is given its own limit, so a single chain can initialize every parameter of a
/// bundle with a different distribution.
pub struct ChainedParamGen {
    param_gens: VecDeque<Box<dyn ParamGen>>,
}

impl ChainedParamGen {
    /// Creates a new `ChainedParamGen`.
    ///
    /// # Arguments
    /// * `param_gens` - The generators, in the order they are drawn from.
    pub fn new(param_gens: Vec<Box<dyn ParamGen>>) -> Self {
        Self {
            param_gens: param_gens.into(),
        }
    }
}

impl ParamGen for ChainedParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f64>> {
        let mut sample = Vec::with_capacity(n);

        while sample.len() < n {
            let missing = n - sample.len();
            let param_gen = self.param_gens.front_mut()?;

            match param_gen.sample(missing) {
                Some(values) if values.len() == missing => sample.extend(values),
                Some(values) => {
                    sample.extend(values);
                    self.param_gens.pop_front();
                }
                None => {
                    self.param_gens.pop_front();
                }
            }

            if self.param_gens.is_empty() {
                break;
            }
        }

        (!sample.is_empty() || n == 0).then_some(sample)
    }
}
