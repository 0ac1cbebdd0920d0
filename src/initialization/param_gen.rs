use ndarray::ArrayD;

use crate::error::{LayerErr, Result};

/// A `ParamGen` generates values for the initial state of a layer's parameters.
pub trait ParamGen {
    /// Should sample at most `n` parameters.
    ///
    /// # Arguments
    /// * `n` - The upper limit of samples to generate.
    ///
    /// # Returns
    /// An option whether the generator is exhausted.
    fn sample(&mut self, n: usize) -> Option<Vec<f64>>;

    /// Overwrites every element of `values` with sampled values, in logical order.
    ///
    /// # Returns
    /// An `InvalidConfiguration` error if the generator is exhausted before `values` is full.
    fn fill(&mut self, values: &mut ArrayD<f64>) -> Result<()> {
        let n = values.len();
        let mut sampled = Vec::with_capacity(n);

        while sampled.len() < n {
            match self.sample(n - sampled.len()) {
                Some(sample) if !sample.is_empty() => sampled.extend(sample),
                _ => {
                    return Err(LayerErr::invalid(format!(
                        "the parameter generator ran out after {} of {n} values",
                        sampled.len()
                    )));
                }
            }
        }

        values
            .iter_mut()
            .zip(sampled)
            .for_each(|(v, sample)| *v = sample);

        Ok(())
    }
}
