use super::ParamGen;
use crate::arch::TrainableParameter;

/// Repeats one value, at most `limit` times in total.
pub struct ConstParamGen {
    value: f64,
    remaining: usize,
}

impl ConstParamGen {
    pub fn new(value: f64, limit: usize) -> Self {
        Self {
            value,
            remaining: limit,
        }
    }

    /// A generator of `value` sized to fill `param` exactly once.
    pub fn for_param(value: f64, param: &TrainableParameter) -> Self {
        Self::new(value, param.values().len())
    }
}

impl ParamGen for ConstParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f64>> {
        (self.remaining > 0).then(|| {
            let taken = n.min(self.remaining);
            self.remaining -= taken;
            vec![self.value; taken]
        })
    }
}
