mod chained;
mod constant;
mod error;
mod param_gen;
mod random;

pub use chained::ChainedParamGen;
pub use constant::ConstParamGen;
pub use error::{RandErr, Result};
pub use param_gen::ParamGen;
pub use random::{Fans, RandParamGen, Scaled, Scaling};
