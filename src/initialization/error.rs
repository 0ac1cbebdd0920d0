use std::{
    error::Error,
    fmt::{self, Display},
};

use rand_distr::{NormalError, uniform::Error as UniformError};

pub type Result<T> = std::result::Result<T, RandErr>;

/// The distribution behind a `RandParamGen` couldn't be built from the given arguments.
#[derive(Debug)]
pub enum RandErr {
    Normal(NormalError),
    Uniform(UniformError),
    /// A fan-based distribution was asked for with no units.
    EmptyFan,
}

impl From<NormalError> for RandErr {
    fn from(value: NormalError) -> Self {
        Self::Normal(value)
    }
}

impl From<UniformError> for RandErr {
    fn from(value: UniformError) -> Self {
        Self::Uniform(value)
    }
}

impl Display for RandErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RandErr::Normal(e) => write!(f, "Invalid normal distribution: {e}"),
            RandErr::Uniform(e) => write!(f, "Invalid uniform distribution: {e}"),
            RandErr::EmptyFan => write!(f, "The fan of a scaled distribution can't be zero"),
        }
    }
}

impl Error for RandErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RandErr::Normal(e) => Some(e),
            RandErr::Uniform(e) => Some(e),
            RandErr::EmptyFan => None,
        }
    }
}
