use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;

use crate::initialization::RandErr;

/// The result type used in the entire layer engine.
pub type Result<T> = std::result::Result<T, LayerErr>;

/// The layer engine's error type.
#[derive(Debug)]
pub enum LayerErr {
    /// Sizes given at construction are empty or inconsistent with each other.
    InvalidConfiguration(String),
    /// A lazily populated field was read before the call that populates it.
    UninitializedState { what: &'static str },
    /// Two parameter bundles don't match in ordering or shape.
    IncompatibleParameters { position: usize, reason: String },
    /// The layer doesn't support the requested operation.
    NotImplemented {
        layer: &'static str,
        operation: &'static str,
    },
    SizeMismatch {
        a: &'static str,
        b: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    Shape(ShapeError),
}

impl LayerErr {
    /// Shorthand for an `InvalidConfiguration` error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Shorthand for a `SizeMismatch` error between two shapes.
    pub fn size_mismatch(
        a: &'static str,
        b: &'static str,
        got: &[usize],
        expected: &[usize],
    ) -> Self {
        Self::SizeMismatch {
            a,
            b,
            got: got.to_vec(),
            expected: expected.to_vec(),
        }
    }
}

impl Display for LayerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LayerErr::InvalidConfiguration(msg) => format!("Invalid configuration: {msg}"),
            LayerErr::UninitializedState { what } => {
                format!("Tried to read {what} before it was initialized")
            }
            LayerErr::IncompatibleParameters { position, reason } => format!(
                "The parameters at position {position} are incompatible with the accumulated ones: {reason}"
            ),
            LayerErr::NotImplemented { layer, operation } => {
                format!("The {layer} layer doesn't implement {operation}")
            }
            LayerErr::SizeMismatch {
                a,
                b,
                got,
                expected,
            } => format!(
                "There's a size mismatch between {a} and {b}, got {got:?} and expected {expected:?}"
            ),
            LayerErr::Shape(e) => format!("Invalid tensor shape: {e}"),
        };

        write!(f, "{s}")
    }
}

impl Error for LayerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LayerErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for LayerErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<RandErr> for LayerErr {
    fn from(value: RandErr) -> Self {
        Self::InvalidConfiguration(value.to_string())
    }
}
