pub mod arch;
pub mod error;
pub mod initialization;
pub mod optimization;
pub mod specs;
pub mod tensor;

pub use error::{LayerErr, Result};
