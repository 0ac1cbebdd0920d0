pub mod activations;
mod array;
mod layer;
pub mod layers;
mod param;
mod params;
mod pool;
mod relevance;
mod sequence;
mod window;

pub use array::ValueErrorArray;
pub use layer::{Layer, LayerState, Phase};
pub use param::{ParamKind, TrainableParameter};
pub use params::{GateParams, LayerParameters, LinearParams, SharedParams, share};
pub use pool::LayerPool;
pub use relevance::{Contributions, RELEVANCE_EPS};
pub use sequence::SequenceEncoder;
pub use window::{Detached, Neighbors, TemporalWindow, split_at_step};
