mod accumulator;
mod adagrad;
mod adam;
mod gradient_descent;
mod gradient_descent_with_momentum;
mod nesterov;
mod optimizer;
mod rmsprop;
mod support;
mod update_method;

pub use accumulator::{AccumulatorState, ParamsErrorsAccumulator};
pub use adagrad::AdaGrad;
pub use adam::Adam;
pub use gradient_descent::GradientDescent;
pub use gradient_descent_with_momentum::GradientDescentWithMomentum;
pub use nesterov::Nesterov;
pub use optimizer::Optimizer;
pub use rmsprop::RmsProp;
pub use support::Support;
pub use update_method::{Schedule, UpdateMethod};
