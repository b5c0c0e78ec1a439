pub mod layer;
pub mod simulations;
pub mod trajectory;
pub mod trajectory_layer;

pub use layer::*;
pub use simulations::*;
pub use trajectory::*;
pub use trajectory_layer::*;
