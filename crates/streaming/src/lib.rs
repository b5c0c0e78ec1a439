pub mod error;
pub mod layer_array;
pub mod loader;
pub mod residency;
pub mod stats;
pub mod switch;
pub mod timed;

pub use error::*;
pub use layer_array::*;
pub use loader::*;
pub use residency::*;
pub use stats::*;
pub use switch::*;
pub use timed::*;
