pub mod shape;
pub mod time;

// Foundation crate: small, well-tested primitives only.
pub use shape::*;
pub use time::*;
