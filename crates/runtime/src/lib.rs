pub mod clock;
pub mod event_bus;
pub mod player;

pub use clock::*;
pub use event_bus::*;
pub use player::*;
