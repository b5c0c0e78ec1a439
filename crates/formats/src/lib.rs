pub mod geojson;
pub mod scenario;

pub use geojson::*;
pub use scenario::*;
