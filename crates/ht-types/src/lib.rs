pub mod dataset;
pub mod errors;
pub mod params;

pub use dataset::*;
pub use errors::*;
pub use params::*;
