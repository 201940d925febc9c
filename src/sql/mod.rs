//! Safe SQL builder: identifiers from schema descriptors only, values as parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
