//! Mathematical structs and functions.

pub use lut::LookupTable;
pub use util::*;

mod lut;
mod util;
