mod advancer;
mod reader;
mod tracker;

pub use advancer::*;
pub use reader::*;
pub use tracker::*;
