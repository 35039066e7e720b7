mod options;
mod reducer;
mod sample;
mod splitter;
#[cfg(test)]
mod tests;
mod unit;

pub use options::*;
pub use reducer::*;
pub use sample::*;
pub use splitter::*;
pub use unit::*;
