mod byte_key;
mod interpolate;
mod range;
#[cfg(test)]
mod tests;

pub use byte_key::*;
pub use range::*;
