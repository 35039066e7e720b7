mod client;
mod error;
mod key;
#[cfg(any(test, feature = "memory"))]
mod memory;
mod planner;
mod scan;
mod split;
mod write;

pub use crate::client::*;
pub use crate::error::*;
pub use crate::key::*;
#[cfg(any(test, feature = "memory"))]
pub use crate::memory::*;
pub use crate::planner::*;
pub use crate::scan::*;
pub use crate::split::*;
pub use crate::write::*;
