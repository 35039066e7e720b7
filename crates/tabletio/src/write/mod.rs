mod admission;
mod config;
mod dispatcher;
mod mutation;

pub use admission::*;
pub use config::*;
pub use dispatcher::*;
pub use mutation::*;
