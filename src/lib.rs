pub mod channel;
pub mod core;
pub mod engine;
pub mod error;
pub mod io;
pub mod nodes;
pub mod observability;
pub mod registry;
pub mod resilience;

pub use error::{NodeError, Result};
