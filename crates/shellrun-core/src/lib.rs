pub mod config;
pub mod error;
pub mod exec;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use exec::Executor;
