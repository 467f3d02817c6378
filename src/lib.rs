// Tollgate — Library root
//
// Re-exports the lifecycle, store, remote, CLI, and gateway modules.

pub mod cli;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod remote;
pub mod settings;
pub mod store;

pub use error::{Result, TollgateError};
