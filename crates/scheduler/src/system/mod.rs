//! Job system coordinator.
//!
//! Split into focused submodules:
//! - `board`: shared job collections, history table and the multi-lock transitions
//! - `core`: JobSystem struct, construction, shutdown and introspection
//! - `reaping`: retiring completed jobs, by pump or by synchronous wait
//! - `workers`: worker registry management

pub(crate) mod board;
mod core;
mod reaping;
mod workers;
#[cfg(test)]
mod tests;

pub use self::board::ClaimedJob;
pub use self::core::JobSystem;
