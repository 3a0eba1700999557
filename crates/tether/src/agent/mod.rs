//! Agent runtime: the [`Session`] conversation loop and its supporting modules.
//!
//! - [`session::Session`] — the conversation loop: model turns, tool turns,
//!   and the inline recovery protocol. Start here.
//! - [`config::SessionConfig`] — timeouts, round bounds, result ceiling.
//! - [`oracle::ModelOracle`] — the model seam; implemented by
//!   [`LocalModelClient`](crate::LocalModelClient), substituted by scripted
//!   fakes in tests.
//! - [`events`] — [`EventHandler`] trait and [`SessionEvent`] enum for
//!   observing the loop.

pub mod config;
pub mod events;
pub mod oracle;
pub mod session;

pub use config::SessionConfig;
pub use events::{EventHandler, LoggingHandler, NoopHandler, SessionEvent};
pub use oracle::{ModelOracle, OracleFuture};
pub use session::Session;
