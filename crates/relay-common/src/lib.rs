//! rpc-relay common types
//!
//! Shared pieces used by the balancer and the command-line binary:
//!
//! - [`error`] - the [`RelayError`] taxonomy and `Result` alias
//! - [`config`] - the immutable [`RelayConfig`] and how it is loaded

pub mod config;
pub mod error;

pub use config::{ConfigOverrides, RelayConfig};
pub use error::{RelayError, Result};
