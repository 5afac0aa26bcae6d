//! Helpers shared by the drivers.
//!
//! - [`tls`]: TLS setup for target connections

pub mod tls;

pub use tls::{make_connector, SslMode};
