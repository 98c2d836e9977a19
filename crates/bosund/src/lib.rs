//! Bosun build agent daemon internals.
//!
//! The binary in `main.rs` wires these together: parse [`config`], register
//! methods in a [`service::ServiceMap`], and run the [`server::AgentServer`]
//! until a shutdown signal arrives.

pub mod config;
pub mod protocol;
pub mod server;
pub mod service;
