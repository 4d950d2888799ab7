//! tcp-proxy: transparent TCP proxy with traffic inspection
//!
//! This crate accepts client connections on a local address, opens a matching
//! connection to a remote endpoint and relays bytes in both directions while
//! optionally inspecting and rewriting the stream in flight.
//!
//! # Architecture
//!
//! - **Proxy**: Listener loop, per-connection lifecycle, byte pumps, TLS unwrap
//! - **Transform**: Regex match (log only) and replace (rewrite) per chunk
//! - **Config**: CLI flags layered over optional TOML config files
//! - **Telemetry**: Per-connection prefixed, verbosity-gated, coloured logging

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod proxy;
pub mod telemetry;
