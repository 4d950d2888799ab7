//! Logging for proxied connections.
//!
//! The proxy reports through `tracing`; the binary installs the subscriber
//! (stderr plus an optional log file). This module supplies the
//! per-connection [`ColorLogger`] that prefixes, gates and tints lines.
//!
//! # Levels
//!
//! | method  | shown when      | used for                          |
//! |---------|-----------------|-----------------------------------|
//! | `trace` | very-verbose    | relayed bytes (text or hex)       |
//! | `debug` | verbose         | per-chunk byte counts             |
//! | `info`  | always          | open/close, matches               |
//! | `warn`  | always          | dial, handshake and I/O failures  |

mod logger;

pub use logger::{ColorLogger, LogOptions};
