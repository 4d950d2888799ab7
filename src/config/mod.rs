//! Configuration system for tcp-proxy.
//!
//! This module provides TOML configuration loading with hierarchy merging.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. Built-in defaults
//! 2. User config: `~/.config/tcp-proxy/config.toml`
//! 3. Additional config file (via `--config` flag)
//! 4. CLI flags (highest priority)
//!
//! No config file is required; the defaults plus CLI flags are enough.
//!
//! # Merge Behavior
//!
//! - **Values** (addresses, patterns, paths) are **overridden** when set
//! - **Toggles** (verbose, hex, unwrap, ...) are **enabled** if any layer sets them

mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{
    DEFAULT_LOCAL, DEFAULT_REMOTE, FileConfig, LogSection, ProxySection, Settings, TlsSection,
    TransformSection,
};
