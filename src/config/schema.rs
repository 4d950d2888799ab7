//! Configuration schema definitions.
//!
//! [`FileConfig`] is the shape of a TOML config file; every field is
//! optional so a file only needs the keys it wants to set. [`Settings`] is
//! the fully resolved result handed to the proxy.
//!
//! ```toml
//! [proxy]
//! local = ":9999"
//! remote = "example.com:443"
//! nagles = true
//!
//! [tls]
//! unwrap = true
//! server_name = "example.com"
//! ca_file = "/etc/ssl/extra-roots.pem"
//!
//! [transform]
//! match = "GET .*"
//! replace = "foo~bar"
//!
//! [log]
//! verbose = true
//! very_verbose = false
//! hex = false
//! color = true
//! file = "/var/log/tcp-proxy.log"
//! ```

use crate::telemetry::LogOptions;
use serde::Deserialize;
use std::path::PathBuf;

/// Default local listen address.
pub const DEFAULT_LOCAL: &str = ":9999";

/// Default remote address.
pub const DEFAULT_REMOTE: &str = "localhost:80";

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Addresses and socket options.
    #[serde(default)]
    pub proxy: ProxySection,

    /// TLS unwrapping of the remote leg.
    #[serde(default)]
    pub tls: TlsSection,

    /// Match and replace.
    #[serde(default)]
    pub transform: TransformSection,

    /// Log output.
    #[serde(default)]
    pub log: LogSection,
}

/// `[proxy]` section.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProxySection {
    /// Local listen address.
    pub local: Option<String>,
    /// Remote address.
    pub remote: Option<String>,
    /// Disable Nagle's algorithm.
    #[serde(default)]
    pub nagles: bool,
}

/// `[tls]` section.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TlsSection {
    /// Speak TLS to the remote.
    #[serde(default)]
    pub unwrap: bool,
    /// Name to verify the remote certificate against.
    pub server_name: Option<String>,
    /// Extra PEM bundle of trusted roots.
    pub ca_file: Option<PathBuf>,
}

/// `[transform]` section.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TransformSection {
    /// Match regex.
    #[serde(rename = "match")]
    pub match_pattern: Option<String>,
    /// Replace spec, `regex~replacement`.
    pub replace: Option<String>,
}

/// `[log]` section.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    /// Log per-chunk activity.
    #[serde(default)]
    pub verbose: bool,
    /// Also log relayed bytes.
    #[serde(default)]
    pub very_verbose: bool,
    /// Log relayed bytes as hex.
    #[serde(default)]
    pub hex: bool,
    /// ANSI colours.
    #[serde(default)]
    pub color: bool,
    /// Also append log lines to this file.
    pub file: Option<PathBuf>,
}

/// Fully resolved proxy settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Local listen address.
    pub local: String,
    /// Remote address.
    pub remote: String,
    /// Log per-chunk activity.
    pub verbose: bool,
    /// Also log relayed bytes.
    pub very_verbose: bool,
    /// Disable Nagle's algorithm on both legs.
    pub disable_nagle: bool,
    /// Log relayed bytes as hex.
    pub output_hex: bool,
    /// ANSI colours.
    pub color: bool,
    /// Speak TLS to the remote.
    pub unwrap_tls: bool,
    /// Name to verify the remote certificate against.
    pub tls_server_name: Option<String>,
    /// Extra PEM bundle of trusted roots.
    pub tls_ca_file: Option<PathBuf>,
    /// Match regex.
    pub match_pattern: Option<String>,
    /// Replace spec.
    pub replace: Option<String>,
    /// Log file.
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            local: DEFAULT_LOCAL.to_string(),
            remote: DEFAULT_REMOTE.to_string(),
            verbose: false,
            very_verbose: false,
            disable_nagle: false,
            output_hex: false,
            color: false,
            unwrap_tls: false,
            tls_server_name: None,
            tls_ca_file: None,
            match_pattern: None,
            replace: None,
            log_file: None,
        }
    }
}

impl Settings {
    /// Layer a config file on top of these settings.
    ///
    /// Values present in the file override; toggles are switched on if the
    /// file enables them.
    pub fn merge(&mut self, file: FileConfig) {
        let FileConfig {
            proxy,
            tls,
            transform,
            log,
        } = file;

        if let Some(local) = proxy.local {
            self.local = local;
        }
        if let Some(remote) = proxy.remote {
            self.remote = remote;
        }
        self.disable_nagle |= proxy.nagles;

        self.unwrap_tls |= tls.unwrap;
        if tls.server_name.is_some() {
            self.tls_server_name = tls.server_name;
        }
        if tls.ca_file.is_some() {
            self.tls_ca_file = tls.ca_file;
        }

        if transform.match_pattern.is_some() {
            self.match_pattern = transform.match_pattern;
        }
        if transform.replace.is_some() {
            self.replace = transform.replace;
        }

        self.verbose |= log.verbose;
        self.very_verbose |= log.very_verbose;
        self.output_hex |= log.hex;
        self.color |= log.color;
        if log.file.is_some() {
            self.log_file = log.file;
        }
    }

    /// Verbosity and colour toggles for connection loggers.
    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            verbose: self.verbose,
            very_verbose: self.very_verbose,
            color: self.color,
        }
        .normalized()
    }
}
