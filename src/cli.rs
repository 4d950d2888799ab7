//! Command-line interface definitions for tcp-proxy.
//!
//! Uses clap's derive API for type-safe argument parsing.

use clap::Parser;
use std::path::PathBuf;

/// Transparent TCP proxy with traffic inspection.
///
/// tcp-proxy accepts clients on a local address, connects each one to the
/// remote address and relays bytes both ways. Traffic can be logged (as text
/// or hex), searched with a regex, rewritten in flight, and the remote leg
/// can be TLS while the local leg stays plaintext.
#[derive(Parser, Debug, Default)]
#[command(name = "tcp-proxy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Local address to listen on [default: :9999].
    #[arg(short = 'l', long = "local", value_name = "ADDR")]
    pub local: Option<String>,

    /// Remote address to connect to [default: localhost:80].
    #[arg(short = 'r', long = "remote", value_name = "ADDR")]
    pub remote: Option<String>,

    /// Display server actions.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Display server actions and all tcp data.
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Disable Nagle's algorithm on both legs.
    #[arg(short = 'n', long = "nagles")]
    pub nagles: bool,

    /// Output relayed data as hex.
    #[arg(short = 'x', long = "hex")]
    pub hex: bool,

    /// Output ANSI colors.
    #[arg(short = 'c', long = "color")]
    pub color: bool,

    /// Connect to the remote with TLS, exposed unencrypted locally.
    #[arg(long = "unwrap-tls")]
    pub unwrap_tls: bool,

    /// Name to verify the remote certificate against.
    ///
    /// Defaults to the host part of the remote address.
    #[arg(long = "tls-server-name", value_name = "NAME")]
    pub tls_server_name: Option<String>,

    /// Extra PEM bundle of trusted root certificates for the remote leg.
    #[arg(long = "tls-ca-file", value_name = "PATH")]
    pub tls_ca_file: Option<PathBuf>,

    /// Log every occurrence of this regex in the relayed data.
    #[arg(long = "match", value_name = "REGEX")]
    pub match_pattern: Option<String>,

    /// Rewrite relayed data, in the form 'regex~replacement'.
    #[arg(long = "replace", value_name = "REGEX~REPLACEMENT")]
    pub replace: Option<String>,

    /// Also append log lines to this file.
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Path to a TOML config file.
    ///
    /// Merged on top of the user config; CLI flags still win.
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,
}
