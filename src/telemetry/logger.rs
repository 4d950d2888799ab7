//! Per-connection log lines.
//!
//! A [`ColorLogger`] stamps every line with its connection prefix, gates the
//! chatty levels behind the verbosity flags and optionally tints each level.
//! Lines are emitted through `tracing`, so the installed subscriber decides
//! where they end up.

use colored::Colorize;
use std::fmt;
use tracing::Level;

/// Log target the verbosity flags raise. Other crates (rustls among them)
/// stay at `info`.
const CRATE_TARGET: &str = "tcp_proxy";

/// Verbosity and colour toggles shared by every connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Log per-chunk activity.
    pub verbose: bool,
    /// Also log the relayed bytes themselves.
    pub very_verbose: bool,
    /// Tint lines with ANSI colours.
    pub color: bool,
}

impl LogOptions {
    /// Very-verbose implies verbose.
    pub fn normalized(mut self) -> Self {
        if self.very_verbose {
            self.verbose = true;
        }
        self
    }

    /// `EnvFilter` directives for these toggles, or `None` to defer to
    /// `RUST_LOG`.
    pub fn filter_directives(self) -> Option<String> {
        let options = self.normalized();
        if options.very_verbose {
            Some(format!("info,{}=trace", CRATE_TARGET))
        } else if options.verbose {
            Some(format!("info,{}=debug", CRATE_TARGET))
        } else {
            None
        }
    }
}

/// Logger bound to one connection.
#[derive(Debug, Clone)]
pub struct ColorLogger {
    prefix: String,
    options: LogOptions,
}

impl ColorLogger {
    /// Create a logger that prefixes every line with `prefix`.
    pub fn new(prefix: impl Into<String>, options: LogOptions) -> Self {
        Self {
            prefix: prefix.into(),
            options: options.normalized(),
        }
    }

    /// Whether [`ColorLogger::trace`] lines are emitted.
    pub fn trace_enabled(&self) -> bool {
        self.options.very_verbose
    }

    /// Whether [`ColorLogger::debug`] lines are emitted.
    pub fn debug_enabled(&self) -> bool {
        self.options.verbose
    }

    /// Relayed bytes. Only with very-verbose.
    pub fn trace(&self, message: impl fmt::Display) {
        if self.trace_enabled() {
            tracing::trace!("{}", self.render(Level::TRACE, message));
        }
    }

    /// Per-chunk activity. Only with verbose.
    pub fn debug(&self, message: impl fmt::Display) {
        if self.debug_enabled() {
            tracing::debug!("{}", self.render(Level::DEBUG, message));
        }
    }

    /// Connection lifecycle and matches.
    pub fn info(&self, message: impl fmt::Display) {
        tracing::info!("{}", self.render(Level::INFO, message));
    }

    /// Failures on one of the legs.
    pub fn warn(&self, message: impl fmt::Display) {
        tracing::warn!("{}", self.render(Level::WARN, message));
    }

    /// Build the final line text for `level`.
    pub fn render(&self, level: Level, message: impl fmt::Display) -> String {
        let line = format!("{}{}", self.prefix, message);
        if !self.options.color {
            return line;
        }

        match level {
            Level::TRACE => line.blue().to_string(),
            Level::DEBUG => line.bright_black().to_string(),
            Level::INFO => line.green().to_string(),
            _ => line.red().to_string(),
        }
    }
}
