//! Logging setup for quarry.
//!
//! Every terminal call emits `tracing` events: `debug` when it runs or
//! fails and `warn` when it times out. Nothing is printed unless a
//! subscriber is installed, either by the application or by [`init`].
//!
//! # Environment Variables
//!
//! - `QUARRY_DEBUG=true|1|yes` - Enable debug logging
//! - `QUARRY_LOG_LEVEL=trace|debug|info|warn|error` - Set a specific level
//! - `QUARRY_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//!
//! ```rust,no_run
//! use quarry_query::logging;
//!
//! logging::init();
//! // or
//! logging::init_with_level("debug");
//! ```
//!
//! Installing the subscriber needs the `tracing-subscriber` feature; without
//! it `init` only records the settings and stays silent.

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

const DEBUG_VAR: &str = "QUARRY_DEBUG";
const LEVEL_VAR: &str = "QUARRY_LOG_LEVEL";
const FORMAT_VAR: &str = "QUARRY_LOG_FORMAT";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line, human oriented.
    Pretty,
    /// Single line, human oriented.
    Compact,
}

impl LogFormat {
    /// Parse a format name, falling back to JSON.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "compact" => Self::Compact,
            _ => Self::Json,
        }
    }
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Whether debug logging was asked for.
    pub debug: bool,
    /// Explicit level, if one was given.
    pub level: Option<&'static str>,
    /// Output format.
    pub format: LogFormat,
}

impl LogSettings {
    /// Build settings from raw variable values.
    pub fn from_values(debug: Option<&str>, level: Option<&str>, format: Option<&str>) -> Self {
        Self {
            debug: debug.is_some_and(is_truthy),
            level: level.and_then(parse_level),
            format: format.map(LogFormat::parse).unwrap_or_default(),
        }
    }

    /// Read settings from the `QUARRY_*` variables.
    pub fn from_env() -> Self {
        let debug = env::var(DEBUG_VAR).ok();
        let level = env::var(LEVEL_VAR).ok();
        let format = env::var(FORMAT_VAR).ok();
        Self::from_values(debug.as_deref(), level.as_deref(), format.as_deref())
    }

    /// Whether any logging was requested.
    pub fn enabled(&self) -> bool {
        self.debug || self.level.is_some()
    }

    /// The level to log at: the explicit one, else `debug` in debug mode,
    /// else `warn`.
    pub fn effective_level(&self) -> &'static str {
        match self.level {
            Some(level) => level,
            None if self.debug => "debug",
            None => "warn",
        }
    }

    /// The filter directive covering the quarry crates.
    pub fn directive(&self) -> String {
        let level = self.effective_level();
        format!("quarry={level},quarry_query={level},quarry_mongodb={level}")
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_level(value: &str) -> Option<&'static str> {
    match value.to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

/// Whether `QUARRY_DEBUG` is set.
#[inline]
pub fn is_debug_enabled() -> bool {
    LogSettings::from_env().debug
}

/// Install the subscriber described by the environment.
///
/// Only the first call has any effect, and nothing is installed unless
/// `QUARRY_DEBUG` or `QUARRY_LOG_LEVEL` is set.
pub fn init() {
    install(LogSettings::from_env());
}

/// Install a subscriber at `level`, ignoring `QUARRY_LOG_LEVEL`.
pub fn init_with_level(level: &str) {
    let mut settings = LogSettings::from_env();
    settings.level = parse_level(level).or(Some("warn"));
    install(settings);
}

fn install(settings: LogSettings) {
    INIT.call_once(|| {
        if !settings.enabled() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let filter =
                EnvFilter::try_new(settings.directive()).unwrap_or_else(|_| EnvFilter::new("warn"));
            let registry = tracing_subscriber::registry().with(filter);
            let installed = match settings.format {
                LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
                LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
                LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
            };
            if installed.is_ok() {
                tracing::info!(
                    level = settings.effective_level(),
                    format = ?settings.format,
                    "quarry logging initialized"
                );
            }
        }
    });
}
