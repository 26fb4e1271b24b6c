//! Structured logging with JSON/pretty formats and credential redaction.
//!
//! - JSON format for production environments
//! - Pretty format for development
//! - Per-module log level configuration
//! - Redaction of session keys and passwords before they reach a log line

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use regex::Regex;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Global redactor instance for sensitive data.
static REDACTOR: OnceLock<SensitiveFieldRedactor> = OnceLock::new();

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty or compact)
    #[serde(default)]
    pub format: LogFormat,

    /// Per-module log levels, e.g. `vigil_core::security::voter = "debug"`
    #[serde(default)]
    pub module_levels: HashMap<String, String>,

    /// Whether to include file/line information
    #[serde(default = "default_true")]
    pub include_location: bool,

    /// Whether to include thread information
    #[serde(default)]
    pub include_thread: bool,

    /// Emit an event when a `secured_call` span closes
    #[serde(default = "default_true")]
    pub span_close: bool,

    /// Redaction configuration
    #[serde(default)]
    pub redaction: RedactionConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            module_levels: HashMap::new(),
            include_location: true,
            include_thread: false,
            span_close: true,
            redaction: RedactionConfig::default(),
        }
    }
}

impl LoggingConfig {
    fn fmt_span(&self) -> FmtSpan {
        if self.span_close {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    /// Level filter with the per-module directives applied.
    pub fn env_filter(&self) -> anyhow::Result<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)?;
        for (module, level) in &self.module_levels {
            filter = filter.add_directive(format!("{}={}", module, level).parse()?);
        }
        Ok(filter)
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format for production/structured logging
    #[default]
    Json,
    /// Pretty format for development
    Pretty,
    /// Compact single-line format
    Compact,
}

/// Masking of session keys and credentials in log output.
#[derive(Debug, Clone, Deserialize)]
pub struct RedactionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Fields whose value is always masked (case-insensitive substring match)
    #[serde(default = "default_sensitive_fields")]
    pub sensitive_fields: Vec<String>,

    /// Mask session-key UUIDs wherever they appear in a value
    #[serde(default = "default_true")]
    pub session_keys: bool,

    #[serde(default = "default_replacement")]
    pub replacement: String,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sensitive_fields: default_sensitive_fields(),
            session_keys: true,
            replacement: default_replacement(),
        }
    }
}

/// A principal may log in with its session key in place of a user name.
const SESSION_KEY_PATTERN: &str =
    r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b";

/// Applies a [`RedactionConfig`] to field names and values.
#[derive(Debug, Clone)]
pub struct SensitiveFieldRedactor {
    fields: Vec<String>,
    session_key: Option<Regex>,
    replacement: String,
    enabled: bool,
}

impl SensitiveFieldRedactor {
    pub fn new(config: &RedactionConfig) -> Self {
        Self {
            fields: config.sensitive_fields.iter().map(|f| f.to_lowercase()).collect(),
            session_key: config
                .session_keys
                .then(|| Regex::new(SESSION_KEY_PATTERN).ok())
                .flatten(),
            replacement: config.replacement.clone(),
            enabled: config.enabled,
        }
    }

    pub fn should_redact_field(&self, field_name: &str) -> bool {
        let lower = field_name.to_lowercase();
        self.enabled && self.fields.iter().any(|f| lower.contains(f.as_str()))
    }

    /// Mask every session key embedded in `value`.
    pub fn redact_value(&self, value: &str) -> String {
        match (&self.session_key, self.enabled) {
            (Some(regex), true) => regex.replace_all(value, self.replacement.as_str()).into_owned(),
            _ => value.to_string(),
        }
    }

    pub fn redact(&self, field_name: &str, value: &str) -> String {
        if self.should_redact_field(field_name) {
            self.replacement.clone()
        } else {
            self.redact_value(value)
        }
    }

    /// The redactor installed by [`init_logging`], or the default one.
    pub fn global() -> &'static SensitiveFieldRedactor {
        REDACTOR.get_or_init(|| SensitiveFieldRedactor::new(&RedactionConfig::default()))
    }
}

fn default_log_level() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
}

fn default_true() -> bool {
    true
}

fn default_sensitive_fields() -> Vec<String> {
    ["session_uuid", "session_key", "password", "passwd", "secret", "credential"]
        .iter()
        .map(|f| f.to_string())
        .collect()
}

fn default_replacement() -> String {
    "[REDACTED]".to_string()
}

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Install the global subscriber.
///
/// In `development` the JSON default is swapped for the pretty format.
///
/// # Errors
///
/// Returns an error if a level directive does not parse or a global
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig, environment: &str) -> anyhow::Result<()> {
    let _ = REDACTOR.set(SensitiveFieldRedactor::new(&config.redaction));

    let format = match (&config.format, environment) {
        (LogFormat::Json, "development") => LogFormat::Pretty,
        (format, _) => format.clone(),
    };

    let base = fmt::layer()
        .with_span_events(config.fmt_span())
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread)
        .with_thread_names(config.include_thread);
    let layer: BoxedLayer = match format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter()?)
        .with(layer)
        .try_init()?;
    Ok(())
}
