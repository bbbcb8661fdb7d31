//! Structured logger setup
//!
//! Library code only emits `tracing` events. Applications call [`init`] once
//! at startup to install a subscriber; the configuration can itself be bound
//! from the environment:
//!
//! ```no_run
//! let config = svckit::logging::LogConfig::from_env()?;
//! svckit::logging::init(&config)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::binder::{bind_with, Options};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {:?} (expected pretty, compact or json)", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

crate::impl_decode_from_str!(LogFormat);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base level (`trace`..`error`) or a full filter expression
    pub level: String,
    pub format: LogFormat,
    /// Colored output
    pub ansi: bool,
    /// Extra filter directives such as `hyper=warn`
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            ansi: true,
            directives: Vec::new(),
        }
    }
}

crate::bindable!(LogConfig {
    level: ",default:info",
    format: ",default:pretty",
    ansi: "",
    directives: "",
});

impl LogConfig {
    /// Bind from `LOG_LEVEL`, `LOG_FORMAT`, `LOG_ANSI` and `LOG_DIRECTIVES`
    pub fn from_env() -> Result<Self> {
        Self::from_options(&Options::default().with_prefix("LOG_"))
    }

    pub fn from_options(options: &Options) -> Result<Self> {
        let mut config = Self::default();
        bind_with(&mut config, options).context("invalid logging configuration")?;
        Ok(config)
    }

    /// Filter used by [`init`]; `RUST_LOG` takes precedence when set
    pub fn filter(&self) -> Result<EnvFilter> {
        self.build_filter(std::env::var("RUST_LOG").ok().as_deref())
    }

    fn build_filter(&self, rust_log: Option<&str>) -> Result<EnvFilter> {
        if let Some(spec) = rust_log.filter(|s| !s.trim().is_empty()) {
            return EnvFilter::try_new(spec).with_context(|| format!("invalid RUST_LOG {:?}", spec));
        }

        let mut filter = EnvFilter::try_new(&self.level)
            .with_context(|| format!("invalid log level {:?}", self.level))?;
        for directive in &self.directives {
            let parsed: Directive = directive
                .parse()
                .with_context(|| format!("invalid log directive {:?}", directive))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// Install the global subscriber.
///
/// Fails instead of panicking when a subscriber is already installed.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = config.filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi);

    let installed = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}
