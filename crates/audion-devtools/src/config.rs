//! Service configuration read from environment variables.
//!
//! - `AUDION_DEBUGGER_URL`: page target WebSocket URL (required)
//! - `AUDION_PORT`: server listen port (default: 3000)
//! - `AUDION_THROTTLE_MS`: per-context update interval (default: 16)
//! - `AUDION_REALTIME_INTERVAL_MS`: realtime data poll interval (default: 1000)
//! - `AUDION_REALTIME_TIMEOUT_MS`: realtime data command timeout (default: 500)
//! - `AUDION_EMIT_PARAM_UPDATES`: emit on parameter creation/removal (default: false)

use std::time::Duration;

use audion_core::IntegratorOptions;
use url::Url;

pub const DEBUGGER_URL_VAR: &str = "AUDION_DEBUGGER_URL";
pub const PORT_VAR: &str = "AUDION_PORT";
pub const THROTTLE_VAR: &str = "AUDION_THROTTLE_MS";
pub const REALTIME_INTERVAL_VAR: &str = "AUDION_REALTIME_INTERVAL_MS";
pub const REALTIME_TIMEOUT_VAR: &str = "AUDION_REALTIME_TIMEOUT_MS";
pub const EMIT_PARAM_UPDATES_VAR: &str = "AUDION_EMIT_PARAM_UPDATES";

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Timing and integrator settings for the graph pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Minimum spacing of updates for one context.
    pub throttle: Duration,
    /// How often realtime statistics are polled per realtime context.
    pub realtime_interval: Duration,
    /// How long one realtime poll may take before it is abandoned.
    pub realtime_timeout: Duration,
    pub integrator: IntegratorOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            throttle: Duration::from_millis(16),
            realtime_interval: Duration::from_millis(1000),
            realtime_timeout: Duration::from_millis(500),
            integrator: IntegratorOptions::default(),
        }
    }
}

/// Everything the server binary needs.
#[derive(Debug, Clone, PartialEq)]
pub struct DevtoolsConfig {
    pub debugger_url: Url,
    pub port: u16,
    pub pipeline: PipelineConfig,
}

impl DevtoolsConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = lookup(DEBUGGER_URL_VAR).ok_or(ConfigError::Missing(DEBUGGER_URL_VAR))?;
        let debugger_url = Url::parse(&raw_url).map_err(|e| invalid(DEBUGGER_URL_VAR, &raw_url, e))?;
        if !matches!(debugger_url.scheme(), "ws" | "wss") {
            return Err(ConfigError::Invalid {
                var: DEBUGGER_URL_VAR,
                value: raw_url,
                reason: "expected a ws:// or wss:// URL".to_string(),
            });
        }

        let port = match lookup(PORT_VAR) {
            Some(raw) => raw.parse::<u16>().map_err(|e| invalid(PORT_VAR, &raw, e))?,
            None => 3000,
        };

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            throttle: millis(&lookup, THROTTLE_VAR)?.unwrap_or(defaults.throttle),
            realtime_interval: millis(&lookup, REALTIME_INTERVAL_VAR)?
                .unwrap_or(defaults.realtime_interval),
            realtime_timeout: millis(&lookup, REALTIME_TIMEOUT_VAR)?
                .unwrap_or(defaults.realtime_timeout),
            integrator: IntegratorOptions {
                emit_param_updates: flag(&lookup, EMIT_PARAM_UPDATES_VAR)?.unwrap_or(false),
            },
        };

        if pipeline.realtime_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: REALTIME_INTERVAL_VAR,
                value: "0".to_string(),
                reason: "interval must be positive".to_string(),
            });
        }

        Ok(DevtoolsConfig {
            debugger_url,
            port,
            pipeline,
        })
    }
}

fn invalid(var: &'static str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn millis<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|raw| {
            raw.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| invalid(var, &raw, e))
        })
        .transpose()
}

fn flag<F>(lookup: &F, var: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|raw| match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(invalid(var, &raw, "expected a boolean")),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config =
            DevtoolsConfig::from_lookup(lookup(&[(DEBUGGER_URL_VAR, "ws://127.0.0.1:9222/devtools/page/A")]))
                .unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.pipeline, PipelineConfig::default());
        assert_eq!(config.pipeline.throttle, Duration::from_millis(16));
    }

    #[test]
    fn overrides_parse() {
        let config = DevtoolsConfig::from_lookup(lookup(&[
            (DEBUGGER_URL_VAR, "wss://host/devtools/page/B"),
            (PORT_VAR, "8080"),
            (THROTTLE_VAR, "50"),
            (REALTIME_INTERVAL_VAR, "250"),
            (REALTIME_TIMEOUT_VAR, "100"),
            (EMIT_PARAM_UPDATES_VAR, "true"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.pipeline.throttle, Duration::from_millis(50));
        assert_eq!(config.pipeline.realtime_interval, Duration::from_millis(250));
        assert_eq!(config.pipeline.realtime_timeout, Duration::from_millis(100));
        assert!(config.pipeline.integrator.emit_param_updates);
    }

    #[test]
    fn missing_url_is_an_error() {
        assert_eq!(
            DevtoolsConfig::from_lookup(lookup(&[])),
            Err(ConfigError::Missing(DEBUGGER_URL_VAR))
        );
    }

    #[test]
    fn bad_values_are_rejected() {
        let http = DevtoolsConfig::from_lookup(lookup(&[(DEBUGGER_URL_VAR, "http://host/")]));
        assert!(matches!(http, Err(ConfigError::Invalid { var: DEBUGGER_URL_VAR, .. })));

        let port = DevtoolsConfig::from_lookup(lookup(&[
            (DEBUGGER_URL_VAR, "ws://host/"),
            (PORT_VAR, "seventy"),
        ]));
        assert!(matches!(port, Err(ConfigError::Invalid { var: PORT_VAR, .. })));

        let flag = DevtoolsConfig::from_lookup(lookup(&[
            (DEBUGGER_URL_VAR, "ws://host/"),
            (EMIT_PARAM_UPDATES_VAR, "maybe"),
        ]));
        assert!(matches!(flag, Err(ConfigError::Invalid { var: EMIT_PARAM_UPDATES_VAR, .. })));
    }
}
