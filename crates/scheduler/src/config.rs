//! Scheduler configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokenflow_core::{Error, Result, ResultExt};

/// Configuration for the [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Delay before an idle scheduler runs a full sweep.
    #[serde(rename = "heartbeat_ms", with = "duration_ms", default = "default_heartbeat")]
    pub heartbeat: Duration,

    /// Fire only triggered actors on non-sweep cycles.
    #[serde(default)]
    pub restrict_to_triggered: bool,

    /// Log the call site and backtrace of every trigger.
    #[serde(default)]
    pub trace_triggers: bool,

    /// Due timers processed before the run loop checks for new commands.
    #[serde(default = "default_max_cycles_per_turn")]
    pub max_cycles_per_turn: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            heartbeat: default_heartbeat(),
            restrict_to_triggered: false,
            trace_triggers: false,
            max_cycles_per_turn: default_max_cycles_per_turn(),
        }
    }
}

impl SchedulerConfig {
    /// Set the heartbeat interval.
    #[must_use]
    pub const fn heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Restrict non-sweep cycles to the triggered actors.
    #[must_use]
    pub const fn restrict_to_triggered(mut self, restrict: bool) -> Self {
        self.restrict_to_triggered = restrict;
        self
    }

    /// Enable trigger provenance logging.
    #[must_use]
    pub const fn trace_triggers(mut self, trace: bool) -> Self {
        self.trace_triggers = trace;
        self
    }

    /// Set how many due timers one run-loop turn may process.
    #[must_use]
    pub const fn max_cycles_per_turn(mut self, max: usize) -> Self {
        self.max_cycles_per_turn = max;
        self
    }

    /// Check the configuration for values the scheduler cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` for a zero heartbeat or a zero
    /// `max_cycles_per_turn`.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat.is_zero() {
            return Err(Error::invalid_config("heartbeat_ms must be greater than 0"));
        }
        if self.max_cycles_per_turn == 0 {
            return Err(Error::invalid_config(
                "max_cycles_per_turn must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigParseFailed` if the document does not parse.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config_parse_failed(e.to_string()))
    }

    /// Load configuration from a file: JSON for `.json`, TOML otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config_read_failed(path, e.to_string()))?;

        if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content).map_err(|e| Error::config_parse_failed(e.to_string()))
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// Defaults overlaid with `TOKENFLOW_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from a variable lookup.
    ///
    /// Recognises `TOKENFLOW_HEARTBEAT_MS`, `TOKENFLOW_RESTRICT_TO_TRIGGERED`
    /// and `TOKENFLOW_TRACE_TRIGGERS`. Values that do not parse are logged and
    /// ignored.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(ms) = lookup("TOKENFLOW_HEARTBEAT_MS")
            .and_then(|raw| parse_env("TOKENFLOW_HEARTBEAT_MS", &raw).into_option_logged())
        {
            self.heartbeat = Duration::from_millis(ms);
        }
        if let Some(restrict) = lookup("TOKENFLOW_RESTRICT_TO_TRIGGERED").and_then(|raw| {
            parse_flag("TOKENFLOW_RESTRICT_TO_TRIGGERED", &raw).into_option_logged()
        }) {
            self.restrict_to_triggered = restrict;
        }
        if let Some(trace) = lookup("TOKENFLOW_TRACE_TRIGGERS")
            .and_then(|raw| parse_flag("TOKENFLOW_TRACE_TRIGGERS", &raw).into_option_logged())
        {
            self.trace_triggers = trace;
        }
        self
    }
}

fn parse_env(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|e| Error::invalid_config(format!("{key}={raw}: {e}")))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::invalid_config(format!("{key}={raw}: expected a boolean"))),
    }
}

const fn default_heartbeat() -> Duration {
    Duration::from_secs(1)
}

const fn default_max_cycles_per_turn() -> usize {
    64
}

/// Serialization helper for Duration as milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
