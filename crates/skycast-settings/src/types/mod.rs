//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file
//! format. Types marked with `#[serde(default)]` allow partial JSON; missing
//! fields get their default value during deserialization.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "api": { "baseUrl": "http://localhost:5001" },
///   "polling": { "intervalMs": 1000, "timeoutMs": 30000 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkycastSettings {
    /// Backend connection settings.
    pub api: ApiSettings,
    /// Result polling cadence and deadline.
    pub polling: PollingSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl SkycastSettings {
    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(SettingsError::invalid("api.baseUrl", "is empty"));
        }
        if self.api.request_timeout_ms == 0 {
            return Err(SettingsError::invalid("api.requestTimeoutMs", "must be > 0"));
        }
        if self.polling.interval_ms == 0 {
            return Err(SettingsError::invalid("polling.intervalMs", "must be > 0"));
        }
        if self.polling.timeout_ms < self.polling.interval_ms {
            return Err(SettingsError::invalid(
                "polling.timeoutMs",
                format!(
                    "{} is shorter than polling.intervalMs ({})",
                    self.polling.timeout_ms, self.polling.interval_ms
                ),
            ));
        }
        Ok(())
    }
}

/// Backend connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// Base URL of the agent backend.
    pub base_url: String,
    /// TCP connect timeout in ms.
    pub connect_timeout_ms: u64,
    /// Whole-request timeout in ms, applied to every call.
    pub request_timeout_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5001".to_string(),
            connect_timeout_ms: 5_000,
            request_timeout_ms: 15_000,
        }
    }
}

impl ApiSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Result polling cadence and deadline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollingSettings {
    /// Delay between result polls in ms.
    pub interval_ms: u64,
    /// Overall deadline for a result, counted from submission acceptance.
    pub timeout_ms: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            timeout_ms: 30_000,
        }
    }
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level name.
    pub level: String,
    /// JSON lines instead of compact text.
    pub json: bool,
    /// Per-target level overrides, e.g. `{"skycast_engine": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_client() {
        let s = SkycastSettings::default();
        assert_eq!(s.api.base_url, "http://localhost:5001");
        assert_eq!(s.polling.interval(), Duration::from_secs(1));
        assert_eq!(s.polling.timeout(), Duration::from_secs(30));
        assert_eq!(s.logging.level, "warn");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: SkycastSettings =
            serde_json::from_str(r#"{"polling": {"intervalMs": 250}}"#).unwrap();
        assert_eq!(s.polling.interval_ms, 250);
        assert_eq!(s.polling.timeout_ms, 30_000);
        assert_eq!(s.api.base_url, "http://localhost:5001");
    }

    #[test]
    fn camel_case_wire_format() {
        let json = serde_json::to_value(SkycastSettings::default()).unwrap();
        assert!(json["api"]["baseUrl"].is_string());
        assert!(json["api"]["requestTimeoutMs"].is_u64());
        assert!(json["polling"]["intervalMs"].is_u64());
    }

    #[test]
    fn validate_rejects_timeout_below_interval() {
        let mut s = SkycastSettings::default();
        s.polling.interval_ms = 5_000;
        s.polling.timeout_ms = 1_000;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("timeoutMs"));
    }

    #[test]
    fn module_levels_from_json() {
        let s: SkycastSettings = serde_json::from_str(
            r#"{"logging": {"level": "info", "modules": {"skycast_engine": "debug"}}}"#,
        )
        .unwrap();
        assert_eq!(s.logging.level, "info");
        assert_eq!(s.logging.modules["skycast_engine"], "debug");
        assert!(!s.logging.json);
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut s = SkycastSettings::default();
        s.polling.interval_ms = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_base_url() {
        let mut s = SkycastSettings::default();
        s.api.base_url = "  ".into();
        assert!(s.validate().is_err());
    }
}
