//! Runtime configuration, resolved from the environment.
//!
//! | variable                    | meaning                                   |
//! |-----------------------------|-------------------------------------------|
//! | `LOOPDECK_DATA_DIR`         | directory holding `loopdeck.db`           |
//! | `LOOPDECK_FLUSH_INTERVAL_MS`| throttle flush cadence                    |
//! | `LOOPDECK_BUDGET_WARNING`   | warning threshold as a fraction (`0.8`)   |
//! | `LOOPDECK_BUDGET_ALERTS`    | `every-check` or `once-per-level`         |
//! | `LOOPDECK_DEFAULT_MODEL`    | model assumed when usage names none       |
//! | `LOOPDECK_LOG`              | fallback tracing filter when no `RUST_LOG`|

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::bus::DEFAULT_FLUSH_INTERVAL;
use crate::cost::{BudgetAlertPolicy, DEFAULT_MODEL, DEFAULT_WARNING_THRESHOLD};

const DATABASE_FILE: &str = "loopdeck.db";
const DEFAULT_LOG_FILTER: &str = "loopdeck=debug,info";

#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub flush_interval: Duration,
    pub budget_warning_threshold: f64,
    pub budget_alert_policy: BudgetAlertPolicy,
    pub default_model: String,
    pub log_filter: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            budget_warning_threshold: DEFAULT_WARNING_THRESHOLD,
            budget_alert_policy: BudgetAlertPolicy::default(),
            default_model: DEFAULT_MODEL.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl CoreConfig {
    /// Load `.env` if present, then overlay `LOOPDECK_*` variables on the
    /// defaults. Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`CoreConfig::from_env`] but reading from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty());

        if let Some(dir) = get("LOOPDECK_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(ms) = parse_var::<u64>("LOOPDECK_FLUSH_INTERVAL_MS", get("LOOPDECK_FLUSH_INTERVAL_MS")) {
            if ms == 0 {
                tracing::warn!("LOOPDECK_FLUSH_INTERVAL_MS must be positive; keeping default");
            } else {
                config.flush_interval = Duration::from_millis(ms);
            }
        }
        if let Some(threshold) = parse_var::<f64>("LOOPDECK_BUDGET_WARNING", get("LOOPDECK_BUDGET_WARNING")) {
            if threshold.is_finite() && threshold > 0.0 && threshold <= 1.0 {
                config.budget_warning_threshold = threshold;
            } else {
                tracing::warn!(threshold, "LOOPDECK_BUDGET_WARNING must be in (0, 1]; keeping default");
            }
        }
        if let Some(policy) = parse_var::<BudgetAlertPolicy>("LOOPDECK_BUDGET_ALERTS", get("LOOPDECK_BUDGET_ALERTS")) {
            config.budget_alert_policy = policy;
        }
        if let Some(model) = get("LOOPDECK_DEFAULT_MODEL") {
            config.default_model = model;
        }
        if let Some(filter) = get("LOOPDECK_LOG") {
            config.log_filter = filter;
        }
        config
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn parse_var<T>(key: &str, raw: Option<String>) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = raw?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("ignoring {key}={raw:?}: {e}");
            None
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(app_data) = std::env::var("APPDATA") {
            return PathBuf::from(app_data).join("Loopdeck");
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".loopdeck");
    }

    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".loopdeck");
    }

    PathBuf::from(".loopdeck")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_variables() {
        let config = CoreConfig::from_lookup(|_| None);
        assert_eq!(config.flush_interval, Duration::from_millis(16));
        assert_eq!(config.budget_warning_threshold, 0.8);
        assert_eq!(config.budget_alert_policy, BudgetAlertPolicy::EveryCheck);
        assert_eq!(config.default_model, DEFAULT_MODEL);
        assert!(config.database_path().ends_with("loopdeck.db"));
    }

    #[test]
    fn test_variables_override_defaults() {
        let config = CoreConfig::from_lookup(lookup_from(&[
            ("LOOPDECK_DATA_DIR", "/tmp/loopdeck-test"),
            ("LOOPDECK_FLUSH_INTERVAL_MS", "33"),
            ("LOOPDECK_BUDGET_WARNING", "0.9"),
            ("LOOPDECK_BUDGET_ALERTS", "once-per-level"),
            ("LOOPDECK_DEFAULT_MODEL", "claude-3-haiku-20240307"),
        ]));
        assert_eq!(config.database_path(), PathBuf::from("/tmp/loopdeck-test/loopdeck.db"));
        assert_eq!(config.flush_interval, Duration::from_millis(33));
        assert_eq!(config.budget_warning_threshold, 0.9);
        assert_eq!(config.budget_alert_policy, BudgetAlertPolicy::OncePerLevel);
        assert_eq!(config.default_model, "claude-3-haiku-20240307");
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = CoreConfig::from_lookup(lookup_from(&[
            ("LOOPDECK_FLUSH_INTERVAL_MS", "soon"),
            ("LOOPDECK_BUDGET_WARNING", "1.5"),
            ("LOOPDECK_BUDGET_ALERTS", "sometimes"),
            ("LOOPDECK_DATA_DIR", "   "),
        ]));
        let defaults = CoreConfig::default();
        assert_eq!(config.flush_interval, defaults.flush_interval);
        assert_eq!(config.budget_warning_threshold, defaults.budget_warning_threshold);
        assert_eq!(config.budget_alert_policy, defaults.budget_alert_policy);
        assert_eq!(config.data_dir, defaults.data_dir);
    }
}
