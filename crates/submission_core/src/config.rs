use std::{fs, time::Duration};

use serde::Deserialize;

use crate::retry::RetryPolicy;

pub const DEFAULT_BALANCE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub credits_endpoint: Option<String>,
    pub operation_endpoint: Option<String>,
    pub balance_timeout_secs: u64,
    pub operation_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_on_empty: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            credits_endpoint: None,
            operation_endpoint: None,
            balance_timeout_secs: DEFAULT_BALANCE_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            retry_attempts: 1,
            retry_on_empty: false,
        }
    }
}

impl Settings {
    pub fn balance_timeout(&self) -> Duration {
        Duration::from_secs(self.balance_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::bounded(self.retry_attempts);
        if self.retry_on_empty {
            policy.with_retry_on_empty()
        } else {
            policy
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    credits_endpoint: Option<String>,
    operation_endpoint: Option<String>,
    balance_timeout_secs: Option<u64>,
    operation_timeout_secs: Option<u64>,
    retry_attempts: Option<u32>,
    retry_on_empty: Option<bool>,
}

/// Defaults, then an optional `toolgate.toml` in the working directory, then
/// `APP__*` environment variables. Environment wins.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("toolgate.toml") {
        if let Ok(file_cfg) = toml::from_str::<FileSettings>(&raw) {
            apply_file(&mut settings, file_cfg);
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.credits_endpoint {
        settings.credits_endpoint = Some(v);
    }
    if let Some(v) = file_cfg.operation_endpoint {
        settings.operation_endpoint = Some(v);
    }
    if let Some(v) = file_cfg.balance_timeout_secs {
        settings.balance_timeout_secs = v;
    }
    if let Some(v) = file_cfg.operation_timeout_secs {
        settings.operation_timeout_secs = v;
    }
    if let Some(v) = file_cfg.retry_attempts {
        settings.retry_attempts = v;
    }
    if let Some(v) = file_cfg.retry_on_empty {
        settings.retry_on_empty = v;
    }
}

fn apply_env(settings: &mut Settings, get: impl Fn(&str) -> Option<String>) {
    if let Some(v) = get("APP__CREDITS_ENDPOINT") {
        settings.credits_endpoint = Some(v);
    }
    if let Some(v) = get("APP__OPERATION_ENDPOINT") {
        settings.operation_endpoint = Some(v);
    }
    if let Some(parsed) = get("APP__BALANCE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        settings.balance_timeout_secs = parsed;
    }
    if let Some(parsed) = get("APP__OPERATION_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        settings.operation_timeout_secs = parsed;
    }
    if let Some(parsed) = get("APP__RETRY_ATTEMPTS").and_then(|v| v.parse().ok()) {
        settings.retry_attempts = parsed;
    }
    if let Some(parsed) = get("APP__RETRY_ON_EMPTY").and_then(|v| v.parse().ok()) {
        settings.retry_on_empty = parsed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_timeouts_are_thirty_seconds_and_five_minutes() {
        let settings = Settings::default();
        assert_eq!(settings.balance_timeout(), Duration::from_secs(30));
        assert_eq!(settings.operation_timeout(), Duration::from_secs(300));
        assert_eq!(settings.retry_policy(), RetryPolicy::single_attempt());
    }

    #[test]
    fn file_settings_overlay_only_present_keys() {
        let mut settings = Settings::default();
        let file_cfg: FileSettings = toml::from_str(
            r#"
            credits_endpoint = "https://api.example.com/credits"
            retry_attempts = 3
            "#,
        )
        .expect("parse");
        apply_file(&mut settings, file_cfg);

        assert_eq!(
            settings.credits_endpoint.as_deref(),
            Some("https://api.example.com/credits")
        );
        assert_eq!(settings.retry_attempts, 3);
        assert_eq!(settings.operation_timeout_secs, 300);
    }

    #[test]
    fn env_overrides_win_and_bad_numbers_are_ignored() {
        let mut settings = Settings::default();
        settings.credits_endpoint = Some("https://file.example.com/credits".into());

        let env: HashMap<&str, &str> = [
            ("APP__CREDITS_ENDPOINT", "https://env.example.com/credits"),
            ("APP__BALANCE_TIMEOUT_SECS", "10"),
            ("APP__OPERATION_TIMEOUT_SECS", "not-a-number"),
            ("APP__RETRY_ON_EMPTY", "true"),
        ]
        .into_iter()
        .collect();
        apply_env(&mut settings, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(
            settings.credits_endpoint.as_deref(),
            Some("https://env.example.com/credits")
        );
        assert_eq!(settings.balance_timeout_secs, 10);
        assert_eq!(settings.operation_timeout_secs, 300);
        assert!(settings.retry_on_empty);
    }
}
