use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const ENV_INVENTORY: &str = "ACCOUNTS_LIST";
pub const ENV_BOT_TOKEN: &str = "TG_BOT_TOKEN";
pub const ENV_CHAT_ID: &str = "TG_CHAT_ID";
pub const ENV_WEBHOOK_SECRET: &str = "WEBHOOK_SECRET";
pub const ENV_LISTEN: &str = "TUNNELWATCH_LISTEN";
pub const ENV_STORE_PATH: &str = "TUNNELWATCH_STORE_PATH";

/// Whether a mute also stops automatic remediation or only the alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutePolicy {
    /// Muted units are neither remediated, charged quota, nor alerted.
    #[default]
    SuppressAll,
    /// Mute silences the alert only; remediation still goes through the quota gate.
    AlertOnly,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl NotificationConfig {
    pub fn is_complete(&self) -> bool {
        !self.bot_token.trim().is_empty() && !self.chat_id.trim().is_empty()
    }
}

impl fmt::Debug for NotificationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationConfig")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Base URLs of the external providers. Overridable for tests and proxies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub monitoring: String,
    pub remediation: String,
    pub notification: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            monitoring: "https://api.cloudflare.com/client/v4".to_string(),
            remediation: "https://api.github.com".to_string(),
            notification: "https://api.telegram.org".to_string(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Raw inventory text; parsed on every invocation.
    pub inventory: Option<String>,
    pub notification: Option<NotificationConfig>,
    pub webhook_secret: Option<String>,
    pub max_concurrent: usize,
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub daily_cap: u32,
    #[serde(with = "humantime_serde")]
    pub mute_ttl: Duration,
    pub mute_policy: MutePolicy,
    pub notify_account_errors: bool,
    pub utc_offset_hours: i32,
    pub workflow_file: String,
    #[serde(with = "humantime_serde")]
    pub schedule_interval: Duration,
    pub listen: String,
    pub store_path: Option<PathBuf>,
    pub endpoints: EndpointsConfig,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            inventory: None,
            notification: None,
            webhook_secret: None,
            max_concurrent: 5,
            fetch_timeout: Duration::from_secs(8),
            request_timeout: Duration::from_secs(10),
            daily_cap: 3,
            mute_ttl: Duration::from_secs(24 * 60 * 60),
            mute_policy: MutePolicy::SuppressAll,
            notify_account_errors: true,
            utc_offset_hours: 8,
            workflow_file: "main.yml".to_string(),
            schedule_interval: Duration::from_secs(5 * 60),
            listen: "127.0.0.1:8787".to_string(),
            store_path: None,
            endpoints: EndpointsConfig::default(),
        }
    }
}

impl fmt::Debug for WatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchConfig")
            .field("inventory", &self.inventory.as_ref().map(|_| "<redacted>"))
            .field("notification", &self.notification)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("max_concurrent", &self.max_concurrent)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("daily_cap", &self.daily_cap)
            .field("mute_ttl", &self.mute_ttl)
            .field("mute_policy", &self.mute_policy)
            .field("notify_account_errors", &self.notify_account_errors)
            .field("utc_offset_hours", &self.utc_offset_hours)
            .field("workflow_file", &self.workflow_file)
            .field("schedule_interval", &self.schedule_interval)
            .field("listen", &self.listen)
            .field("store_path", &self.store_path)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl WatchConfig {
    /// Loads YAML config; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("invalid config at {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Applies environment-style overrides. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(inventory) = get(ENV_INVENTORY) {
            self.inventory = Some(inventory);
        }
        if let Some(secret) = get(ENV_WEBHOOK_SECRET) {
            self.webhook_secret = Some(secret);
        }
        if let Some(listen) = get(ENV_LISTEN) {
            self.listen = listen;
        }
        if let Some(path) = get(ENV_STORE_PATH) {
            self.store_path = Some(PathBuf::from(path));
        }

        let token = get(ENV_BOT_TOKEN);
        let chat_id = get(ENV_CHAT_ID);
        if token.is_some() || chat_id.is_some() {
            let current = self.notification.take().unwrap_or_default();
            self.notification = Some(NotificationConfig {
                bot_token: token.unwrap_or(current.bot_token),
                chat_id: chat_id.unwrap_or(current.chat_id),
            });
        }
    }

    /// Notification settings, only when both credentials are present.
    pub fn active_notification(&self) -> Option<&NotificationConfig> {
        self.notification
            .as_ref()
            .filter(|notification| notification.is_complete())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = WatchConfig::default();
        assert_eq!(config.max_concurrent, 5);
        assert_eq!(config.daily_cap, 3);
        assert_eq!(config.mute_ttl, Duration::from_secs(86_400));
        assert_eq!(config.mute_policy, MutePolicy::SuppressAll);
        assert!(config.active_notification().is_none());
    }

    #[test]
    fn test_yaml_with_humantime_durations() {
        let config = WatchConfig::from_yaml(
            r#"
max_concurrent: 2
fetch_timeout: 3s
mute_ttl: 2h
mute_policy: alert_only
notification:
  bot_token: "123:abc"
  chat_id: "42"
"#,
        )
        .unwrap();

        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.fetch_timeout, Duration::from_secs(3));
        assert_eq!(config.mute_ttl, Duration::from_secs(7200));
        assert_eq!(config.mute_policy, MutePolicy::AlertOnly);
        assert_eq!(config.daily_cap, 3);
        assert_eq!(config.active_notification().unwrap().chat_id, "42");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_INVENTORY, "a:ID1,TOK1,tunA"),
            (ENV_CHAT_ID, "42"),
            (ENV_WEBHOOK_SECRET, ""),
        ]);
        let mut config = WatchConfig::default();
        config.apply_overrides(|key| env.get(key).map(|value| value.to_string()));

        assert_eq!(config.inventory.as_deref(), Some("a:ID1,TOK1,tunA"));
        assert!(config.webhook_secret.is_none());
        // Chat id alone does not enable notifications.
        assert!(config.notification.is_some());
        assert!(config.active_notification().is_none());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = WatchConfig::load_from_path(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, WatchConfig::default());

        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "daily_cap: 5\n").unwrap();
        assert_eq!(WatchConfig::load_from_path(&path).unwrap().daily_cap, 5);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let mut config = WatchConfig::default();
        config.inventory = Some("a:ID1,very-secret".into());
        config.notification = Some(NotificationConfig {
            bot_token: "bot-secret".into(),
            chat_id: "42".into(),
        });
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("bot-secret"));
    }
}
