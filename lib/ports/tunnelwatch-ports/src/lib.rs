//! Port traits between the reconciliation core and its external collaborators.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tunnelwatch_domain::{
    AccountFetchError, AccountGroup, Alert, NotificationDeliveryError, ObservedUnit,
    RemediationDispatchError, RemediationTarget,
};

/// Lists the live units of one provider account.
#[async_trait]
pub trait MonitoringPort: Send + Sync {
    async fn list_units(
        &self,
        account: &AccountGroup,
    ) -> Result<Vec<ObservedUnit>, AccountFetchError>;
}

/// Fires the remediation workflow for a target. Returns the provider's acceptance status.
#[async_trait]
pub trait RemediationPort: Send + Sync {
    async fn dispatch_workflow(
        &self,
        target: &RemediationTarget,
    ) -> Result<u16, RemediationDispatchError>;
}

/// The single notification channel.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn send_alert(&self, alert: &Alert) -> Result<(), NotificationDeliveryError>;

    /// Clears the pending state of a pressed control.
    async fn answer_callback(
        &self,
        callback_id: &str,
        text: &str,
    ) -> Result<(), NotificationDeliveryError>;

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), NotificationDeliveryError>;
}

/// Shared, eventually-consistent key/value store. No cross-key atomicity.
#[async_trait]
pub trait KvStorePort: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: String) -> Result<()>;
}

pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone)]
pub struct PortSet {
    pub monitoring: Arc<dyn MonitoringPort>,
    pub remediation: Arc<dyn RemediationPort>,
    /// `None` disables the notification gateway.
    pub notification: Option<Arc<dyn NotificationPort>>,
    pub store: Arc<dyn KvStorePort>,
    pub clock: Arc<dyn ClockPort>,
}
