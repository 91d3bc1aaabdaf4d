//! In-memory fakes for every port, shared by unit tests and the service's route tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use tunnelwatch_domain::{
    AccountFetchError, AccountGroup, Alert, NotificationDeliveryError, ObservedUnit,
    RemediationDispatchError, RemediationTarget,
};
use tunnelwatch_ports::{ClockPort, KvStorePort, MonitoringPort, NotificationPort, RemediationPort};

pub fn account(id: &str, units: &[&str]) -> AccountGroup {
    AccountGroup {
        id: id.to_string(),
        credential: format!("token-{id}"),
        alias: format!("alias-{id}"),
        units: units.iter().map(|unit| unit.to_string()).collect(),
    }
}

#[derive(Default)]
pub struct FakeMonitoring {
    listings: Mutex<HashMap<String, Result<Vec<ObservedUnit>, AccountFetchError>>>,
    delays: HashMap<String, Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeMonitoring {
    pub fn with_units(self, account_id: &str, units: &[(&str, &str)]) -> Self {
        let observed = units
            .iter()
            .map(|(name, status)| ObservedUnit {
                name: name.to_string(),
                id: format!("{account_id}-{name}-0000"),
                status: status.to_string(),
                account_id: account_id.to_string(),
            })
            .collect();
        self.set(account_id, Ok(observed));
        self
    }

    pub fn with_error(self, account_id: &str, error: AccountFetchError) -> Self {
        self.set(account_id, Err(error));
        self
    }

    pub fn with_delay(mut self, account_id: &str, delay: Duration) -> Self {
        self.delays.insert(account_id.to_string(), delay);
        self
    }

    /// Replaces the live listing of an account between cycles.
    pub fn set(&self, account_id: &str, listing: Result<Vec<ObservedUnit>, AccountFetchError>) {
        self.listings
            .lock()
            .expect("fake monitoring lock poisoned")
            .insert(account_id.to_string(), listing);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MonitoringPort for FakeMonitoring {
    async fn list_units(
        &self,
        account: &AccountGroup,
    ) -> Result<Vec<ObservedUnit>, AccountFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&account.id) {
            tokio::time::sleep(*delay).await;
        }
        let listing = self
            .listings
            .lock()
            .expect("fake monitoring lock poisoned")
            .get(&account.id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        listing
    }
}

/// Records every workflow dispatch and answers with a fixed status.
pub struct RecordingRemediation {
    status: Mutex<Result<u16, RemediationDispatchError>>,
    dispatched: Mutex<Vec<RemediationTarget>>,
}

impl Default for RecordingRemediation {
    fn default() -> Self {
        Self {
            status: Mutex::new(Ok(204)),
            dispatched: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingRemediation {
    pub fn failing(error: RemediationDispatchError) -> Self {
        let remediation = Self::default();
        *remediation.status.lock().expect("remediation lock poisoned") = Err(error);
        remediation
    }

    pub fn dispatched(&self) -> Vec<RemediationTarget> {
        self.dispatched
            .lock()
            .expect("remediation lock poisoned")
            .clone()
    }
}

#[async_trait]
impl RemediationPort for RecordingRemediation {
    async fn dispatch_workflow(
        &self,
        target: &RemediationTarget,
    ) -> Result<u16, RemediationDispatchError> {
        self.dispatched
            .lock()
            .expect("remediation lock poisoned")
            .push(target.clone());
        self.status.lock().expect("remediation lock poisoned").clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Alert(Alert),
    Answer { callback_id: String, text: String },
    Text { chat_id: String, text: String },
}

#[derive(Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<Delivery>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .expect("notifier lock poisoned")
            .clone()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.deliveries()
            .into_iter()
            .filter_map(|delivery| match delivery {
                Delivery::Alert(alert) => Some(alert),
                _ => None,
            })
            .collect()
    }

    fn record(&self, delivery: Delivery) -> Result<(), NotificationDeliveryError> {
        self.deliveries
            .lock()
            .expect("notifier lock poisoned")
            .push(delivery);
        if self.fail {
            return Err(NotificationDeliveryError::Transport(
                "connection refused".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationPort for RecordingNotifier {
    async fn send_alert(&self, alert: &Alert) -> Result<(), NotificationDeliveryError> {
        self.record(Delivery::Alert(alert.clone()))
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: &str,
    ) -> Result<(), NotificationDeliveryError> {
        self.record(Delivery::Answer {
            callback_id: callback_id.to_string(),
            text: text.to_string(),
        })
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), NotificationDeliveryError> {
        self.record(Delivery::Text {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        })
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// 2024-01-01 10:00 UTC, 18:00 at the default +08:00 offset.
    pub fn new_year() -> Self {
        Self::at(
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0)
                .single()
                .expect("valid fixed timestamp"),
        )
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now += chrono::Duration::from_std(by).expect("duration in range");
    }
}

impl ClockPort for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock poisoned")
    }
}

/// Wraps a store and yields between every read and write so that concurrent
/// read-modify-write sequences interleave.
pub struct InterleavingStore {
    inner: Arc<dyn KvStorePort>,
}

impl InterleavingStore {
    pub fn new(inner: Arc<dyn KvStorePort>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl KvStorePort for InterleavingStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self.inner.get(key).await;
        tokio::task::yield_now().await;
        value
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        tokio::task::yield_now().await;
        self.inner.put(key, value).await
    }
}

/// Wraps a store and fails every read or write of one key.
pub struct FailingKeyStore {
    inner: Arc<dyn KvStorePort>,
    key: String,
}

impl FailingKeyStore {
    pub fn new(inner: Arc<dyn KvStorePort>, key: &str) -> Self {
        Self {
            inner,
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl KvStorePort for FailingKeyStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if key == self.key {
            anyhow::bail!("store unavailable for {key}");
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        if key == self.key {
            anyhow::bail!("store unavailable for {key}");
        }
        self.inner.put(key, value).await
    }
}
