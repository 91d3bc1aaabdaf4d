use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use tunnelwatch_domain::{
    AlertState, AuthorizationError, CallbackPress, ConfigurationError, DispatchMode,
    DispatchOutcome, Inventory, MuteState, TemporaryMute, UnitClass, WatchConfig,
};
use tunnelwatch_ports::{ClockPort, PortSet};

use crate::aggregator::AccountAggregator;
use crate::dispatcher::ActionDispatcher;
use crate::gateway::NotificationGateway;
use crate::policy_store::PolicyStore;
use crate::reconciler::{AccountError, Reconciliation, reconcile};
use crate::webhook::{Acknowledged, Received, WebhookController, format_ttl};

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// What one cycle did about one unit needing attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitAction {
    pub unit: String,
    pub class: UnitClass,
    pub outcome: DispatchOutcome,
    pub alert: AlertState,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub reconciliation: Reconciliation,
    pub actions: Vec<UnitAction>,
    pub account_alerts: Vec<(String, AlertState)>,
}

impl CycleReport {
    pub fn action(&self, unit: &str) -> Option<&UnitAction> {
        self.actions.iter().find(|action| action.unit == unit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitStatus {
    pub name: String,
    pub account: String,
    pub class: UnitClass,
    pub status: String,
    pub id: Option<String>,
    pub repo: Option<String>,
    pub error: Option<String>,
    pub muted: bool,
    pub mute: MuteState,
    pub quota_today: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub monitoring_error: usize,
    pub not_found: usize,
    pub unmonitored: usize,
    pub live_total: usize,
    pub live_healthy: usize,
}

/// Read-only dashboard payload.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub generated_at: DateTime<Utc>,
    pub today: NaiveDate,
    pub daily_cap: u32,
    pub summary: StatusSummary,
    pub units: Vec<UnitStatus>,
    pub account_errors: Vec<AccountError>,
    pub temporary_mutes: Vec<TemporaryMute>,
    pub permanent_mutes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MuteAction {
    Mute,
    Unmute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MuteChange {
    pub name: String,
    pub action: MuteAction,
    pub changed: bool,
    pub message: String,
}

/// The core every trigger enters: the timer, the HTTP surface and the webhook.
#[derive(Clone)]
pub struct Watcher {
    config: Arc<WatchConfig>,
    aggregator: AccountAggregator,
    policy: PolicyStore,
    dispatcher: ActionDispatcher,
    gateway: NotificationGateway,
    webhook: WebhookController,
    clock: Arc<dyn ClockPort>,
}

impl Watcher {
    pub fn new(ports: PortSet, config: WatchConfig) -> Self {
        let aggregator = AccountAggregator::new(
            ports.monitoring,
            config.max_concurrent,
            config.fetch_timeout,
        );
        let policy = PolicyStore::new(
            ports.store,
            Arc::clone(&ports.clock),
            config.daily_cap,
            config.utc_offset_hours,
        );
        let dispatcher =
            ActionDispatcher::new(ports.remediation, policy.clone(), config.mute_policy);
        let gateway = NotificationGateway::new(ports.notification);
        let webhook = WebhookController::new(
            dispatcher.clone(),
            policy.clone(),
            gateway.clone(),
            config.webhook_secret.clone(),
            config
                .active_notification()
                .map(|notification| notification.chat_id.clone()),
            config.mute_ttl,
        );
        Self {
            config: Arc::new(config),
            aggregator,
            policy,
            dispatcher,
            gateway,
            webhook,
            clock: ports.clock,
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn policy(&self) -> &PolicyStore {
        &self.policy
    }

    fn inventory(&self) -> Result<Inventory, ConfigurationError> {
        Inventory::from_optional(self.config.inventory.as_deref())
    }

    async fn observe(&self, inventory: &Inventory) -> Reconciliation {
        let reports = self.aggregator.collect(inventory.accounts()).await;
        reconcile(inventory, &reports)
    }

    /// One detection pass: fetch, reconcile, remediate and alert.
    pub async fn run_cycle(&self) -> Result<CycleReport, WatchError> {
        let cycle_id = Uuid::new_v4();
        self.cycle(cycle_id)
            .instrument(tracing::info_span!("cycle", id = %cycle_id))
            .await
    }

    async fn cycle(&self, cycle_id: Uuid) -> Result<CycleReport, WatchError> {
        let inventory = self.inventory()?;
        if let Err(err) = self.policy.purge_expired().await {
            tracing::error!(error = %err, "failed to purge expired mutes");
        }
        let reconciliation = self.observe(&inventory).await;

        let mut actions = Vec::new();
        for unit in reconciliation.attention() {
            let outcome = match self.dispatcher.dispatch(unit, DispatchMode::Normal).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(unit = %unit.name, error = %err, "policy check failed");
                    DispatchOutcome::PolicyUnavailable {
                        reason: err.to_string(),
                    }
                }
            };
            let muted = self
                .policy
                .is_effectively_muted(&unit.name)
                .await
                .unwrap_or_else(|err| {
                    tracing::error!(unit = %unit.name, error = %err, "mute check failed, alerting");
                    false
                });
            let alert = if muted {
                tracing::debug!(unit = %unit.name, "alert suppressed, unit muted");
                AlertState::Suppressed
            } else {
                self.gateway
                    .deliver(&self.gateway.unit_alert(unit, &outcome))
                    .await
            };
            tracing::info!(
                unit = %unit.name,
                class = unit.class.as_str(),
                outcome = %outcome.summary(),
                alert = ?alert,
                "unit needs attention"
            );
            actions.push(UnitAction {
                unit: unit.name.clone(),
                class: unit.class,
                outcome,
                alert,
            });
        }

        let mut account_alerts = Vec::new();
        if self.config.notify_account_errors {
            for error in &reconciliation.account_errors {
                let muted = self
                    .account_muted(&inventory, &error.account_id)
                    .await
                    .unwrap_or_else(|err| {
                        tracing::error!(
                            account = %error.account_id,
                            error = %err,
                            "mute check failed, alerting"
                        );
                        false
                    });
                let state = if muted {
                    AlertState::Suppressed
                } else {
                    self.gateway
                        .deliver(&self.gateway.account_alert(error))
                        .await
                };
                account_alerts.push((error.account_id.clone(), state));
            }
        }

        tracing::info!(
            declared = inventory.unit_count(),
            units = reconciliation.units.len(),
            attention = actions.len(),
            remediated = actions.iter().filter(|action| action.outcome.attempted()).count(),
            account_errors = reconciliation.account_errors.len(),
            "cycle complete"
        );
        Ok(CycleReport {
            cycle_id,
            reconciliation,
            actions,
            account_alerts,
        })
    }

    /// True when the account declares units and every one of them is muted.
    async fn account_muted(&self, inventory: &Inventory, account_id: &str) -> anyhow::Result<bool> {
        let snapshot = self.policy.snapshot().await?;
        let now = self.clock.now();
        let mut declared = inventory.declared_in(account_id).peekable();
        if declared.peek().is_none() {
            return Ok(false);
        }
        Ok(declared.all(|unit| snapshot.state_for(&unit.name).is_effective(now)))
    }

    /// Live view for the dashboard. Never remediates or alerts.
    pub async fn status(&self) -> Result<StatusView, WatchError> {
        let inventory = self.inventory()?;
        let reconciliation = self.observe(&inventory).await;
        let snapshot = self.policy.snapshot().await?;
        let now = self.clock.now();
        let today = self.policy.today();

        let mut units = Vec::with_capacity(reconciliation.units.len());
        for unit in reconciliation.units.values() {
            let mute = snapshot.state_for(&unit.name);
            units.push(UnitStatus {
                name: unit.name.clone(),
                account: unit.account_alias.clone(),
                class: unit.class,
                status: unit.status_label().to_string(),
                id: unit.short_id().map(str::to_string),
                repo: unit.target().map(|target| target.slug()),
                error: unit.error.clone(),
                muted: mute.is_effective(now),
                mute,
                quota_today: self.policy.quota(&unit.name, today).await?,
            });
        }

        let summary = StatusSummary {
            total: reconciliation.units.len(),
            healthy: reconciliation.count(UnitClass::Healthy),
            unhealthy: reconciliation.count(UnitClass::Unhealthy),
            monitoring_error: reconciliation.count(UnitClass::MonitoringError),
            not_found: reconciliation.count(UnitClass::NotFound),
            unmonitored: reconciliation.count(UnitClass::Unmonitored),
            live_total: reconciliation.live_total,
            live_healthy: reconciliation.live_healthy,
        };
        Ok(StatusView {
            generated_at: now,
            today,
            daily_cap: self.policy.daily_cap(),
            summary,
            units,
            account_errors: reconciliation.account_errors,
            temporary_mutes: snapshot.temporary,
            permanent_mutes: snapshot.permanent.into_iter().collect(),
        })
    }

    /// Manual fix request. Forced: ignores mute and quota.
    pub async fn trigger(&self, name: &str) -> Result<DispatchOutcome, WatchError> {
        let inventory = self.inventory()?;
        let outcome = self.dispatcher.dispatch_by_name(&inventory, name).await;
        tracing::info!(unit = %name, outcome = %outcome.summary(), "manual trigger");
        Ok(outcome)
    }

    pub async fn set_mute(&self, name: &str, action: MuteAction) -> Result<MuteChange, WatchError> {
        let ttl = self.config.mute_ttl;
        let (changed, message) = match action {
            MuteAction::Mute => {
                let already = self.policy.set_temporary_mute(name, ttl).await?;
                let message = if already {
                    format!("{name} mute extended for {}", format_ttl(ttl))
                } else {
                    format!("{name} muted for {}", format_ttl(ttl))
                };
                (!already, message)
            }
            MuteAction::Unmute => {
                let removed = self.policy.clear_temporary_mute(name).await?;
                let message = if removed {
                    format!("{name} unmuted")
                } else {
                    format!("{name} was not muted")
                };
                (removed, message)
            }
        };
        Ok(MuteChange {
            name: name.to_string(),
            action,
            changed,
            message,
        })
    }

    pub async fn set_permanent_mute(
        &self,
        name: &str,
        action: MuteAction,
    ) -> Result<MuteChange, WatchError> {
        let (changed, message) = match action {
            MuteAction::Mute => {
                let added = self.policy.set_permanent_mute(name).await?;
                let message = if added {
                    format!("{name} permanently muted")
                } else {
                    format!("{name} was already permanently muted")
                };
                (added, message)
            }
            MuteAction::Unmute => {
                let removed = self.policy.clear_permanent_mute(name).await?;
                let message = if removed {
                    format!("{name} permanent mute removed")
                } else {
                    format!("{name} was not permanently muted")
                };
                (removed, message)
            }
        };
        Ok(MuteChange {
            name: name.to_string(),
            action,
            changed,
            message,
        })
    }

    /// Entry point for an interactive control press.
    ///
    /// A broken inventory does not block mutes; fix presses then find no target.
    pub async fn handle_callback(
        &self,
        press: CallbackPress,
        presented_secret: Option<String>,
    ) -> Result<Acknowledged, AuthorizationError> {
        let inventory = self.inventory().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "inventory unavailable for callback");
            Inventory::default()
        });
        self.webhook
            .handle(Received::new(press, presented_secret), &inventory)
            .await
    }
}
