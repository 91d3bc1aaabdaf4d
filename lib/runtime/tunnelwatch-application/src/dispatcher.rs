use std::sync::Arc;

use anyhow::Result;

use tunnelwatch_domain::{
    DispatchMode, DispatchOutcome, Inventory, MutePolicy, ReconciledUnit, RemediationTarget,
};
use tunnelwatch_ports::RemediationPort;

use crate::policy_store::PolicyStore;

/// Decides per unit whether remediation runs, and runs it.
#[derive(Clone)]
pub struct ActionDispatcher {
    remediation: Arc<dyn RemediationPort>,
    policy: PolicyStore,
    mute_policy: MutePolicy,
}

impl ActionDispatcher {
    pub fn new(
        remediation: Arc<dyn RemediationPort>,
        policy: PolicyStore,
        mute_policy: MutePolicy,
    ) -> Self {
        Self {
            remediation,
            policy,
            mute_policy,
        }
    }

    /// Normal mode checks target, health, mute and quota in that order. Forced mode
    /// skips everything but the target check.
    pub async fn dispatch(&self, unit: &ReconciledUnit, mode: DispatchMode) -> Result<DispatchOutcome> {
        let Some(target) = unit.target() else {
            return Ok(DispatchOutcome::NoTarget);
        };
        if mode == DispatchMode::Forced {
            return Ok(self.call(&unit.name, target, None).await);
        }

        if unit.is_healthy() {
            return Ok(DispatchOutcome::NotNeeded);
        }
        if self.mute_policy == MutePolicy::SuppressAll
            && self.policy.is_effectively_muted(&unit.name).await?
        {
            tracing::debug!(unit = %unit.name, "remediation skipped, unit muted");
            return Ok(DispatchOutcome::Muted);
        }

        let cap = self.policy.daily_cap();
        let decision = self
            .policy
            .consume_quota(&unit.name, self.policy.today())
            .await?;
        if !decision.allowed {
            tracing::info!(unit = %unit.name, cap, "daily remediation quota exhausted");
            return Ok(DispatchOutcome::QuotaExhausted { cap });
        }
        Ok(self
            .call(&unit.name, target, Some((decision.count_after, cap)))
            .await)
    }

    /// Forced dispatch of a declared unit without a live fetch.
    pub async fn dispatch_by_name(&self, inventory: &Inventory, name: &str) -> DispatchOutcome {
        match inventory.target_for(name) {
            Some(target) => self.call(name, target, None).await,
            None => DispatchOutcome::NoTarget,
        }
    }

    async fn call(
        &self,
        name: &str,
        target: &RemediationTarget,
        quota: Option<(u32, u32)>,
    ) -> DispatchOutcome {
        match self.remediation.dispatch_workflow(target).await {
            Ok(status) => {
                tracing::info!(unit = %name, repo = %target.slug(), status, "remediation dispatched");
                DispatchOutcome::Dispatched { status, quota }
            }
            Err(error) => {
                tracing::warn!(
                    unit = %name,
                    repo = %target.slug(),
                    http_status = ?error.status(),
                    error = %error,
                    "remediation failed"
                );
                DispatchOutcome::Failed { error, quota }
            }
        }
    }
}
