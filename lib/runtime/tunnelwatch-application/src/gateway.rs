use std::sync::Arc;

use tunnelwatch_domain::{Alert, AlertState, DispatchOutcome, ReconciledUnit, UnitClass};
use tunnelwatch_ports::NotificationPort;

use crate::reconciler::AccountError;

/// Formats alerts and hands them to the notification channel, if one is configured.
///
/// Delivery problems never propagate; they are logged and reported as
/// [`AlertState::Undelivered`].
#[derive(Clone)]
pub struct NotificationGateway {
    port: Option<Arc<dyn NotificationPort>>,
}

impl NotificationGateway {
    pub fn new(port: Option<Arc<dyn NotificationPort>>) -> Self {
        Self { port }
    }

    pub fn unit_alert(&self, unit: &ReconciledUnit, outcome: &DispatchOutcome) -> Alert {
        let heading = match unit.class {
            UnitClass::Unmonitored => "Unmonitored tunnel unhealthy",
            _ => "Tunnel unhealthy",
        };
        let mut text = format!(
            "🚨 {heading}: {}\nAccount: {}\nStatus: {}",
            unit.name,
            unit.account_alias,
            unit.status_label()
        );
        if let Some(id) = unit.short_id() {
            text.push_str(&format!("\nID: {id}"));
        }
        text.push_str(&format!("\nRemediation: {}", outcome.summary()));
        Alert::for_unit(text, &unit.name, unit.target().is_some())
    }

    pub fn account_alert(&self, error: &AccountError) -> Alert {
        Alert::plain(format!(
            "⚠️ Account {} ({}) could not be checked\nError: {}",
            error.alias, error.account_id, error.error
        ))
    }

    pub async fn deliver(&self, alert: &Alert) -> AlertState {
        let Some(port) = &self.port else {
            tracing::debug!("notification gateway disabled, alert skipped");
            return AlertState::Disabled;
        };
        match port.send_alert(alert).await {
            Ok(()) => AlertState::Sent,
            Err(err) => {
                tracing::warn!(error = %err, "alert delivery failed");
                AlertState::Undelivered
            }
        }
    }

    /// Acknowledges a control press and reports its outcome to the pressing chat.
    pub async fn reply(&self, callback_id: &str, chat_id: &str, text: &str) {
        let Some(port) = &self.port else {
            tracing::debug!("notification gateway disabled, reply skipped");
            return;
        };
        if let Err(err) = port.answer_callback(callback_id, text).await {
            tracing::warn!(error = %err, "callback answer failed");
        }
        if let Err(err) = port.send_text(chat_id, text).await {
            tracing::warn!(error = %err, %chat_id, "callback reply failed");
        }
    }
}
