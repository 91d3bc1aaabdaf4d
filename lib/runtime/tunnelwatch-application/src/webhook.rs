//! Interactive control presses, handled as an explicit four-stage pipeline:
//! [`Received`] → [`Authenticated`] → [`ActionApplied`] → [`Acknowledged`].
//!
//! Each stage is only reachable from the previous one, so nothing is mutated or sent
//! for a press that failed authentication.

use std::time::Duration;

use tunnelwatch_domain::{
    AlertCallback, AuthorizationError, CallbackPress, ControlAction, Inventory,
};

use crate::dispatcher::ActionDispatcher;
use crate::gateway::NotificationGateway;
use crate::policy_store::PolicyStore;

#[derive(Debug, Clone)]
pub struct Received {
    press: CallbackPress,
    presented_secret: Option<String>,
}

impl Received {
    pub fn new(press: CallbackPress, presented_secret: Option<String>) -> Self {
        Self {
            press,
            presented_secret,
        }
    }

    /// Checks the shared secret (when one is configured) and the allow-listed chat.
    /// Without an allow-listed chat every press is rejected.
    pub fn authenticate(
        self,
        expected_secret: Option<&str>,
        allowed_chat: Option<&str>,
    ) -> Result<Authenticated, AuthorizationError> {
        if let Some(expected) = expected_secret {
            if self.presented_secret.as_deref() != Some(expected) {
                return Err(AuthorizationError::SecretMismatch);
            }
        }
        if allowed_chat != Some(self.press.chat_id.as_str()) {
            return Err(AuthorizationError::RecipientNotAllowed {
                chat_id: self.press.chat_id,
            });
        }
        Ok(Authenticated { press: self.press })
    }
}

#[derive(Debug, Clone)]
pub struct Authenticated {
    press: CallbackPress,
}

impl Authenticated {
    pub fn callback(&self) -> Option<AlertCallback> {
        AlertCallback::decode(&self.press.data)
    }
}

#[derive(Debug, Clone)]
pub struct ActionApplied {
    press: CallbackPress,
    reply: String,
}

/// Terminal stage: the press was answered and its outcome reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledged {
    pub callback_id: String,
    pub chat_id: String,
    pub reply: String,
}

#[derive(Clone)]
pub struct WebhookController {
    dispatcher: ActionDispatcher,
    policy: PolicyStore,
    gateway: NotificationGateway,
    expected_secret: Option<String>,
    allowed_chat: Option<String>,
    mute_ttl: Duration,
}

impl WebhookController {
    pub fn new(
        dispatcher: ActionDispatcher,
        policy: PolicyStore,
        gateway: NotificationGateway,
        expected_secret: Option<String>,
        allowed_chat: Option<String>,
        mute_ttl: Duration,
    ) -> Self {
        Self {
            dispatcher,
            policy,
            gateway,
            expected_secret,
            allowed_chat,
            mute_ttl,
        }
    }

    pub async fn handle(
        &self,
        received: Received,
        inventory: &Inventory,
    ) -> Result<Acknowledged, AuthorizationError> {
        let authenticated = received
            .authenticate(self.expected_secret.as_deref(), self.allowed_chat.as_deref())
            .inspect_err(|err| tracing::warn!(error = %err, "callback rejected"))?;
        let applied = self.apply(authenticated, inventory).await;
        Ok(self.acknowledge(applied).await)
    }

    pub async fn apply(&self, authenticated: Authenticated, inventory: &Inventory) -> ActionApplied {
        let reply = match authenticated.callback() {
            Some(AlertCallback {
                action: ControlAction::Fix,
                unit,
            }) => {
                let outcome = self.dispatcher.dispatch_by_name(inventory, &unit).await;
                format!("🛠 {unit}: {}", outcome.summary())
            }
            Some(AlertCallback {
                action: ControlAction::Mute,
                unit,
            }) => self.mute(&unit).await,
            None => {
                tracing::debug!(data = %authenticated.press.data, "ignoring unknown callback");
                "Unknown action, nothing changed".to_string()
            }
        };
        ActionApplied {
            press: authenticated.press,
            reply,
        }
    }

    pub async fn acknowledge(&self, applied: ActionApplied) -> Acknowledged {
        let ActionApplied { press, reply } = applied;
        self.gateway
            .reply(&press.callback_id, &press.chat_id, &reply)
            .await;
        Acknowledged {
            callback_id: press.callback_id,
            chat_id: press.chat_id,
            reply,
        }
    }

    async fn mute(&self, unit: &str) -> String {
        let ttl = format_ttl(self.mute_ttl);
        match self.policy.set_temporary_mute(unit, self.mute_ttl).await {
            Ok(false) => format!("🔕 {unit} muted for {ttl}"),
            Ok(true) => format!("🔕 {unit} was already muted, extended for {ttl}"),
            Err(err) => {
                tracing::error!(unit = %unit, error = %err, "mute from callback failed");
                format!("⚠️ {unit}: mute failed ({err})")
            }
        }
    }
}

pub(crate) fn format_ttl(ttl: Duration) -> String {
    let secs = ttl.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tunnelwatch_adapter_store::MemoryKvStore;
    use tunnelwatch_domain::MutePolicy;

    use crate::testing::{Delivery, ManualClock, RecordingNotifier, RecordingRemediation};

    struct Harness {
        controller: WebhookController,
        policy: PolicyStore,
        remediation: Arc<RecordingRemediation>,
        notifier: Arc<RecordingNotifier>,
        inventory: Inventory,
    }

    fn harness() -> Harness {
        let remediation = Arc::new(RecordingRemediation::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let policy = PolicyStore::new(
            Arc::new(MemoryKvStore::default()),
            Arc::new(ManualClock::new_year()),
            3,
            8,
        );
        let dispatcher =
            ActionDispatcher::new(remediation.clone(), policy.clone(), MutePolicy::SuppressAll);
        let controller = WebhookController::new(
            dispatcher,
            policy.clone(),
            NotificationGateway::new(Some(notifier.clone())),
            Some("s3cret".into()),
            Some("42".into()),
            Duration::from_secs(24 * 3600),
        );
        Harness {
            controller,
            policy,
            remediation,
            notifier,
            inventory: "acct:ID1,TOK1,tunA;own,repo,PAT".parse().unwrap(),
        }
    }

    fn press(chat_id: &str, data: &str) -> CallbackPress {
        CallbackPress {
            callback_id: "cb-1".into(),
            chat_id: chat_id.into(),
            data: data.into(),
        }
    }

    #[test]
    fn test_authentication_rules() {
        let ok = Received::new(press("42", "fix:tunA"), Some("s3cret".into()));
        assert!(ok.authenticate(Some("s3cret"), Some("42")).is_ok());

        let wrong_secret = Received::new(press("42", "fix:tunA"), Some("guess".into()));
        assert_eq!(
            wrong_secret.authenticate(Some("s3cret"), Some("42")).unwrap_err(),
            AuthorizationError::SecretMismatch
        );

        let no_secret_configured = Received::new(press("42", "fix:tunA"), None);
        assert!(no_secret_configured.authenticate(None, Some("42")).is_ok());

        let stranger = Received::new(press("7", "fix:tunA"), None);
        assert_eq!(
            stranger.authenticate(None, Some("42")).unwrap_err(),
            AuthorizationError::RecipientNotAllowed { chat_id: "7".into() }
        );

        let nobody_allowed = Received::new(press("42", "fix:tunA"), None);
        assert!(nobody_allowed.authenticate(None, None).is_err());
    }

    #[tokio::test]
    async fn test_unauthorized_press_changes_nothing() {
        let h = harness();

        let result = h
            .controller
            .handle(Received::new(press("7", "mute:tunA"), Some("s3cret".into())), &h.inventory)
            .await;
        let forged = h
            .controller
            .handle(Received::new(press("42", "fix:tunA"), Some("nope".into())), &h.inventory)
            .await;

        assert!(result.is_err() && forged.is_err());
        assert!(!h.policy.is_effectively_muted("tunA").await.unwrap());
        assert_eq!(h.policy.quota("tunA", h.policy.today()).await.unwrap(), 0);
        assert!(h.remediation.dispatched().is_empty());
        assert!(h.notifier.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_fix_press_forces_dispatch_and_replies() {
        let h = harness();

        let ack = h
            .controller
            .handle(Received::new(press("42", "fix:tunA"), Some("s3cret".into())), &h.inventory)
            .await
            .unwrap();

        assert_eq!(ack.reply, "🛠 tunA: fix requested (HTTP 204)");
        assert_eq!(h.remediation.dispatched().len(), 1);
        let deliveries = h.notifier.deliveries();
        assert_eq!(deliveries.len(), 2);
        assert!(matches!(&deliveries[0], Delivery::Answer { callback_id, .. } if callback_id == "cb-1"));
        assert!(matches!(&deliveries[1], Delivery::Text { chat_id, .. } if chat_id == "42"));
    }

    #[tokio::test]
    async fn test_mute_press_mutes_and_distinguishes_repeat() {
        let h = harness();
        let received = || Received::new(press("42", "mute:tunA"), Some("s3cret".into()));

        let first = h.controller.handle(received(), &h.inventory).await.unwrap();
        let second = h.controller.handle(received(), &h.inventory).await.unwrap();

        assert_eq!(first.reply, "🔕 tunA muted for 24h");
        assert_eq!(second.reply, "🔕 tunA was already muted, extended for 24h");
        assert!(h.policy.is_effectively_muted("tunA").await.unwrap());
        assert_eq!(h.policy.active_temporary_mutes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_action_is_still_acknowledged() {
        let h = harness();

        let ack = h
            .controller
            .handle(Received::new(press("42", "reboot:tunA"), Some("s3cret".into())), &h.inventory)
            .await
            .unwrap();

        assert_eq!(ack.reply, "Unknown action, nothing changed");
        assert_eq!(h.notifier.deliveries().len(), 2);
        assert!(h.remediation.dispatched().is_empty());
    }

    #[test]
    fn test_format_ttl() {
        assert_eq!(format_ttl(Duration::from_secs(86_400)), "24h");
        assert_eq!(format_ttl(Duration::from_secs(90 * 60)), "90m");
        assert_eq!(format_ttl(Duration::from_secs(45)), "45s");
    }
}
