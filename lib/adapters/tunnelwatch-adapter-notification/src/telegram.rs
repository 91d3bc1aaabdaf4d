use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use tunnelwatch_domain::{Alert, NotificationDeliveryError};
use tunnelwatch_ports::NotificationPort;

/// Telegram rejects `callback_data` longer than this.
pub const MAX_CALLBACK_DATA: usize = 64;
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

#[derive(Debug, Serialize)]
pub struct SendMessage<'a> {
    pub chat_id: &'a str,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboard>,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
    text: &'a str,
}

/// One row with every control that fits the callback payload limit.
pub fn keyboard(alert: &Alert) -> Option<InlineKeyboard> {
    let row: Vec<InlineButton> = alert
        .controls
        .iter()
        .filter_map(|control| {
            let data = control.encode();
            if data.len() > MAX_CALLBACK_DATA {
                tracing::warn!(unit = %control.unit, "unit name too long for an inline control");
                return None;
            }
            Some(InlineButton {
                text: control.action.label().to_string(),
                callback_data: data,
            })
        })
        .collect();
    if row.is_empty() {
        return None;
    }
    Some(InlineKeyboard {
        inline_keyboard: vec![row],
    })
}

#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("base_url", &self.base_url)
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl TelegramNotifier {
    pub fn new(
        base_url: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build notification HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        })
    }

    pub fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.bot_token)
    }

    async fn call<B: Serialize + Sync>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<(), NotificationDeliveryError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            // reqwest errors carry the URL, which embeds the bot token.
            .map_err(|err| NotificationDeliveryError::Transport(err.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        let body = match body.char_indices().nth(MAX_ERROR_BODY) {
            Some((end, _)) => format!("{}…", &body[..end]),
            None => body,
        };
        Err(NotificationDeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl NotificationPort for TelegramNotifier {
    async fn send_alert(&self, alert: &Alert) -> Result<(), NotificationDeliveryError> {
        self.call(
            "sendMessage",
            &SendMessage {
                chat_id: &self.chat_id,
                text: &alert.text,
                reply_markup: keyboard(alert),
            },
        )
        .await
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: &str,
    ) -> Result<(), NotificationDeliveryError> {
        self.call(
            "answerCallbackQuery",
            &AnswerCallbackQuery {
                callback_query_id: callback_id,
                text,
            },
        )
        .await
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), NotificationDeliveryError> {
        self.call(
            "sendMessage",
            &SendMessage {
                chat_id,
                text,
                reply_markup: None,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alert_message_carries_inline_keyboard() {
        let alert = Alert::for_unit("tunA is down", "tunA", true);
        let message = SendMessage {
            chat_id: "42",
            text: &alert.text,
            reply_markup: keyboard(&alert),
        };

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "chat_id": "42",
                "text": "tunA is down",
                "reply_markup": {"inline_keyboard": [[
                    {"text": "🛠 Force fix", "callback_data": "fix:tunA"},
                    {"text": "🔕 Mute", "callback_data": "mute:tunA"}
                ]]}
            })
        );
    }

    #[test]
    fn test_plain_message_has_no_markup() {
        let message = SendMessage {
            chat_id: "42",
            text: "hello",
            reply_markup: keyboard(&Alert::plain("hello")),
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"chat_id": "42", "text": "hello"})
        );
    }

    #[test]
    fn test_oversized_callback_data_is_dropped() {
        let name = "n".repeat(70);
        let alert = Alert::for_unit("down", &name, true);
        assert_eq!(keyboard(&alert), None);
    }

    #[test]
    fn test_token_stays_out_of_debug() {
        let notifier =
            TelegramNotifier::new("https://api.telegram.org/", "123:ABC", "42", Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            notifier.method_url("sendMessage"),
            "https://api.telegram.org/bot123:ABC/sendMessage"
        );
        assert!(!format!("{notifier:?}").contains("123:ABC"));
    }

    #[tokio::test]
    async fn test_transport_errors_do_not_leak_token() {
        let notifier =
            TelegramNotifier::new("http://127.0.0.1:9", "123:SECRET", "42", Duration::from_secs(2))
                .unwrap();

        let err = notifier.send_text("42", "hi").await.unwrap_err();

        assert!(matches!(err, NotificationDeliveryError::Transport(_)));
        assert!(!err.to_string().contains("SECRET"));
    }
}
