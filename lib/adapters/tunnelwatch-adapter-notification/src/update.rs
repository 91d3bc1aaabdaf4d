use serde::Deserialize;

use tunnelwatch_domain::CallbackPress;

/// Header Telegram sets to the `secret_token` registered with `setWebhook`.
pub const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// The subset of a Telegram `Update` that control presses need.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: i64,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Lifts a control press out of an update. `None` for every other kind of update.
///
/// The chat of the message carrying the control identifies the caller; presses on
/// inaccessible messages fall back to the pressing user.
pub fn callback_press(update: &Update) -> Option<CallbackPress> {
    let query = update.callback_query.as_ref()?;
    let chat_id = query
        .message
        .as_ref()
        .map(|message| message.chat.id)
        .unwrap_or(query.from.id);
    Some(CallbackPress {
        callback_id: query.id.clone(),
        chat_id: chat_id.to_string(),
        data: query.data.clone().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_query_update() {
        let update: Update = serde_json::from_str(
            r#"{
                "update_id": 10,
                "callback_query": {
                    "id": "4382bfdwdsb323b2d9",
                    "from": {"id": 1111, "is_bot": false, "first_name": "Ops"},
                    "message": {"message_id": 7, "date": 1700000000, "chat": {"id": -1001234, "type": "supergroup"}},
                    "chat_instance": "-123",
                    "data": "fix:tunA"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            callback_press(&update),
            Some(CallbackPress {
                callback_id: "4382bfdwdsb323b2d9".into(),
                chat_id: "-1001234".into(),
                data: "fix:tunA".into(),
            })
        );
    }

    #[test]
    fn test_message_update_is_not_a_press() {
        let update: Update = serde_json::from_str(
            r#"{"update_id": 11, "message": {"message_id": 1, "chat": {"id": 5}, "text": "/start"}}"#,
        )
        .unwrap();
        assert_eq!(callback_press(&update), None);
    }

    #[test]
    fn test_press_without_message_uses_sender() {
        let update: Update = serde_json::from_str(
            r#"{"update_id": 12, "callback_query": {"id": "q", "from": {"id": 42}}}"#,
        )
        .unwrap();

        let press = callback_press(&update).unwrap();
        assert_eq!(press.chat_id, "42");
        assert_eq!(press.data, "");
    }
}
