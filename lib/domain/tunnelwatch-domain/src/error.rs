use std::time::Duration;

/// Inventory missing or unparseable. Fatal to the whole cycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("inventory is not configured")]
    MissingInventory,
    #[error("inventory declares no accounts")]
    EmptyInventory,
    #[error("inventory line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },
}

impl ConfigurationError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedLine {
            line,
            reason: reason.into(),
        }
    }
}

/// Failure listing the units of a single account. Isolated to that account.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountFetchError {
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed payload: {0}")]
    Payload(String),
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemediationDispatchError {
    #[error("workflow dispatch rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("workflow dispatch failed: {0}")]
    Transport(String),
}

impl RemediationDispatchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationDeliveryError {
    #[error("notification rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("notification transport error: {0}")]
    Transport(String),
}

/// Inbound interactive callback that failed authentication.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("webhook secret missing or mismatched")]
    SecretMismatch,
    #[error("recipient {chat_id} is not allow-listed")]
    RecipientNotAllowed { chat_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_human_readable() {
        assert_eq!(
            AccountFetchError::Timeout(Duration::from_secs(8)).to_string(),
            "request timed out after 8s"
        );
        assert_eq!(
            ConfigurationError::malformed(3, "missing credential").to_string(),
            "inventory line 3: missing credential"
        );
        let rejected = RemediationDispatchError::Rejected {
            status: 404,
            body: "Not Found".into(),
        };
        assert_eq!(rejected.status(), Some(404));
        assert_eq!(RemediationDispatchError::Transport("reset".into()).status(), None);
    }
}
