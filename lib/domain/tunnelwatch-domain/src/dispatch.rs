use crate::error::RemediationDispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Scheduled detection; honours mute and daily quota.
    Normal,
    /// Manual or interactive request; bypasses mute and quota.
    Forced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    NoTarget,
    NotNeeded,
    Muted,
    QuotaExhausted {
        cap: u32,
    },
    /// Remediation accepted by the provider. `quota` is the count after this attempt,
    /// absent for forced dispatches.
    Dispatched {
        status: u16,
        quota: Option<(u32, u32)>,
    },
    Failed {
        error: RemediationDispatchError,
        quota: Option<(u32, u32)>,
    },
    /// Mute or quota state could not be read; nothing was dispatched.
    PolicyUnavailable {
        reason: String,
    },
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Dispatched { .. })
    }

    pub fn attempted(&self) -> bool {
        matches!(
            self,
            DispatchOutcome::Dispatched { .. } | DispatchOutcome::Failed { .. }
        )
    }

    /// One-line description used in alerts and HTTP replies.
    pub fn summary(&self) -> String {
        match self {
            DispatchOutcome::NoTarget => "no remediation configured".to_string(),
            DispatchOutcome::NotNeeded => "unit is healthy, nothing to fix".to_string(),
            DispatchOutcome::Muted => "muted, remediation skipped".to_string(),
            DispatchOutcome::QuotaExhausted { cap } => {
                format!("daily limit {cap}/{cap} reached, fix manually")
            }
            DispatchOutcome::Dispatched {
                quota: Some((count, cap)),
                ..
            } => format!("auto-fix triggered {count}/{cap}"),
            DispatchOutcome::Dispatched { status, quota: None } => {
                format!("fix requested (HTTP {status})")
            }
            DispatchOutcome::Failed {
                error,
                quota: Some((count, cap)),
            } => format!("auto-fix {count}/{cap} failed: {error}"),
            DispatchOutcome::Failed { error, quota: None } => format!("fix request failed: {error}"),
            DispatchOutcome::PolicyUnavailable { reason } => {
                format!("policy store unavailable, auto-fix skipped: {reason}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summaries() {
        let triggered = DispatchOutcome::Dispatched {
            status: 204,
            quota: Some((2, 3)),
        };
        assert!(triggered.is_success());
        assert_eq!(triggered.summary(), "auto-fix triggered 2/3");
        assert_eq!(
            DispatchOutcome::QuotaExhausted { cap: 3 }.summary(),
            "daily limit 3/3 reached, fix manually"
        );

        let failed = DispatchOutcome::Failed {
            error: RemediationDispatchError::Rejected {
                status: 422,
                body: "bad ref".into(),
            },
            quota: None,
        };
        assert!(failed.attempted());
        assert!(!failed.is_success());
        assert_eq!(
            failed.summary(),
            "fix request failed: workflow dispatch rejected with HTTP 422: bad ref"
        );
        assert!(!DispatchOutcome::Muted.attempted());

        let unavailable = DispatchOutcome::PolicyUnavailable {
            reason: "timeout".into(),
        };
        assert!(!unavailable.attempted());
        assert_eq!(
            unavailable.summary(),
            "policy store unavailable, auto-fix skipped: timeout"
        );
    }
}
