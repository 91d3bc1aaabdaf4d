use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Fix,
    Mute,
}

impl ControlAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlAction::Fix => "fix",
            ControlAction::Mute => "mute",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ControlAction::Fix => "🛠 Force fix",
            ControlAction::Mute => "🔕 Mute",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "fix" => Some(ControlAction::Fix),
            "mute" => Some(ControlAction::Mute),
            _ => None,
        }
    }
}

/// Correlates an interactive control with the unit it acts on.
///
/// Encoded as `<action>:<unit>` in the control's callback payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertCallback {
    pub action: ControlAction,
    pub unit: String,
}

impl AlertCallback {
    pub fn new(action: ControlAction, unit: impl Into<String>) -> Self {
        Self {
            action,
            unit: unit.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!("{}:{}", self.action.as_str(), self.unit)
    }

    /// Returns `None` for unknown actions or an empty unit name.
    pub fn decode(data: &str) -> Option<Self> {
        let (action, unit) = data.split_once(':')?;
        let action = ControlAction::parse(action.trim())?;
        let unit = unit.trim();
        if unit.is_empty() {
            return None;
        }
        Some(Self::new(action, unit))
    }
}

impl fmt::Display for AlertCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub text: String,
    pub controls: Vec<AlertCallback>,
}

impl Alert {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            controls: Vec::new(),
        }
    }

    /// Alert for one unit. Force-fix is offered only when remediation is possible.
    pub fn for_unit(text: impl Into<String>, unit: &str, can_fix: bool) -> Self {
        let mut controls = Vec::with_capacity(2);
        if can_fix {
            controls.push(AlertCallback::new(ControlAction::Fix, unit));
        }
        controls.push(AlertCallback::new(ControlAction::Mute, unit));
        Self {
            text: text.into(),
            controls,
        }
    }
}

/// Notification lifecycle for one detected unit within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertState {
    Sent,
    Suppressed,
    /// Notification gateway not configured.
    Disabled,
    /// Delivery attempted and failed; logged only.
    Undelivered,
}

/// Inbound control press, already lifted out of the messaging provider's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPress {
    pub callback_id: String,
    pub chat_id: String,
    pub data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_wire_form() {
        let callback = AlertCallback::new(ControlAction::Fix, "foxgla-eu");
        assert_eq!(callback.encode(), "fix:foxgla-eu");
        assert_eq!(AlertCallback::decode("fix:foxgla-eu"), Some(callback));
        assert_eq!(
            AlertCallback::decode("mute:a:b"),
            Some(AlertCallback::new(ControlAction::Mute, "a:b"))
        );
        assert_eq!(AlertCallback::decode("restart:foxgla-eu"), None);
        assert_eq!(AlertCallback::decode("fix:"), None);
        assert_eq!(AlertCallback::decode("garbage"), None);
    }

    #[test]
    fn test_force_fix_only_with_target() {
        let alert = Alert::for_unit("down", "tunA", false);
        assert_eq!(
            alert.controls,
            vec![AlertCallback::new(ControlAction::Mute, "tunA")]
        );
        assert_eq!(Alert::for_unit("down", "tunA", true).controls.len(), 2);
    }
}
