use serde::{Deserialize, Serialize};

use crate::inventory::{DeclaredUnit, RemediationTarget};

/// Status string the monitoring provider reports for a healthy unit.
pub const HEALTHY_STATUS: &str = "healthy";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedUnit {
    pub name: String,
    pub id: String,
    pub status: String,
    pub account_id: String,
}

impl ObservedUnit {
    pub fn is_healthy(&self) -> bool {
        self.status == HEALTHY_STATUS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitClass {
    Healthy,
    Unhealthy,
    MonitoringError,
    NotFound,
    Unmonitored,
}

impl UnitClass {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitClass::Healthy => "healthy",
            UnitClass::Unhealthy => "unhealthy",
            UnitClass::MonitoringError => "monitoring-error",
            UnitClass::NotFound => "not-found",
            UnitClass::Unmonitored => "unmonitored",
        }
    }
}

/// One unit after merging the declared inventory with the live observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledUnit {
    pub name: String,
    pub account_id: String,
    pub account_alias: String,
    pub declared: Option<DeclaredUnit>,
    pub observed: Option<ObservedUnit>,
    pub class: UnitClass,
    pub error: Option<String>,
}

impl ReconciledUnit {
    pub fn target(&self) -> Option<&RemediationTarget> {
        self.declared.as_ref().and_then(|unit| unit.target.as_ref())
    }

    pub fn is_healthy(&self) -> bool {
        self.observed.as_ref().is_some_and(ObservedUnit::is_healthy)
    }

    /// Live units reporting anything but healthy, declared or not.
    pub fn needs_attention(&self) -> bool {
        match self.class {
            UnitClass::Unhealthy => true,
            UnitClass::Unmonitored => !self.is_healthy(),
            _ => false,
        }
    }

    pub fn status_label(&self) -> &str {
        match (&self.observed, self.class) {
            (Some(observed), _) => &observed.status,
            (None, class) => class.as_str(),
        }
    }

    pub fn short_id(&self) -> Option<&str> {
        self.observed
            .as_ref()
            .map(|observed| observed.id.get(..8).unwrap_or(&observed.id))
    }
}
