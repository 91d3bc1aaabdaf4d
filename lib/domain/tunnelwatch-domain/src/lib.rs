//! Domain models and invariants.

pub mod alert;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod inventory;
pub mod policy;
pub mod unit;

pub use alert::{Alert, AlertCallback, AlertState, CallbackPress, ControlAction};
pub use config::{EndpointsConfig, MutePolicy, NotificationConfig, WatchConfig};
pub use dispatch::{DispatchMode, DispatchOutcome};
pub use error::{
    AccountFetchError, AuthorizationError, ConfigurationError, NotificationDeliveryError,
    RemediationDispatchError,
};
pub use inventory::{AccountGroup, DeclaredUnit, Inventory, RemediationTarget};
pub use policy::{MuteState, QuotaDecision, QuotaRecord, TemporaryMute, local_date};
pub use unit::{ObservedUnit, ReconciledUnit, UnitClass, HEALTHY_STATUS};
