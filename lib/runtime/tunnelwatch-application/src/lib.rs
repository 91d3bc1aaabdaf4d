//! Reconciliation, policy and remediation core of tunnelwatch.

pub mod aggregator;
pub mod dispatcher;
pub mod gateway;
pub mod policy_store;
pub mod reconciler;
pub mod watcher;
pub mod webhook;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use aggregator::{AccountAggregator, AccountReport};
pub use dispatcher::ActionDispatcher;
pub use gateway::NotificationGateway;
pub use policy_store::{MuteSnapshot, PolicyStore};
pub use reconciler::{AccountError, Reconciliation, reconcile};
pub use watcher::{
    CycleReport, MuteAction, MuteChange, StatusSummary, StatusView, UnitAction, UnitStatus,
    WatchError, Watcher,
};
pub use webhook::{Acknowledged, WebhookController};
