use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use tokio::time::timeout;

use tunnelwatch_domain::{AccountFetchError, AccountGroup, ObservedUnit};
use tunnelwatch_ports::MonitoringPort;

/// Live listing of one account, or why it could not be fetched.
#[derive(Debug, Clone)]
pub struct AccountReport {
    pub account: AccountGroup,
    pub result: Result<Vec<ObservedUnit>, AccountFetchError>,
}

/// Bounded fan-out over the monitoring API, one call per account.
#[derive(Clone)]
pub struct AccountAggregator {
    monitoring: Arc<dyn MonitoringPort>,
    max_concurrent: usize,
    fetch_timeout: Duration,
}

impl AccountAggregator {
    pub fn new(
        monitoring: Arc<dyn MonitoringPort>,
        max_concurrent: usize,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            monitoring,
            max_concurrent: max_concurrent.max(1),
            fetch_timeout,
        }
    }

    /// Returns exactly one report per account, in input order.
    pub async fn collect(&self, accounts: &[AccountGroup]) -> Vec<AccountReport> {
        let fetches = accounts.iter().cloned().map(|account| {
            let monitoring = Arc::clone(&self.monitoring);
            let limit = self.fetch_timeout;
            async move {
                let result = match timeout(limit, monitoring.list_units(&account)).await {
                    Ok(result) => result,
                    Err(_) => Err(AccountFetchError::Timeout(limit)),
                };
                match &result {
                    Ok(units) => {
                        tracing::debug!(account = %account.alias, units = units.len(), "account listed")
                    }
                    Err(err) => {
                        tracing::warn!(account = %account.alias, error = %err, "account fetch failed")
                    }
                }
                AccountReport { account, result }
            }
        });

        stream::iter(fetches)
            .buffered(self.max_concurrent)
            .collect()
            .await
    }
}
