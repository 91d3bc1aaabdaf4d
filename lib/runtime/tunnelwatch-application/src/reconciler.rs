use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use tunnelwatch_domain::{DeclaredUnit, Inventory, ReconciledUnit, UnitClass};

use crate::aggregator::AccountReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountError {
    pub account_id: String,
    pub alias: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Keyed by unit name; no duplicates.
    pub units: BTreeMap<String, ReconciledUnit>,
    pub account_errors: Vec<AccountError>,
    pub live_total: usize,
    pub live_healthy: usize,
}

impl Reconciliation {
    pub fn attention(&self) -> impl Iterator<Item = &ReconciledUnit> {
        self.units.values().filter(|unit| unit.needs_attention())
    }

    pub fn count(&self, class: UnitClass) -> usize {
        self.units.values().filter(|unit| unit.class == class).count()
    }
}

/// Merges the declared inventory with one cycle's live reports.
///
/// A pure function of its inputs. Units named in several accounts keep the last one seen.
pub fn reconcile(inventory: &Inventory, reports: &[AccountReport]) -> Reconciliation {
    let mut out = Reconciliation::default();

    for report in reports {
        let account = &report.account;
        let mut declared: HashMap<&str, &DeclaredUnit> = inventory
            .declared_in(&account.id)
            .map(|unit| (unit.name.as_str(), unit))
            .collect();

        let observed = match &report.result {
            Ok(observed) => observed,
            Err(err) => {
                let error = err.to_string();
                for unit in declared.into_values() {
                    out.units.insert(
                        unit.name.clone(),
                        ReconciledUnit {
                            name: unit.name.clone(),
                            account_id: account.id.clone(),
                            account_alias: account.alias.clone(),
                            declared: Some(unit.clone()),
                            observed: None,
                            class: UnitClass::MonitoringError,
                            error: Some(error.clone()),
                        },
                    );
                }
                out.account_errors.push(AccountError {
                    account_id: account.id.clone(),
                    alias: account.alias.clone(),
                    error,
                });
                continue;
            }
        };

        for live in observed {
            out.live_total += 1;
            if live.is_healthy() {
                out.live_healthy += 1;
            }
            let matched = declared.remove(live.name.as_str());
            let class = match (matched, live.is_healthy()) {
                (None, _) => UnitClass::Unmonitored,
                (Some(_), true) => UnitClass::Healthy,
                (Some(_), false) => UnitClass::Unhealthy,
            };
            let replaced = out.units.insert(
                live.name.clone(),
                ReconciledUnit {
                    name: live.name.clone(),
                    account_id: account.id.clone(),
                    account_alias: account.alias.clone(),
                    declared: matched.cloned(),
                    observed: Some(live.clone()),
                    class,
                    error: None,
                },
            );
            if let Some(previous) = replaced {
                tracing::debug!(
                    unit = %live.name,
                    previous_account = %previous.account_alias,
                    account = %account.alias,
                    "duplicate unit name, keeping last seen"
                );
            }
        }

        for unit in declared.into_values() {
            out.units.insert(
                unit.name.clone(),
                ReconciledUnit {
                    name: unit.name.clone(),
                    account_id: account.id.clone(),
                    account_alias: account.alias.clone(),
                    declared: Some(unit.clone()),
                    observed: None,
                    class: UnitClass::NotFound,
                    error: None,
                },
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::account;
    use tunnelwatch_domain::{AccountFetchError, ObservedUnit};

    fn live(account_id: &str, name: &str, status: &str) -> ObservedUnit {
        ObservedUnit {
            name: name.into(),
            id: format!("{name}-id"),
            status: status.into(),
            account_id: account_id.into(),
        }
    }

    fn report(
        inventory: &Inventory,
        id: &str,
        result: Result<Vec<ObservedUnit>, AccountFetchError>,
    ) -> AccountReport {
        let account = inventory
            .accounts()
            .iter()
            .find(|account| account.id == id)
            .cloned()
            .unwrap_or_else(|| account(id, &[]));
        AccountReport { account, result }
    }

    #[test]
    fn test_failed_account_units_become_monitoring_errors() {
        let inventory: Inventory = "a:ID1,T1,tunA,tunB;own,repo,PAT\nb:ID2,T2,tunC"
            .parse()
            .unwrap();
        let reports = vec![
            report(
                &inventory,
                "ID1",
                Err(AccountFetchError::Status {
                    status: 403,
                    message: "Forbidden".into(),
                }),
            ),
            report(
                &inventory,
                "ID2",
                Ok(vec![live("ID2", "tunC", "healthy"), live("ID2", "extra", "down")]),
            ),
        ];

        let out = reconcile(&inventory, &reports);

        // Two declared units of the failed account plus two observed units.
        assert_eq!(out.units.len(), 4);
        assert_eq!(out.count(UnitClass::MonitoringError), 2);
        let errored = &out.units["tunA"];
        assert_eq!(errored.error.as_deref(), Some("HTTP 403: Forbidden"));
        assert!(errored.target().is_some());
        assert_eq!(out.units["tunC"].class, UnitClass::Healthy);
        assert_eq!(out.units["extra"].class, UnitClass::Unmonitored);
        assert_eq!(out.account_errors.len(), 1);
        assert_eq!(out.account_errors[0].alias, "a");
        assert_eq!((out.live_total, out.live_healthy), (2, 1));
    }

    #[test]
    fn test_declared_units_missing_from_live_data_are_not_found() {
        let inventory: Inventory = "a:ID1,T1,tunA,tunB".parse().unwrap();
        let reports = vec![report(
            &inventory,
            "ID1",
            Ok(vec![live("ID1", "tunA", "down")]),
        )];

        let out = reconcile(&inventory, &reports);

        assert_eq!(out.units["tunA"].class, UnitClass::Unhealthy);
        assert_eq!(out.units["tunB"].class, UnitClass::NotFound);
        let attention: Vec<_> = out.attention().map(|unit| unit.name.as_str()).collect();
        assert_eq!(attention, vec!["tunA"]);
    }

    #[test]
    fn test_unhealthy_declared_unit_carries_target() {
        let inventory: Inventory = "acct:ID1,TOK1,tunA;GitHub:own,repo,PAT".parse().unwrap();
        let reports = vec![report(
            &inventory,
            "ID1",
            Ok(vec![live("ID1", "tunA", "down")]),
        )];

        let out = reconcile(&inventory, &reports);

        assert_eq!(out.units.len(), 1);
        let unit = &out.units["tunA"];
        assert_eq!(unit.class, UnitClass::Unhealthy);
        assert_eq!(unit.target().unwrap().slug(), "own/repo");
        assert_eq!(unit.account_alias, "acct");
    }

    #[test]
    fn test_duplicate_live_names_keep_last_seen() {
        let inventory: Inventory = "a:ID1,T1\nb:ID2,T2".parse().unwrap();
        let reports = vec![
            report(&inventory, "ID1", Ok(vec![live("ID1", "dup", "down")])),
            report(&inventory, "ID2", Ok(vec![live("ID2", "dup", "healthy")])),
        ];

        let out = reconcile(&inventory, &reports);

        assert_eq!(out.units.len(), 1);
        assert_eq!(out.units["dup"].account_id, "ID2");
        assert!(out.units["dup"].is_healthy());
    }
}
