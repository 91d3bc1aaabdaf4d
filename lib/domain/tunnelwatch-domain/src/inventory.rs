//! Declared inventory: which accounts to scan and which units they should hold.
//!
//! One declaration per line:
//!
//! ```text
//! alias:accountId,credential[,unitName]*[;[GitHub:]owner,repo,credential[,branch]]
//! ```
//!
//! The optional second segment is the remediation target shared by every unit named on
//! the line. Full-width `：，；` are accepted as their ASCII equivalents.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;

pub const DEFAULT_BRANCH: &str = "main";

const TARGET_PREFIX: &str = "github:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountGroup {
    pub id: String,
    pub credential: String,
    pub alias: String,
    pub units: Vec<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct RemediationTarget {
    pub owner: String,
    pub repo: String,
    pub credential: String,
    pub branch: String,
}

impl RemediationTarget {
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Debug for RemediationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemediationTarget")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("credential", &"<redacted>")
            .field("branch", &self.branch)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredUnit {
    pub name: String,
    pub account_id: String,
    pub target: Option<RemediationTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    accounts: Vec<AccountGroup>,
    units: BTreeMap<String, DeclaredUnit>,
}

impl Inventory {
    /// Parses the raw inventory, treating `None` as an unconfigured inventory.
    pub fn from_optional(raw: Option<&str>) -> Result<Self, ConfigurationError> {
        match raw {
            Some(raw) => raw.parse(),
            None => Err(ConfigurationError::MissingInventory),
        }
    }

    pub fn accounts(&self) -> &[AccountGroup] {
        &self.accounts
    }

    pub fn declared(&self, name: &str) -> Option<&DeclaredUnit> {
        self.units.get(name)
    }

    pub fn target_for(&self, name: &str) -> Option<&RemediationTarget> {
        self.declared(name).and_then(|unit| unit.target.as_ref())
    }

    /// Units whose winning declaration belongs to `account_id`.
    pub fn declared_in<'a>(&'a self, account_id: &'a str) -> impl Iterator<Item = &'a DeclaredUnit> {
        self.units
            .values()
            .filter(move |unit| unit.account_id == account_id)
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    fn register_line(&mut self, line: ParsedLine) {
        let ParsedLine {
            alias,
            account_id,
            credential,
            units,
            target,
        } = line;

        match self.accounts.iter_mut().find(|group| group.id == account_id) {
            Some(group) => {
                for name in &units {
                    if !group.units.contains(name) {
                        group.units.push(name.clone());
                    }
                }
            }
            None => self.accounts.push(AccountGroup {
                id: account_id.clone(),
                credential,
                alias,
                units: units.clone(),
            }),
        }

        // Last declaration of a name wins, including its remediation target.
        for name in units {
            self.units.insert(
                name.clone(),
                DeclaredUnit {
                    name,
                    account_id: account_id.clone(),
                    target: target.clone(),
                },
            );
        }
    }
}

impl FromStr for Inventory {
    type Err = ConfigurationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(raw);
        if normalized.trim().is_empty() {
            return Err(ConfigurationError::MissingInventory);
        }

        let mut inventory = Inventory::default();
        for (index, line) in normalized.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            inventory.register_line(parse_line(index + 1, line)?);
        }

        if inventory.accounts.is_empty() {
            return Err(ConfigurationError::EmptyInventory);
        }
        Ok(inventory)
    }
}

struct ParsedLine {
    alias: String,
    account_id: String,
    credential: String,
    units: Vec<String>,
    target: Option<RemediationTarget>,
}

fn normalize(raw: &str) -> String {
    raw.replace('：', ":")
        .replace('，', ",")
        .replace('；', ";")
}

fn parse_line(number: usize, line: &str) -> Result<ParsedLine, ConfigurationError> {
    let (primary, secondary) = match line.split_once(';') {
        Some((primary, rest)) => (primary.trim(), rest.split(';').next()),
        None => (line, None),
    };

    let (alias, details) = primary
        .split_once(':')
        .ok_or_else(|| ConfigurationError::malformed(number, "missing `alias:` prefix"))?;

    let mut fields = details.split(',').map(str::trim);
    let account_id = fields
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ConfigurationError::malformed(number, "missing account identifier"))?;
    let credential = fields
        .next()
        .filter(|credential| !credential.is_empty())
        .ok_or_else(|| ConfigurationError::malformed(number, "missing account credential"))?;
    let units = fields
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    let alias = alias.trim();
    Ok(ParsedLine {
        alias: if alias.is_empty() {
            account_id.to_string()
        } else {
            alias.to_string()
        },
        account_id: account_id.to_string(),
        credential: credential.to_string(),
        units,
        target: secondary.and_then(parse_target),
    })
}

/// Malformed targets degrade to "no target" rather than failing the line.
fn parse_target(segment: &str) -> Option<RemediationTarget> {
    let segment = segment.trim();
    let segment = match segment.get(..TARGET_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(TARGET_PREFIX) => &segment[TARGET_PREFIX.len()..],
        _ => segment,
    };

    let fields: Vec<&str> = segment.split(',').map(str::trim).collect();
    let [owner, repo, credential, rest @ ..] = fields.as_slice() else {
        return None;
    };
    if owner.is_empty() || repo.is_empty() || credential.is_empty() {
        return None;
    }
    let branch = rest
        .first()
        .filter(|branch| !branch.is_empty())
        .copied()
        .unwrap_or(DEFAULT_BRANCH);

    Some(RemediationTarget {
        owner: owner.to_string(),
        repo: repo.to_string(),
        credential: credential.to_string(),
        branch: branch.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_line_with_target() {
        let inventory: Inventory = "acct:ID1,TOK1,tunA;GitHub:own,repo,PAT".parse().unwrap();

        assert_eq!(
            inventory.accounts(),
            &[AccountGroup {
                id: "ID1".into(),
                credential: "TOK1".into(),
                alias: "acct".into(),
                units: vec!["tunA".into()],
            }]
        );
        let target = inventory.target_for("tunA").unwrap();
        assert_eq!(target.slug(), "own/repo");
        assert_eq!(target.credential, "PAT");
        assert_eq!(target.branch, DEFAULT_BRANCH);
    }

    #[test]
    fn test_normalizes_full_width_punctuation() {
        let inventory: Inventory = "主账号：ID1，TOK1，tunA；own，repo，PAT，release"
            .parse()
            .unwrap();

        assert_eq!(inventory.accounts()[0].alias, "主账号");
        let target = inventory.target_for("tunA").unwrap();
        assert_eq!(target.branch, "release");
    }

    #[test]
    fn test_account_without_units_is_scanned_without_targets() {
        let inventory: Inventory = "scan-only:ID9,TOK9;own,repo,PAT".parse().unwrap();

        assert_eq!(inventory.accounts().len(), 1);
        assert!(inventory.accounts()[0].units.is_empty());
        assert_eq!(inventory.unit_count(), 0);
    }

    #[test]
    fn test_malformed_target_degrades_to_no_target() {
        let inventory: Inventory = "a:ID1,TOK1,tunA,tunB;own,repo".parse().unwrap();

        assert!(inventory.declared("tunA").is_some());
        assert!(inventory.target_for("tunA").is_none());
        assert!(inventory.target_for("tunB").is_none());
    }

    #[test]
    fn test_missing_credential_is_fatal() {
        let err = "a:ID1,TOK1\nb:ID2".parse::<Inventory>().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MalformedLine {
                line: 2,
                reason: "missing account credential".into(),
            }
        );

        let err = "no-colon,ID1,TOK1".parse::<Inventory>().unwrap_err();
        assert!(matches!(err, ConfigurationError::MalformedLine { line: 1, .. }));
    }

    #[test]
    fn test_empty_input_is_missing_inventory() {
        assert_eq!(
            "  \n \n".parse::<Inventory>().unwrap_err(),
            ConfigurationError::MissingInventory
        );
        assert_eq!(
            Inventory::from_optional(None).unwrap_err(),
            ConfigurationError::MissingInventory
        );
    }

    #[test]
    fn test_duplicate_unit_last_declaration_wins() {
        let raw = "a:ID1,TOK1,shared;own,first,PAT1\nb:ID2,TOK2,shared;own,second,PAT2";
        let inventory: Inventory = raw.parse().unwrap();

        let unit = inventory.declared("shared").unwrap();
        assert_eq!(unit.account_id, "ID2");
        assert_eq!(unit.target.as_ref().unwrap().repo, "second");
        assert_eq!(inventory.declared_in("ID1").count(), 0);
        assert_eq!(inventory.declared_in("ID2").count(), 1);
    }

    #[test]
    fn test_lines_for_same_account_merge() {
        let raw = "a:ID1,TOK1,tunA;own,repo,PAT\nalias-b:ID1,TOK1,tunB";
        let inventory: Inventory = raw.parse().unwrap();

        assert_eq!(inventory.accounts().len(), 1);
        assert_eq!(inventory.accounts()[0].alias, "a");
        assert_eq!(inventory.accounts()[0].units, vec!["tunA", "tunB"]);
        assert!(inventory.target_for("tunA").is_some());
        assert!(inventory.target_for("tunB").is_none());
    }

    #[test]
    fn test_debug_redacts_target_credential() {
        let inventory: Inventory = "a:ID1,TOK1,tunA;own,repo,secret-pat".parse().unwrap();
        let rendered = format!("{:?}", inventory.target_for("tunA").unwrap());
        assert!(!rendered.contains("secret-pat"));
    }
}
