//! Mute and quota policy over the shared key/value store.
//!
//! Every mutation is a single read-modify-write of one key. Two writers racing on the
//! same key may lose an update; each write still stores a complete JSON document.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;

use tunnelwatch_domain::{MuteState, QuotaDecision, QuotaRecord, TemporaryMute, local_date};
use tunnelwatch_ports::{ClockPort, KvStorePort};

pub const TEMPORARY_MUTES_KEY: &str = "temporary-mutes";
pub const PERMANENT_MUTES_KEY: &str = "permanent-mutes";
pub const QUOTA_KEY_PREFIX: &str = "quota:";

pub fn quota_key(name: &str) -> String {
    format!("{QUOTA_KEY_PREFIX}{name}")
}

/// Mute lists as read in one pass, for presentation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MuteSnapshot {
    pub temporary: Vec<TemporaryMute>,
    pub permanent: BTreeSet<String>,
}

impl MuteSnapshot {
    pub fn state_for(&self, name: &str) -> MuteState {
        MuteState {
            temporary_until: self
                .temporary
                .iter()
                .find(|entry| entry.name == name)
                .map(|entry| entry.expiry),
            permanent: self.permanent.contains(name),
        }
    }
}

#[derive(Clone)]
pub struct PolicyStore {
    store: Arc<dyn KvStorePort>,
    clock: Arc<dyn ClockPort>,
    daily_cap: u32,
    utc_offset_hours: i32,
}

impl PolicyStore {
    pub fn new(
        store: Arc<dyn KvStorePort>,
        clock: Arc<dyn ClockPort>,
        daily_cap: u32,
        utc_offset_hours: i32,
    ) -> Self {
        Self {
            store,
            clock,
            daily_cap,
            utc_offset_hours,
        }
    }

    pub fn daily_cap(&self) -> u32 {
        self.daily_cap
    }

    /// Today's date in the quota time zone.
    pub fn today(&self) -> NaiveDate {
        local_date(self.clock.now(), self.utc_offset_hours)
    }

    pub async fn is_effectively_muted(&self, name: &str) -> Result<bool> {
        let now = self.clock.now();
        let temporary = self.active_temporary_mutes().await?;
        if temporary
            .iter()
            .any(|entry| entry.name == name && entry.is_active(now))
        {
            return Ok(true);
        }
        Ok(self.permanent_mutes().await?.contains(name))
    }

    pub async fn snapshot(&self) -> Result<MuteSnapshot> {
        Ok(MuteSnapshot {
            temporary: self.active_temporary_mutes().await?,
            permanent: self.permanent_mutes().await?,
        })
    }

    /// Mutes `name` until now + `ttl`, replacing any earlier temporary entry.
    ///
    /// Returns whether the unit was already under an active temporary mute.
    pub async fn set_temporary_mute(&self, name: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let mut entries = self.active_temporary_mutes().await?;
        let already = entries.iter().any(|entry| entry.name == name);
        entries.retain(|entry| entry.name != name);

        let ttl = chrono::Duration::from_std(ttl).context("mute duration out of range")?;
        let expiry = now
            .checked_add_signed(ttl)
            .context("mute expiry out of range")?;
        entries.push(TemporaryMute {
            name: name.to_string(),
            expiry: expiry.timestamp_millis(),
        });
        self.write(TEMPORARY_MUTES_KEY, &entries).await?;
        tracing::info!(unit = %name, ?ttl, "temporary mute set");
        Ok(already)
    }

    /// Returns whether an entry was removed.
    pub async fn clear_temporary_mute(&self, name: &str) -> Result<bool> {
        let mut entries = self.active_temporary_mutes().await?;
        let before = entries.len();
        entries.retain(|entry| entry.name != name);
        if entries.len() == before {
            return Ok(false);
        }
        self.write(TEMPORARY_MUTES_KEY, &entries).await?;
        tracing::info!(unit = %name, "temporary mute cleared");
        Ok(true)
    }

    /// Returns whether the name was newly added.
    pub async fn set_permanent_mute(&self, name: &str) -> Result<bool> {
        let mut names = self.permanent_mutes().await?;
        if !names.insert(name.to_string()) {
            return Ok(false);
        }
        self.write(PERMANENT_MUTES_KEY, &names).await?;
        tracing::info!(unit = %name, "permanent mute set");
        Ok(true)
    }

    /// Returns whether the name was present.
    pub async fn clear_permanent_mute(&self, name: &str) -> Result<bool> {
        let mut names = self.permanent_mutes().await?;
        if !names.remove(name) {
            return Ok(false);
        }
        self.write(PERMANENT_MUTES_KEY, &names).await?;
        tracing::info!(unit = %name, "permanent mute cleared");
        Ok(true)
    }

    /// Charges one remediation attempt against the daily cap.
    ///
    /// A stored record from another day is reset before counting. Denied calls do not write.
    pub async fn consume_quota(&self, name: &str, today: NaiveDate) -> Result<QuotaDecision> {
        let key = quota_key(name);
        let mut record: QuotaRecord = self
            .read(&key)
            .await?
            .unwrap_or_else(|| QuotaRecord::fresh(today));
        if record.date != today {
            record = QuotaRecord::fresh(today);
        }

        if record.count >= self.daily_cap {
            tracing::debug!(unit = %name, count = record.count, "daily quota exhausted");
            return Ok(QuotaDecision {
                allowed: false,
                count_after: record.count,
            });
        }

        record.count += 1;
        self.write(&key, &record).await?;
        Ok(QuotaDecision {
            allowed: true,
            count_after: record.count,
        })
    }

    /// Attempts charged to `name` on `today`.
    pub async fn quota(&self, name: &str, today: NaiveDate) -> Result<u32> {
        Ok(self
            .read::<QuotaRecord>(&quota_key(name))
            .await?
            .map(|record| record.count_on(today))
            .unwrap_or(0))
    }

    /// Drops expired temporary mutes. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<usize> {
        let stored: Vec<TemporaryMute> = self.read(TEMPORARY_MUTES_KEY).await?.unwrap_or_default();
        let before = stored.len();
        let remaining = self.purge(stored).await?;
        Ok(before - remaining.len())
    }

    pub async fn permanent_mutes(&self) -> Result<BTreeSet<String>> {
        Ok(self.read(PERMANENT_MUTES_KEY).await?.unwrap_or_default())
    }

    /// Unexpired temporary mutes; writes back the list when anything expired.
    pub async fn active_temporary_mutes(&self) -> Result<Vec<TemporaryMute>> {
        let stored: Vec<TemporaryMute> = self.read(TEMPORARY_MUTES_KEY).await?.unwrap_or_default();
        self.purge(stored).await
    }

    async fn purge(&self, stored: Vec<TemporaryMute>) -> Result<Vec<TemporaryMute>> {
        let now = self.clock.now();
        let before = stored.len();
        let active: Vec<TemporaryMute> = stored
            .into_iter()
            .filter(|entry| entry.is_active(now))
            .collect();
        if active.len() != before {
            tracing::debug!(purged = before - active.len(), "expired temporary mutes purged");
            self.write(TEMPORARY_MUTES_KEY, &active).await?;
        }
        Ok(active)
    }

    /// Undecodable values are logged and treated as absent.
    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self
            .store
            .get(key)
            .await
            .with_context(|| format!("failed to read policy key {key}"))?
        else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!(%key, error = %err, "discarding undecodable policy value");
                Ok(None)
            }
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("failed to encode policy key {key}"))?;
        self.store
            .put(key, raw)
            .await
            .with_context(|| format!("failed to write policy key {key}"))
    }
}
