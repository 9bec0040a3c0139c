//! In-memory reminder ledger — used by tests and the manual tick path.
//!
//! Same contract as the SQLite ledger: append-only, at most one `sent`
//! entry per (subscription, threshold, channel) triple.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use subwatch_core::error::{Result, SubwatchError};
use subwatch_core::traits::ReminderLedger;
use subwatch_core::types::{ChannelKind, DeliveryStatus, LedgerEntry, ReminderStats};

#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReminderLedger for MemoryLedger {
    async fn sent_exists(&self, subscription_id: &str, threshold_days: u32) -> Result<bool> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.iter().any(|e| {
            e.status == DeliveryStatus::Sent
                && e.subscription_id == subscription_id
                && e.threshold_days == threshold_days
        }))
    }

    async fn sent_exists_on(
        &self,
        subscription_id: &str,
        threshold_days: u32,
        channel: ChannelKind,
    ) -> Result<bool> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.iter().any(|e| {
            e.status == DeliveryStatus::Sent
                && e.subscription_id == subscription_id
                && e.threshold_days == threshold_days
                && e.channel == channel
        }))
    }

    async fn record(&self, entry: LedgerEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if entry.status == DeliveryStatus::Sent {
            let duplicate = entries.iter().any(|e| {
                e.status == DeliveryStatus::Sent
                    && e.subscription_id == entry.subscription_id
                    && e.threshold_days == entry.threshold_days
                    && e.channel == entry.channel
            });
            if duplicate {
                return Err(SubwatchError::Ledger(format!(
                    "duplicate sent entry for ({}, {}, {})",
                    entry.subscription_id, entry.threshold_days, entry.channel
                )));
            }
        }
        entries.push(entry);
        Ok(())
    }

    async fn stats_for_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<ReminderStats> {
        let entries = self.entries.lock().unwrap();
        let cutoff = now - Duration::days(30);
        let mut stats = ReminderStats::default();
        for entry in entries.iter().filter(|e| e.user_id == user_id) {
            let key = entry.channel.as_str().to_string();
            match entry.status {
                DeliveryStatus::Sent => *stats.sent_by_channel.entry(key).or_insert(0) += 1,
                DeliveryStatus::Failed => {
                    *stats.failed_by_channel.entry(key).or_insert(0) += 1
                }
            }
            if entry.created_at >= cutoff {
                stats.last_30_days += 1;
            }
        }
        Ok(stats)
    }
}
