//! SQLite-backed reminder ledger.
//!
//! Append-only: rows are inserted and never updated. The partial unique
//! index makes the "at most one sent entry per (subscription, threshold,
//! channel)" invariant hold even under concurrent writers.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

use subwatch_core::error::{Result, SubwatchError};
use subwatch_core::traits::ReminderLedger;
use subwatch_core::types::{ChannelKind, DeliveryStatus, LedgerEntry, ReminderStats};

pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open or create the ledger database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| SubwatchError::Ledger(format!("DB open: {e}")))?;
        let ledger = Self { conn: Mutex::new(conn) };
        ledger.migrate()?;
        Ok(ledger)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SubwatchError::Ledger(format!("DB open: {e}")))?;
        let ledger = Self { conn: Mutex::new(conn) };
        ledger.migrate()?;
        Ok(ledger)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS reminder_ledger (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                subscription_id TEXT NOT NULL,
                threshold_days INTEGER NOT NULL,
                channel TEXT NOT NULL,
                status TEXT NOT NULL,           -- 'sent' | 'failed'
                error TEXT,
                provider_message_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_ledger_pair
                ON reminder_ledger (subscription_id, threshold_days);

            CREATE INDEX IF NOT EXISTS idx_ledger_user
                ON reminder_ledger (user_id, created_at);

            -- The idempotency invariant, enforced at the storage layer.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_sent_once
                ON reminder_ledger (subscription_id, threshold_days, channel)
                WHERE status = 'sent';
         ",
            )
            .map_err(|e| SubwatchError::Ledger(format!("Migration: {e}")))?;
        Ok(())
    }

    fn count_sent(
        &self,
        subscription_id: &str,
        threshold_days: u32,
        channel: Option<ChannelKind>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = match channel {
            Some(ch) => conn.query_row(
                "SELECT COUNT(*) FROM reminder_ledger
                 WHERE subscription_id = ?1 AND threshold_days = ?2
                   AND channel = ?3 AND status = 'sent'",
                rusqlite::params![subscription_id, threshold_days, ch.as_str()],
                |row| row.get::<_, i64>(0),
            ),
            None => conn.query_row(
                "SELECT COUNT(*) FROM reminder_ledger
                 WHERE subscription_id = ?1 AND threshold_days = ?2 AND status = 'sent'",
                rusqlite::params![subscription_id, threshold_days],
                |row| row.get::<_, i64>(0),
            ),
        };
        count.map_err(|e| SubwatchError::Ledger(format!("Exists query: {e}")))
    }

    /// All entries for one subscription, oldest first. Used by tests and
    /// audit tooling.
    pub fn entries_for_subscription(&self, subscription_id: &str) -> Result<Vec<LedgerEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, subscription_id, threshold_days, channel, status,
                        error, provider_message_id, created_at
                 FROM reminder_ledger WHERE subscription_id = ?1 ORDER BY created_at",
            )
            .map_err(|e| SubwatchError::Ledger(format!("Prepare: {e}")))?;

        let rows = stmt
            .query_map([subscription_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })
            .map_err(|e| SubwatchError::Ledger(format!("Query: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, user_id, subscription_id, threshold_days, channel, status, error, provider_message_id, created_at) =
                row.map_err(|e| SubwatchError::Ledger(format!("Row: {e}")))?;
            entries.push(LedgerEntry {
                id,
                user_id,
                subscription_id,
                threshold_days,
                channel: channel
                    .parse()
                    .map_err(|e| SubwatchError::Ledger(format!("Bad channel: {e}")))?,
                status: DeliveryStatus::parse(&status)
                    .ok_or_else(|| SubwatchError::Ledger(format!("Bad status '{status}'")))?,
                error,
                provider_message_id,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| SubwatchError::Ledger(format!("Bad timestamp: {e}")))?
                    .with_timezone(&Utc),
            });
        }
        Ok(entries)
    }
}

#[async_trait]
impl ReminderLedger for SqliteLedger {
    async fn sent_exists(&self, subscription_id: &str, threshold_days: u32) -> Result<bool> {
        Ok(self.count_sent(subscription_id, threshold_days, None)? > 0)
    }

    async fn sent_exists_on(
        &self,
        subscription_id: &str,
        threshold_days: u32,
        channel: ChannelKind,
    ) -> Result<bool> {
        Ok(self.count_sent(subscription_id, threshold_days, Some(channel))? > 0)
    }

    async fn record(&self, entry: LedgerEntry) -> Result<()> {
        let result = self.conn.lock().unwrap().execute(
            "INSERT INTO reminder_ledger
             (id, user_id, subscription_id, threshold_days, channel, status,
              error, provider_message_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                entry.id,
                entry.user_id,
                entry.subscription_id,
                entry.threshold_days,
                entry.channel.as_str(),
                entry.status.as_str(),
                entry.error,
                entry.provider_message_id,
                entry.created_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(SubwatchError::Ledger(format!(
                    "duplicate sent entry for ({}, {}, {})",
                    entry.subscription_id, entry.threshold_days, entry.channel
                )))
            }
            Err(e) => Err(SubwatchError::Ledger(format!("Insert: {e}"))),
        }
    }

    async fn stats_for_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<ReminderStats> {
        let conn = self.conn.lock().unwrap();
        let mut stats = ReminderStats::default();

        let mut stmt = conn
            .prepare(
                "SELECT channel, status, COUNT(*) FROM reminder_ledger
                 WHERE user_id = ?1 GROUP BY channel, status",
            )
            .map_err(|e| SubwatchError::Ledger(format!("Prepare: {e}")))?;
        let rows = stmt
            .query_map([user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .map_err(|e| SubwatchError::Ledger(format!("Stats query: {e}")))?;
        for row in rows {
            let (channel, status, count) =
                row.map_err(|e| SubwatchError::Ledger(format!("Row: {e}")))?;
            let count = count as u64;
            match DeliveryStatus::parse(&status) {
                Some(DeliveryStatus::Sent) => {
                    *stats.sent_by_channel.entry(channel).or_insert(0) += count;
                }
                Some(DeliveryStatus::Failed) => {
                    *stats.failed_by_channel.entry(channel).or_insert(0) += count;
                }
                None => {}
            }
        }

        let cutoff = (now - Duration::days(30)).to_rfc3339();
        stats.last_30_days = conn
            .query_row(
                "SELECT COUNT(*) FROM reminder_ledger
                 WHERE user_id = ?1 AND created_at >= ?2",
                rusqlite::params![user_id, cutoff],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| SubwatchError::Ledger(format!("Window query: {e}")))? as u64;

        Ok(stats)
    }
}
