//! Trait seams between the engine and its collaborators.
//!
//! The subscription and preference stores belong to the surrounding
//! application; the engine only ever talks to these interfaces.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::NotificationPreferences;
use crate::error::Result;
use crate::types::{
    ChannelKind, ConnectionCheck, LedgerEntry, ReminderStats, RenewalNotice, SendOutcome,
    Subscription,
};

/// One delivery surface. Knows how to talk to a single provider and nothing
/// about scheduling or idempotency.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Deliver one reminder. Expected provider failures come back as
    /// `SendOutcome::Failed`, never as a panic or an `Err`.
    async fn send(&self, notice: &RenewalNotice) -> SendOutcome;

    /// Verify configuration without sending a real reminder.
    async fn test_connection(&self) -> ConnectionCheck;
}

/// Builds a channel adapter from a user's preferences.
///
/// Returns `None` when the channel is enabled but missing required
/// destination data, so the dispatcher can skip it before invocation
/// instead of attempting and failing.
pub trait AdapterFactory: Send + Sync {
    fn adapter_for(
        &self,
        kind: ChannelKind,
        prefs: &NotificationPreferences,
    ) -> Option<Box<dyn ChannelAdapter>>;
}

/// Append-only record of reminder attempts — the engine's sole source of
/// idempotency truth. There is no separate distributed lock.
#[async_trait]
pub trait ReminderLedger: Send + Sync {
    /// True if any `sent` entry exists for the pair, independent of channel.
    async fn sent_exists(&self, subscription_id: &str, threshold_days: u32) -> Result<bool>;

    /// True if a `sent` entry exists for this specific channel.
    async fn sent_exists_on(
        &self,
        subscription_id: &str,
        threshold_days: u32,
        channel: ChannelKind,
    ) -> Result<bool>;

    /// Append one entry. Rejects a second `sent` entry for the same
    /// (subscription, threshold, channel) triple.
    async fn record(&self, entry: LedgerEntry) -> Result<()>;

    /// Aggregate counts for reporting. `now` anchors the 30-day window.
    async fn stats_for_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<ReminderStats>;
}

/// Subscription persistence, external to this engine.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Subscription>>;
}

/// Preference persistence, external to this engine. Credentials inside the
/// returned preferences are already decrypted by the caller.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn list_users_with_preferences(
        &self,
    ) -> Result<Vec<(String, NotificationPreferences)>>;

    async fn get_preferences(&self, user_id: &str) -> Result<Option<NotificationPreferences>>;
}
