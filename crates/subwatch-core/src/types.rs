//! Data model for the reminder engine.
//!
//! `Subscription` and the preference types are owned by the surrounding
//! application and read-only here. The ledger entry is the only record this
//! engine ever creates, and it is append-only.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How often a subscription bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Weekly,
    Monthly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Weekly => "weekly",
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }
}

/// A recurring subscription. Mutated by the CRUD layer, read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    /// Display name, e.g. "Netflix".
    pub name: String,
    /// Cost per billing cycle, in minor units.
    pub cost_cents: i64,
    /// ISO 4217 code, e.g. "USD".
    pub currency: String,
    pub billing_cycle: BillingCycle,
    /// Next renewal instant.
    pub next_renewal: DateTime<Utc>,
    /// Only active subscriptions are eligible for reminders.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Trial bookkeeping happens elsewhere; carried for the data model only.
    #[serde(default)]
    pub is_trial: bool,
}

fn default_true() -> bool {
    true
}

impl Subscription {
    /// Cost formatted for humans: "9.99 USD".
    pub fn cost_display(&self) -> String {
        format!(
            "{}.{:02} {}",
            self.cost_cents / 100,
            (self.cost_cents % 100).abs(),
            self.currency
        )
    }
}

/// One delivery surface with its own adapter and per-user configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Messaging,
    Calendar,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] =
        [ChannelKind::Email, ChannelKind::Messaging, ChannelKind::Calendar];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Messaging => "messaging",
            ChannelKind::Calendar => "calendar",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(ChannelKind::Email),
            "messaging" => Ok(ChannelKind::Messaging),
            "calendar" => Ok(ChannelKind::Calendar),
            other => Err(format!("unknown channel '{other}'")),
        }
    }
}

/// A (subscription, threshold) pair the policy decided needs notification
/// on the current tick. Ephemeral — consumed by the dispatcher, never stored.
#[derive(Debug, Clone)]
pub struct DueReminder {
    pub subscription: Subscription,
    pub threshold_days: u32,
}

/// What a channel adapter receives: the subscription summary plus the
/// threshold that fired. `note` carries opaque extra content (e.g. generated
/// insight text) supplied by the caller; adapters append it verbatim.
#[derive(Debug, Clone)]
pub struct RenewalNotice {
    pub subscription_id: String,
    pub user_id: String,
    pub name: String,
    pub cost_display: String,
    pub billing_cycle: BillingCycle,
    pub next_renewal: DateTime<Utc>,
    pub threshold_days: u32,
    pub note: Option<String>,
}

impl RenewalNotice {
    pub fn from_due(due: &DueReminder) -> Self {
        let sub = &due.subscription;
        Self {
            subscription_id: sub.id.clone(),
            user_id: sub.user_id.clone(),
            name: sub.name.clone(),
            cost_display: sub.cost_display(),
            billing_cycle: sub.billing_cycle,
            next_renewal: sub.next_renewal,
            threshold_days: due.threshold_days,
            note: None,
        }
    }

    /// "in 3 days" / "tomorrow" / "today" — shared phrasing for adapters.
    pub fn renews_phrase(&self) -> String {
        match self.threshold_days {
            0 => "today".into(),
            1 => "tomorrow".into(),
            n => format!("in {n} days"),
        }
    }
}

/// Result of one channel send. Expected provider failures are values here,
/// not errors — the dispatcher never needs exception handling to implement
/// failure isolation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { provider_message_id: Option<String> },
    Failed { reason: String },
}

impl SendOutcome {
    pub fn sent(provider_message_id: impl Into<Option<String>>) -> Self {
        SendOutcome::Sent { provider_message_id: provider_message_id.into() }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        SendOutcome::Failed { reason: reason.into() }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }
}

/// Result of a configuration check. Never sends a real reminder and never
/// touches the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionCheck {
    pub success: bool,
    pub message: String,
}

impl ConnectionCheck {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// Status of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(DeliveryStatus::Sent),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

/// One reminder attempt, written by the dispatcher and immutable afterwards.
/// A retry is a new entry, never an update.
///
/// Invariant: at most one `sent` entry may ever exist per
/// (subscription_id, threshold_days, channel) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub subscription_id: String,
    pub threshold_days: u32,
    pub channel: ChannelKind,
    pub status: DeliveryStatus,
    pub error: Option<String>,
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn sent(
        notice: &RenewalNotice,
        channel: ChannelKind,
        provider_message_id: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: notice.user_id.clone(),
            subscription_id: notice.subscription_id.clone(),
            threshold_days: notice.threshold_days,
            channel,
            status: DeliveryStatus::Sent,
            error: None,
            provider_message_id,
            created_at: at,
        }
    }

    pub fn failed(
        notice: &RenewalNotice,
        channel: ChannelKind,
        reason: String,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: notice.user_id.clone(),
            subscription_id: notice.subscription_id.clone(),
            threshold_days: notice.threshold_days,
            channel,
            status: DeliveryStatus::Failed,
            error: Some(reason),
            provider_message_id: None,
            created_at: at,
        }
    }
}

/// Read-only aggregate over the ledger, consumed by reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReminderStats {
    /// Count of `sent` entries per channel, all time.
    pub sent_by_channel: BTreeMap<String, u64>,
    /// Count of `failed` entries per channel, all time.
    pub failed_by_channel: BTreeMap<String, u64>,
    /// Total attempts in the last 30 days.
    pub last_30_days: u64,
}
