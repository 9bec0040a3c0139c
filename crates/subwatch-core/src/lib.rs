//! # SubWatch Core
//!
//! Shared types, configuration, and trait seams for the reminder engine.
//! Everything the channel adapters and the scheduler agree on lives here.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{
    CalendarSettings, EmailSettings, EngineConfig, MessagingSettings, NotificationPreferences,
};
pub use error::{Result, SubwatchError};
pub use traits::{
    AdapterFactory, ChannelAdapter, PreferenceStore, ReminderLedger, SubscriptionStore,
};
pub use types::{
    BillingCycle, ChannelKind, ConnectionCheck, DeliveryStatus, DueReminder, LedgerEntry,
    ReminderStats, RenewalNotice, SendOutcome, Subscription,
};
