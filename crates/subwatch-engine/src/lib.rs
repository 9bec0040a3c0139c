//! # SubWatch Engine
//!
//! Renewal-reminder scheduling and multi-channel dispatch.
//!
//! ## Architecture
//! ```text
//! ReminderScheduler (tokio interval, single-flight ticks)
//!   └── per user: send-window gate → per subscription:
//!         DueReminderPolicy: daysUntilRenewal == threshold?
//!           └── ChannelDispatcher: per enabled channel, independently
//!                 ├── Email adapter    (SMTP)
//!                 ├── Messaging adapter (Telegram)
//!                 └── Calendar adapter  (CalDAV)
//!                       └── ReminderLedger (append-only, sole
//!                           idempotency truth — SQLite or in-memory)
//! ```
//!
//! One channel's failure never blocks another; one user's bad data never
//! aborts a tick; a reminder that was sent is never sent again.

pub mod clock;
pub mod dispatch;
pub mod engine;
pub mod ledger;
pub mod persistence;
pub mod policy;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{ChannelDispatcher, ChannelOutcome, DispatchReport};
pub use engine::{ReminderScheduler, TickReport};
pub use ledger::MemoryLedger;
pub use persistence::SqliteLedger;
pub use store::FileStore;
