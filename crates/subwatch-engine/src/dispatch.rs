//! Channel dispatcher — fans one due reminder out to every enabled channel.
//!
//! Channels are fully isolated: the outcome of one never affects whether
//! another is attempted, and every error ends up in the aggregate report
//! instead of aborting the reminder.

use std::sync::Arc;

use subwatch_core::config::NotificationPreferences;
use subwatch_core::traits::{AdapterFactory, ReminderLedger};
use subwatch_core::types::{ChannelKind, DueReminder, LedgerEntry, RenewalNotice, SendOutcome};

use crate::clock::Clock;

/// What happened on one channel for one reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Sent { provider_message_id: Option<String> },
    Failed { reason: String },
    /// Channel enabled but missing destination data — no ledger entry.
    SkippedUnconfigured,
    /// A `sent` entry already exists for this triple — no ledger entry.
    SkippedAlreadySent,
}

/// Aggregate result for one reminder across all channels. Consumed for
/// logging and metrics, never raised as a single failure.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub subscription_id: String,
    pub threshold_days: u32,
    pub outcomes: Vec<(ChannelKind, ChannelOutcome)>,
    pub errors: Vec<String>,
}

impl DispatchReport {
    pub fn sent_count(&self) -> u64 {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ChannelOutcome::Sent { .. }))
            .count() as u64
    }

    pub fn failed_count(&self) -> u64 {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ChannelOutcome::Failed { .. }))
            .count() as u64
    }
}

pub struct ChannelDispatcher {
    factory: Arc<dyn AdapterFactory>,
    ledger: Arc<dyn ReminderLedger>,
    clock: Arc<dyn Clock>,
}

impl ChannelDispatcher {
    pub fn new(
        factory: Arc<dyn AdapterFactory>,
        ledger: Arc<dyn ReminderLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { factory, ledger, clock }
    }

    /// Deliver one due reminder on every enabled channel, independently.
    pub async fn dispatch(
        &self,
        due: &DueReminder,
        prefs: &NotificationPreferences,
    ) -> DispatchReport {
        let notice = RenewalNotice::from_due(due);
        let mut report = DispatchReport {
            subscription_id: notice.subscription_id.clone(),
            threshold_days: notice.threshold_days,
            ..Default::default()
        };

        for channel in prefs.enabled_channels() {
            let outcome = self.attempt_channel(channel, &notice, prefs, &mut report).await;
            report.outcomes.push((channel, outcome));
        }
        report
    }

    async fn attempt_channel(
        &self,
        channel: ChannelKind,
        notice: &RenewalNotice,
        prefs: &NotificationPreferences,
        report: &mut DispatchReport,
    ) -> ChannelOutcome {
        // Idempotency gate. A ledger read failure skips the channel: sending
        // without the check could double-notify.
        match self
            .ledger
            .sent_exists_on(&notice.subscription_id, notice.threshold_days, channel)
            .await
        {
            Ok(true) => return ChannelOutcome::SkippedAlreadySent,
            Ok(false) => {}
            Err(e) => {
                let msg = format!("{channel}: ledger lookup failed: {e}");
                tracing::error!("{msg}");
                report.errors.push(msg);
                return ChannelOutcome::Failed { reason: format!("ledger lookup failed: {e}") };
            }
        }

        let Some(adapter) = self.factory.adapter_for(channel, prefs) else {
            tracing::warn!(
                "⚠️ Channel {channel} enabled but not configured for user {}; skipping",
                notice.user_id
            );
            return ChannelOutcome::SkippedUnconfigured;
        };

        let now = self.clock.now();
        match adapter.send(notice).await {
            SendOutcome::Sent { provider_message_id } => {
                let entry =
                    LedgerEntry::sent(notice, channel, provider_message_id.clone(), now);
                if let Err(e) = self.ledger.record(entry).await {
                    let msg = format!("{channel}: ledger write failed after send: {e}");
                    tracing::error!("{msg}");
                    report.errors.push(msg);
                }
                ChannelOutcome::Sent { provider_message_id }
            }
            SendOutcome::Failed { reason } => {
                tracing::warn!(
                    "⚠️ {channel} send failed for subscription {}: {reason}",
                    notice.subscription_id
                );
                let entry = LedgerEntry::failed(notice, channel, reason.clone(), now);
                if let Err(e) = self.ledger.record(entry).await {
                    let msg = format!("{channel}: ledger write failed: {e}");
                    tracing::error!("{msg}");
                    report.errors.push(msg);
                }
                report.errors.push(format!("{channel}: {reason}"));
                ChannelOutcome::Failed { reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use subwatch_core::types::DeliveryStatus;

    use crate::clock::ManualClock;
    use crate::ledger::MemoryLedger;
    use crate::testutil::{ScriptedFactory, prefs_with_channels, subscription};

    fn setup(
        factory: ScriptedFactory,
    ) -> (ChannelDispatcher, Arc<MemoryLedger>, chrono::DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let dispatcher = ChannelDispatcher::new(
            Arc::new(factory),
            ledger.clone(),
            Arc::new(ManualClock::at(now)),
        );
        (dispatcher, ledger, now)
    }

    fn due(now: chrono::DateTime<Utc>) -> DueReminder {
        DueReminder {
            subscription: subscription("s1", "u1", now + Duration::days(1), true),
            threshold_days: 1,
        }
    }

    #[tokio::test]
    async fn test_channel_isolation() {
        // Email misconfigured upstream (provider rejects), messaging fine.
        let factory = ScriptedFactory::new()
            .with(ChannelKind::Email, SendOutcome::failed("SMTP 550 relay denied"))
            .with(ChannelKind::Messaging, SendOutcome::sent(Some("m-9".to_string())));
        let (dispatcher, ledger, now) = setup(factory);
        let prefs = prefs_with_channels(&[ChannelKind::Email, ChannelKind::Messaging]);

        let report = dispatcher.dispatch(&due(now), &prefs).await;

        assert_eq!(report.sent_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert!(report.errors.iter().any(|e| e.contains("SMTP 550")));

        // Messaging ledger entry written even though email failed.
        let entries = ledger.entries();
        assert_eq!(entries.len(), 2);
        let messaging = entries.iter().find(|e| e.channel == ChannelKind::Messaging).unwrap();
        assert_eq!(messaging.status, DeliveryStatus::Sent);
        assert_eq!(messaging.provider_message_id.as_deref(), Some("m-9"));
        let email = entries.iter().find(|e| e.channel == ChannelKind::Email).unwrap();
        assert_eq!(email.status, DeliveryStatus::Failed);
        assert_eq!(email.error.as_deref(), Some("SMTP 550 relay denied"));
    }

    #[tokio::test]
    async fn test_unconfigured_channel_skipped_without_ledger_entry() {
        // Messaging enabled in prefs but factory has nothing for it.
        let factory =
            ScriptedFactory::new().with(ChannelKind::Email, SendOutcome::sent(None));
        let (dispatcher, ledger, now) = setup(factory);
        let prefs = prefs_with_channels(&[ChannelKind::Email, ChannelKind::Messaging]);

        let report = dispatcher.dispatch(&due(now), &prefs).await;

        assert!(report
            .outcomes
            .iter()
            .any(|(k, o)| *k == ChannelKind::Messaging
                && *o == ChannelOutcome::SkippedUnconfigured));
        // Only the email attempt reached the ledger.
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.entries()[0].channel, ChannelKind::Email);
    }

    #[tokio::test]
    async fn test_already_sent_channel_skipped() {
        let factory = ScriptedFactory::new()
            .with(ChannelKind::Email, SendOutcome::sent(None))
            .with(ChannelKind::Messaging, SendOutcome::sent(None));
        let (dispatcher, ledger, now) = setup(factory);
        let prefs = prefs_with_channels(&[ChannelKind::Email, ChannelKind::Messaging]);

        let first = dispatcher.dispatch(&due(now), &prefs).await;
        assert_eq!(first.sent_count(), 2);
        assert_eq!(ledger.len(), 2);

        let second = dispatcher.dispatch(&due(now), &prefs).await;
        assert_eq!(second.sent_count(), 0);
        assert!(second
            .outcomes
            .iter()
            .all(|(_, o)| *o == ChannelOutcome::SkippedAlreadySent));
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_channel_retried_sent_channel_not() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let factory = Arc::new(
            ScriptedFactory::new()
                .with(ChannelKind::Email, SendOutcome::failed("timeout"))
                .with(ChannelKind::Messaging, SendOutcome::sent(None)),
        );
        let ledger = Arc::new(MemoryLedger::new());
        let dispatcher = ChannelDispatcher::new(
            factory.clone(),
            ledger.clone(),
            Arc::new(ManualClock::at(now)),
        );
        let prefs = prefs_with_channels(&[ChannelKind::Email, ChannelKind::Messaging]);

        let first = dispatcher.dispatch(&due(now), &prefs).await;
        assert_eq!(first.sent_count(), 1);
        assert_eq!(first.failed_count(), 1);

        // Email recovers; a later dispatch retries only email.
        factory.set(ChannelKind::Email, SendOutcome::sent(None));
        let second = dispatcher.dispatch(&due(now), &prefs).await;
        assert!(second
            .outcomes
            .iter()
            .any(|(k, o)| *k == ChannelKind::Messaging
                && *o == ChannelOutcome::SkippedAlreadySent));
        assert!(second
            .outcomes
            .iter()
            .any(|(k, o)| *k == ChannelKind::Email
                && matches!(o, ChannelOutcome::Sent { .. })));

        // Ledger: one failed + one sent for email, one sent for messaging.
        let email_entries: Vec<_> = ledger
            .entries()
            .into_iter()
            .filter(|e| e.channel == ChannelKind::Email)
            .collect();
        assert_eq!(email_entries.len(), 2);
        assert_eq!(email_entries[0].status, DeliveryStatus::Failed);
        assert_eq!(email_entries[1].status, DeliveryStatus::Sent);
    }
}
