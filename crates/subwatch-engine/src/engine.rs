//! Reminder scheduler — the process driver.
//!
//! Two states: Idle (waiting on the timer) and Running (processing one
//! tick). Ticks are single-flight: the timer never starts a tick while a
//! previous one is still in flight, because the idempotency design relies
//! on ledger reads happening after all writes from any running tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use subwatch_core::config::NotificationPreferences;
use subwatch_core::error::Result;
use subwatch_core::traits::{
    AdapterFactory, PreferenceStore, ReminderLedger, SubscriptionStore,
};
use subwatch_core::types::{
    ChannelKind, ConnectionCheck, DueReminder, ReminderStats, Subscription,
};

use crate::clock::Clock;
use crate::dispatch::ChannelDispatcher;
use crate::policy;

/// Summary of one tick, for logging and the manual-tick CLI path.
#[derive(Debug, Default, Clone, Serialize)]
pub struct TickReport {
    pub users_processed: u64,
    pub users_failed: u64,
    /// Users skipped because their local send window had not opened yet.
    pub users_deferred: u64,
    pub subscriptions_failed: u64,
    pub reminders_dispatched: u64,
    pub sends_ok: u64,
    pub sends_failed: u64,
    pub errors: Vec<String>,
}

pub struct ReminderScheduler {
    subscriptions: Arc<dyn SubscriptionStore>,
    preferences: Arc<dyn PreferenceStore>,
    ledger: Arc<dyn ReminderLedger>,
    factory: Arc<dyn AdapterFactory>,
    dispatcher: ChannelDispatcher,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    startup_delay: Duration,
    /// Single-flight tick guard. The timer skips when held; a manual tick
    /// waits for it.
    tick_guard: Mutex<()>,
    shutdown: watch::Sender<bool>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ReminderScheduler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        preferences: Arc<dyn PreferenceStore>,
        ledger: Arc<dyn ReminderLedger>,
        factory: Arc<dyn AdapterFactory>,
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
        startup_delay: Duration,
    ) -> Self {
        let dispatcher =
            ChannelDispatcher::new(factory.clone(), ledger.clone(), clock.clone());
        let (shutdown, _) = watch::channel(false);
        Self {
            subscriptions,
            preferences,
            ledger,
            factory,
            dispatcher,
            clock,
            tick_interval,
            startup_delay,
            tick_guard: Mutex::new(()),
            shutdown,
            worker: std::sync::Mutex::new(None),
        }
    }

    /// Begin the recurring timer: one tick after the startup delay, then
    /// every `tick_interval` until [`stop`](Self::stop).
    pub fn start(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            tracing::info!(
                "⏰ Reminder scheduler started (tick every {}s, first in {}s)",
                engine.tick_interval.as_secs(),
                engine.startup_delay.as_secs()
            );

            tokio::select! {
                _ = tokio::time::sleep(engine.startup_delay) => {}
                _ = shutdown_rx.changed() => return,
            }
            engine.timer_tick().await;

            let mut interval = tokio::time::interval(engine.tick_interval);
            interval.tick().await; // first tick of an interval completes immediately
            loop {
                tokio::select! {
                    _ = interval.tick() => engine.timer_tick().await,
                    _ = shutdown_rx.changed() => {
                        tracing::info!("⏰ Reminder scheduler stopping");
                        return;
                    }
                }
            }
        });
        *self.worker.lock().unwrap() = Some(handle);
    }

    /// Halt the timer, letting any in-flight tick finish first.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Out-of-band tick (the manual "test reminders" action). Waits for any
    /// running tick instead of skipping.
    pub async fn run_tick_now(&self) -> TickReport {
        let _guard = self.tick_guard.lock().await;
        self.run_tick().await
    }

    /// Verify a channel's configuration without sending a reminder or
    /// writing a ledger entry.
    pub async fn test_channel(
        &self,
        kind: ChannelKind,
        prefs: &NotificationPreferences,
    ) -> ConnectionCheck {
        match self.factory.adapter_for(kind, prefs) {
            Some(adapter) => adapter.test_connection().await,
            None => ConnectionCheck::failed(format!("channel {kind} is not configured")),
        }
    }

    /// Read-only aggregate over the ledger.
    pub async fn reminder_stats(&self, user_id: &str) -> Result<ReminderStats> {
        self.ledger.stats_for_user(user_id, self.clock.now()).await
    }

    /// Timer-driven tick: skipped entirely if a previous tick still holds
    /// the guard (strictly periodic, no backlog).
    async fn timer_tick(&self) {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            tracing::warn!("⚠️ Previous tick still running; skipping this interval");
            return;
        };
        let report = self.run_tick().await;
        tracing::info!(
            "🔔 Tick complete: {} user(s), {} reminder(s) dispatched, {} sent, {} failed",
            report.users_processed,
            report.reminders_dispatched,
            report.sends_ok,
            report.sends_failed
        );
    }

    /// One full evaluation pass. Never panics outward: every per-user and
    /// per-subscription failure is caught, logged, and skipped.
    async fn run_tick(&self) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport::default();

        let users = match self.preferences.list_users_with_preferences().await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!("Failed to list users with preferences: {e}");
                report.errors.push(format!("preference store: {e}"));
                return report;
            }
        };

        for (user_id, prefs) in users {
            match self.process_user(&user_id, &prefs, now, &mut report).await {
                Ok(true) => report.users_processed += 1,
                Ok(false) => report.users_deferred += 1,
                Err(e) => {
                    report.users_failed += 1;
                    report.errors.push(format!("user {user_id}: {e}"));
                    tracing::error!("⚠️ Skipping user {user_id}: {e}");
                }
            }
        }
        report
    }

    /// Returns Ok(false) when the user's send window has not opened yet.
    async fn process_user(
        &self,
        user_id: &str,
        prefs: &NotificationPreferences,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<bool> {
        prefs.validate()?;
        if !send_window_open(prefs, now)? {
            tracing::debug!("Send window not yet open for user {user_id}; deferring");
            return Ok(false);
        }

        let subscriptions = self.subscriptions.list_active_for_user(user_id).await?;
        for subscription in subscriptions {
            if let Err(e) = self.process_subscription(&subscription, prefs, now, report).await
            {
                // One bad record never halts the tick.
                report.subscriptions_failed += 1;
                report.errors.push(format!("subscription {}: {e}", subscription.id));
                tracing::warn!("⚠️ Skipping subscription {}: {e}", subscription.id);
            }
        }
        Ok(true)
    }

    async fn process_subscription(
        &self,
        subscription: &Subscription,
        prefs: &NotificationPreferences,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<()> {
        let due = policy::due_thresholds(subscription, prefs, now, self.ledger.as_ref()).await?;
        for threshold_days in due {
            tracing::info!(
                "🔔 Reminder due: '{}' renews in {threshold_days} day(s)",
                subscription.name
            );
            let reminder =
                DueReminder { subscription: subscription.clone(), threshold_days };
            let dispatched = self.dispatcher.dispatch(&reminder, prefs).await;
            report.reminders_dispatched += 1;
            report.sends_ok += dispatched.sent_count();
            report.sends_failed += dispatched.failed_count();
            report.errors.extend(dispatched.errors);
        }
        Ok(())
    }
}

/// True once `now`, in the user's timezone, has reached their preferred
/// local send time for the day.
fn send_window_open(prefs: &NotificationPreferences, now: DateTime<Utc>) -> Result<bool> {
    let tz = prefs.parsed_timezone()?;
    let send_time = prefs.parsed_send_time()?;
    Ok(now.with_timezone(&tz).time() >= send_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use subwatch_core::types::{DeliveryStatus, SendOutcome};

    use crate::clock::ManualClock;
    use crate::ledger::MemoryLedger;
    use crate::testutil::{ScriptedFactory, StaticStore, prefs_with_channels, subscription};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    struct Harness {
        scheduler: Arc<ReminderScheduler>,
        ledger: Arc<MemoryLedger>,
        factory: Arc<ScriptedFactory>,
        clock: Arc<ManualClock>,
    }

    fn harness(store: StaticStore, factory: ScriptedFactory) -> Harness {
        let store = Arc::new(store);
        let ledger = Arc::new(MemoryLedger::new());
        let factory = Arc::new(factory);
        let clock = Arc::new(ManualClock::at(noon()));
        let scheduler = Arc::new(ReminderScheduler::new(
            store.clone(),
            store,
            ledger.clone(),
            factory.clone(),
            clock.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(0),
        ));
        Harness { scheduler, ledger, factory, clock }
    }

    #[tokio::test]
    async fn test_concrete_scenario_one_day_email_and_calendar() {
        // Renews in 1 day, thresholds [7,3,1], email+calendar enabled,
        // empty ledger.
        let mut store = StaticStore::new();
        store.subscriptions =
            vec![subscription("s1", "u1", noon() + ChronoDuration::days(1), true)];
        store.preferences = vec![(
            "u1".into(),
            prefs_with_channels(&[ChannelKind::Email, ChannelKind::Calendar]),
        )];
        let factory = ScriptedFactory::new()
            .with(ChannelKind::Email, SendOutcome::sent(None))
            .with(ChannelKind::Calendar, SendOutcome::sent(Some("ev-1".to_string())));
        let h = harness(store, factory);

        let report = h.scheduler.run_tick_now().await;
        assert_eq!(report.users_processed, 1);
        assert_eq!(report.reminders_dispatched, 1);
        assert_eq!(report.sends_ok, 2);
        assert_eq!(report.sends_failed, 0);

        let entries = h.ledger.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.threshold_days == 1));
        assert!(entries.iter().all(|e| e.status == DeliveryStatus::Sent));

        // Second tick the same day: both entries found, nothing dispatched.
        let report = h.scheduler.run_tick_now().await;
        assert_eq!(report.reminders_dispatched, 0);
        assert_eq!(h.ledger.len(), 2);
    }

    #[tokio::test]
    async fn test_idempotence_across_ticks() {
        let mut store = StaticStore::new();
        store.subscriptions =
            vec![subscription("s1", "u1", noon() + ChronoDuration::days(3), true)];
        store.preferences =
            vec![("u1".into(), prefs_with_channels(&[ChannelKind::Messaging]))];
        let factory = ScriptedFactory::new()
            .with(ChannelKind::Messaging, SendOutcome::sent(None));
        let h = harness(store, factory);

        h.scheduler.run_tick_now().await;
        h.scheduler.run_tick_now().await;
        h.scheduler.run_tick_now().await;

        // Exactly one sent entry, never two.
        assert_eq!(h.ledger.len(), 1);
        assert_eq!(h.ledger.entries()[0].status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn test_exact_day_firing_only_matching_threshold() {
        let mut store = StaticStore::new();
        store.subscriptions =
            vec![subscription("s1", "u1", noon() + ChronoDuration::days(3), true)];
        store.preferences =
            vec![("u1".into(), prefs_with_channels(&[ChannelKind::Email]))];
        let factory =
            ScriptedFactory::new().with(ChannelKind::Email, SendOutcome::sent(None));
        let h = harness(store, factory);

        let report = h.scheduler.run_tick_now().await;
        assert_eq!(report.reminders_dispatched, 1);
        let entries = h.ledger.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].threshold_days, 3);
    }

    #[tokio::test]
    async fn test_inactive_subscription_excluded() {
        let mut store = StaticStore::new();
        store.subscriptions =
            vec![subscription("s1", "u1", noon() + ChronoDuration::days(3), false)];
        store.preferences =
            vec![("u1".into(), prefs_with_channels(&[ChannelKind::Email]))];
        let factory =
            ScriptedFactory::new().with(ChannelKind::Email, SendOutcome::sent(None));
        let h = harness(store, factory);

        let report = h.scheduler.run_tick_now().await;
        assert_eq!(report.reminders_dispatched, 0);
        assert!(h.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_tick_resilience_bad_user_does_not_block_others() {
        let mut store = StaticStore::new();
        store.subscriptions =
            vec![subscription("s2", "user-b", noon() + ChronoDuration::days(1), true)];
        store.preferences = vec![
            ("user-a".into(), prefs_with_channels(&[ChannelKind::Email])),
            ("user-b".into(), prefs_with_channels(&[ChannelKind::Email])),
        ];
        store.failing_users.insert("user-a".into());
        let factory =
            ScriptedFactory::new().with(ChannelKind::Email, SendOutcome::sent(None));
        let h = harness(store, factory);

        let report = h.scheduler.run_tick_now().await;
        assert_eq!(report.users_failed, 1);
        assert_eq!(report.users_processed, 1);
        // User B's reminder was still written.
        assert_eq!(h.ledger.len(), 1);
        assert_eq!(h.ledger.entries()[0].user_id, "user-b");
    }

    #[tokio::test]
    async fn test_failed_channel_retried_on_next_tick() {
        let mut store = StaticStore::new();
        store.subscriptions =
            vec![subscription("s1", "u1", noon() + ChronoDuration::days(1), true)];
        store.preferences = vec![(
            "u1".into(),
            prefs_with_channels(&[ChannelKind::Email, ChannelKind::Messaging]),
        )];
        let factory = ScriptedFactory::new()
            .with(ChannelKind::Email, SendOutcome::failed("SMTP down"))
            .with(ChannelKind::Messaging, SendOutcome::sent(None));
        let h = harness(store, factory);

        let first = h.scheduler.run_tick_now().await;
        assert_eq!(first.sends_ok, 1);
        assert_eq!(first.sends_failed, 1);

        // Provider recovers; the same day, only email is retried.
        h.factory.set(ChannelKind::Email, SendOutcome::sent(None));
        let second = h.scheduler.run_tick_now().await;
        assert_eq!(second.reminders_dispatched, 1);
        assert_eq!(second.sends_ok, 1);

        let sent: Vec<_> = h
            .ledger
            .entries()
            .into_iter()
            .filter(|e| e.status == DeliveryStatus::Sent)
            .collect();
        assert_eq!(sent.len(), 2);

        // Third tick: everything covered, nothing due.
        let third = h.scheduler.run_tick_now().await;
        assert_eq!(third.reminders_dispatched, 0);
    }

    #[tokio::test]
    async fn test_send_window_defers_until_local_time() {
        let mut store = StaticStore::new();
        store.subscriptions =
            vec![subscription("s1", "u1", noon() + ChronoDuration::days(1), true)];
        let mut prefs = prefs_with_channels(&[ChannelKind::Email]);
        // 09:00 in New York is 13:00 UTC in June (EDT).
        prefs.send_time = "09:00".into();
        prefs.timezone = "America/New_York".into();
        store.preferences = vec![("u1".into(), prefs)];
        let factory =
            ScriptedFactory::new().with(ChannelKind::Email, SendOutcome::sent(None));
        let h = harness(store, factory);

        // 12:00 UTC = 08:00 local — window closed.
        let report = h.scheduler.run_tick_now().await;
        assert_eq!(report.users_deferred, 1);
        assert!(h.ledger.is_empty());

        // 13:30 UTC = 09:30 local — window open, reminder goes out.
        h.clock.set(noon() + ChronoDuration::minutes(90));
        let report = h.scheduler.run_tick_now().await;
        assert_eq!(report.users_processed, 1);
        assert_eq!(h.ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_start_and_stop_lifecycle() {
        let mut store = StaticStore::new();
        store.preferences =
            vec![("u1".into(), prefs_with_channels(&[ChannelKind::Email]))];
        let factory =
            ScriptedFactory::new().with(ChannelKind::Email, SendOutcome::sent(None));
        let h = harness(store, factory);

        h.scheduler.start();
        // Let the startup tick run.
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.scheduler.stop().await;
        // Stopping again is a no-op.
        h.scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_test_channel_unconfigured() {
        let store = StaticStore::new();
        let h = harness(store, ScriptedFactory::new());
        let prefs = prefs_with_channels(&[]);
        let check = h.scheduler.test_channel(ChannelKind::Email, &prefs).await;
        assert!(!check.success);
        assert!(check.message.contains("not configured"));
    }

    #[tokio::test]
    async fn test_reminder_stats_roundtrip() {
        let mut store = StaticStore::new();
        store.subscriptions =
            vec![subscription("s1", "u1", noon() + ChronoDuration::days(1), true)];
        store.preferences =
            vec![("u1".into(), prefs_with_channels(&[ChannelKind::Email]))];
        let factory =
            ScriptedFactory::new().with(ChannelKind::Email, SendOutcome::sent(None));
        let h = harness(store, factory);

        h.scheduler.run_tick_now().await;
        let stats = h.scheduler.reminder_stats("u1").await.unwrap();
        assert_eq!(stats.sent_by_channel.get("email"), Some(&1));
        assert_eq!(stats.last_30_days, 1);
    }
}
