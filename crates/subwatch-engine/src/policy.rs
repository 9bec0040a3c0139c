//! Due-reminder policy — the pure decision core.
//!
//! A threshold fires on exactly one calendar day: `days_until_renewal == t`,
//! not `<= t`. An hourly tick therefore never re-evaluates a past day as
//! due once ledger entries exist, and a day is never skipped as long as the
//! scheduler runs at least once during it.

use chrono::{DateTime, Utc};

use subwatch_core::config::NotificationPreferences;
use subwatch_core::error::Result;
use subwatch_core::traits::ReminderLedger;
use subwatch_core::types::Subscription;

const DAY_SECS: i64 = 86_400;

/// ceil((renewal - now) / 1 day). Zero means "renews today"; negative means
/// the renewal is more than a whole day in the past.
pub fn days_until_renewal(now: DateTime<Utc>, renewal: DateTime<Utc>) -> i64 {
    let secs = (renewal - now).num_seconds();
    secs.div_euclid(DAY_SECS) + i64::from(secs.rem_euclid(DAY_SECS) > 0)
}

/// Thresholds due for this subscription right now.
///
/// A threshold is due iff the day count matches exactly AND at least one of
/// the user's enabled channels has no `sent` ledger entry for the pair —
/// so a later tick retries only channels that have not succeeded yet, and
/// once every enabled channel has a `sent` entry the threshold never fires
/// again. Inactive subscriptions never produce due reminders.
pub async fn due_thresholds(
    subscription: &Subscription,
    prefs: &NotificationPreferences,
    now: DateTime<Utc>,
    ledger: &dyn ReminderLedger,
) -> Result<Vec<u32>> {
    if !subscription.active {
        return Ok(Vec::new());
    }
    let enabled = prefs.enabled_channels();
    if enabled.is_empty() {
        return Ok(Vec::new());
    }

    let days = days_until_renewal(now, subscription.next_renewal);
    let mut due = Vec::new();
    for &threshold in &prefs.thresholds {
        if i64::from(threshold) != days || due.contains(&threshold) {
            continue;
        }
        for &channel in &enabled {
            if !ledger.sent_exists_on(&subscription.id, threshold, channel).await? {
                due.push(threshold);
                break;
            }
        }
    }
    Ok(due)
}
