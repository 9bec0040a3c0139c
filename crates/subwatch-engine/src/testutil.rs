//! Shared test fixtures: canned subscriptions/preferences, scripted channel
//! adapters, and static store doubles.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use subwatch_core::config::{
    CalendarSettings, EmailSettings, MessagingSettings, NotificationPreferences,
};
use subwatch_core::error::{Result, SubwatchError};
use subwatch_core::traits::{
    AdapterFactory, ChannelAdapter, PreferenceStore, SubscriptionStore,
};
use subwatch_core::types::{
    BillingCycle, ChannelKind, ConnectionCheck, RenewalNotice, SendOutcome, Subscription,
};

pub fn subscription(
    id: &str,
    user_id: &str,
    next_renewal: DateTime<Utc>,
    active: bool,
) -> Subscription {
    Subscription {
        id: id.into(),
        user_id: user_id.into(),
        name: format!("service-{id}"),
        cost_cents: 999,
        currency: "USD".into(),
        billing_cycle: BillingCycle::Monthly,
        next_renewal,
        active,
        is_trial: false,
    }
}

/// Preferences with the given channels fully configured, thresholds [7,3,1],
/// UTC timezone, and a send window that is always open.
pub fn prefs_with_channels(channels: &[ChannelKind]) -> NotificationPreferences {
    let mut prefs = NotificationPreferences {
        send_time: "00:00".into(),
        ..Default::default()
    };
    for channel in channels {
        match channel {
            ChannelKind::Email => {
                prefs.email = Some(EmailSettings {
                    enabled: true,
                    smtp_host: "smtp.example.com".into(),
                    smtp_port: 587,
                    username: "bot@example.com".into(),
                    password: "secret".into(),
                    from_address: String::new(),
                    to_address: "user@example.com".into(),
                });
            }
            ChannelKind::Messaging => {
                prefs.messaging = Some(MessagingSettings {
                    enabled: true,
                    bot_token: "123:abc".into(),
                    chat_id: "42".into(),
                });
            }
            ChannelKind::Calendar => {
                prefs.calendar = Some(CalendarSettings {
                    enabled: true,
                    calendar_url: "https://dav.example.com/cal/u1".into(),
                    username: "u".into(),
                    password: "p".into(),
                });
            }
        }
    }
    prefs
}

/// Adapter that returns a fixed outcome without touching any provider.
pub struct ScriptedAdapter {
    kind: ChannelKind,
    outcome: SendOutcome,
}

#[async_trait]
impl ChannelAdapter for ScriptedAdapter {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, _notice: &RenewalNotice) -> SendOutcome {
        self.outcome.clone()
    }

    async fn test_connection(&self) -> ConnectionCheck {
        ConnectionCheck::ok("scripted")
    }
}

/// Factory handing out scripted adapters. A channel with no scripted
/// outcome counts as unconfigured. Outcomes can be changed between ticks.
#[derive(Default)]
pub struct ScriptedFactory {
    outcomes: Mutex<HashMap<ChannelKind, SendOutcome>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, kind: ChannelKind, outcome: SendOutcome) -> Self {
        self.set(kind, outcome);
        self
    }

    pub fn set(&self, kind: ChannelKind, outcome: SendOutcome) {
        self.outcomes.lock().unwrap().insert(kind, outcome);
    }
}

impl AdapterFactory for ScriptedFactory {
    fn adapter_for(
        &self,
        kind: ChannelKind,
        _prefs: &NotificationPreferences,
    ) -> Option<Box<dyn ChannelAdapter>> {
        let outcome = self.outcomes.lock().unwrap().get(&kind).cloned()?;
        Some(Box::new(ScriptedAdapter { kind, outcome }))
    }
}

/// In-memory subscription + preference store with per-user failure
/// injection, for tick-resilience tests.
#[derive(Default)]
pub struct StaticStore {
    pub subscriptions: Vec<Subscription>,
    pub preferences: Vec<(String, NotificationPreferences)>,
    pub failing_users: HashSet<String>,
}

impl StaticStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for StaticStore {
    async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Subscription>> {
        if self.failing_users.contains(user_id) {
            return Err(SubwatchError::Store(format!(
                "corrupt subscription row for user {user_id}"
            )));
        }
        Ok(self
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id && s.active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PreferenceStore for StaticStore {
    async fn list_users_with_preferences(
        &self,
    ) -> Result<Vec<(String, NotificationPreferences)>> {
        Ok(self.preferences.clone())
    }

    async fn get_preferences(&self, user_id: &str) -> Result<Option<NotificationPreferences>> {
        Ok(self
            .preferences
            .iter()
            .find(|(id, _)| id == user_id)
            .map(|(_, prefs)| prefs.clone()))
    }
}
