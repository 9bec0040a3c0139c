//! # SubWatch Channels
//! Delivery channel adapters: email (SMTP), messaging (Telegram Bot API),
//! calendar (CalDAV). Each adapter owns one provider's authentication and
//! formatting; scheduling and idempotency live in `subwatch-engine`.

pub mod calendar;
pub mod email;
pub mod telegram;

pub use calendar::CalendarAdapter;
pub use email::EmailAdapter;
pub use telegram::TelegramAdapter;

use subwatch_core::config::NotificationPreferences;
use subwatch_core::traits::{AdapterFactory, ChannelAdapter};
use subwatch_core::types::ChannelKind;

/// Builds real provider adapters from a user's preferences.
///
/// A channel that is disabled, absent, or missing required destination data
/// yields `None` — the dispatcher skips it before invocation rather than
/// attempting and failing.
pub struct ProviderAdapterFactory;

impl AdapterFactory for ProviderAdapterFactory {
    fn adapter_for(
        &self,
        kind: ChannelKind,
        prefs: &NotificationPreferences,
    ) -> Option<Box<dyn ChannelAdapter>> {
        match kind {
            ChannelKind::Email => prefs
                .email
                .as_ref()
                .filter(|c| c.enabled && !c.smtp_host.is_empty() && !c.to_address.is_empty())
                .map(|c| Box::new(EmailAdapter::new(c.clone())) as Box<dyn ChannelAdapter>),
            ChannelKind::Messaging => prefs
                .messaging
                .as_ref()
                .filter(|c| c.enabled && !c.bot_token.is_empty() && !c.chat_id.is_empty())
                .map(|c| Box::new(TelegramAdapter::new(c.clone())) as Box<dyn ChannelAdapter>),
            ChannelKind::Calendar => prefs
                .calendar
                .as_ref()
                .filter(|c| c.enabled && !c.calendar_url.is_empty())
                .map(|c| Box::new(CalendarAdapter::new(c.clone())) as Box<dyn ChannelAdapter>),
        }
    }
}
