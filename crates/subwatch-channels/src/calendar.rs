//! Calendar channel — renewal reminders as CalDAV events.
//!
//! Writes an all-day VEVENT on the renewal date into the user's calendar
//! collection via an authenticated `PUT`. Works against Radicale, Nextcloud,
//! Fastmail, and other RFC 4791 servers.

use async_trait::async_trait;

use subwatch_core::config::CalendarSettings;
use subwatch_core::error::{Result, SubwatchError};
use subwatch_core::traits::ChannelAdapter;
use subwatch_core::types::{ChannelKind, ConnectionCheck, RenewalNotice, SendOutcome};

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// CalDAV adapter for one user's calendar collection.
pub struct CalendarAdapter {
    settings: CalendarSettings,
    client: reqwest::Client,
}

impl CalendarAdapter {
    pub fn new(settings: CalendarSettings) -> Self {
        Self { settings, client: reqwest::Client::new() }
    }

    fn event_url(&self, uid: &str) -> String {
        format!("{}/{uid}.ics", self.settings.calendar_url.trim_end_matches('/'))
    }

    async fn try_send(&self, notice: &RenewalNotice) -> Result<String> {
        let uid = uuid::Uuid::new_v4().to_string();
        let ics = build_ics(notice, &uid);

        let resp = self
            .client
            .put(self.event_url(&uid))
            .basic_auth(&self.settings.username, Some(&self.settings.password))
            .header("Content-Type", "text/calendar; charset=utf-8")
            // Never overwrite an existing resource with this name.
            .header("If-None-Match", "*")
            .body(ics)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| SubwatchError::Channel(format!("CalDAV PUT failed: {e}")))?;

        if resp.status().is_success() {
            Ok(uid)
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(SubwatchError::Channel(format!("CalDAV error {status}: {body}")))
        }
    }
}

/// Build the iCalendar payload: a single all-day event on the renewal date.
fn build_ics(notice: &RenewalNotice, uid: &str) -> String {
    let date = notice.next_renewal.format("%Y%m%d");
    let stamp = notice.next_renewal.format("%Y%m%dT%H%M%SZ");
    let summary = escape_ics(&format!(
        "{} renews ({})",
        notice.name, notice.cost_display
    ));
    let mut description = format!(
        "Subscription {} renews {} at {} per {} cycle.",
        notice.name,
        notice.renews_phrase(),
        notice.cost_display,
        notice.billing_cycle.as_str(),
    );
    if let Some(note) = &notice.note {
        description.push(' ');
        description.push_str(note);
    }
    let description = escape_ics(&description);

    // RFC 5545 mandates CRLF line endings.
    [
        "BEGIN:VCALENDAR",
        "VERSION:2.0",
        "PRODID:-//SubWatch//Renewal Reminder//EN",
        "BEGIN:VEVENT",
        &format!("UID:{uid}"),
        &format!("DTSTAMP:{stamp}"),
        &format!("DTSTART;VALUE=DATE:{date}"),
        &format!("SUMMARY:{summary}"),
        &format!("DESCRIPTION:{description}"),
        "TRANSP:TRANSPARENT",
        "END:VEVENT",
        "END:VCALENDAR",
    ]
    .join("\r\n")
        + "\r\n"
}

/// Escape iCalendar TEXT values (RFC 5545 §3.3.11).
fn escape_ics(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

#[async_trait]
impl ChannelAdapter for CalendarAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Calendar
    }

    async fn send(&self, notice: &RenewalNotice) -> SendOutcome {
        match self.try_send(notice).await {
            Ok(uid) => {
                tracing::info!("📅 Calendar event created for '{}'", notice.name);
                SendOutcome::sent(Some(uid))
            }
            Err(e) => SendOutcome::failed(e.to_string()),
        }
    }

    async fn test_connection(&self) -> ConnectionCheck {
        let resp = match self
            .client
            .request(reqwest::Method::OPTIONS, &self.settings.calendar_url)
            .basic_auth(&self.settings.username, Some(&self.settings.password))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ConnectionCheck::failed(format!("CalDAV OPTIONS failed: {e}")),
        };

        if !resp.status().is_success() {
            return ConnectionCheck::failed(format!("CalDAV returned {}", resp.status()));
        }
        if resp.headers().contains_key("dav") {
            ConnectionCheck::ok("CalDAV collection reachable")
        } else {
            ConnectionCheck::failed("Server responded but does not advertise DAV support")
        }
    }
}
