//! Email channel — renewal reminders via SMTP (async lettre).
//!
//! Submission only; this engine never reads mail. Supports Gmail, Outlook,
//! and custom servers over STARTTLS.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor, message::Mailbox,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};

use subwatch_core::config::EmailSettings;
use subwatch_core::error::{Result, SubwatchError};
use subwatch_core::traits::ChannelAdapter;
use subwatch_core::types::{ChannelKind, ConnectionCheck, RenewalNotice, SendOutcome};

/// SMTP adapter for one user's mailbox settings.
pub struct EmailAdapter {
    settings: EmailSettings,
}

impl EmailAdapter {
    pub fn new(settings: EmailSettings) -> Self {
        Self { settings }
    }

    fn mailer(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let creds = Credentials::new(
            self.settings.username.clone(),
            self.settings.password.clone(),
        );
        let mailer =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.settings.smtp_host)
                .map_err(|e| SubwatchError::Channel(format!("SMTP relay: {e}")))?
                .port(self.settings.smtp_port)
                .credentials(creds)
                .build();
        Ok(mailer)
    }

    fn from_address(&self) -> &str {
        if self.settings.from_address.is_empty() {
            &self.settings.username
        } else {
            &self.settings.from_address
        }
    }

    async fn try_send(&self, notice: &RenewalNotice) -> Result<()> {
        let from: Mailbox = format!("SubWatch <{}>", self.from_address())
            .parse()
            .map_err(|e| SubwatchError::Channel(format!("Invalid from: {e}")))?;
        let to: Mailbox = self
            .settings
            .to_address
            .parse()
            .map_err(|e| SubwatchError::Channel(format!("Invalid to: {e}")))?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject_line(notice))
            .header(ContentType::TEXT_PLAIN)
            .body(body_text(notice))
            .map_err(|e| SubwatchError::Channel(format!("Build email: {e}")))?;

        self.mailer()?
            .send(email)
            .await
            .map_err(|e| SubwatchError::Channel(format!("SMTP send: {e}")))?;
        Ok(())
    }
}

fn subject_line(notice: &RenewalNotice) -> String {
    format!("{} renews {}", notice.name, notice.renews_phrase())
}

fn body_text(notice: &RenewalNotice) -> String {
    let mut body = format!(
        "Your {} subscription renews {} ({}), on {}.\n\nAmount: {} per {} cycle.\n",
        notice.name,
        notice.renews_phrase(),
        plural_days(notice.threshold_days),
        notice.next_renewal.format("%Y-%m-%d"),
        notice.cost_display,
        notice.billing_cycle.as_str(),
    );
    if let Some(note) = &notice.note {
        body.push('\n');
        body.push_str(note);
        body.push('\n');
    }
    body
}

fn plural_days(n: u32) -> String {
    if n == 1 { "1 day".into() } else { format!("{n} days") }
}

#[async_trait]
impl ChannelAdapter for EmailAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, notice: &RenewalNotice) -> SendOutcome {
        match self.try_send(notice).await {
            Ok(()) => {
                tracing::info!("📤 Email reminder sent to {}", self.settings.to_address);
                SendOutcome::sent(None)
            }
            Err(e) => SendOutcome::failed(e.to_string()),
        }
    }

    async fn test_connection(&self) -> ConnectionCheck {
        let mailer = match self.mailer() {
            Ok(m) => m,
            Err(e) => return ConnectionCheck::failed(e.to_string()),
        };
        match mailer.test_connection().await {
            Ok(true) => {
                ConnectionCheck::ok(format!("SMTP connection to {} ok", self.settings.smtp_host))
            }
            Ok(false) => ConnectionCheck::failed("SMTP server refused the connection"),
            Err(e) => ConnectionCheck::failed(format!("SMTP connect: {e}")),
        }
    }
}
