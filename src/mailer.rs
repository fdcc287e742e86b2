use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::info;
use thiserror::Error;

use crate::contact::ContactSubmission;

const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("SMTP is not configured, missing: {}", .0.join(", "))]
    Misconfigured(Vec<&'static str>),

    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build email: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Outbound notification for a freshly stored contact.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, contact: &ContactSubmission, id: i64) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Default)]
pub struct SmtpSettings {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub recipient: Option<String>,
    pub sender: Option<String>,
}

struct ResolvedSmtp<'a> {
    host: &'a str,
    user: &'a str,
    password: &'a str,
    recipient: &'a str,
    sender: &'a str,
}

impl SmtpSettings {
    fn resolve(&self) -> Result<ResolvedSmtp<'_>, NotifyError> {
        let mut missing = Vec::new();
        let host = required(&self.host, "SMTP_HOST", &mut missing);
        let user = required(&self.user, "SMTP_USER", &mut missing);
        let password = required(&self.password, "SMTP_PASSWORD", &mut missing);

        if !missing.is_empty() {
            return Err(NotifyError::Misconfigured(missing));
        }

        Ok(ResolvedSmtp {
            host,
            user,
            password,
            recipient: optional(&self.recipient).unwrap_or(user),
            sender: optional(&self.sender).unwrap_or(user),
        })
    }
}

fn optional(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(
    value: &'a Option<String>,
    name: &'static str,
    missing: &mut Vec<&'static str>,
) -> &'a str {
    optional(value).unwrap_or_else(|| {
        missing.push(name);
        ""
    })
}

pub struct SmtpNotifier {
    settings: SmtpSettings,
}

impl SmtpNotifier {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }
}

pub fn build_message(
    contact: &ContactSubmission,
    id: i64,
    sender: &str,
    recipient: &str,
) -> Result<Message, NotifyError> {
    let from: Mailbox = sender.parse()?;
    let to: Mailbox = recipient.parse()?;
    let reply_to = Mailbox::new(Some(contact.name.clone()), contact.email.parse()?);

    let body = format!(
        "New contact form submission #{id}\n\nName: {name}\nEmail: {email}\n\n{message}\n",
        id = id,
        name = contact.name,
        email = contact.email,
        message = contact.message,
    );

    let message = Message::builder()
        .from(from)
        .reply_to(reply_to)
        .to(to)
        .subject(format!("Portfolio contact from {}", contact.name))
        .header(ContentType::TEXT_PLAIN)
        .body(body)?;

    Ok(message)
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, contact: &ContactSubmission, id: i64) -> Result<(), NotifyError> {
        let smtp = self.settings.resolve()?;
        let message = build_message(contact, id, smtp.sender, smtp.recipient)?;

        let builder = if self.settings.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp.host)?
        };
        let mailer = builder
            .port(self.settings.port)
            .credentials(Credentials::new(
                smtp.user.to_string(),
                smtp.password.to_string(),
            ))
            .build();

        mailer.send(message).await?;
        info!("sent notification for contact {} to {}", id, smtp.recipient);
        Ok(())
    }
}
