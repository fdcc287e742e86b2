use lazy_static::lazy_static;
use lettre::Address;
use log::{error, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::database::ContactStore;
use crate::mailer::{Notifier, NotifyError};

pub const MIN_NAME_CHARS: usize = 2;
pub const MIN_MESSAGE_CHARS: usize = 10;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

/// Request body as sent by the contact form. Fields stay untyped so a
/// missing or mistyped one is reported alongside the other validation
/// failures.
#[derive(Debug, Default, Deserialize)]
pub struct ContactPayload {
    pub name: Option<Value>,
    pub email: Option<Value>,
    pub message: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let issues = self
            .0
            .iter()
            .map(|e| format!("{} at \"{}\"", e.message, e.field))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "Validation error: {}", issues)
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Debug, Error)]
pub enum ContactError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("failed to store contact: {0}")]
    Storage(#[from] tokio_rusqlite::Error),

    #[error("contact {id} stored but notification failed: {source}")]
    Notification { id: i64, source: NotifyError },
}

impl ContactPayload {
    pub fn validate(self) -> Result<ContactSubmission, ValidationErrors> {
        let mut errors = Vec::new();

        let name = check(&mut errors, "name", self.name, |name| {
            (name.chars().count() >= MIN_NAME_CHARS)
                .then_some(())
                .ok_or("Name must be at least 2 characters")
        });
        let email = check(&mut errors, "email", self.email, |email| {
            // The mailer parses the same address, so both checks must agree.
            (EMAIL_RE.is_match(email) && email.parse::<Address>().is_ok())
                .then_some(())
                .ok_or("Please enter a valid email")
        });
        let message = check(&mut errors, "message", self.message, |message| {
            (message.chars().count() >= MIN_MESSAGE_CHARS)
                .then_some(())
                .ok_or("Message must be at least 10 characters")
        });

        match (name, email, message) {
            (Some(name), Some(email), Some(message)) if errors.is_empty() => {
                Ok(ContactSubmission {
                    name,
                    email,
                    message,
                })
            }
            _ => Err(ValidationErrors(errors)),
        }
    }
}

fn check(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    value: Option<Value>,
    rule: impl Fn(&str) -> Result<(), &'static str>,
) -> Option<String> {
    let value = match value {
        Some(Value::String(value)) => value,
        other => {
            errors.push(FieldError {
                field,
                message: type_mismatch(other.as_ref()),
            });
            return None;
        }
    };

    match rule(&value) {
        Ok(()) => Some(value),
        Err(message) => {
            errors.push(FieldError { field, message });
            None
        }
    }
}

fn type_mismatch(value: Option<&Value>) -> &'static str {
    match value {
        None | Some(Value::Null) => "Required",
        Some(Value::Bool(_)) => "Expected string, received boolean",
        Some(Value::Number(_)) => "Expected string, received number",
        Some(Value::Array(_)) => "Expected string, received array",
        Some(Value::Object(_)) => "Expected string, received object",
        Some(Value::String(_)) => "Expected string",
    }
}

/// Validates, stores and (when a notifier is configured) emails one
/// submission. Returns the stored id.
pub async fn submit(
    store: &ContactStore,
    notifier: Option<&dyn Notifier>,
    payload: ContactPayload,
) -> Result<i64, ContactError> {
    let contact = payload.validate()?;

    let id = store.insert(&contact).await.map_err(|e| {
        error!("Contact form error: {}", e);
        ContactError::Storage(e)
    })?;
    info!("stored contact {} from {}", id, contact.email);

    if let Some(notifier) = notifier {
        if let Err(source) = notifier.notify(&contact, id).await {
            error!("Failed to send notification for contact {}: {}", id, source);
            return Err(ContactError::Notification { id, source });
        }
    }

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn payload(name: &str, email: &str, message: &str) -> ContactPayload {
        ContactPayload {
            name: Some(name.into()),
            email: Some(email.into()),
            message: Some(message.into()),
        }
    }

    #[test]
    fn accepts_valid_submission() {
        let contact = payload("Al", "al@example.com", "0123456789").validate().unwrap();

        assert_eq!(contact.name, "Al");
        assert_eq!(contact.message, "0123456789");
    }

    #[test]
    fn rejects_short_message() {
        let err = payload("Alice", "alice@example.com", "hello").validate().unwrap_err();

        assert_eq!(
            err.0,
            vec![FieldError {
                field: "message",
                message: "Message must be at least 10 characters",
            }]
        );
        assert_eq!(
            err.to_string(),
            "Validation error: Message must be at least 10 characters at \"message\""
        );
    }

    #[test]
    fn reports_every_offending_field() {
        let err = payload("A", "not-an-email", "short").validate().unwrap_err();

        let fields: Vec<_> = err.0.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["name", "email", "message"]);
    }

    #[test]
    fn missing_fields_are_required() {
        let err = ContactPayload::default().validate().unwrap_err();

        assert!(err.0.iter().all(|e| e.message == "Required"));
        assert_eq!(err.0.len(), 3);
    }

    #[test]
    fn email_format_is_checked() {
        for bad in ["plain", "a@b", "a b@c.io", "@c.io", "a@.io "] {
            assert!(
                payload("Alice", bad, "long enough message").validate().is_err(),
                "{bad} should be rejected"
            );
        }
        assert!(payload("Alice", "a.b+c@d.co.uk", "long enough message")
            .validate()
            .is_ok());
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        assert!(payload("Ж", "zh@example.com", "ééééééééé").validate().is_err());
        assert!(payload("Жо", "zh@example.com", "éééééééééé").validate().is_ok());
    }

    #[test]
    fn addresses_the_mailer_cannot_parse_are_rejected() {
        for bad in ["a..b@c.io", "a<b>@c.io", "a,b@c.io", "a\"b@c.io", "a@b_c!.io"] {
            let err = payload("Alice", bad, "long enough message").validate().unwrap_err();

            assert_eq!(
                err.0,
                vec![FieldError {
                    field: "email",
                    message: "Please enter a valid email",
                }],
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn mistyped_fields_name_the_field() {
        let payload: ContactPayload = serde_json::from_value(serde_json::json!({
            "name": 5,
            "email": "alice@example.com",
            "message": ["long enough message"],
            "extra": true,
        }))
        .unwrap();

        let err = payload.validate().unwrap_err();

        assert_eq!(
            err.to_string(),
            "Validation error: Expected string, received number at \"name\"; \
             Expected string, received array at \"message\""
        );
    }

    #[test]
    fn null_fields_are_required() {
        let payload: ContactPayload = serde_json::from_value(serde_json::json!({
            "name": null,
            "email": "alice@example.com",
            "message": "long enough message",
        }))
        .unwrap();

        let err = payload.validate().unwrap_err();

        assert_eq!(
            err.0,
            vec![FieldError {
                field: "name",
                message: "Required",
            }]
        );
    }
}
