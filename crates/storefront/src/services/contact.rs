//! Contact form forwarding.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use printshelf_core::Email;

use crate::services::email::{ContactMessage, Notifier, SendOutcome};

const MAX_NAME_LEN: usize = 100;
const MAX_SUBJECT_LEN: usize = 200;
const MAX_MESSAGE_LEN: usize = 5_000;

/// Contact form body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Contact form validation failure.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ContactError(pub String);

/// Validates contact form submissions and forwards them to the shop inbox.
#[derive(Clone)]
pub struct ContactService {
    notifier: Arc<dyn Notifier>,
}

impl ContactService {
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Forward a submission.
    ///
    /// Delivery failures are logged and reported in the outcome only.
    ///
    /// # Errors
    ///
    /// Returns `ContactError` if a field is missing or too long.
    #[tracing::instrument(skip_all)]
    pub async fn submit(&self, form: ContactForm) -> Result<SendOutcome, ContactError> {
        let message = validate(form)?;
        let outcome = self.notifier.contact_message(&message).await;
        if !outcome.success {
            tracing::warn!(
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "Contact message was not delivered"
            );
        }
        Ok(outcome)
    }
}

fn validate(form: ContactForm) -> Result<ContactMessage, ContactError> {
    let name = form.name.trim().to_string();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(ContactError(format!(
            "name is required (max {MAX_NAME_LEN} characters)"
        )));
    }

    let email =
        Email::parse(&form.email).map_err(|e| ContactError(format!("invalid email: {e}")))?;

    let subject = form
        .subject
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if subject
        .as_ref()
        .is_some_and(|s| s.chars().count() > MAX_SUBJECT_LEN)
    {
        return Err(ContactError(format!(
            "subject must be at most {MAX_SUBJECT_LEN} characters"
        )));
    }

    let message = form.message.trim().to_string();
    if message.is_empty() || message.chars().count() > MAX_MESSAGE_LEN {
        return Err(ContactError(format!(
            "message is required (max {MAX_MESSAGE_LEN} characters)"
        )));
    }

    Ok(ContactMessage {
        name,
        email,
        subject,
        message,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn form() -> ContactForm {
        ContactForm {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            subject: Some("  ".to_string()),
            message: "Do you have dinosaurs?".to_string(),
        }
    }

    #[test]
    fn test_validate_drops_blank_subject() {
        let message = validate(form()).unwrap();
        assert_eq!(message.subject, None);
        assert_eq!(message.email.as_str(), "ada@example.com");
    }

    #[test]
    fn test_validate_requires_message() {
        let mut empty = form();
        empty.message = "\n".to_string();
        assert!(validate(empty).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_email() {
        let mut bad = form();
        bad.email = "ada".to_string();
        assert!(validate(bad).is_err());
    }
}
