//! Notification dispatcher for order confirmations, password resets and
//! contact form messages.
//!
//! Uses SMTP via lettre for delivery with Askama templates. Sends never fail
//! the caller: every method returns a [`SendOutcome`] and the caller decides
//! whether a failed send matters.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;

use printshelf_core::Email;

use crate::config::EmailConfig;
use crate::models::Order;

/// HTML template for the order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    customer_name: &'a str,
    order_number: &'a str,
    lines: &'a [LineView],
    total: &'a str,
    order_url: &'a str,
}

/// Plain text template for the order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    customer_name: &'a str,
    order_number: &'a str,
    lines: &'a [LineView],
    total: &'a str,
    order_url: &'a str,
}

/// HTML template for the password reset email.
#[derive(Template)]
#[template(path = "email/password_reset.html")]
struct PasswordResetHtml<'a> {
    reset_url: &'a str,
    ttl_minutes: u64,
}

/// Plain text template for the password reset email.
#[derive(Template)]
#[template(path = "email/password_reset.txt")]
struct PasswordResetText<'a> {
    reset_url: &'a str,
    ttl_minutes: u64,
}

/// Plain text template for a forwarded contact form message.
#[derive(Template)]
#[template(path = "email/contact_message.txt")]
struct ContactMessageText<'a> {
    name: &'a str,
    email: &'a str,
    subject: &'a str,
    message: &'a str,
}

/// One order line as shown in the confirmation email.
struct LineView {
    title: String,
    quantity: u32,
    line_total: String,
    download_url: Option<String>,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// No SMTP server configured.
    #[error("email delivery is not configured")]
    Disabled,
}

/// Result of a send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    /// A successful send.
    #[must_use]
    pub const fn sent() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// A failed send with its reason.
    #[must_use]
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            error: Some(reason.to_string()),
        }
    }
}

impl From<Result<(), EmailError>> for SendOutcome {
    fn from(result: Result<(), EmailError>) -> Self {
        match result {
            Ok(()) => Self::sent(),
            Err(e) => Self::failed(e),
        }
    }
}

/// A message submitted through the contact form.
#[derive(Debug, Clone)]
pub struct ContactMessage {
    pub name: String,
    pub email: Email,
    pub subject: Option<String>,
    pub message: String,
}

/// Outgoing notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send the order confirmation to the order's email.
    async fn order_confirmation(&self, order: &Order) -> SendOutcome;

    /// Send a password reset link.
    async fn password_reset(&self, to: &Email, reset_url: &str) -> SendOutcome;

    /// Forward a contact form message to the shop inbox.
    async fn contact_message(&self, message: &ContactMessage) -> SendOutcome;
}

/// Notifier used when SMTP is not configured. Every send reports failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn order_confirmation(&self, order: &Order) -> SendOutcome {
        tracing::info!(order_number = %order.order_number, "Email disabled, skipping order confirmation");
        SendOutcome::failed(EmailError::Disabled)
    }

    async fn password_reset(&self, _to: &Email, _reset_url: &str) -> SendOutcome {
        tracing::info!("Email disabled, skipping password reset");
        SendOutcome::failed(EmailError::Disabled)
    }

    async fn contact_message(&self, _message: &ContactMessage) -> SendOutcome {
        tracing::info!("Email disabled, skipping contact message");
        SendOutcome::failed(EmailError::Disabled)
    }
}

/// SMTP-backed notifier.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    contact_inbox: Mailbox,
    base_url: String,
    reset_ttl_minutes: u64,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// `base_url` is the public storefront URL used to build links.
    ///
    /// # Errors
    ///
    /// Returns error if the relay cannot be configured or an address is invalid.
    pub fn new(
        config: &EmailConfig,
        base_url: &str,
        reset_ttl_minutes: u64,
    ) -> Result<Self, EmailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        Ok(Self {
            mailer: builder.build(),
            from: parse_mailbox(&config.from)?,
            contact_inbox: parse_mailbox(&config.contact_inbox)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            reset_ttl_minutes,
        })
    }

    async fn send_confirmation(&self, order: &Order) -> Result<(), EmailError> {
        let lines: Vec<LineView> = order
            .items
            .iter()
            .map(|item| LineView {
                title: item.title.clone(),
                quantity: item.quantity,
                line_total: item
                    .price
                    .times(item.quantity)
                    .map_or_else(|_| item.price.to_string(), |p| p.to_string()),
                download_url: item.product_id.as_ref().map(|id| {
                    format!(
                        "{}/products/{id}/download?order={}",
                        self.base_url, order.order_number
                    )
                }),
            })
            .collect();
        let total = order.total.to_string();
        let order_url = format!("{}/orders/number/{}", self.base_url, order.order_number);

        let html = OrderConfirmationHtml {
            customer_name: &order.customer_name,
            order_number: order.order_number.as_str(),
            lines: &lines,
            total: &total,
            order_url: &order_url,
        }
        .render()?;
        let text = OrderConfirmationText {
            customer_name: &order.customer_name,
            order_number: order.order_number.as_str(),
            lines: &lines,
            total: &total,
            order_url: &order_url,
        }
        .render()?;

        let subject = format!("Your Printshelf order {}", order.order_number);
        self.send_multipart_email(parse_mailbox(order.email.as_str())?, &subject, &text, &html)
            .await
    }

    async fn send_reset(&self, to: &Email, reset_url: &str) -> Result<(), EmailError> {
        let html = PasswordResetHtml {
            reset_url,
            ttl_minutes: self.reset_ttl_minutes,
        }
        .render()?;
        let text = PasswordResetText {
            reset_url,
            ttl_minutes: self.reset_ttl_minutes,
        }
        .render()?;

        self.send_multipart_email(
            parse_mailbox(to.as_str())?,
            "Reset your Printshelf password",
            &text,
            &html,
        )
        .await
    }

    async fn send_contact(&self, message: &ContactMessage) -> Result<(), EmailError> {
        let subject = message
            .subject
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("New contact form message");
        let text = ContactMessageText {
            name: &message.name,
            email: message.email.as_str(),
            subject,
            message: &message.message,
        }
        .render()?;

        let email = Message::builder()
            .from(self.from.clone())
            .reply_to(parse_mailbox(message.email.as_str())?)
            .to(self.contact_inbox.clone())
            .subject(format!("[Contact] {subject}"))
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(text),
            )?;

        self.mailer.send(email).await?;
        tracing::info!(subject = %subject, "Contact message forwarded");
        Ok(())
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: Mailbox,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(subject = %subject, "Email sent successfully");
        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailService {
    async fn order_confirmation(&self, order: &Order) -> SendOutcome {
        self.send_confirmation(order).await.into()
    }

    async fn password_reset(&self, to: &Email, reset_url: &str) -> SendOutcome {
        self.send_reset(to, reset_url).await.into()
    }

    async fn contact_message(&self, message: &ContactMessage) -> SendOutcome {
        self.send_contact(message).await.into()
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address
        .parse()
        .map_err(|_| EmailError::InvalidAddress(address.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_send_outcome_from_result() {
        assert_eq!(SendOutcome::from(Ok(())), SendOutcome::sent());

        let failed = SendOutcome::from(Err(EmailError::Disabled));
        assert!(!failed.success);
        assert_eq!(
            failed.error.as_deref(),
            Some("email delivery is not configured")
        );
    }

    #[test]
    fn test_password_reset_text_contains_link() {
        let text = PasswordResetText {
            reset_url: "https://printshelf.test/reset?token=abc",
            ttl_minutes: 60,
        }
        .render()
        .unwrap();
        assert!(text.contains("https://printshelf.test/reset?token=abc"));
        assert!(text.contains("60 minutes"));
    }

    #[test]
    fn test_confirmation_html_escapes_titles() {
        let lines = vec![LineView {
            title: "<b>Fox</b>".to_string(),
            quantity: 2,
            line_total: "$19.98".to_string(),
            download_url: None,
        }];
        let html = OrderConfirmationHtml {
            customer_name: "Ada",
            order_number: "ORD-1-ABCD",
            lines: &lines,
            total: "$19.98",
            order_url: "https://printshelf.test/orders/number/ORD-1-ABCD",
        }
        .render()
        .unwrap();
        assert!(html.contains("&#60;b&#62;Fox") || html.contains("&lt;b&gt;Fox"));
        assert!(html.contains("$19.98"));
    }

    #[test]
    fn test_parse_mailbox_rejects_garbage() {
        assert!(parse_mailbox("Printshelf <shop@printshelf.test>").is_ok());
        assert!(matches!(
            parse_mailbox("not an address"),
            Err(EmailError::InvalidAddress(_))
        ));
    }
}
