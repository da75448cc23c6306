//! Verification email composition and delivery.
//!
//! Uses SMTP via lettre for delivery with Askama HTML templates.
//!
//! Composition (template rendering, message assembly) is separated from
//! delivery: composition can fail with [`EmailError`], but [`Mailer::send`]
//! itself only reports success or failure. A failed send leaves the caller
//! in the "credential issued but not delivered" state, which the route
//! layer surfaces as retryable.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;
use url::Url;

use papillon_core::Email;

use crate::config::EmailConfig;

/// HTML template for the verification link email.
#[derive(Template)]
#[template(path = "email/verification_link.html")]
struct VerificationLinkEmailHtml<'a> {
    url: &'a str,
}

/// Plain text template for the verification link email.
#[derive(Template)]
#[template(path = "email/verification_link.txt")]
struct VerificationLinkEmailText<'a> {
    url: &'a str,
}

/// HTML template for the verification code email.
#[derive(Template)]
#[template(path = "email/verification_code.html")]
struct VerificationCodeEmailHtml<'a> {
    code: &'a str,
}

/// Plain text template for the verification code email.
#[derive(Template)]
#[template(path = "email/verification_code.txt")]
struct VerificationCodeEmailText<'a> {
    code: &'a str,
}

/// Errors that can occur while composing an email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// A fully composed outbound message.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    /// Recipient address.
    pub to: Email,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
    /// Plain text alternative.
    pub text: String,
}

/// Delivery capability.
///
/// `send` never fails loudly: transport errors are logged and collapsed to
/// `false` so callers degrade instead of aborting.
#[allow(async_fn_in_trait)]
pub trait Mailer {
    /// Deliver a composed message. Returns whether delivery was accepted.
    async fn send(&self, mail: &OutgoingEmail) -> bool;
}

/// Compose the verification link email.
///
/// # Errors
///
/// Returns [`EmailError::Template`] if rendering fails.
pub fn verification_link_email(to: Email, url: &Url) -> Result<OutgoingEmail, EmailError> {
    let url = url.as_str();
    let html = VerificationLinkEmailHtml { url }.render()?;
    let text = VerificationLinkEmailText { url }.render()?;

    Ok(OutgoingEmail {
        to,
        subject: "Verify your Papillon email address".to_owned(),
        html,
        text,
    })
}

/// Compose the verification code email.
///
/// # Errors
///
/// Returns [`EmailError::Template`] if rendering fails.
pub fn verification_code_email(to: Email, code: &str) -> Result<OutgoingEmail, EmailError> {
    let html = VerificationCodeEmailHtml { code }.render()?;
    let text = VerificationCodeEmailText { code }.render()?;

    Ok(OutgoingEmail {
        to,
        subject: "Your Papillon verification code".to_owned(),
        html,
        text,
    })
}

/// SMTP-backed [`Mailer`].
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    /// Create a new mailer from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay parameters are invalid.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
        })
    }

    /// Assemble a multipart message with both plain text and HTML versions.
    fn build_message(&self, mail: &OutgoingEmail) -> Result<Message, EmailError> {
        Ok(Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(mail
                .to
                .as_str()
                .parse()
                .map_err(|_| EmailError::InvalidAddress(mail.to.to_string()))?)
            .subject(&mail.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(mail.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(mail.html.clone()),
                    ),
            )?)
    }
}

impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingEmail) -> bool {
        let message = match self.build_message(mail) {
            Ok(message) => message,
            Err(error) => {
                tracing::error!(to = %mail.to, %error, "failed to build email message");
                return false;
            }
        };

        match self.transport.send(message).await {
            Ok(_) => {
                tracing::info!(to = %mail.to, subject = %mail.subject, "Email sent successfully");
                true
            }
            Err(error) => {
                tracing::error!(to = %mail.to, %error, "failed to send email");
                false
            }
        }
    }
}

/// Test mailer that records every message instead of delivering it.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: std::sync::Mutex<Vec<OutgoingEmail>>,
}

impl RecordingMailer {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutgoingEmail) -> bool {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(mail.clone());
        true
    }
}
