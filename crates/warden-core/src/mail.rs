//! Outbound email.
//!
//! [`from_config`] picks the transport: [`LogMailer`] for development and
//! tests, [`SmtpMailer`] for a real relay.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::{Mailbox, Message, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use thiserror::Error;

use crate::config::{MailConfig, MailTransport, SmtpConfig};

/// A message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
#[error("delivery to {to} failed: {reason}")]
pub struct DeliveryFailed {
    pub to: String,
    pub reason: String,
}

#[derive(Debug, Error)]
#[error("mail transport setup failed: {0}")]
pub struct MailSetupError(String);

/// Delivers email. Implementations either hand the message to a transport or
/// fail with [`DeliveryFailed`]; the caller waits for the outcome.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), DeliveryFailed>;
}

/// Build the mailer named by `config.transport`.
pub fn from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailSetupError> {
    match config.transport {
        MailTransport::Log => Ok(Arc::new(LogMailer)),
        MailTransport::Smtp => Ok(Arc::new(SmtpMailer::new(&config.smtp)?)),
    }
}

/// Drops messages, recording only the envelope. Bodies carry live tokens and
/// are never written to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), DeliveryFailed> {
        tracing::info!(
            from = %email.from,
            to = %email.to,
            subject = %email.subject,
            "email not sent (log transport)"
        );
        Ok(())
    }
}

/// Sends through an SMTP relay with STARTTLS.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// No connection is opened until the first send.
    pub fn new(config: &SmtpConfig) -> Result<Self, MailSetupError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| MailSetupError(e.to_string()))?
            .port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        tracing::info!(host = %config.host, port = config.port, "SMTP mailer configured");
        Ok(Self {
            transport: builder.build(),
        })
    }
}

fn build_message(email: &Email) -> Result<Message, String> {
    let from: Mailbox = email
        .from
        .parse()
        .map_err(|e| format!("invalid sender address: {}", e))?;
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|e| format!("invalid recipient address: {}", e))?;
    Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(email.body.clone())
        .map_err(|e| e.to_string())
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<(), DeliveryFailed> {
        let failed = |reason: String| DeliveryFailed {
            to: email.to.clone(),
            reason,
        };
        let message = build_message(&email).map_err(failed)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| failed(e.to_string()))?;
        tracing::info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn reset_email() -> Email {
        Email {
            from: "noreply@example.com".to_string(),
            to: "alice@example.com".to_string(),
            subject: "Password Reset Request".to_string(),
            body: "token=eyJ.secret.token".to_string(),
        }
    }

    #[tokio::test]
    async fn log_transport_omits_the_body() {
        let captured = Captured::default();
        let sink = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || sink.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        LogMailer.send(reset_email()).await.unwrap();

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("alice@example.com"));
        assert!(output.contains("Password Reset Request"));
        assert!(!output.contains("eyJ.secret.token"));
    }

    #[test]
    fn message_carries_headers_and_body() {
        let message = build_message(&reset_email()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: alice@example.com"));
        assert!(raw.contains("Subject: Password Reset Request"));
        assert!(raw.contains("token=eyJ.secret.token"));
    }

    #[test]
    fn bad_recipient_is_rejected_before_sending() {
        let email = Email {
            to: "not an address".to_string(),
            ..reset_email()
        };
        let err = build_message(&email).unwrap_err();
        assert!(err.contains("recipient"));
    }

    #[tokio::test]
    async fn config_selects_the_transport() {
        assert!(from_config(&MailConfig::default()).is_ok());

        let smtp = MailConfig {
            transport: MailTransport::Smtp,
            smtp: SmtpConfig {
                host: "smtp.example.com".to_string(),
                username: Some("warden".to_string()),
                password: Some("secret".to_string()),
                ..SmtpConfig::default()
            },
        };
        assert!(from_config(&smtp).is_ok());
    }
}
