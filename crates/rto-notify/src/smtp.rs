//! SMTP delivery through lettre.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, SmtpTransport, Transport};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::SmtpSettings;
use crate::error::EmailError;
use crate::provider::{EmailMessage, EmailProvider, Sender};

/// Sends mail through an SMTP relay.
///
/// lettre's `SmtpTransport` is blocking, so each send runs on the blocking
/// thread pool.
pub struct SmtpProvider {
    transport: SmtpTransport,
    from: Mailbox,
    domain: String,
}

impl SmtpProvider {
    pub fn new(settings: &SmtpSettings, sender: &Sender) -> Result<Self, EmailError> {
        if settings.host.trim().is_empty() {
            return Err(EmailError::Configuration("SMTP host is empty".to_string()));
        }

        let builder = if settings.starttls {
            SmtpTransport::starttls_relay(&settings.host)
                .map_err(|e| EmailError::Configuration(format!("SMTP relay error: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&settings.host)
        };

        let builder = builder.port(settings.port);
        let transport = match (&settings.username, &settings.password) {
            (Some(user), Some(pass)) => builder
                .credentials(Credentials::new(user.clone(), pass.clone()))
                .build(),
            _ => builder.build(),
        };

        let address: Address = sender.address.parse()?;
        let domain = address.domain().to_string();

        Ok(Self {
            transport,
            from: Mailbox::new(Some(sender.name.clone()), address),
            domain,
        })
    }

    fn build_message(&self, message: &EmailMessage, message_id: &str) -> Result<Message, EmailError> {
        let to = Mailbox::new(message.to_name.clone(), message.to.parse()?);

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .message_id(Some(message_id.to_string()))
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| EmailError::InvalidAddress(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    fn name(&self) -> &str {
        "smtp"
    }

    #[instrument(skip(self, message), fields(to = %message.to))]
    async fn send(&self, message: &EmailMessage) -> Result<String, EmailError> {
        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.domain);
        let email = self.build_message(message, &message_id)?;
        let transport = self.transport.clone();

        let result = tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| EmailError::Provider(format!("SMTP task failed: {}", e)))?;

        match result {
            Ok(response) => {
                debug!(code = %response.code(), "SMTP relay accepted message");
                Ok(message_id)
            }
            Err(e) if e.is_permanent() => Err(EmailError::Rejected(e.to_string())),
            Err(e) => Err(EmailError::Provider(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> Sender {
        Sender {
            address: "compliance@college.edu.au".to_string(),
            name: "Compliance Office".to_string(),
        }
    }

    fn settings() -> SmtpSettings {
        SmtpSettings {
            host: "localhost".to_string(),
            port: 2525,
            username: None,
            password: None,
            starttls: false,
        }
    }

    #[test]
    fn test_empty_host_is_configuration_error() {
        let mut settings = settings();
        settings.host = " ".to_string();
        let err = SmtpProvider::new(&settings, &sender()).err().unwrap();
        assert!(matches!(err, EmailError::Configuration(_)));
    }

    #[test]
    fn test_bad_sender_address() {
        let mut sender = sender();
        sender.address = "not an address".to_string();
        let err = SmtpProvider::new(&settings(), &sender).err().unwrap();
        assert!(matches!(err, EmailError::InvalidAddress(_)));
    }

    #[test]
    fn test_builds_plain_text_message() {
        let provider = SmtpProvider::new(&settings(), &sender()).unwrap();
        let message = EmailMessage::new("jo@college.edu.au", "Hello", "Body").with_name("Jo");
        let built = provider.build_message(&message, "<id@college.edu.au>").unwrap();

        let raw = String::from_utf8(built.formatted()).unwrap();
        assert!(raw.contains("Subject: Hello"));
        assert!(raw.contains("Message-ID: <id@college.edu.au>"));
        assert!(raw.contains("Content-Type: text/plain"));
    }

    #[test]
    fn test_invalid_recipient_is_rejected_before_sending() {
        let provider = SmtpProvider::new(&settings(), &sender()).unwrap();
        let message = EmailMessage::new("nobody", "Hello", "Body");
        let err = provider.build_message(&message, "<id@x>").unwrap_err();
        assert!(err.is_permanent());
    }
}
