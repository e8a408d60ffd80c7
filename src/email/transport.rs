//! Outbound mail transport: trait plus the SMTP implementation via lettre.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::SmtpConfig;
use crate::email::message::OutgoingMail;
use crate::error::TransportError;

/// Port on which SMTP is spoken over implicit TLS; any other port upgrades
/// with STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends a mail. No timeout or retry is applied here.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError>;
}

/// SMTP transport with PLAIN/LOGIN credentials.
pub struct SmtpMailTransport {
    config: SmtpConfig,
}

impl SmtpMailTransport {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<SmtpTransport, TransportError> {
        let creds = Credentials::new(
            self.config.email_address.clone(),
            self.config.password.expose_secret().to_string(),
        );

        let relay = if self.config.port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(&self.config.host)
        } else {
            SmtpTransport::starttls_relay(&self.config.host)
        };
        let builder =
            relay.map_err(|e| TransportError::Send(format!("SMTP relay error: {e}")))?;

        Ok(builder.port(self.config.port).credentials(creds).build())
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
        let message = build_message(mail)?;
        let transport = self.transport()?;

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| TransportError::TaskFailed(e.to_string()))?
            .map_err(|e| TransportError::Send(format!("SMTP send failed: {e}")))?;

        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, TransportError> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| TransportError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Build the RFC 5322 message for `mail`.
pub fn build_message(mail: &OutgoingMail) -> Result<Message, TransportError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(&mail.from)?)
        .subject(mail.subject.as_str());

    for to in &mail.to {
        builder = builder.to(parse_mailbox(to)?);
    }
    for cc in &mail.cc {
        builder = builder.cc(parse_mailbox(cc)?);
    }

    builder
        .body(mail.body.clone())
        .map_err(|e| TransportError::Build(e.to_string()))
}
