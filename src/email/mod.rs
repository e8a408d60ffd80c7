//! Email dispatch: SMTP worker, outgoing mail model, and transport.

pub mod message;
pub mod transport;
pub mod worker;

pub use message::OutgoingMail;
pub use transport::{MailTransport, SmtpMailTransport};
pub use worker::SmtpWorker;
