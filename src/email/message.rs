//! Outgoing mail built from a `SendTrigger` notification.

use crate::error::NotificationError;
use crate::store::Notification;

/// Context field order requested at subscribe time.
pub const TO_INDEX: usize = 0;
pub const CC_INDEX: usize = 1;
pub const SUBJECT_INDEX: usize = 2;
pub const BODY_INDEX: usize = 3;

/// A mail ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    /// Extract To, Cc, Subject and Body from the notification context.
    ///
    /// Missing or non-string context is an error, and so is an empty `To`.
    pub fn from_notification(
        from: &str,
        notification: &Notification,
    ) -> Result<Self, NotificationError> {
        let to = split_recipients(notification.context_str(TO_INDEX)?);
        let cc = split_recipients(notification.context_str(CC_INDEX)?);
        let subject = notification.context_str(SUBJECT_INDEX)?.to_string();
        let body = notification.context_str(BODY_INDEX)?.to_string();

        if to.is_empty() {
            return Err(NotificationError::Invalid("no To recipients".to_string()));
        }

        Ok(Self {
            from: from.to_string(),
            to,
            cc,
            subject,
            body,
        })
    }

    /// Every envelope recipient: To followed by Cc.
    pub fn recipients(&self) -> Vec<String> {
        self.to.iter().chain(self.cc.iter()).cloned().collect()
    }

    /// Header-and-body rendering used in logs.
    pub fn render(&self) -> String {
        format!(
            "From: {}\nTo: {}\nCc: {}\nSubject: {}\n\n{}",
            self.from,
            self.to.join(","),
            self.cc.join(","),
            self.subject,
            self.body
        )
    }
}

/// Split a comma-separated address list, trimming and dropping empties.
pub fn split_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
