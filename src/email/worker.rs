//! SMTP worker: while leader, turns `SmtpController.SendTrigger` writes
//! into outgoing mail.
//!
//! Sends run on spawned tasks so a slow server never stalls notification
//! delivery or the scheduler. A failed send is fatal: it is logged with the
//! full message and escalated through the quit signal, never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::email::message::OutgoingMail;
use crate::email::transport::MailTransport;
use crate::store::{EntityStore, Notification, NotificationConfig, NotificationHandler};
use crate::worker::{DispatchTracker, Interest, LeadershipGate, QuitSignal, Worker};

pub const SMTP_ENTITY_TYPE: &str = "SmtpController";
pub const SEND_TRIGGER_FIELD: &str = "SendTrigger";
pub const CONTEXT_FIELDS: [&str; 4] = ["To", "Cc", "Subject", "Body"];

/// How long `deinit` waits for in-flight sends.
const DEINIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// The notification interest held while leader.
pub fn notification_config() -> NotificationConfig {
    NotificationConfig::new(SMTP_ENTITY_TYPE)
        .field(SEND_TRIGGER_FIELD)
        .context_fields(CONTEXT_FIELDS)
}

/// Notification-side half of the worker: gates on leadership and spawns sends.
struct MailDispatcher {
    from: String,
    gate: Arc<LeadershipGate>,
    transport: Arc<dyn MailTransport>,
    quit: QuitSignal,
    in_flight: DispatchTracker,
}

impl MailDispatcher {
    async fn process_notification(&self, notification: Notification) {
        let outcome = self
            .gate
            .while_leader(|| {
                info!(
                    entity = %notification.entity_id,
                    notification = %serde_json::to_string(&notification).unwrap_or_default(),
                    "Received notification"
                );
                match OutgoingMail::from_notification(&self.from, &notification) {
                    Ok(mail) => self.dispatch(mail),
                    Err(e) => error!(
                        entity = %notification.entity_id,
                        error = %e,
                        "Dropping malformed mail notification"
                    ),
                }
            })
            .await;

        if outcome.is_none() {
            debug!(entity = %notification.entity_id, "Not leader, discarding notification");
        }
    }

    fn dispatch(&self, mail: OutgoingMail) {
        let transport = Arc::clone(&self.transport);
        let quit = self.quit.clone();

        self.in_flight.spawn(async move {
            match transport.send(&mail).await {
                Ok(()) => {
                    info!(recipients = ?mail.recipients(), "Email sent successfully");
                }
                Err(e) => {
                    error!(
                        error = %e,
                        message = %mail.render(),
                        "Error sending email"
                    );
                    quit.fail(format!("email send failed: {e}"));
                }
            }
        });
    }
}

#[async_trait]
impl NotificationHandler for MailDispatcher {
    async fn on_notification(&self, notification: Notification) {
        self.process_notification(notification).await;
    }
}

/// Leader-gated mail dispatcher.
pub struct SmtpWorker {
    store: Arc<dyn EntityStore>,
    gate: Arc<LeadershipGate>,
    dispatcher: Arc<MailDispatcher>,
    quit: QuitSignal,
}

impl SmtpWorker {
    pub fn new(
        store: Arc<dyn EntityStore>,
        from_address: impl Into<String>,
        transport: Arc<dyn MailTransport>,
        quit: QuitSignal,
    ) -> Self {
        let gate = Arc::new(LeadershipGate::new("smtp"));
        let dispatcher = Arc::new(MailDispatcher {
            from: from_address.into(),
            gate: Arc::clone(&gate),
            transport,
            quit: quit.clone(),
            in_flight: DispatchTracker::new(),
        });

        Self {
            store,
            gate,
            dispatcher,
            quit,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.gate.is_leader()
    }

    pub async fn subscription_count(&self) -> usize {
        self.gate.subscription_count().await
    }

    /// Handle one delivered notification. Normally called by the store.
    pub async fn process_notification(&self, notification: Notification) {
        self.dispatcher.process_notification(notification).await;
    }

    /// Number of sends still running.
    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight.in_flight()
    }

    /// Wait for every dispatched send to complete.
    pub async fn wait_for_dispatches(&self) {
        self.dispatcher.in_flight.wait_idle().await;
    }
}

#[async_trait]
impl Worker for SmtpWorker {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn deinit(&self) {
        if tokio::time::timeout(DEINIT_DRAIN_TIMEOUT, self.wait_for_dispatches())
            .await
            .is_err()
        {
            warn!(in_flight = self.in_flight(), "Gave up waiting for in-flight emails");
        }
    }

    async fn on_became_leader(&self) {
        let interests = [Interest::new(
            notification_config(),
            Arc::clone(&self.dispatcher) as Arc<dyn NotificationHandler>,
        )];

        if let Err(e) = self.gate.become_leader(self.store.as_ref(), &interests).await {
            error!(worker = "smtp", error = %e, "Failed to subscribe to send triggers");
            self.quit.fail(format!("smtp subscribe failed: {e}"));
        }
    }

    async fn on_lost_leadership(&self) {
        if let Err(e) = self.gate.lose_leadership(self.store.as_ref()).await {
            error!(worker = "smtp", error = %e, "Failed to release send trigger subscription");
            self.quit.fail(format!("smtp unsubscribe failed: {e}"));
        }
    }
}
