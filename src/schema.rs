//! Schema validator: leadership is only offered once the store defines
//! every (entity type, field) pair the workers rely on.
//!
//! Validity is re-checked on every store connect, disconnect and schema
//! update, so a store outage withdraws availability on the next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::store::{EntityStore, StoreEvent};
use crate::worker::Worker;

pub struct SchemaValidator {
    store: Arc<dyn EntityStore>,
    required: Vec<(String, String)>,
    valid: AtomicBool,
    events: Mutex<broadcast::Receiver<StoreEvent>>,
}

impl SchemaValidator {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        let events = Mutex::new(store.connection_events());
        Self {
            store,
            required: Vec::new(),
            valid: AtomicBool::new(false),
            events,
        }
    }

    /// Require `fields` on `entity_type`.
    pub fn add_entity(&mut self, entity_type: &str, fields: &[&str]) -> &mut Self {
        for field in fields {
            self.required
                .push((entity_type.to_string(), field.to_string()));
        }
        self
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Re-check every required pair against the store. Call on (re)connect
    /// and whenever the schema may have changed.
    pub async fn validation_required(&self) -> bool {
        let mut valid = true;
        for (entity_type, field) in &self.required {
            match self.store.field_exists(entity_type, field).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(entity_type = %entity_type, field = %field, "Required field missing from schema");
                    valid = false;
                }
                Err(e) => {
                    warn!(entity_type = %entity_type, field = %field, error = %e, "Schema check failed");
                    valid = false;
                }
            }
        }

        let was_valid = self.valid.swap(valid, Ordering::AcqRel);
        if valid != was_valid {
            info!(valid, "Schema validity changed");
        }
        valid
    }

    /// Drain pending store events. Returns `true` if any of them calls for
    /// revalidation.
    fn store_changed(&self) -> bool {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let mut changed = false;
        loop {
            match events.try_recv() {
                Ok(event) => {
                    debug!(?event, "Store event");
                    changed = true;
                }
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "Schema validator lagged behind store events");
                    changed = true;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return changed,
            }
        }
    }
}

#[async_trait]
impl Worker for SchemaValidator {
    fn name(&self) -> &str {
        "schema-validator"
    }

    async fn init(&self) {
        self.validation_required().await;
    }

    /// Re-check while invalid and after any store lifecycle event.
    async fn do_work(&self) {
        let changed = self.store_changed();
        if changed || !self.is_valid() {
            self.validation_required().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, ValueKind};

    #[tokio::test]
    async fn valid_only_when_all_fields_exist() {
        let store = InMemoryStore::new();
        let mut validator = SchemaValidator::new(store.clone());
        validator
            .add_entity("Root", &["SchemaUpdateTrigger"])
            .add_entity("SystemClock", &["CurrentTime"]);

        assert!(!validator.is_valid());
        assert!(!validator.validation_required().await);

        store
            .define_entity_type("Root", &[("SchemaUpdateTrigger", ValueKind::Int)])
            .await;
        assert!(!validator.validation_required().await);

        store
            .define_entity_type("SystemClock", &[("CurrentTime", ValueKind::Timestamp)])
            .await;
        assert!(validator.validation_required().await);
        assert!(validator.is_valid());
    }

    #[tokio::test]
    async fn disconnect_invalidates() {
        let store = InMemoryStore::new();
        store
            .define_entity_type("SystemClock", &[("CurrentTime", ValueKind::Timestamp)])
            .await;
        let mut validator = SchemaValidator::new(store.clone());
        validator.add_entity("SystemClock", &["CurrentTime"]);

        validator.init().await;
        assert!(validator.is_valid());

        store.disconnect().await;
        validator.do_work().await;
        assert!(!validator.is_valid());

        store.reconnect();
        validator.do_work().await;
        assert!(validator.is_valid());
    }

    #[tokio::test]
    async fn schema_update_is_rechecked() {
        let store = InMemoryStore::new();
        store
            .define_entity_type("SystemClock", &[("CurrentTime", ValueKind::Timestamp)])
            .await;
        let mut validator = SchemaValidator::new(store.clone());
        validator.add_entity("SystemClock", &["CurrentTime"]);
        validator.init().await;
        assert!(validator.is_valid());

        // Valid and quiet: no store calls at all.
        assert!(!validator.store_changed());

        store
            .define_entity_type("Root", &[("SchemaUpdateTrigger", ValueKind::Int)])
            .await;
        assert!(validator.store_changed());
    }
}
