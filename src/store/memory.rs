//! In-process `EntityStore`: schema, entities, and subscriptions in memory.
//!
//! Used by the binary when running standalone and by tests. Every
//! notification is delivered on its own task, after the store lock has been
//! released, so a handler may call back into the store or take worker locks
//! freely.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::traits::{
    EntityId, EntityStore, Notification, NotificationConfig, NotificationHandler,
    NotificationToken, StoreEvent, Value, ValueKind,
};
use crate::error::StoreError;
use crate::worker::DispatchTracker;

struct Entity {
    entity_type: String,
    fields: HashMap<String, Value>,
}

struct Subscription {
    config: NotificationConfig,
    handler: Arc<dyn NotificationHandler>,
}

#[derive(Default)]
struct StoreState {
    schema: HashMap<String, BTreeMap<String, ValueKind>>,
    entities: HashMap<EntityId, Entity>,
    subscriptions: HashMap<Uuid, Subscription>,
}

impl StoreState {
    fn field_kind(&self, entity_type: &str, field: &str) -> Result<ValueKind, StoreError> {
        self.schema
            .get(entity_type)
            .and_then(|fields| fields.get(field))
            .copied()
            .ok_or_else(|| StoreError::FieldNotFound {
                entity_type: entity_type.to_string(),
                field: field.to_string(),
            })
    }
}

/// In-memory entity store with asynchronous notification delivery.
pub struct InMemoryStore {
    connected: AtomicBool,
    state: RwLock<StoreState>,
    deliveries: DispatchTracker,
    events: broadcast::Sender<StoreEvent>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            connected: AtomicBool::new(true),
            state: RwLock::new(StoreState::default()),
            deliveries: DispatchTracker::new(),
            events,
        })
    }

    /// Define (or extend) an entity type with typed fields.
    pub async fn define_entity_type(&self, entity_type: &str, fields: &[(&str, ValueKind)]) {
        self.define_fields(entity_type, fields).await;
        self.emit(StoreEvent::SchemaUpdated);
    }

    async fn define_fields(&self, entity_type: &str, fields: &[(&str, ValueKind)]) {
        let mut state = self.state.write().await;
        let schema = state.schema.entry(entity_type.to_string()).or_default();
        for (name, kind) in fields {
            schema.insert(name.to_string(), *kind);
        }

        // Existing entities gain the new fields at their defaults.
        for entity in state.entities.values_mut() {
            if entity.entity_type != entity_type {
                continue;
            }
            for (name, kind) in fields {
                entity
                    .fields
                    .entry(name.to_string())
                    .or_insert_with(|| kind.default_value());
            }
        }
        info!(entity_type, fields = fields.len(), "Entity type defined");
    }

    /// Create an entity with every schema field at its default value.
    pub async fn create_entity(&self, entity_type: &str) -> Result<EntityId, StoreError> {
        self.ensure_connected()?;
        let mut state = self.state.write().await;
        let schema = state
            .schema
            .get(entity_type)
            .ok_or_else(|| StoreError::Rejected(format!("unknown entity type {entity_type}")))?;

        let fields = schema
            .iter()
            .map(|(name, kind)| (name.clone(), kind.default_value()))
            .collect();

        let id = EntityId::new();
        state.entities.insert(
            id.clone(),
            Entity {
                entity_type: entity_type.to_string(),
                fields,
            },
        );
        debug!(entity = %id, entity_type, "Entity created");
        Ok(id)
    }

    /// Current value of a field.
    pub async fn read_field(&self, entity: &EntityId, field: &str) -> Result<Value, StoreError> {
        self.ensure_connected()?;
        let state = self.state.read().await;
        let stored = state
            .entities
            .get(entity)
            .ok_or_else(|| StoreError::EntityNotFound(entity.to_string()))?;
        stored
            .fields
            .get(field)
            .cloned()
            .ok_or_else(|| StoreError::FieldNotFound {
                entity_type: stored.entity_type.clone(),
                field: field.to_string(),
            })
    }

    /// Number of live subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.state.read().await.subscriptions.len()
    }

    /// Drop the connection: every live subscription is voided and every
    /// subsequent call fails with [`StoreError::Disconnected`].
    pub async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        let dropped = {
            let mut state = self.state.write().await;
            std::mem::take(&mut state.subscriptions).len()
        };
        warn!(dropped_subscriptions = dropped, "Store disconnected");
        self.emit(StoreEvent::Disconnected);
    }

    pub fn reconnect(&self) {
        if self.connected.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Store reconnected");
        self.emit(StoreEvent::Connected);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Wait until every notification delivered so far has been handled.
    pub async fn flush_notifications(&self) {
        self.deliveries.wait_idle().await;
    }

    fn emit(&self, event: StoreEvent) {
        if self.events.send(event).is_err() {
            debug!(?event, "No store event listeners");
        }
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StoreError::Disconnected)
        }
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn subscribe(
        &self,
        config: NotificationConfig,
        handler: Arc<dyn NotificationHandler>,
    ) -> Result<NotificationToken, StoreError> {
        self.ensure_connected()?;
        let mut state = self.state.write().await;

        state.field_kind(&config.entity_type, &config.field)?;
        for context_field in &config.context_fields {
            state.field_kind(&config.entity_type, context_field)?;
        }

        let token = NotificationToken::new(config.clone());
        state
            .subscriptions
            .insert(token.id(), Subscription { config, handler });
        debug!(token = %token.id(), "Subscription registered");
        Ok(token)
    }

    async fn unsubscribe(&self, token: NotificationToken) -> Result<(), StoreError> {
        self.ensure_connected()?;
        let mut state = self.state.write().await;
        match state.subscriptions.remove(&token.id()) {
            Some(_) => {
                debug!(token = %token.id(), "Subscription released");
                Ok(())
            }
            None => Err(StoreError::UnknownToken(token.id().to_string())),
        }
    }

    async fn find_entities(&self, entity_type: &str) -> Result<Vec<EntityId>, StoreError> {
        self.ensure_connected()?;
        let state = self.state.read().await;
        Ok(state
            .entities
            .iter()
            .filter(|(_, entity)| entity.entity_type == entity_type)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn push_field(
        &self,
        entity: &EntityId,
        field: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        self.ensure_connected()?;

        let deliveries = {
            let mut state = self.state.write().await;
            let entity_type = state
                .entities
                .get(entity)
                .map(|e| e.entity_type.clone())
                .ok_or_else(|| StoreError::EntityNotFound(entity.to_string()))?;

            let kind = state.field_kind(&entity_type, field)?;
            if kind != value.kind() {
                return Err(StoreError::Rejected(format!(
                    "{entity_type}.{field} expects {kind}, got {}",
                    value.kind()
                )));
            }

            let Some(stored) = state.entities.get_mut(entity) else {
                return Err(StoreError::EntityNotFound(entity.to_string()));
            };
            stored.fields.insert(field.to_string(), value.clone());

            let stored = &state.entities[entity];
            state
                .subscriptions
                .values()
                .filter(|s| s.config.entity_type == entity_type && s.config.field == field)
                .map(|s| {
                    let context = s
                        .config
                        .context_fields
                        .iter()
                        .filter_map(|name| stored.fields.get(name).cloned())
                        .collect();
                    let notification = Notification {
                        entity_id: entity.clone(),
                        entity_type: entity_type.clone(),
                        field: field.to_string(),
                        value: value.clone(),
                        context,
                    };
                    (Arc::clone(&s.handler), notification)
                })
                .collect::<Vec<_>>()
        };

        for (handler, notification) in deliveries {
            self.deliveries.spawn(async move {
                handler.on_notification(notification).await;
            });
        }

        Ok(())
    }

    async fn field_exists(&self, entity_type: &str, field: &str) -> Result<bool, StoreError> {
        self.ensure_connected()?;
        let state = self.state.read().await;
        Ok(state.field_kind(entity_type, field).is_ok())
    }

    fn connection_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl NotificationHandler for Recorder {
        async fn on_notification(&self, notification: Notification) {
            self.seen.lock().unwrap().push(notification);
        }
    }

    async fn store_with_controller() -> (Arc<InMemoryStore>, EntityId) {
        let store = InMemoryStore::new();
        store
            .define_entity_type(
                "SmtpController",
                &[
                    ("SendTrigger", ValueKind::Int),
                    ("To", ValueKind::String),
                    ("Subject", ValueKind::String),
                ],
            )
            .await;
        let id = store.create_entity("SmtpController").await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn create_entity_uses_defaults() {
        let (store, id) = store_with_controller().await;
        assert_eq!(store.read_field(&id, "To").await.unwrap(), Value::from(""));
        assert_eq!(store.read_field(&id, "SendTrigger").await.unwrap(), Value::Int(0));
    }

    #[tokio::test]
    async fn push_notifies_with_context_in_order() {
        let (store, id) = store_with_controller().await;
        let recorder = Arc::new(Recorder::default());
        let config = NotificationConfig::new("SmtpController")
            .field("SendTrigger")
            .context_fields(["Subject", "To"]);
        store.subscribe(config, recorder.clone()).await.unwrap();

        store.push_field(&id, "To", "a@x.com".into()).await.unwrap();
        store.push_field(&id, "Subject", "S".into()).await.unwrap();
        store.push_field(&id, "SendTrigger", Value::Int(1)).await.unwrap();
        store.flush_notifications().await;

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].context, vec![Value::from("S"), Value::from("a@x.com")]);
        assert_eq!(seen[0].value, Value::Int(1));
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let (store, id) = store_with_controller().await;
        let recorder = Arc::new(Recorder::default());
        let token = store
            .subscribe(
                NotificationConfig::new("SmtpController").field("SendTrigger"),
                recorder.clone(),
            )
            .await
            .unwrap();
        assert_eq!(store.subscription_count().await, 1);

        store.unsubscribe(token.clone()).await.unwrap();
        assert_eq!(store.subscription_count().await, 0);
        assert!(matches!(
            store.unsubscribe(token).await,
            Err(StoreError::UnknownToken(_))
        ));

        store.push_field(&id, "SendTrigger", Value::Int(1)).await.unwrap();
        store.flush_notifications().await;
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscribe_rejects_unknown_fields() {
        let (store, _) = store_with_controller().await;
        let result = store
            .subscribe(
                NotificationConfig::new("SmtpController")
                    .field("SendTrigger")
                    .context_fields(["Bcc"]),
                Arc::new(Recorder::default()),
            )
            .await;
        assert!(matches!(result, Err(StoreError::FieldNotFound { .. })));
    }

    #[tokio::test]
    async fn push_rejects_wrong_kind() {
        let (store, id) = store_with_controller().await;
        let result = store.push_field(&id, "SendTrigger", "now".into()).await;
        assert!(matches!(result, Err(StoreError::Rejected(_))));
    }

    #[tokio::test]
    async fn disconnected_store_fails_calls() {
        let (store, id) = store_with_controller().await;
        store.disconnect().await;
        assert!(matches!(
            store.find_entities("SmtpController").await,
            Err(StoreError::Disconnected)
        ));
        assert!(matches!(
            store.push_field(&id, "To", "x".into()).await,
            Err(StoreError::Disconnected)
        ));

        store.reconnect();
        assert_eq!(store.find_entities("SmtpController").await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn disconnect_voids_subscriptions() {
        let (store, id) = store_with_controller().await;
        let recorder = Arc::new(Recorder::default());
        let token = store
            .subscribe(
                NotificationConfig::new("SmtpController").field("SendTrigger"),
                recorder.clone(),
            )
            .await
            .unwrap();

        store.disconnect().await;
        assert_eq!(store.subscription_count().await, 0);
        assert!(matches!(
            store.unsubscribe(token.clone()).await,
            Err(StoreError::Disconnected)
        ));

        store.reconnect();
        assert!(matches!(
            store.unsubscribe(token).await,
            Err(StoreError::UnknownToken(_))
        ));
        store.push_field(&id, "SendTrigger", Value::Int(1)).await.unwrap();
        store.flush_notifications().await;
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn lifecycle_events_are_broadcast() {
        let (store, _) = store_with_controller().await;
        let mut events = store.connection_events();

        store.disconnect().await;
        store.disconnect().await;
        store.reconnect();
        store
            .define_entity_type("SystemClock", &[("CurrentTime", ValueKind::Timestamp)])
            .await;

        assert_eq!(events.try_recv().unwrap(), StoreEvent::Disconnected);
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Connected);
        assert_eq!(events.try_recv().unwrap(), StoreEvent::SchemaUpdated);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn field_exists_reflects_schema() {
        let (store, _) = store_with_controller().await;
        assert!(store.field_exists("SmtpController", "To").await.unwrap());
        assert!(!store.field_exists("SmtpController", "Cc").await.unwrap());
        assert!(!store.field_exists("SystemClock", "CurrentTime").await.unwrap());
    }
}
