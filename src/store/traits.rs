//! `EntityStore` trait: the narrow async interface workers use to reach the
//! replicated entity store.
//!
//! Notification delivery is asynchronous: a store must never invoke a
//! [`NotificationHandler`] while holding locks a worker may call back into.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{NotificationError, StoreError};

/// Identifier of one entity in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Int,
    Bool,
    Timestamp,
}

impl ValueKind {
    /// Value a freshly created entity holds for a field of this kind.
    pub fn default_value(&self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Int => Value::Int(0),
            Self::Bool => Value::Bool(false),
            Self::Timestamp => Value::Timestamp(DateTime::<Utc>::UNIX_EPOCH),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Timestamp => "timestamp",
        };
        write!(f, "{s}")
    }
}

/// A field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::String(_) => ValueKind::String,
            Self::Int(_) => ValueKind::Int,
            Self::Bool(_) => ValueKind::Bool,
            Self::Timestamp(_) => ValueKind::Timestamp,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// What a subscriber wants to be told about: writes to `field` on any
/// entity of `entity_type`, with `context_fields` read from the same entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub entity_type: String,
    pub field: String,
    pub context_fields: Vec<String>,
}

impl NotificationConfig {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            field: String::new(),
            context_fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn context_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// A delivered change record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub entity_id: EntityId,
    pub entity_type: String,
    /// Field whose write triggered this notification.
    pub field: String,
    /// Value written to `field`.
    pub value: Value,
    /// Context values, in the order requested at subscribe time.
    pub context: Vec<Value>,
}

impl Notification {
    /// Context value at `index`.
    pub fn context(&self, index: usize) -> Result<&Value, NotificationError> {
        self.context
            .get(index)
            .ok_or(NotificationError::MissingContext { index })
    }

    /// Context value at `index`, which must be a string.
    pub fn context_str(&self, index: usize) -> Result<&str, NotificationError> {
        self.context(index)?
            .as_str()
            .ok_or(NotificationError::WrongType {
                index,
                expected: "string",
            })
    }
}

/// Handle for one active subscription. Must be released with
/// [`EntityStore::unsubscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationToken {
    id: Uuid,
    config: NotificationConfig,
}

impl NotificationToken {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }
}

/// Connection and schema lifecycle of a store.
///
/// Subscriptions do not survive a disconnect: every token issued before a
/// `Disconnected` event is void afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreEvent {
    Connected,
    Disconnected,
    SchemaUpdated,
}

/// Receiver for asynchronously delivered notifications.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn on_notification(&self, notification: Notification);
}

/// Backend-agnostic entity store.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Register interest in writes described by `config`.
    async fn subscribe(
        &self,
        config: NotificationConfig,
        handler: Arc<dyn NotificationHandler>,
    ) -> Result<NotificationToken, StoreError>;

    /// Release a subscription. No notification is delivered for it afterwards.
    async fn unsubscribe(&self, token: NotificationToken) -> Result<(), StoreError>;

    /// All entities of the given type.
    async fn find_entities(&self, entity_type: &str) -> Result<Vec<EntityId>, StoreError>;

    /// Write a value into a field, notifying matching subscribers.
    async fn push_field(
        &self,
        entity: &EntityId,
        field: &str,
        value: Value,
    ) -> Result<(), StoreError>;

    /// Whether the schema defines `field` on `entity_type`.
    async fn field_exists(&self, entity_type: &str, field: &str) -> Result<bool, StoreError>;

    /// Lifecycle events emitted from now on.
    fn connection_events(&self) -> broadcast::Receiver<StoreEvent>;
}
