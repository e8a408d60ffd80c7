//! Entity store collaborator: trait, value model, and the in-memory backend.

pub mod memory;
pub mod traits;

pub use memory::InMemoryStore;
pub use traits::{
    EntityId, EntityStore, Notification, NotificationConfig, NotificationHandler,
    NotificationToken, StoreEvent, Value, ValueKind,
};
