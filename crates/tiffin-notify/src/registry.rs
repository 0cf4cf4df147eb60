//! Active subscription handles and inbound message routing. The registry
//! tracks only *active* handles; intent is re-declared by the owner after
//! every reconnect.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use tiffin_wire::OrderEvent;

pub type SubscriptionId = String;
pub type MessageHandler = Arc<dyn Fn(OrderEvent) + Send + Sync>;

struct Entry {
    destination: String,
    handler: MessageHandler,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<HashMap<SubscriptionId, Entry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler and mint an opaque id for it.
    pub fn register(&self, destination: &str, handler: MessageHandler) -> SubscriptionId {
        let id = Uuid::new_v4().to_string();
        self.entries.lock().insert(
            id.clone(),
            Entry {
                destination: destination.to_string(),
                handler,
            },
        );
        id
    }

    /// Remove an entry, returning its destination. Unknown ids are a quiet
    /// no-op so unsubscribe stays idempotent.
    pub fn remove(&self, id: &str) -> Option<String> {
        self.entries.lock().remove(id).map(|entry| entry.destination)
    }

    /// Drop every entry; returns how many were invalidated.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Route a `Message` body to its subscription. Malformed bodies are
    /// logged and dropped; they never reach a handler and never panic.
    pub fn dispatch(&self, id: &str, body: serde_json::Value) {
        let entry = {
            let entries = self.entries.lock();
            entries
                .get(id)
                .map(|entry| (entry.handler.clone(), entry.destination.clone()))
        };
        let Some((handler, destination)) = entry else {
            debug!(target: "tiffin::registry", %id, "message for unknown subscription");
            return;
        };
        match OrderEvent::from_body(body) {
            // The handler runs outside the registry lock so it may
            // subscribe or unsubscribe itself.
            Ok(event) => handler(event),
            Err(err) => {
                warn!(target: "tiffin::registry", %destination, %err, "dropping malformed order event");
            }
        }
    }
}
