use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::messages::OutboundMessage;

/// Outbound half of the client message bus.
///
/// Components register the message names they intend to send; the transport
/// subscribes and forwards whatever gets dispatched.
#[derive(Clone)]
pub struct MessageBus {
    tx: broadcast::Sender<OutboundMessage>,
    registered: Arc<RwLock<BTreeSet<&'static str>>>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            registered: Arc::new(RwLock::new(BTreeSet::new())),
        }
    }

    pub fn register_outgoing(&self, name: &'static str) {
        self.registered.write().insert(name);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registered.read().contains(name)
    }

    pub fn registered(&self) -> Vec<&'static str> {
        self.registered.read().iter().copied().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.tx.subscribe()
    }

    /// Send a message to the client. Returns false when the message type was
    /// never registered or no transport is listening.
    pub fn dispatch(&self, message: OutboundMessage) -> bool {
        let name = message.name();
        if !self.is_registered(name) {
            tracing::warn!(event_type = name, "Dropping message of unregistered type");
            return false;
        }
        match self.tx.send(message) {
            Ok(_) => true,
            Err(_) => {
                tracing::debug!(event_type = name, "No transport subscribed, message dropped");
                false
            }
        }
    }
}
