/// Message cache: the union of history-fetched and live messages
///
/// Append-only, keyed by the server-assigned message id, so a record that
/// arrives both via the history fetch and via a live echo collapses to one
/// entry. Readers take snapshots; derived views recompute when the revision
/// counter moves.
use crate::message::Message;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

#[derive(Clone)]
pub struct MessageStore {
    messages: Arc<RwLock<HashMap<u64, Message>>>,
    revision: Arc<watch::Sender<u64>>,
}

impl MessageStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            messages: Arc::new(RwLock::new(HashMap::new())),
            revision: Arc::new(revision),
        }
    }

    /// Add a message. Re-ingesting an already known id is a no-op.
    /// Returns whether the message was new.
    pub async fn ingest(&self, message: Message) -> bool {
        let mut messages = self.messages.write().await;
        match messages.entry(message.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(message);
                self.revision.send_modify(|r| *r += 1);
                true
            }
        }
    }

    /// Bulk form of `ingest`, used by the history loader. The whole batch
    /// lands under one write lock, so no reader observes a partial history.
    /// Returns how many records were new.
    pub async fn ingest_batch(&self, batch: Vec<Message>) -> usize {
        let mut messages = self.messages.write().await;
        let mut added = 0;
        for message in batch {
            if let Entry::Vacant(slot) = messages.entry(message.id) {
                slot.insert(message);
                added += 1;
            }
        }
        if added > 0 {
            self.revision.send_modify(|r| *r += 1);
        }
        added
    }

    /// Snapshot of the full, unordered message set
    pub async fn all(&self) -> Vec<Message> {
        self.messages.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }

    /// Observe store revisions; the receiver resolves whenever a mutation lands
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Discard everything. Used when the session that produced the cache ends.
    pub async fn clear(&self) {
        let mut messages = self.messages.write().await;
        if !messages.is_empty() {
            messages.clear();
            self.revision.send_modify(|r| *r += 1);
        }
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}
