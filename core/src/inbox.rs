/// Inbox service: binds the selected conversation to the store, the
/// history loader, and the live channel
///
/// Owns the three stateful pieces and exposes the two read models the UI
/// renders: the conversation list and the active thread. Selection is the
/// only state of its own; changing it never touches the store.
use crate::aggregator::{self, ConversationSummary, ThreadMessage};
use crate::channel::{ChannelState, LiveChannel};
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::history::HistoryLoader;
use crate::message::Message;
use crate::session::Session;
use crate::store::MessageStore;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Real-time events observers can subscribe to (CLI, tests)
#[derive(Debug, Clone)]
pub enum InboxEvent {
    /// A new message landed in the store (live push or echo)
    MessageIngested { message: Message },
    /// The history fetch completed with this many new records
    HistoryLoaded { count: usize },
    /// The live channel moved to a new state
    ChannelState { state: ChannelState },
}

pub struct Inbox {
    session: Session,
    store: MessageStore,
    history: HistoryLoader,
    channel: LiveChannel,
    events: broadcast::Sender<InboxEvent>,
    selected_peer: Arc<RwLock<Option<u64>>>,
    /// Session epoch whose history is already in the store
    loaded_epoch: Arc<RwLock<Option<u64>>>,
}

impl Inbox {
    pub fn new(config: &Config, session: Session) -> Self {
        let store = MessageStore::new();
        let (events, _) = broadcast::channel(config.event_buffer);
        let history = HistoryLoader::new(config);
        let channel = LiveChannel::new(config, store.clone(), events.clone());

        Self {
            session,
            store,
            history,
            channel,
            events,
            selected_peer: Arc::new(RwLock::new(None)),
            loaded_epoch: Arc::new(RwLock::new(None)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InboxEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn channel(&self) -> &LiveChannel {
        &self.channel
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Load history for the current credential and open the live channel
    pub async fn start(&self) -> Result<()> {
        self.ensure_history().await?;
        self.channel.open(&self.session).await
    }

    /// Run the history loader at most once per credential epoch.
    ///
    /// A credential change discards the previous session's cache first; the
    /// store is rebuilt from the fresh history plus whatever streams in.
    pub async fn ensure_history(&self) -> Result<usize> {
        let epoch = self.session.epoch().await;
        {
            let loaded = self.loaded_epoch.read().await;
            if *loaded == Some(epoch) {
                debug!("History already loaded for epoch {}", epoch);
                return Ok(0);
            }
            if loaded.is_some() {
                self.store.clear().await;
            }
        }

        let added = self.history.load(&self.session, &self.store).await?;
        *self.loaded_epoch.write().await = Some(epoch);
        let _ = self.events.send(InboxEvent::HistoryLoaded { count: added });
        Ok(added)
    }

    /// Change (or clear) the selected conversation. The store is untouched;
    /// the thread view is recomputed on the next read.
    pub async fn select(&self, peer: Option<u64>) {
        *self.selected_peer.write().await = peer;
    }

    pub async fn selected(&self) -> Option<u64> {
        *self.selected_peer.read().await
    }

    /// The conversation list, newest first
    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>> {
        let local = self.session.local_user().await.ok_or(ChatError::AuthRequired)?;
        Ok(aggregator::conversation_list(&self.store.all().await, local))
    }

    /// The active thread, oldest first.
    ///
    /// `None` means no conversation is selected; `Some(vec![])` means the
    /// selected conversation has no messages yet. Callers render the two
    /// differently.
    pub async fn thread(&self) -> Result<Option<Vec<ThreadMessage>>> {
        let local = self.session.local_user().await.ok_or(ChatError::AuthRequired)?;
        let peer = match *self.selected_peer.read().await {
            Some(peer) => peer,
            None => return Ok(None),
        };
        Ok(Some(aggregator::active_thread(
            &self.store.all().await,
            local,
            peer,
        )))
    }

    /// Send a message to the selected peer over the live channel
    pub async fn send(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(ChatError::Config("message text is empty".to_string()));
        }
        let peer = self
            .selected()
            .await
            .ok_or_else(|| ChatError::Config("no conversation selected".to_string()))?;
        self.channel.send(peer, text).await
    }

    /// First-contact path: write through the REST endpoint instead of the
    /// channel (used before any conversation exists, e.g. replying to an ad)
    pub async fn contact(&self, receiver: u64, text: &str) -> Result<Message> {
        if text.trim().is_empty() {
            return Err(ChatError::Config("message text is empty".to_string()));
        }
        let message = self.history.post_message(&self.session, receiver, text).await?;
        if self.store.ingest(message.clone()).await {
            let _ = self.events.send(InboxEvent::MessageIngested {
                message: message.clone(),
            });
        }
        Ok(message)
    }

    /// Release the live channel. Required on teardown.
    pub async fn shutdown(&self) {
        self.channel.close().await;
    }

    /// End the session: close the channel, clear the credential, drop the cache
    pub async fn logout(&self) {
        self.channel.close().await;
        self.session.logout().await;
        self.store.clear().await;
        *self.loaded_epoch.write().await = None;
    }
}

impl Clone for Inbox {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            store: self.store.clone(),
            history: self.history.clone(),
            channel: self.channel.clone(),
            events: self.events.clone(),
            selected_peer: self.selected_peer.clone(),
            loaded_epoch: self.loaded_epoch.clone(),
        }
    }
}
