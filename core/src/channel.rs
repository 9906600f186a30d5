/// Live channel: the persistent WebSocket connection for push delivery
///
/// One connection per authenticated session. The bearer token rides the
/// handshake URL so the server authenticates before accepting traffic;
/// inbound frames are message records, outbound frames are
/// `{"receiver", "message"}` requests. The channel is an owned resource:
/// explicit `open`, `send`, `close`, with an observable state field.
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::inbox::InboxEvent;
use crate::message::Message;
use crate::session::Session;
use crate::store::MessageStore;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

/// Connection state of the live channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    /// No connection
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Ready to send and receive
    Open,
    /// Teardown in progress
    Closing,
    /// Transport failed; settles back to Disconnected
    Error,
}

/// Outbound wire shape expected by the chat endpoint
#[derive(Debug, Clone, Serialize)]
struct SendFrame {
    receiver: u64,
    message: String,
}

/// Server-side delivery problems arrive as plain error reports
#[derive(Debug, Deserialize)]
struct ErrorFrame {
    error: String,
}

enum Outbound {
    Frame(SendFrame),
    Goodbye,
}

pub struct LiveChannel {
    ws_base: String,
    store: MessageStore,
    events: broadcast::Sender<InboxEvent>,
    outbound_buffer: usize,
    state: Arc<RwLock<ChannelState>>,
    outbound: Arc<RwLock<Option<mpsc::Sender<Outbound>>>>,
    reader: Arc<Mutex<Option<JoinHandle<()>>>>,
    writer: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// How long close() waits for the writer to flush the goodbye frame before
/// stopping it outright
const WRITER_DRAIN_GRACE: Duration = Duration::from_secs(1);

impl LiveChannel {
    pub fn new(config: &Config, store: MessageStore, events: broadcast::Sender<InboxEvent>) -> Self {
        Self {
            ws_base: config.ws_base.clone(),
            store,
            events,
            outbound_buffer: config.outbound_buffer,
            state: Arc::new(RwLock::new(ChannelState::Disconnected)),
            outbound: Arc::new(RwLock::new(None)),
            reader: Arc::new(Mutex::new(None)),
            writer: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn state(&self) -> ChannelState {
        *self.state.read().await
    }

    /// Connect and start the reader/writer tasks.
    ///
    /// Valid from Disconnected (or after a transport error); requires a
    /// logged-in session. The credential is part of the handshake URL.
    pub async fn open(&self, session: &Session) -> Result<()> {
        {
            let state = self.state.read().await;
            match *state {
                ChannelState::Disconnected | ChannelState::Error => {}
                other => {
                    return Err(ChatError::Channel(format!(
                        "open is not valid from state {:?}",
                        other
                    )))
                }
            }
        }
        let credentials = session.credentials().await.ok_or(ChatError::AuthRequired)?;

        publish_state(&self.state, &self.events, ChannelState::Connecting).await;

        let url = format!("{}/chat/?token={}", self.ws_base, credentials.token);
        let (ws, _) = match connect_async(url.as_str()).await {
            Ok(connected) => connected,
            Err(e) => {
                publish_state(&self.state, &self.events, ChannelState::Error).await;
                publish_state(&self.state, &self.events, ChannelState::Disconnected).await;
                return Err(ChatError::Channel(format!("connect failed: {}", e)));
            }
        };
        info!("Live channel connected to {}", self.ws_base);

        let (mut write, mut read) = ws.split();
        let (tx, mut rx) = mpsc::channel::<Outbound>(self.outbound_buffer);

        let store = self.store.clone();
        let events = self.events.clone();
        let state = self.state.clone();
        let outbound = self.outbound.clone();

        // Registration happens under the state lock so a close() issued while
        // the handshake was in flight wins: the fresh socket must not outlive
        // a teardown the caller already completed
        {
            let mut current = self.state.write().await;
            if *current != ChannelState::Connecting {
                drop(current);
                let _ = write.send(WsMessage::Close(None)).await;
                return Err(ChatError::Channel(
                    "channel was closed during connect".to_string(),
                ));
            }

            // Writer: drains the outbound queue until the sender is dropped
            // or a goodbye frame is flushed
            let writer = tokio::spawn(async move {
                while let Some(outbound) = rx.recv().await {
                    match outbound {
                        Outbound::Frame(frame) => {
                            let json = match serde_json::to_string(&frame) {
                                Ok(json) => json,
                                Err(e) => {
                                    warn!("Dropping unserializable outbound frame: {}", e);
                                    continue;
                                }
                            };
                            debug!("Sending message to {}", frame.receiver);
                            if let Err(e) = write.send(WsMessage::text(json)).await {
                                error!("Live channel send failed: {}", e);
                                break;
                            }
                        }
                        Outbound::Goodbye => {
                            let _ = write.send(WsMessage::Close(None)).await;
                            break;
                        }
                    }
                }
            });

            // Reader: every inbound frame that parses as a message is ingested
            let reader = tokio::spawn(async move {
                let exit_state = loop {
                    match read.next().await {
                        Some(Ok(WsMessage::Text(text))) => {
                            handle_frame(text.as_str(), &store, &events).await;
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            info!("Live channel closed by server");
                            break ChannelState::Disconnected;
                        }
                        Some(Ok(_)) => {
                            // Ping/pong/binary frames carry no messages
                        }
                        Some(Err(e)) => {
                            error!("Live channel transport error: {}", e);
                            break ChannelState::Error;
                        }
                    }
                };

                outbound.write().await.take();
                {
                    let current = *state.read().await;
                    // A close() in progress owns the state from here
                    if !matches!(current, ChannelState::Closing | ChannelState::Disconnected) {
                        if exit_state == ChannelState::Error {
                            publish_state(&state, &events, ChannelState::Error).await;
                        }
                        publish_state(&state, &events, ChannelState::Disconnected).await;
                    }
                }
            });

            *self.outbound.write().await = Some(tx);
            *self.writer.lock().await = Some(writer);
            *self.reader.lock().await = Some(reader);
            *current = ChannelState::Open;
        }
        let _ = self.events.send(InboxEvent::ChannelState {
            state: ChannelState::Open,
        });

        Ok(())
    }

    /// Queue one message for the given peer. Valid only while Open; never
    /// suspends and never silently drops: a full queue is an error.
    ///
    /// Fire-and-forget: the sent message reaches the store only through the
    /// server's echo, which carries the durable id.
    pub async fn send(&self, receiver: u64, text: &str) -> Result<()> {
        if self.state().await != ChannelState::Open {
            return Err(ChatError::ChannelNotReady);
        }
        let tx = self
            .outbound
            .read()
            .await
            .clone()
            .ok_or(ChatError::ChannelNotReady)?;

        tx.try_send(Outbound::Frame(SendFrame {
            receiver,
            message: text.to_string(),
        }))
        .map_err(|_| ChatError::Channel("outbound queue full or closed".to_string()))
    }

    /// Release the connection. Safe on every exit path: stops ingestion
    /// deterministically, says goodbye to the server, ends in Disconnected.
    pub async fn close(&self) {
        {
            let mut state = self.state.write().await;
            if *state == ChannelState::Disconnected {
                return;
            }
            *state = ChannelState::Closing;
        }
        let _ = self.events.send(InboxEvent::ChannelState {
            state: ChannelState::Closing,
        });

        if let Some(tx) = self.outbound.write().await.take() {
            // Dropping the sender ends the writer once the goodbye is flushed
            let _ = tx.try_send(Outbound::Goodbye);
        }

        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
            let _ = reader.await;
        }

        // Both tasks are gone when close() returns; a stalled socket must not
        // hold the teardown hostage
        if let Some(mut writer) = self.writer.lock().await.take() {
            if tokio::time::timeout(WRITER_DRAIN_GRACE, &mut writer).await.is_err() {
                writer.abort();
                let _ = writer.await;
            }
        }

        publish_state(&self.state, &self.events, ChannelState::Disconnected).await;
        info!("Live channel closed");
    }
}

impl Clone for LiveChannel {
    fn clone(&self) -> Self {
        Self {
            ws_base: self.ws_base.clone(),
            store: self.store.clone(),
            events: self.events.clone(),
            outbound_buffer: self.outbound_buffer,
            state: self.state.clone(),
            outbound: self.outbound.clone(),
            reader: self.reader.clone(),
            writer: self.writer.clone(),
        }
    }
}

async fn publish_state(
    state: &Arc<RwLock<ChannelState>>,
    events: &broadcast::Sender<InboxEvent>,
    next: ChannelState,
) {
    *state.write().await = next;
    let _ = events.send(InboxEvent::ChannelState { state: next });
}

/// Parse and ingest one inbound frame. Malformed frames are logged and
/// discarded; they never take the channel or the store down.
async fn handle_frame(
    raw: &str,
    store: &MessageStore,
    events: &broadcast::Sender<InboxEvent>,
) {
    match serde_json::from_str::<Message>(raw) {
        Ok(message) => {
            let fresh = store.ingest(message.clone()).await;
            if fresh {
                let _ = events.send(InboxEvent::MessageIngested { message });
            } else {
                debug!("Duplicate message {} ignored", message.id);
            }
        }
        Err(_) => {
            if let Ok(report) = serde_json::from_str::<ErrorFrame>(raw) {
                warn!("Server reported delivery error: {}", report.error);
            } else {
                warn!("Discarding malformed live frame ({} bytes)", raw.len());
            }
        }
    }
}
