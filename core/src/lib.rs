/// Unimarket Messaging - real-time inbox core for the campus marketplace
///
/// A client-side messaging stack: durable history over HTTP, live push over
/// a persistent WebSocket, an idempotent in-memory message store, and pure
/// derivation of the conversation-list and thread views.

pub mod error;
pub mod config;
pub mod session;
pub mod message;
pub mod store;
pub mod history;
pub mod channel;
pub mod aggregator;
pub mod inbox;
pub mod cli;

pub use error::{ChatError, Result};
pub use config::Config;
pub use session::Session;
pub use message::Message;
pub use store::MessageStore;
pub use history::HistoryLoader;
pub use channel::{ChannelState, LiveChannel};
pub use aggregator::{ConversationSummary, ThreadMessage};
pub use inbox::{Inbox, InboxEvent};
