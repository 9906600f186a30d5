/// Conversation derivation: list and thread views over the raw message set
///
/// Pure functions over a store snapshot; nothing here mutates or does I/O.
use crate::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Display cap for the conversation-list preview, ellipsis included
pub const PREVIEW_MAX_CHARS: usize = 50;
const PREVIEW_ELLIPSIS: &str = "...";

/// Summary of one conversation thread (for the chats list view)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// The other participant's user id
    pub peer_id: u64,
    pub peer_name: String,
    pub peer_avatar: Option<String>,
    /// Preview of the latest message, "You: "-prefixed when the local user
    /// sent it, truncated to `PREVIEW_MAX_CHARS`
    pub preview: String,
    /// Timestamp of the latest message (drives the recency sort)
    pub timestamp: DateTime<Utc>,
    /// Id of the latest message (tie-break under timestamp collisions)
    pub last_message_id: u64,
}

/// One message of the active thread, annotated with the local user's role
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadMessage {
    pub message: Message,
    /// True when the local user wrote the message
    pub is_sender: bool,
}

/// Derive the conversation list: one entry per peer, carrying that peer's
/// latest message, sorted newest-first.
pub fn conversation_list(messages: &[Message], local_user: u64) -> Vec<ConversationSummary> {
    let mut latest: HashMap<u64, &Message> = HashMap::new();
    for message in messages {
        let peer = message.peer_of(local_user);
        match latest.entry(peer) {
            Entry::Occupied(mut slot) => {
                if newer(message, slot.get()) {
                    slot.insert(message);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(message);
            }
        }
    }

    let mut list: Vec<ConversationSummary> = latest
        .into_iter()
        .map(|(peer, message)| summarize(peer, message, local_user))
        .collect();

    list.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then(b.last_message_id.cmp(&a.last_message_id))
    });
    list
}

/// Derive the active thread for one peer, oldest first.
///
/// History-loaded and live messages merge here at read time; insertion
/// order in the store is irrelevant.
pub fn active_thread(messages: &[Message], local_user: u64, peer_id: u64) -> Vec<ThreadMessage> {
    let mut thread: Vec<&Message> = messages
        .iter()
        .filter(|m| m.sender == peer_id || m.receiver == peer_id)
        .collect();

    thread.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

    thread
        .into_iter()
        .map(|message| ThreadMessage {
            is_sender: message.sender == local_user,
            message: message.clone(),
        })
        .collect()
}

/// Source timestamps may collide; the server-assigned id breaks the tie
fn newer(candidate: &Message, current: &Message) -> bool {
    candidate.timestamp > current.timestamp
        || (candidate.timestamp == current.timestamp && candidate.id > current.id)
}

fn summarize(peer_id: u64, latest: &Message, local_user: u64) -> ConversationSummary {
    let sent_by_local = latest.sender == local_user;
    let (peer_name, peer_avatar) = if sent_by_local {
        (latest.receiver_name.clone(), latest.receiver_profile_picture.clone())
    } else {
        (latest.sender_name.clone(), latest.sender_profile_picture.clone())
    };

    let raw_preview = if sent_by_local {
        format!("You: {}", latest.text)
    } else {
        latest.text.clone()
    };

    ConversationSummary {
        peer_id,
        peer_name,
        peer_avatar,
        preview: truncate_preview(&raw_preview),
        timestamp: latest.timestamp,
        last_message_id: latest.id,
    }
}

/// Cap the preview at `PREVIEW_MAX_CHARS` characters, ellipsis included
pub fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_MAX_CHARS {
        return text.to_string();
    }
    let kept: String = text
        .chars()
        .take(PREVIEW_MAX_CHARS - PREVIEW_ELLIPSIS.chars().count())
        .collect();
    format!("{}{}", kept, PREVIEW_ELLIPSIS)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: u64 = 42;

    fn message(id: u64, sender: u64, receiver: u64, text: &str, secs: i64) -> Message {
        Message {
            id,
            sender,
            receiver,
            text: text.to_string(),
            timestamp: DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
            sender_name: if sender == LOCAL { "me".to_string() } else { format!("user{}", sender) },
            receiver_name: if receiver == LOCAL { "me".to_string() } else { format!("user{}", receiver) },
            sender_profile_picture: None,
            receiver_profile_picture: Some(format!("/media/{}.png", receiver)),
        }
    }

    #[test]
    fn test_conversation_recency_sort() {
        // Peer 7 latest at t=5, peer 9 latest at t=9
        let messages = vec![
            message(1, 7, LOCAL, "old", 1),
            message(2, LOCAL, 7, "latest with x", 5),
            message(3, 9, LOCAL, "latest with y", 9),
        ];

        let list = conversation_list(&messages, LOCAL);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].peer_id, 9);
        assert_eq!(list[1].peer_id, 7);
    }

    #[test]
    fn test_preview_prefix_and_peer_metadata() {
        let messages = vec![
            message(1, LOCAL, 7, "see you at the library", 5),
            message(2, 9, LOCAL, "still selling the desk?", 9),
        ];

        let list = conversation_list(&messages, LOCAL);
        // Latest message from peer 9 was written by the peer: no prefix
        assert_eq!(list[0].preview, "still selling the desk?");
        assert_eq!(list[0].peer_name, "user9");
        // Latest message toward peer 7 was written locally: prefixed
        assert_eq!(list[1].preview, "You: see you at the library");
        assert_eq!(list[1].peer_name, "user7");
        assert_eq!(list[1].peer_avatar.as_deref(), Some("/media/7.png"));
    }

    #[test]
    fn test_preview_truncation() {
        let long = "x".repeat(80);
        let preview = truncate_preview(&long);
        assert!(preview.chars().count() <= PREVIEW_MAX_CHARS);
        assert!(preview.ends_with("..."));

        let short = "y".repeat(30);
        assert_eq!(truncate_preview(&short), short);

        // Exactly at the cap: unabridged
        let exact = "z".repeat(PREVIEW_MAX_CHARS);
        assert_eq!(truncate_preview(&exact), exact);
    }

    #[test]
    fn test_thread_merges_history_and_live_by_timestamp() {
        // History delivered A(t=1) and B(t=3); C(t=2) arrived live later
        let messages = vec![
            message(1, 7, LOCAL, "A", 1),
            message(3, 7, LOCAL, "B", 3),
            message(5, LOCAL, 7, "C", 2),
        ];

        let thread = active_thread(&messages, LOCAL, 7);
        let texts: Vec<_> = thread.iter().map(|t| t.message.text.as_str()).collect();
        assert_eq!(texts, vec!["A", "C", "B"]);
    }

    #[test]
    fn test_thread_roles() {
        let messages = vec![
            message(1, LOCAL, 7, "sent by self", 1),
            message(2, 7, LOCAL, "sent by other", 2),
        ];

        let thread = active_thread(&messages, LOCAL, 7);
        assert!(thread[0].is_sender);
        assert!(!thread[1].is_sender);
    }

    #[test]
    fn test_thread_excludes_other_peers() {
        let messages = vec![
            message(1, 7, LOCAL, "mine", 1),
            message(2, 9, LOCAL, "someone else's", 2),
        ];

        let thread = active_thread(&messages, LOCAL, 7);
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].message.text, "mine");
    }

    #[test]
    fn test_empty_inputs() {
        assert!(conversation_list(&[], LOCAL).is_empty());
        assert!(active_thread(&[], LOCAL, 7).is_empty());

        // A peer with no messages yields an empty thread, not an error
        let messages = vec![message(1, 9, LOCAL, "hi", 1)];
        assert!(active_thread(&messages, LOCAL, 7).is_empty());
    }

    #[test]
    fn test_timestamp_collision_tie_break() {
        // Same timestamp: the higher server id is treated as later
        let messages = vec![
            message(10, 7, LOCAL, "first", 5),
            message(11, LOCAL, 7, "second", 5),
        ];

        let list = conversation_list(&messages, LOCAL);
        assert_eq!(list[0].last_message_id, 11);
        assert_eq!(list[0].preview, "You: second");

        let thread = active_thread(&messages, LOCAL, 7);
        assert_eq!(thread[0].message.id, 10);
        assert_eq!(thread[1].message.id, 11);
    }
}
