/// The message entity and its wire mapping
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One durably stored chat message.
///
/// Identical shape on the history endpoint and on the live channel; the
/// display metadata is denormalized onto every record so rendering a
/// conversation never needs a separate user lookup. Avatar URLs are `null`
/// on the wire for users without a profile picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier assigned by the durable store
    pub id: u64,
    pub sender: u64,
    pub receiver: u64,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub sender_name: String,
    pub receiver_name: String,
    #[serde(default)]
    pub sender_profile_picture: Option<String>,
    #[serde(default)]
    pub receiver_profile_picture: Option<String>,
}

impl Message {
    /// The other participant of the conversation this message belongs to
    pub fn peer_of(&self, local_user: u64) -> u64 {
        if self.sender == local_user {
            self.receiver
        } else {
            self.sender
        }
    }

    /// Whether the given user wrote this message
    pub fn is_from(&self, user: u64) -> bool {
        self.sender == user
    }

    /// Whether the given user is on either side of this message
    pub fn involves(&self, user: u64) -> bool {
        self.sender == user || self.receiver == user
    }
}
