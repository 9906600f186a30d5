/// History loader: one authenticated read of the durable message log
///
/// Also carries the REST side channel used by the "contact the ad owner"
/// action, which writes into the same durable log the channel echoes from.
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::message::Message;
use crate::session::Session;
use crate::store::MessageStore;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone)]
pub struct HistoryLoader {
    client: reqwest::Client,
    api_base: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct PostMessageBody<'a> {
    receiver: u64,
    text: &'a str,
}

impl HistoryLoader {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.clone(),
            timeout: config.http_timeout,
        }
    }

    /// Fetch the full message history for the current session and ingest it
    /// as one atomic batch. The store is left untouched on any failure.
    ///
    /// The session epoch is captured before the request; if a logout or a
    /// re-login lands while the response is in flight, the stale result is
    /// discarded and `SessionChanged` is returned.
    pub async fn load(&self, session: &Session, store: &MessageStore) -> Result<usize> {
        let credentials = session.credentials().await.ok_or(ChatError::AuthRequired)?;
        let epoch = session.epoch().await;

        let url = format!("{}/api/messages/", self.api_base);
        debug!("Fetching message history from {}", url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", credentials.token))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ChatError::HistoryUnavailable(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ChatError::HistoryUnavailable(format!(
                "status {}",
                response.status()
            )));
        }

        let records: Vec<Message> = response
            .json()
            .await
            .map_err(|e| ChatError::HistoryUnavailable(format!("invalid body: {}", e)))?;

        if session.epoch().await != epoch {
            debug!("Discarding history response from a previous session epoch");
            return Err(ChatError::SessionChanged);
        }

        let added = store.ingest_batch(records).await;
        info!("History loaded: {} new messages", added);
        Ok(added)
    }

    /// Write one message through the REST send endpoint.
    ///
    /// This is the initial-contact path; it produces the same record shape
    /// as the live channel, so the created message is returned ready to be
    /// ingested.
    pub async fn post_message(
        &self,
        session: &Session,
        receiver: u64,
        text: &str,
    ) -> Result<Message> {
        let credentials = session.credentials().await.ok_or(ChatError::AuthRequired)?;

        let url = format!("{}/api/messages/send/", self.api_base);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", credentials.token))
            .json(&PostMessageBody { receiver, text })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ChatError::Api(format!("send request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ChatError::Api(format!("send status {}", response.status())));
        }

        response
            .json()
            .await
            .map_err(|e| ChatError::Api(format!("invalid send response: {}", e)))
    }
}
