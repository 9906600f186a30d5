/// Authenticated session state
///
/// The session object replaces the web client's ambient auth context: it is
/// passed by reference into the history loader and the live channel, and its
/// lifetime is driven by explicit login/logout calls.
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Credential material for one logged-in user
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Bearer token issued by the marketplace API
    pub token: String,
    /// The local user's identifier
    pub user_id: u64,
    /// The local user's display name
    pub username: String,
}

struct SessionState {
    credentials: Option<Credentials>,
    /// Bumped on every login/logout so in-flight responses can detect
    /// that the credential they were issued under is gone
    epoch: u64,
}

/// Shared handle to the authenticated session
#[derive(Clone)]
pub struct Session {
    inner: Arc<RwLock<SessionState>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionState {
                credentials: None,
                epoch: 0,
            })),
        }
    }

    /// Install a credential, starting a new epoch
    pub async fn login(&self, token: impl Into<String>, user_id: u64, username: impl Into<String>) {
        let mut state = self.inner.write().await;
        state.epoch += 1;
        state.credentials = Some(Credentials {
            token: token.into(),
            user_id,
            username: username.into(),
        });
        info!("Session opened for user {} (epoch {})", user_id, state.epoch);
    }

    /// Clear the credential, starting a new epoch
    pub async fn logout(&self) {
        let mut state = self.inner.write().await;
        state.epoch += 1;
        state.credentials = None;
        info!("Session closed (epoch {})", state.epoch);
    }

    /// Current credential, if logged in
    pub async fn credentials(&self) -> Option<Credentials> {
        self.inner.read().await.credentials.clone()
    }

    /// The local user's identifier, if logged in
    pub async fn local_user(&self) -> Option<u64> {
        self.inner.read().await.credentials.as_ref().map(|c| c.user_id)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.read().await.credentials.is_some()
    }

    /// Current credential epoch (see stale-response guard in the history loader)
    pub async fn epoch(&self) -> u64 {
        self.inner.read().await.epoch
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
