/// Configuration management
use crate::error::{ChatError, Result};
use std::time::Duration;

/// Messaging client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the marketplace REST API (history fetch, REST send path)
    pub api_base: String,

    /// Base URL of the chat WebSocket endpoint (the `/chat/` path is appended)
    pub ws_base: String,

    /// Timeout applied to each REST request
    pub http_timeout: Duration,

    /// Capacity of the live channel's outbound queue
    pub outbound_buffer: usize,

    /// Capacity of the inbox event broadcast channel
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8000".to_string(),
            ws_base: "ws://127.0.0.1:8000/ws".to_string(),
            http_timeout: Duration::from_secs(10),
            outbound_buffer: 64,
            event_buffer: 256,
        }
    }
}

impl Config {
    /// Create config from command line arguments.
    ///
    /// Only flags are consumed here; positional arguments (the login
    /// credentials) belong to the binary.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = Self::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--api-url" => {
                    let url = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--api-url requires a URL argument".to_string())
                    })?;
                    config.api_base = url.trim_end_matches('/').to_string();
                    i += 2;
                }
                "--ws-url" => {
                    let url = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--ws-url requires a URL argument".to_string())
                    })?;
                    config.ws_base = url.trim_end_matches('/').to_string();
                    i += 2;
                }
                "--http-timeout" => {
                    let secs = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--http-timeout requires a seconds argument".to_string())
                    })?;
                    let secs = secs.parse::<u64>().map_err(|_| {
                        ChatError::Config(
                            "--http-timeout must be a whole number of seconds".to_string(),
                        )
                    })?;
                    config.http_timeout = Duration::from_secs(secs);
                    i += 2;
                }
                _ => {
                    // Positional argument (credentials), handled by the binary
                    i += 1;
                }
            }
        }

        // Env overrides (nice for scripts)
        if let Ok(url) = std::env::var("UNIMARKET_API_URL") {
            config.api_base = url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = std::env::var("UNIMARKET_WS_URL") {
            config.ws_base = url.trim_end_matches('/').to_string();
        }

        Ok(config)
    }
}
