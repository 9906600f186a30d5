/// Unimarket inbox - terminal client entry point
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;
use unimarket_messaging::{cli, Config, Inbox, Session};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    // Parse configuration and credentials
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let (token, user_id, username) = cli::parse_login(&args)
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let session = Session::new();
    session.login(token, user_id, username).await;

    let inbox = Inbox::new(&config, session);
    info!("Starting Unimarket inbox");
    info!("   API: {}", config.api_base);
    info!("   Chat: {}", config.ws_base);

    inbox.start().await
        .map_err(|e| anyhow::anyhow!("Startup error: {}", e))?;

    cli::run(inbox).await
}
