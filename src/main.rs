use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use irbot::{
    bus::EventBus,
    completion::{ChatTransport, GatewayClient},
    config::Config,
    controller::ChatController,
    interface::{telegram::TelegramRelay, terminal::Terminal, ThreadRelay},
    mirror::HttpMirror,
    server::{self, AppState},
    store::{self, SqliteStore},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the chat proxy and mirroring routes
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Chat from the terminal against a running server
    Chat {
        #[arg(long)]
        server: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let dotenv = dotenvy::dotenv();

    // Logs go to stderr so the terminal chat keeps stdout to itself
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenv {
        // Not fatal, real env vars may be set
        info!("No .env file found or failed to load: {}", e);
    }

    let args = Args::parse();
    let config = Config::from_env()?;

    match args.command {
        Command::Serve { port } => serve(config, port).await,
        Command::Chat { server } => chat(config, server).await,
    }
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    info!("irbot server starting...");

    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;

    if config.gateway.api_key.is_none() {
        error!("AI_GATEWAY_API_KEY is not set; chat requests will fail");
    }
    let completion = Arc::new(GatewayClient::new(client, config.gateway.clone()));
    info!("Using model {}", completion.model());

    let relay: Option<Arc<dyn ThreadRelay>> = match &config.telegram {
        Some(telegram) => Some(Arc::new(TelegramRelay::new(telegram)?) as Arc<dyn ThreadRelay>),
        None => {
            info!("No Telegram token or chat id found, mirroring disabled.");
            None
        }
    };

    let state = Arc::new(AppState { completion, relay });
    let port = port.unwrap_or(config.port);

    server::serve(state, port, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
        }
    })
    .await
}

async fn chat(config: Config, server: Option<String>) -> anyhow::Result<()> {
    let server_url = server.unwrap_or(config.server_url);

    info!("Initializing widget store at {}", config.db_path.display());
    let kv = SqliteStore::new(&config.db_path).await?;
    kv.init().await?;
    let kv = Arc::new(kv);

    let session_id = store::load_or_assign_session_id(kv.as_ref()).await?;

    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;

    let bus = Arc::new(EventBus::new());
    let controller = ChatController::new(
        kv,
        Arc::new(ChatTransport::new(client.clone(), &server_url, session_id)),
        Arc::new(HttpMirror::new(client, &server_url)),
        bus.clone(),
    );

    Terminal::new(controller, &bus).run().await
}
