pub mod auth;
pub mod citations;
pub mod composer;
pub mod config;
pub mod connection;
pub mod debounce;
pub mod highlight;
pub mod markup;
pub mod protocol;
pub mod session;
pub mod store;
pub mod stream;

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{chat::ChatArgs, conversations::ConversationCommand, documents::DocumentCommand, App};
use config::ClientConfig;

#[derive(Parser)]
#[command(name = "docchat")]
#[command(about = "Chat with an assistant grounded in your document corpus", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file; DOCCHAT_* variables and flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// REST base url, e.g. http://localhost:8000/api
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// WebSocket base url, e.g. ws://localhost:8000/api
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// Bearer token
    #[arg(long, global = true)]
    token: Option<String>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive chat
    Chat(ChatArgs),
    /// Manage conversations
    #[command(subcommand)]
    Conversations(ConversationCommand),
    /// Browse documents
    #[command(subcommand)]
    Documents(DocumentCommand),
}

impl Cli {
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?
                .with_env(),
            None => ClientConfig::from_env(),
        };

        if let Some(url) = &self.api_url {
            config.api_base_url = url.clone();
        }
        if let Some(url) = &self.ws_url {
            config.ws_base_url = url.clone();
        }
        if let Some(token) = &self.token {
            config.token = Some(token.clone());
        }
        Ok(config)
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .target(env_logger::Target::Stderr)
        .init();
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let app = App::new(cli.client_config()?);
    match cli.command {
        Commands::Chat(args) => commands::chat::run(&app, args).await,
        Commands::Conversations(command) => commands::conversations::run(&app, command).await,
        Commands::Documents(command) => commands::documents::run(&app, command).await,
    }
}
