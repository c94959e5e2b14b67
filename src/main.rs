//! Boardroom CLI entry point

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use boardroom::app::App;
use boardroom::config::{self, Config};
use boardroom::dispatcher::TurnOutcome;
use boardroom::queue::TurnQueue;
use boardroom::server::BoardroomServer;
use boardroom::store::{MessageStore, SqliteStore};
use boardroom::ui;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "boardroom")]
#[command(about = "Boardroom - a meeting room where the CEO's questions reach the right agent")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.boardroom/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Start the HTTP API
    Serve {
        /// Address to bind (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Post a message as the CEO and wait for the reply
    Send {
        /// Message text
        text: String,

        /// Display name of the sender
        #[arg(short, long, default_value = "CEO")]
        user_name: String,

        /// Meeting room (defaults to the configured room)
        #[arg(short, long)]
        room: Option<i64>,
    },

    /// Show which agent would answer a message, without posting it
    Route {
        /// Message text
        text: String,
    },

    /// Show configuration and store status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);

    match cli.command {
        Commands::Init => {
            if config::init(&config_path)? {
                ui::print_success(&format!("Wrote {}", config_path.display()));
                println!("\nNext steps:");
                println!("  1. Add your API key to {} (or set {})", config_path.display(), config::API_KEY_ENV);
                println!("  2. Add a Microsoft Graph token (or set {})", config::GRAPH_TOKEN_ENV);
                println!("  3. Run: boardroom serve");
            } else {
                ui::print_warning(&format!("Config already exists at {}", config_path.display()));
            }
        }

        Commands::Serve { bind } => {
            let config = load_config(&cli.config)?;
            let bind: SocketAddr = bind
                .as_deref()
                .unwrap_or(config.bind.as_str())
                .parse()
                .context("Invalid bind address")?;

            ui::print_header(&config.model, &config.provider);
            let app = App::from_config(config).await?;
            if app.config.greet_on_startup {
                for greeting in app.greet().await? {
                    ui::print_message(&greeting);
                }
            }

            let (queue, worker) = TurnQueue::spawn(app.dispatcher.clone());
            let resumed = queue.resubmit_unanswered(&app.dispatcher).await?;
            if resumed > 0 {
                ui::print_step(&format!("Resuming {} unanswered messages", resumed));
            }

            let server = BoardroomServer::new(bind, app.dispatcher.clone(), queue, app.config.default_room_id);
            ui::print_step(&format!("Listening on http://{}", bind));
            server.run().await?;

            // The server held the last queue handle; finish the accepted turns
            ui::print_thinking("Finishing queued turns");
            worker.await?;
        }

        Commands::Send { text, user_name, room } => {
            let config = load_config(&cli.config)?;
            let room = room.unwrap_or(config.default_room_id);
            let app = App::from_config(config).await?;

            let question = app.dispatcher.post(&user_name, &text, room).await?;
            ui::print_message(&question);
            ui::print_thinking("Routing");

            match app.dispatcher.handle_inbound(&question).await? {
                TurnOutcome::Replied(reply) => ui::print_message(&reply),
                outcome => ui::print_warning(&format!("No reply ({:?})", outcome)),
            }
        }

        Commands::Route { text } => {
            let config = load_config(&cli.config)?;
            let app = App::from_config(config).await?;
            let agent = app.dispatcher.route(&text).await?;
            ui::print_success(&format!("{} ({})", agent.role(), agent.name()));
        }

        Commands::Status => {
            let config = load_config(&cli.config)?;
            println!("Boardroom Status\n");
            println!("Config: {}", config_path.display());
            println!("Database: {}", config.database.display());
            println!("Provider: {}", config.provider);
            println!("Model: {}", config.model);
            println!("API key: {}", if config.api_key.is_empty() { "not set" } else { "✓" });
            println!(
                "Graph token: {}",
                if config.graph.access_token.is_empty() { "not set" } else { "✓" }
            );
            println!("Principal: {}", config.principal_role);
            println!("Tool call limit: {}", config.tool_call_limit);

            println!("\nAgents:");
            for agent in &config.agents {
                let tools = if agent.tools.is_empty() {
                    "no tools".to_string()
                } else {
                    agent.tools.join(", ")
                };
                println!("  {} ({}) - {}", agent.role, agent.name, tools);
            }

            let store = SqliteStore::open(&config.database)?;
            let rooms = store.rooms().await?;
            println!("\nRooms:");
            for room in &rooms {
                println!("  #{} - {} messages", room.id, room.messages.len());
            }
            if rooms.is_empty() {
                println!("  none yet");
            }
        }
    }

    Ok(())
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => config::load_from(path)?,
        None => config::load()?,
    };
    Ok(config)
}
