pub mod client;
pub mod commands;
pub mod config;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use client::UqlClient;

#[derive(Parser)]
#[command(name = "uqlc")]
#[command(about = "uqlc - command-line client for a uql-gateway server")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[arg(long, global = true, help = "Gateway base url (overrides UQL_SERVER and saved config)")]
    pub server: Option<String>,

    #[arg(long, global = true, help = "Bearer token (overrides UQL_TOKEN and saved config)")]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Invoke an intent")]
    Call(commands::call::CallArgs),

    #[command(about = "List published intents")]
    Intents {
        #[arg(help = "Only show intents whose name contains this text")]
        filter: Option<String>,
    },

    #[command(about = "Issue a signed token for a user and role")]
    Token(commands::token::TokenArgs),

    #[command(about = "Gateway selection and health")]
    Server {
        #[command(subcommand)]
        cmd: commands::server::ServerCommands,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

fn client(cli: &Cli) -> anyhow::Result<UqlClient> {
    let config = config::load_client_config()?.with_env_overrides();
    let server = cli.server.clone().unwrap_or(config.server);
    let token = cli.token.clone().or(config.token);
    UqlClient::new(&server, token)
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let client = client(&cli)?;

    match cli.command {
        Commands::Call(args) => commands::call::handle(args, &client, output_format).await,
        Commands::Intents { filter } => commands::intents::handle(filter, &client, output_format).await,
        Commands::Token(args) => commands::token::handle(args, output_format),
        Commands::Server { cmd } => commands::server::handle(cmd, &client, output_format).await,
    }
}
