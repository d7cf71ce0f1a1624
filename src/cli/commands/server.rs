use clap::Subcommand;
use serde_json::json;

use crate::cli::client::UqlClient;
use crate::cli::config::{load_client_config, save_client_config};
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum ServerCommands {
    #[command(about = "Remember the gateway url for later commands")]
    Use {
        #[arg(help = "Gateway base url, e.g. http://localhost:3000")]
        url: String,
    },

    #[command(about = "Show the configured gateway")]
    Current,

    #[command(about = "Check gateway health from the /health endpoint")]
    Health,
}

pub async fn handle(cmd: ServerCommands, client: &UqlClient, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ServerCommands::Use { url } => {
            UqlClient::new(&url, None)?;
            let mut config = load_client_config()?;
            config.server = url.clone();
            save_client_config(&config)?;
            output_success(&output_format, &format!("Using server {}", url), Some(json!({ "server": url })))
        }
        ServerCommands::Current => {
            let config = load_client_config()?.with_env_overrides();
            output_success(
                &output_format,
                &format!("Current server: {}", config.server),
                Some(json!({ "server": config.server, "authenticated": config.token.is_some() })),
            )
        }
        ServerCommands::Health => {
            let health = client.health().await?;
            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&health)?),
                OutputFormat::Text => println!(
                    "status: {}  store: {}",
                    health["data"]["status"].as_str().unwrap_or("unknown"),
                    health["data"]["store"].as_str().unwrap_or("unavailable")
                ),
            }
            Ok(())
        }
    }
}
