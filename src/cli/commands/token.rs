use clap::Args;
use serde_json::json;

use crate::auth::{generate_jwt, Claims};
use crate::cli::config::{load_client_config, save_client_config};
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;

#[derive(Args)]
pub struct TokenArgs {
    #[arg(long, help = "User id carried in the token")]
    pub user_id: String,
    #[arg(long, default_value = "user", help = "Role the gateway resolves policies under")]
    pub role: String,
    #[arg(long, default_value_t = 24, help = "Hours until the token expires")]
    pub hours: u64,
    #[arg(long, help = "Signing secret (defaults to JWT_SECRET)")]
    pub secret: Option<String>,
    #[arg(long, help = "Store the token for later commands")]
    pub save: bool,
}

/// Numeric ids stay numbers so they compare equal to stored keys
fn user_id(raw: &str) -> serde_json::Value {
    raw.parse::<i64>().map(|id| json!(id)).unwrap_or_else(|_| json!(raw))
}

pub fn handle(args: TokenArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let secret = match args.secret.or_else(|| std::env::var("JWT_SECRET").ok()) {
        Some(secret) => secret,
        None => anyhow::bail!("no signing secret: pass --secret or set JWT_SECRET"),
    };

    let claims = Claims::new(user_id(&args.user_id), args.role, args.hours);
    let token = generate_jwt(&claims, &secret)?;

    if args.save {
        let mut config = load_client_config()?;
        config.token = Some(token.clone());
        save_client_config(&config)?;
    }

    match output_format {
        OutputFormat::Json => output_success(&output_format, "Token issued", Some(json!({ "token": token, "claims": claims }))),
        OutputFormat::Text => {
            println!("{}", token);
            Ok(())
        }
    }
}
