use std::io::Read;

use clap::Args;
use serde_json::{json, Map, Value};

use crate::cli::client::UqlClient;
use crate::cli::utils::{output_response, parse_json_arg};
use crate::cli::OutputFormat;

#[derive(Args)]
pub struct CallArgs {
    #[arg(help = "Intent name, e.g. models.user.find (omit with --stdin)")]
    pub intent: Option<String>,
    #[arg(long, help = "JSON object of intent arguments")]
    pub args: Option<String>,
    #[arg(long, help = "JSON field selector; defaults to \"$all\"")]
    pub fields: Option<String>,
    #[arg(long, help = "Read a raw envelope or batch from stdin")]
    pub stdin: bool,
}

/// Builds the request body described by the command line
pub fn request_body(args: &CallArgs) -> anyhow::Result<Value> {
    let Some(intent) = &args.intent else {
        anyhow::bail!("an intent name is required unless --stdin is given");
    };
    let call_args = match parse_json_arg("args", args.args.as_deref())? {
        None => Value::Object(Map::new()),
        Some(Value::Object(map)) => Value::Object(map),
        Some(_) => anyhow::bail!("--args must be a JSON object"),
    };
    let fields = parse_json_arg("fields", args.fields.as_deref())?.unwrap_or_else(|| json!("$all"));

    Ok(json!({ "intent": intent, "fields": fields, "args": call_args }))
}

pub async fn handle(args: CallArgs, client: &UqlClient, output_format: OutputFormat) -> anyhow::Result<()> {
    let body = if args.stdin {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        serde_json::from_str(&raw)?
    } else {
        request_body(&args)?
    };

    let response = client.call(&body).await?;
    output_response(&output_format, &response)
}
