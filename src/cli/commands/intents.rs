use serde_json::Value;

use crate::cli::client::UqlClient;
use crate::cli::utils::output_envelope;
use crate::cli::OutputFormat;

/// Lists the gateway's published intents
pub async fn handle(filter: Option<String>, client: &UqlClient, output_format: OutputFormat) -> anyhow::Result<()> {
    let envelope = client.directory().await?;
    match output_format {
        OutputFormat::Json => {
            if output_envelope(&output_format, &envelope)? {
                anyhow::bail!("directory unavailable");
            }
        }
        OutputFormat::Text => {
            let Some(Value::Object(directory)) = envelope.get("data") else {
                output_envelope(&output_format, &envelope)?;
                anyhow::bail!("directory unavailable");
            };
            for (name, entry) in directory {
                if filter.as_deref().map_or(false, |f| !name.contains(f)) {
                    continue;
                }
                let required = entry["requiredArgs"].as_array().map(Vec::len).unwrap_or(0);
                println!("{:<32} {} required arg(s)  {}", name, required, entry["description"].as_str().unwrap_or(""));
            }
        }
    }
    Ok(())
}
