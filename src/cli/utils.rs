use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });
            if let (Some(Value::Object(extra)), Some(body)) = (data, response.as_object_mut()) {
                body.extend(extra);
            }
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Prints one response envelope; returns whether it carried an error
pub fn output_envelope(output_format: &OutputFormat, envelope: &Value) -> anyhow::Result<bool> {
    let has_error = envelope["meta"]["hasError"].as_bool().unwrap_or(false);
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(envelope)?),
        OutputFormat::Text if has_error => {
            let error = &envelope["error"];
            eprintln!(
                "Error [{}] ({}): {}",
                error["errorCode"].as_str().unwrap_or("unknown"),
                envelope["statusCode"],
                error["message"].as_str().unwrap_or("")
            );
        }
        OutputFormat::Text => {
            if let Some(warning) = envelope["warning"].as_str() {
                eprintln!("Warning: {}", warning);
            }
            println!("{}", serde_json::to_string_pretty(&envelope["data"])?);
        }
    }
    Ok(has_error)
}

/// Prints a single envelope or every envelope of a batch; errors if any failed
pub fn output_response(output_format: &OutputFormat, response: &Value) -> anyhow::Result<()> {
    let failed = match response {
        Value::Array(envelopes) => {
            let mut failed = 0;
            for envelope in envelopes {
                if output_envelope(output_format, envelope)? {
                    failed += 1;
                }
            }
            failed
        }
        envelope => usize::from(output_envelope(output_format, envelope)?),
    };
    if failed > 0 {
        anyhow::bail!("{} intent(s) failed", failed);
    }
    Ok(())
}

/// Parses an optional JSON argument from the command line
pub fn parse_json_arg(name: &str, raw: Option<&str>) -> anyhow::Result<Option<Value>> {
    raw.map(|raw| serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("--{} is not valid JSON: {}", name, e)))
        .transpose()
}
