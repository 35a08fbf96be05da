//! Output formatting for CLI commands
//!
//! Data goes to stdout; status lines go to stderr so output can be piped.

use std::io::IsTerminal;

use colored::Colorize;
use serde_json::{Value, json};

use warden::{AuthorizationHeaderSet, ClientConfig};

/// Disables colors when stdout is not a terminal.
pub fn configure_colors() {
    if !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
}

/// Display headers as `Name: value` lines
pub fn display_headers(headers: &AuthorizationHeaderSet) {
    for (name, value) in headers.exposed_pairs() {
        println!("{}: {value}", name.bold());
    }
}

/// Display a client configuration bundle as pretty JSON
pub fn display_client_config(config: &ClientConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&client_config_json(config))?);
    Ok(())
}

/// Display a one-line status message on stderr
pub fn display_status(message: &str) {
    eprintln!("{} {message}", "✓".green().bold());
}

fn client_config_json(config: &ClientConfig) -> Value {
    let headers: serde_json::Map<String, Value> = config
        .headers
        .exposed_pairs()
        .into_iter()
        .map(|(name, value)| (name.to_string(), Value::from(value)))
        .collect();

    json!({
        "base_url": config.base_url.as_str(),
        "certificate_path": config.certificate_path.display().to_string(),
        "private_key_path": config.private_key_path.display().to_string(),
        "headers": headers,
    })
}
