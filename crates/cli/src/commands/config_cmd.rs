//! `mcpagent config` — Show the effective configuration.

use mcpagent_config::AppConfig;
use std::path::Path;

pub fn show(config: &AppConfig, path: Option<&Path>) -> anyhow::Result<()> {
    let default_path = AppConfig::config_dir().join("config.toml");
    let path = path.unwrap_or(default_path.as_path());
    let source = if path.exists() { "" } else { " (not found, using defaults)" };

    println!("# {}{source}", path.display());
    println!("{}", config.redacted_toml());

    if let Err(e) = config.validate() {
        eprintln!("   ⚠️  {e}");
    }
    Ok(())
}
