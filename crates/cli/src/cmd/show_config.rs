//! Print the effective configuration

use crate::config::{self, MigrateConfig};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;

pub fn run(config: &MigrateConfig, example: bool) -> Result<()> {
    if example {
        print!("{}", config::example_config());
        return Ok(());
    }

    match config::config_file_path() {
        Some(path) if path.exists() => {
            println!("{} {}", "# Default config file:".dimmed(), path.display())
        }
        Some(path) => println!(
            "{} {} {}",
            "# Default config file:".dimmed(),
            path.display(),
            "(not present)".dimmed()
        ),
        None => {}
    }

    let rendered = toml::to_string_pretty(config).context("Failed to render config")?;
    print!("{}", rendered);
    Ok(())
}
