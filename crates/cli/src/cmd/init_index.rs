//! Create the destination index

use crate::config::MigrateConfig;
use crate::elastic::ElasticSink;
use anyhow::Result;
use owo_colors::OwoColorize;

pub fn run(config: &MigrateConfig) -> Result<()> {
    let sink = ElasticSink::new(&config.destination)?;

    if sink.ensure_index()? {
        println!("{} Created index {}", "✓".green(), sink.index_name().cyan());
    } else {
        println!(
            "{} Index {} already exists",
            "→".dimmed(),
            sink.index_name().cyan()
        );
    }
    Ok(())
}
