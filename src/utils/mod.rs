pub mod retry;

use anyhow::{Context, Result};
use chrono::Utc;
use config::{Config, Environment, File, FileFormat};
use std::path::Path;
use tracing::info;

use crate::models::common::IndexerConfig;

pub const CONFIG_PATH_ENV: &str = "INDEXER_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// Load the indexer config from YAML, overlaid with `INDEXER__*` environment variables.
///
/// The file is optional so a deployment can be configured through the environment alone.
pub fn load_config<P: AsRef<Path>>(file_name: P) -> Result<IndexerConfig> {
    let config_path = file_name.as_ref();
    info!("Config path: {}", config_path.to_string_lossy());

    let settings = Config::builder()
        .add_source(
            File::from(config_path)
                .format(FileFormat::Yaml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix("INDEXER")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("sink.endpoints")
                .try_parsing(true),
        )
        .build()
        .context("failed to read config")?;

    let mut config: IndexerConfig = settings
        .try_deserialize()
        .context("failed to parse config")?;

    // Convert hyphens to underscores so the chain name is a valid metric label
    config.chain_name = config.chain_name.replace('-', "_");

    Ok(config)
}

/// Config file named by `INDEXER_CONFIG`, or `config.yml` in the working directory.
pub fn config_file_path() -> String {
    std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string())
}

pub fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

pub(crate) fn strip_html(error: &str) -> String {
    // If the error contains HTML tags, extract just the text content
    if error.contains("<!doctype html>") || error.contains("<html>") {
        // Remove all HTML tags and return the first non-empty line of text
        error
            .lines()
            .map(|line| line.trim())
            .find(|line| {
                !line.starts_with('<')
                    && !line.ends_with('>')
                    && !line.is_empty()
                    && !line.starts_with("<!")
                    && *line != "html"
                    && *line != "body"
            })
            .unwrap_or(error)
            .to_string()
    } else {
        // Return original error if no HTML
        error.to_string()
    }
}
