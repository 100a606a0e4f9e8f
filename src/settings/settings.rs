use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub feed: Feed,
    pub directory: Directory,
    pub log: Log,
}

#[derive(Debug, Deserialize)]
pub struct Feed {
    pub page_size: usize,
    pub overfetch: usize,
}

#[derive(Debug, Deserialize)]
pub struct Directory {
    /// Upper bound on the profiles scanned per search/match call.
    pub scan_cap: usize,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    Config::builder()
        .add_source(File::with_name(path))
        .build()
        .with_context(|| format!("reading settings from {path}"))?
        .try_deserialize()
        .with_context(|| format!("deserializing settings from {path}"))
}
