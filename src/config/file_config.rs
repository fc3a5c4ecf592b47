use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,

    pub ranking: Option<RankingFileConfig>,
}

/// The `[ranking]` table. Anything left out keeps its default.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RankingFileConfig {
    pub pool_limit: Option<usize>,
    pub exploration_window: Option<usize>,
    pub rival_window: Option<usize>,
    pub history_size: Option<usize>,
    pub initial_rating: Option<f64>,
    pub k_provisional: Option<f64>,
    pub k_established: Option<f64>,
    pub provisional_games: Option<u32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
