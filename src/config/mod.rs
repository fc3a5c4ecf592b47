mod file_config;

pub use file_config::{FileConfig, RankingFileConfig};

use crate::ranking::{EloSettings, RankingSettings};
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,

    pub ranking: RankingSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let ranking = resolve_ranking(file.ranking.unwrap_or_default());
        ranking
            .validate()
            .context("Invalid [ranking] configuration")?;

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            frontend_dir_path,
            ranking,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.db_dir.join("user.db")
    }

    pub fn ranking_db_path(&self) -> PathBuf {
        self.db_dir.join("ranking.db")
    }
}

fn resolve_ranking(file: RankingFileConfig) -> RankingSettings {
    let defaults = RankingSettings::default();
    let elo_defaults = EloSettings::default();
    RankingSettings {
        pool_limit: file.pool_limit.unwrap_or(defaults.pool_limit),
        exploration_window: file
            .exploration_window
            .unwrap_or(defaults.exploration_window),
        rival_window: file.rival_window.unwrap_or(defaults.rival_window),
        history_size: file.history_size.unwrap_or(defaults.history_size),
        elo: EloSettings {
            initial_rating: file.initial_rating.unwrap_or(elo_defaults.initial_rating),
            k_provisional: file.k_provisional.unwrap_or(elo_defaults.k_provisional),
            k_established: file.k_established.unwrap_or(elo_defaults.k_established),
            provisional_games: file
                .provisional_games
                .unwrap_or(elo_defaults.provisional_games),
        },
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
