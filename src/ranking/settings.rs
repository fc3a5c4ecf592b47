use anyhow::{bail, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct EloSettings {
    pub initial_rating: f64,
    pub k_provisional: f64,
    pub k_established: f64,
    /// Below this many games on either side the provisional K applies.
    pub provisional_games: u32,
}

impl Default for EloSettings {
    fn default() -> Self {
        EloSettings {
            initial_rating: 1500.0,
            k_provisional: 32.0,
            k_established: 16.0,
            provisional_games: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RankingSettings {
    pub pool_limit: usize,
    pub exploration_window: usize,
    pub rival_window: usize,
    pub history_size: usize,
    pub elo: EloSettings,
}

impl Default for RankingSettings {
    fn default() -> Self {
        RankingSettings {
            pool_limit: 300,
            exploration_window: 15,
            rival_window: 5,
            history_size: 10,
            elo: EloSettings::default(),
        }
    }
}

impl RankingSettings {
    pub fn validate(&self) -> Result<()> {
        if self.pool_limit < 2 {
            bail!("pool_limit must be at least 2, got {}", self.pool_limit);
        }
        if self.exploration_window == 0 {
            bail!("exploration_window must be greater than 0");
        }
        if self.rival_window == 0 {
            bail!("rival_window must be greater than 0");
        }
        if !self.elo.initial_rating.is_finite() {
            bail!("initial_rating must be a finite number");
        }
        for (name, k) in [
            ("k_provisional", self.elo.k_provisional),
            ("k_established", self.elo.k_established),
        ] {
            if !k.is_finite() || k <= 0.0 {
                bail!("{} must be a positive number, got {}", name, k);
            }
        }
        Ok(())
    }
}
