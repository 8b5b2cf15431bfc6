//! Engine configuration.
//!
//! Built in code with the `with_*` methods, or read from `IMPOSTOR_*`
//! environment variables with [`EngineConfig::from_env`].

use crate::model::PlayerId;
use crate::policy::{
    ScalingPolicy, SessionRules, DEFAULT_MIN_PLAYERS, DEFAULT_SKIP_ALLOWANCE, DEFAULT_VOTE_TIMEOUT,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors from reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// JSON catalog file. `None` keeps the catalog in memory only.
    pub catalog_path: Option<PathBuf>,

    /// Minimum players required to start.
    pub min_players: usize,

    /// How many impostors a game gets.
    pub scaling: ScalingPolicy,

    /// Objective skips per game.
    pub skip_allowance: u32,

    /// How long a vote stays open without quorum.
    pub vote_timeout: Duration,

    /// Players allowed to run admin commands. Empty means everyone.
    pub admins: BTreeSet<PlayerId>,

    /// Seed for role assignment and draw orders.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            catalog_path: None,
            min_players: DEFAULT_MIN_PLAYERS,
            scaling: ScalingPolicy::default(),
            skip_allowance: DEFAULT_SKIP_ALLOWANCE,
            vote_timeout: DEFAULT_VOTE_TIMEOUT,
            admins: BTreeSet::new(),
            seed: None,
        }
    }

    /// Read `IMPOSTOR_*` variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(path) = lookup("IMPOSTOR_CATALOG") {
            config.catalog_path = Some(PathBuf::from(path));
        }
        if let Some(n) = parse(&lookup, "IMPOSTOR_MIN_PLAYERS")? {
            config.min_players = n;
        }
        if let Some(threshold) = parse(&lookup, "IMPOSTOR_PAIR_THRESHOLD")? {
            config.scaling = ScalingPolicy::Headcount {
                pair_threshold: threshold,
            };
        }
        // A fixed count wins over a threshold.
        if let Some(impostors) = parse(&lookup, "IMPOSTOR_FIXED_IMPOSTORS")? {
            config.scaling = ScalingPolicy::Fixed { impostors };
        }
        if let Some(skips) = parse(&lookup, "IMPOSTOR_SKIP_ALLOWANCE")? {
            config.skip_allowance = skips;
        }
        if let Some(secs) = parse(&lookup, "IMPOSTOR_VOTE_TIMEOUT_SECS")? {
            config.vote_timeout = Duration::from_secs(secs);
        }
        if let Some(list) = lookup("IMPOSTOR_ADMINS") {
            config.admins = parse_admins(&list).ok_or(ConfigError::InvalidValue {
                var: "IMPOSTOR_ADMINS",
                value: list.clone(),
            })?;
        }
        if let Some(seed) = parse(&lookup, "IMPOSTOR_SEED")? {
            config.seed = Some(seed);
        }

        Ok(config)
    }

    /// Set the catalog file.
    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = Some(path.into());
        self
    }

    pub fn with_min_players(mut self, min_players: usize) -> Self {
        self.min_players = min_players;
        self
    }

    pub fn with_scaling(mut self, scaling: ScalingPolicy) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_skip_allowance(mut self, skips: u32) -> Self {
        self.skip_allowance = skips;
        self
    }

    pub fn with_vote_timeout(mut self, timeout: Duration) -> Self {
        self.vote_timeout = timeout;
        self
    }

    /// Add an admin.
    pub fn with_admin(mut self, admin: PlayerId) -> Self {
        self.admins.insert(admin);
        self
    }

    /// Fix the random seed for reproducible games.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Whether `player` may run admin commands.
    pub fn is_admin(&self, player: PlayerId) -> bool {
        self.admins.is_empty() || self.admins.contains(&player)
    }

    /// Rules handed to every new session.
    pub fn session_rules(&self) -> SessionRules {
        SessionRules {
            skip_allowance: self.skip_allowance,
            vote_timeout: self.vote_timeout,
        }
    }

    pub fn pair_threshold(&self) -> Option<usize> {
        match self.scaling {
            ScalingPolicy::Headcount { pair_threshold } => Some(pair_threshold),
            ScalingPolicy::Fixed { .. } => None,
        }
    }
}

fn parse<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}

fn parse_admins(list: &str) -> Option<BTreeSet<PlayerId>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok().map(PlayerId))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DEFAULT_PAIR_THRESHOLD;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::new());
        assert_eq!(config.min_players, 3);
        assert_eq!(config.pair_threshold(), Some(DEFAULT_PAIR_THRESHOLD));
        assert_eq!(config.vote_timeout, Duration::from_secs(300));
        assert!(config.is_admin(PlayerId(12345)));
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("IMPOSTOR_CATALOG", "/tmp/tasks.json"),
            ("IMPOSTOR_MIN_PLAYERS", "4"),
            ("IMPOSTOR_PAIR_THRESHOLD", "8"),
            ("IMPOSTOR_VOTE_TIMEOUT_SECS", "30"),
            ("IMPOSTOR_ADMINS", "10, 20"),
            ("IMPOSTOR_SEED", "99"),
        ]))
        .unwrap();

        assert_eq!(config.catalog_path, Some(PathBuf::from("/tmp/tasks.json")));
        assert_eq!(config.min_players, 4);
        assert_eq!(config.scaling, ScalingPolicy::Headcount { pair_threshold: 8 });
        assert_eq!(config.vote_timeout, Duration::from_secs(30));
        assert!(config.is_admin(PlayerId(20)));
        assert!(!config.is_admin(PlayerId(30)));
        assert_eq!(config.seed, Some(99));
    }

    #[test]
    fn test_fixed_impostors_wins() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("IMPOSTOR_PAIR_THRESHOLD", "8"),
            ("IMPOSTOR_FIXED_IMPOSTORS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.scaling, ScalingPolicy::Fixed { impostors: 3 });
        assert_eq!(config.pair_threshold(), None);
    }

    #[test]
    fn test_invalid_value() {
        let err = EngineConfig::from_lookup(lookup(&[("IMPOSTOR_MIN_PLAYERS", "many")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for IMPOSTOR_MIN_PLAYERS: \"many\"");

        let err = EngineConfig::from_lookup(lookup(&[("IMPOSTOR_ADMINS", "1,x")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "IMPOSTOR_ADMINS", .. }));
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_min_players(5)
            .with_skip_allowance(2)
            .with_admin(PlayerId(1))
            .with_seed(3);
        assert_eq!(config.session_rules().skip_allowance, 2);
        assert!(!config.is_admin(PlayerId(2)));
        assert_eq!(config.seed, Some(3));
    }
}
