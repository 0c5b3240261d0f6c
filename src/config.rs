use crate::domain::Decimal;
use std::collections::HashMap;
use thiserror::Error;

/// Deepest relationship depth a commission plan may pay on.
pub const MAX_TIER_DEPTH: u8 = 9;

const DEFAULT_COMMISSION_TIERS: &str = "1:10,2:5";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Tier percentages by relationship depth; injected, never hard-coded.
    pub commission_plan: CommissionPlan,
    /// Upper bound on the `maxDepth` a network snapshot request may ask for.
    pub snapshot_max_depth: i64,
    /// Frontier batch size for downline traversal queries.
    pub team_batch_size: usize,
}

/// A payout percentage for one relationship depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierRate {
    pub depth: u8,
    pub rate_percent: Decimal,
}

/// Commission plan: which depths pay, and at what percentage.
///
/// Parsed from `depth:percent` pairs, e.g. `"1:10,2:5"` pays 10% on direct
/// (depth 1) activity and 5% on level-two activity. Depths must be unique,
/// between 1 and [`MAX_TIER_DEPTH`], with rates between 0 and 100.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionPlan {
    tiers: Vec<TierRate>,
}

impl CommissionPlan {
    /// Parse the `depth:percent` pair list. The returned plan is sorted by
    /// depth.
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut tiers: Vec<TierRate> = Vec::new();
        for pair in s.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (depth_str, rate_str) = pair
                .split_once(':')
                .ok_or_else(|| format!("tier '{}' is not depth:percent", pair))?;
            let depth: u8 = depth_str
                .trim()
                .parse()
                .map_err(|_| format!("tier depth '{}' is not a number", depth_str))?;
            if depth == 0 || depth > MAX_TIER_DEPTH {
                return Err(format!(
                    "tier depth {} out of range 1..={}",
                    depth, MAX_TIER_DEPTH
                ));
            }
            let rate_percent = Decimal::from_str_canonical(rate_str.trim())
                .map_err(|_| format!("tier rate '{}' is not a decimal", rate_str))?;
            if rate_percent.is_negative()
                || rate_percent > Decimal::from_str_canonical("100").expect("100 is a valid decimal")
            {
                return Err(format!("tier rate {} out of range 0..=100", rate_percent));
            }
            if tiers.iter().any(|t| t.depth == depth) {
                return Err(format!("tier depth {} configured twice", depth));
            }
            tiers.push(TierRate {
                depth,
                rate_percent,
            });
        }
        if tiers.is_empty() {
            return Err("commission plan has no tiers".to_string());
        }
        tiers.sort_by_key(|t| t.depth);
        Ok(CommissionPlan { tiers })
    }

    /// Deepest configured depth; bounds the evaluation scan.
    pub fn max_depth(&self) -> u8 {
        self.tiers.last().map(|t| t.depth).unwrap_or(0)
    }

    /// Rate for a relationship depth, if that depth pays.
    pub fn rate_for_depth(&self, depth: u8) -> Option<Decimal> {
        self.tiers
            .iter()
            .find(|t| t.depth == depth)
            .map(|t| t.rate_percent)
    }

    /// Configured tiers, ascending by depth.
    pub fn tiers(&self) -> &[TierRate] {
        &self.tiers
    }
}

impl Default for CommissionPlan {
    fn default() -> Self {
        Self::parse(DEFAULT_COMMISSION_TIERS).expect("default commission plan is valid")
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let commission_plan = CommissionPlan::parse(
            env_map
                .get("COMMISSION_TIERS")
                .map(|s| s.as_str())
                .unwrap_or(DEFAULT_COMMISSION_TIERS),
        )
        .map_err(|msg| ConfigError::InvalidValue("COMMISSION_TIERS".to_string(), msg))?;

        let snapshot_max_depth = env_map
            .get("SNAPSHOT_MAX_DEPTH")
            .map(|s| s.as_str())
            .unwrap_or("6")
            .parse::<i64>()
            .ok()
            .filter(|d| (1..=16).contains(d))
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "SNAPSHOT_MAX_DEPTH".to_string(),
                    "must be an integer between 1 and 16".to_string(),
                )
            })?;

        let team_batch_size = env_map
            .get("TEAM_BATCH_SIZE")
            .map(|s| s.as_str())
            .unwrap_or("500")
            .parse::<usize>()
            .ok()
            // SQLite caps bound parameters at 999 per statement.
            .filter(|b| (1..=900).contains(b))
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "TEAM_BATCH_SIZE".to_string(),
                    "must be an integer between 1 and 900".to_string(),
                )
            })?;

        Ok(Config {
            port,
            database_path,
            commission_plan,
            snapshot_max_depth,
            team_batch_size,
        })
    }
}
