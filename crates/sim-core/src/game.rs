//! Games, players and quarters as seen by the resolution engine.

use crate::resources::PlayerResources;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GameId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuarterId(pub i64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "game#{}", self.0)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

impl fmt::Display for QuarterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "quarter#{}", self.0)
    }
}

/// `waiting → active → completed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Waiting,
    Active,
    Completed,
}

/// `active → resolving → completed`. Only the first edge is a concurrency gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarterStatus {
    Active,
    Resolving,
    Completed,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Waiting => "waiting",
            GameStatus::Active => "active",
            GameStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(GameStatus::Waiting),
            "active" => Some(GameStatus::Active),
            "completed" => Some(GameStatus::Completed),
            _ => None,
        }
    }
}

impl QuarterStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QuarterStatus::Active => "active",
            QuarterStatus::Resolving => "resolving",
            QuarterStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(QuarterStatus::Active),
            "resolving" => Some(QuarterStatus::Resolving),
            "completed" => Some(QuarterStatus::Completed),
            _ => None,
        }
    }
}

/// How cross-country interactions see the rest of the world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// One pass against the world as it entered the quarter.
    #[default]
    Lagged,
    /// Iterate against the updated world until it stops moving.
    Equilibrium,
}

/// What, besides the deadline sweep, may trigger resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Only the deadline (or an operator) resolves a quarter.
    Deadline,
    /// Resolve early once every active player has submitted.
    #[default]
    AllSubmit,
}

/// Relative weight of each score component.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub gdp_growth: f64,
    pub gdp_per_capita_growth: f64,
    pub population_growth: f64,
    pub stability: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPreset {
    #[default]
    BalancedGrowth,
    PureProsperity,
    PopulationPower,
    EconomicPowerhouse,
    StabilityDoctrine,
    Custom,
}

impl ScoringPreset {
    pub fn weights(self) -> ScoringWeights {
        let (gdp_growth, gdp_per_capita_growth, population_growth, stability) = match self {
            ScoringPreset::BalancedGrowth => (0.3, 0.3, 0.2, 0.2),
            ScoringPreset::PureProsperity => (0.2, 0.5, 0.0, 0.3),
            ScoringPreset::PopulationPower => (0.3, 0.2, 0.4, 0.1),
            ScoringPreset::EconomicPowerhouse => (0.6, 0.2, 0.0, 0.2),
            ScoringPreset::StabilityDoctrine => (0.15, 0.25, 0.1, 0.5),
            ScoringPreset::Custom => (0.25, 0.25, 0.25, 0.25),
        };
        ScoringWeights {
            gdp_growth,
            gdp_per_capita_growth,
            population_growth,
            stability,
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringPreset::BalancedGrowth.weights()
    }
}

/// Game configuration fixed at creation time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub name: String,
    pub total_quarters: u32,
    pub quarter_duration_seconds: u32,
    pub max_players: u32,
    pub min_players_to_start: u32,
    pub scoring_preset: ScoringPreset,
    /// Overrides the preset's weights when present.
    pub scoring_weights: Option<ScoringWeights>,
    pub resolution_mode: ResolutionMode,
    pub trigger_mode: TriggerMode,
    pub rng_seed: u64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            name: "Untitled".to_string(),
            total_quarters: 40,
            quarter_duration_seconds: 300,
            max_players: 10,
            min_players_to_start: 2,
            scoring_preset: ScoringPreset::BalancedGrowth,
            scoring_weights: None,
            resolution_mode: ResolutionMode::Lagged,
            trigger_mode: TriggerMode::AllSubmit,
            rng_seed: 42,
        }
    }
}

impl GameSettings {
    pub fn weights(&self) -> ScoringWeights {
        self.scoring_weights
            .unwrap_or_else(|| self.scoring_preset.weights())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub settings: GameSettings,
    pub status: GameStatus,
    /// Number of the quarter currently open (0 before the game starts).
    pub current_quarter: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub game_id: GameId,
    pub name: String,
    /// Last resolved score, rounded.
    pub score: i64,
    pub resources: PlayerResources,
    /// Baseline that growth scores are measured against.
    pub starting_resources: PlayerResources,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quarter {
    pub id: QuarterId,
    pub game_id: GameId,
    pub number: u32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: QuarterStatus,
    /// Set when the quarter is claimed for resolution.
    pub claimed_at: Option<DateTime<Utc>>,
}
