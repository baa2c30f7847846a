//! Inputs and outputs of one resolution pass. Outputs are append-only history.

use crate::game::{GameId, PlayerId, QuarterId};
use crate::policy::PolicyChoices;
use crate::resources::PlayerResources;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything the resolver needs for one player in one quarter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolutionInput {
    pub player_id: PlayerId,
    pub resources: PlayerResources,
    pub policies: PolicyChoices,
    pub starting_resources: PlayerResources,
    pub quarters_played: u32,
    /// Seed for this player's random events in this quarter.
    pub rng_seed: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Shock,
    Achievement,
    Crisis,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    pub kind: EventKind,
    pub title: String,
    pub description: String,
    /// Field name to signed magnitude, for display.
    pub impact: BTreeMap<String, f64>,
}

impl GameEvent {
    pub fn new(kind: EventKind, title: &str, description: &str, impact: &[(&str, f64)]) -> Self {
        Self {
            kind,
            title: title.to_string(),
            description: description.to_string(),
            impact: impact
                .iter()
                .map(|(k, v)| ((*k).to_string(), *v))
                .collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub gdp_growth_component: f64,
    pub gdp_per_capita_component: f64,
    pub population_component: f64,
    pub stability_component: f64,
    /// Always <= 0.
    pub penalties: f64,
    pub total: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerOutcome {
    pub player_id: PlayerId,
    pub score: f64,
    pub resources: PlayerResources,
    pub score_breakdown: ScoreBreakdown,
    pub events: Vec<GameEvent>,
}

/// Per-player chart point stored after every quarter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetrics {
    pub player_id: PlayerId,
    #[serde(flatten)]
    pub resources: PlayerResources,
    pub score: f64,
    /// 1-based, highest score first.
    pub rank: u32,
}

/// One player's contribution to the world aggregate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub player_id: PlayerId,
    pub gdp: f64,
    pub population: f64,
    pub interest_rate: f64,
    pub inflation: f64,
    pub exchange_rate: f64,
    pub quality_of_life: f64,
    pub tariff_rate: f64,
}

/// Cross-player aggregates. Always derived from player state, never stored on its own.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    /// GDP-weighted.
    pub avg_interest_rate: f64,
    /// GDP-weighted.
    pub avg_inflation: f64,
    /// GDP-weighted.
    pub avg_exchange_rate: f64,
    /// Population-weighted.
    pub avg_quality_of_life: f64,
    /// Simple average.
    pub avg_tariff_rate: f64,
    pub total_gdp: f64,
    pub total_population: f64,
    pub player_count: usize,
    pub players: Vec<PlayerSnapshot>,
}

impl WorldState {
    /// Largest absolute move across the averages that drive convergence.
    pub fn max_average_change(&self, other: &WorldState) -> f64 {
        [
            self.avg_interest_rate - other.avg_interest_rate,
            self.avg_inflation - other.avg_inflation,
            self.avg_exchange_rate - other.avg_exchange_rate,
            self.avg_quality_of_life - other.avg_quality_of_life,
        ]
        .iter()
        .fold(0.0_f64, |acc, d| acc.max(d.abs()))
    }
}

/// Record of one resolved quarter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuarterResult {
    pub quarter_id: QuarterId,
    pub game_id: GameId,
    /// World the final iteration resolved against.
    pub world: WorldState,
    pub iterations: u32,
    pub converged: bool,
    pub outcomes: Vec<PlayerOutcome>,
    pub resolved_at: DateTime<Utc>,
}
