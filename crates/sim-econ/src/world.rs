//! World aggregator: cross-player averages consumed by the interaction models.

use sim_core::{PlayerId, PlayerResources, PlayerSnapshot, PolicyChoices, WorldState};

/// One player's state as seen by the aggregator.
#[derive(Clone, Copy, Debug)]
pub struct Participant<'a> {
    pub player_id: PlayerId,
    pub resources: &'a PlayerResources,
    pub policies: &'a PolicyChoices,
}

/// Normalized weights; uniform when the total is zero or not finite.
fn weights(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let total: f64 = values.iter().sum();
    if total > 0.0 && total.is_finite() {
        values.iter().map(|v| v / total).collect()
    } else {
        vec![1.0 / n as f64; n]
    }
}

fn weighted_mean(weights: &[f64], values: impl Iterator<Item = f64>) -> f64 {
    weights.iter().zip(values).map(|(w, v)| w * v).sum()
}

/// Aggregate the world from every participant in the pass.
///
/// Pure: the same participants always produce the same world, bit for bit.
/// With one participant every average is exactly that participant's value.
pub fn aggregate(participants: &[Participant<'_>]) -> WorldState {
    if participants.is_empty() {
        return WorldState::default();
    }
    let players: Vec<PlayerSnapshot> = participants
        .iter()
        .map(|p| PlayerSnapshot {
            player_id: p.player_id,
            gdp: p.resources.gdp,
            population: p.resources.population,
            interest_rate: p.resources.interest_rate,
            inflation: p.resources.inflation,
            exchange_rate: p.resources.exchange_rate,
            quality_of_life: p.resources.compute_quality_of_life(),
            tariff_rate: p.policies.tariff_rate,
        })
        .collect();

    let gdps: Vec<f64> = players.iter().map(|p| p.gdp).collect();
    let pops: Vec<f64> = players.iter().map(|p| p.population).collect();
    let by_gdp = weights(&gdps);
    let by_pop = weights(&pops);
    let uniform = vec![1.0 / players.len() as f64; players.len()];

    WorldState {
        avg_interest_rate: weighted_mean(&by_gdp, players.iter().map(|p| p.interest_rate)),
        avg_inflation: weighted_mean(&by_gdp, players.iter().map(|p| p.inflation)),
        avg_exchange_rate: weighted_mean(&by_gdp, players.iter().map(|p| p.exchange_rate)),
        avg_quality_of_life: weighted_mean(&by_pop, players.iter().map(|p| p.quality_of_life)),
        avg_tariff_rate: weighted_mean(&uniform, players.iter().map(|p| p.tariff_rate)),
        total_gdp: gdps.iter().sum(),
        total_population: pops.iter().sum(),
        player_count: players.len(),
        players,
    }
}
