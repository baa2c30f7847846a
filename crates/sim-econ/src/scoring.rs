//! Score a player's trajectory and rank a quarter's outcomes.

use sim_core::{PlayerOutcome, PlayerResources, ScoreBreakdown, ScoringWeights, SnapshotMetrics};

/// 100 at the targets (2% inflation, 60% debt, 5% unemployment), 0 when far off.
pub fn stability_score(resources: &PlayerResources) -> f64 {
    let inflation_penalty = (resources.inflation - 2.0).abs() * 10.0;
    let debt_penalty = (resources.debt_to_gdp - 60.0).abs() * 0.5;
    let unemployment_penalty = (resources.unemployment - 5.0).abs() * 10.0;
    (100.0 - inflation_penalty - debt_penalty - unemployment_penalty).clamp(0.0, 100.0)
}

fn total_growth(current: f64, starting: f64) -> f64 {
    if starting > 0.0 {
        (current - starting) / starting
    } else {
        0.0
    }
}

/// Compound a total growth over `years` into an annual percent.
fn annualized_percent(total: f64, years: f64) -> f64 {
    let base = (1.0 + total).max(0.0);
    (base.powf(1.0 / years) - 1.0) * 100.0
}

/// Additive penalties for crises and depressions. Never positive.
pub fn penalties(resources: &PlayerResources) -> f64 {
    let mut p = 0.0;
    if resources.debt_to_gdp > 150.0 {
        p -= 50.0;
    }
    if resources.inflation > 20.0 {
        p -= 100.0;
    }
    if resources.gdp < resources.potential_gdp * 0.9 {
        p -= 10.0;
    }
    p
}

/// Score `current` against `starting` after `quarters_played` quarters.
///
/// Zero quarters scores exactly zero in every component.
pub fn score(
    current: &PlayerResources,
    starting: &PlayerResources,
    quarters_played: u32,
    weights: &ScoringWeights,
) -> ScoreBreakdown {
    if quarters_played == 0 {
        return ScoreBreakdown::default();
    }
    let years = f64::from(quarters_played) / 4.0;

    let gdp_annual = annualized_percent(total_growth(current.gdp, starting.gdp), years);
    let gdp_growth_component = gdp_annual * 3.0 * weights.gdp_growth * 100.0;

    let pc_annual = annualized_percent(
        total_growth(current.gdp_per_capita, starting.gdp_per_capita),
        years,
    );
    let gdp_per_capita_component = pc_annual * 3.0 * weights.gdp_per_capita_growth * 100.0;

    let pop_percent = total_growth(current.population, starting.population) * 100.0;
    let population_component = pop_percent * 0.2 * weights.population_growth * 100.0;

    let stability_component = stability_score(current) * 0.2 * weights.stability * 100.0;

    let penalties = penalties(current);
    ScoreBreakdown {
        gdp_growth_component,
        gdp_per_capita_component,
        population_component,
        stability_component,
        penalties,
        total: gdp_growth_component
            + gdp_per_capita_component
            + population_component
            + stability_component
            + penalties,
    }
}

/// Chart points for every outcome, ranked by score (highest first, ties keep input order).
pub fn rank(outcomes: &[PlayerOutcome]) -> Vec<SnapshotMetrics> {
    let mut order: Vec<&PlayerOutcome> = outcomes.iter().collect();
    order.sort_by(|a, b| b.score.total_cmp(&a.score));
    order
        .into_iter()
        .enumerate()
        .map(|(i, o)| SnapshotMetrics {
            player_id: o.player_id,
            resources: o.resources.clone(),
            score: o.score,
            rank: i as u32 + 1,
        })
        .collect()
}
