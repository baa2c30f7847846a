//! Player macro resolver: one player, one quarter, a fixed ordered pipeline.
//!
//! Steps, in order (later steps read what earlier ones wrote):
//!
//! ```text
//!  1. cabinet effects              9. population
//!  2. QE / money supply           10. GDP per capita
//!  3. policy rate (CBRF or manual) 11. budget identity
//!  4. capital flows               12. exchange rate
//!  5. net exports                 13. unemployment (Okun)
//!  6. IS curve                    14. persist trade/money/QoL/tax
//!  7. Phillips curve              15. random events
//!  8. migration                   16. crisis detection
//!                                 17. score
//! ```
//!
//! All arithmetic is total: out-of-range values are clamped, never rejected.

use crate::events::{detect_crises, event_rng, roll_random_events};
use crate::interaction::{capital_flows, migration, money_supply, net_exports, twin_deficits};
use crate::scoring::score;
use sim_core::resources::{clamp_range, INFLATION_RANGE, INTEREST_RATE_RANGE, POPULATION_FLOOR};
use sim_core::{
    DiplomatAssignment, EngineerAssignment, ImmigrationPolicy, MageAssignment, PlayerOutcome,
    PlayerResources, PolicyChoices, ResolutionInput, ScoringWeights, WorldState,
    TARGET_INFLATION,
};
use tracing::debug;

/// Neutral real rate (r*).
pub const NEUTRAL_REAL_RATE: f64 = 2.0;
/// CBRF inflation-gap sensitivity (α).
pub const DEFAULT_ALPHA: f64 = 1.5;
/// CBRF output-gap sensitivity (γ).
pub const DEFAULT_GAMMA: f64 = 0.5;
/// IS-curve rate sensitivity (β).
pub const DEFAULT_BETA: f64 = 1.0;
/// Phillips-curve slope (λ).
pub const DEFAULT_LAMBDA: f64 = 0.3;
pub const BIRTH_RATE: f64 = 0.01;
pub const BASE_DEATH_RATE: f64 = 0.008;
pub const MIN_DEATH_RATE: f64 = 0.002;

/// Apply minister effects before any macro equation runs.
pub fn apply_cabinet_effects(resources: &mut PlayerResources, policies: &PolicyChoices) {
    let cabinet = &policies.cabinet;

    if cabinet.mage.assignment == MageAssignment::InflationTargeting && cabinet.mage.focus >= 3 {
        resources.inflation *= 1.0 - 0.05 * f64::from(cabinet.mage.focus);
    }

    let engineer = cabinet.engineer.effectiveness();
    match cabinet.engineer.assignment {
        EngineerAssignment::Infrastructure => {
            resources.infrastructure_index =
                (resources.infrastructure_index + 0.5 * engineer).min(100.0);
            resources.potential_gdp *= 1.0 + 0.001 * engineer;
        }
        EngineerAssignment::Education => {
            resources.education_index = (resources.education_index + 0.5 * engineer).min(100.0);
        }
        EngineerAssignment::Healthcare => {
            resources.healthcare_index = (resources.healthcare_index + 0.5 * engineer).min(100.0);
        }
        EngineerAssignment::ProductivityInnovation | EngineerAssignment::GreenTransition => {}
    }

    if cabinet.diplomat.assignment == DiplomatAssignment::ImmigrationPolicy {
        let base = match policies.immigration_policy {
            ImmigrationPolicy::Open => 0.025,
            ImmigrationPolicy::Moderate => 0.01,
            ImmigrationPolicy::Restrictive => 0.0,
        };
        resources.population *= 1.0 + base * cabinet.diplomat.effectiveness() / 4.0;
    }
}

/// Central bank reaction function: `i = r* + π* + α(π−π*) + γ(y−y*)/y*`.
pub fn cbrf_rate(resources: &PlayerResources, alpha: f64, gamma: f64) -> f64 {
    let inflation_gap = resources.inflation - TARGET_INFLATION;
    let rate = NEUTRAL_REAL_RATE
        + TARGET_INFLATION
        + alpha * inflation_gap
        + gamma * resources.output_gap();
    clamp_range(rate, INTEREST_RATE_RANGE)
}

/// Risk premium charged on debt above 100% of GDP.
pub fn debt_risk_premium(debt_to_gdp: f64) -> f64 {
    if debt_to_gdp > 100.0 {
        (debt_to_gdp - 100.0) * 0.05
    } else {
        0.0
    }
}

/// Adaptive-expectations Phillips curve, clamped.
pub fn phillips_inflation(resources: &PlayerResources, supply_shock: f64) -> f64 {
    let expected = 0.7 * resources.inflation + 0.3 * TARGET_INFLATION;
    clamp_range(
        expected + DEFAULT_LAMBDA * resources.output_gap() * 100.0 + supply_shock,
        INFLATION_RANGE,
    )
}

/// Okun's law, approximated: unemployment rises as output falls below potential.
pub fn okun_unemployment(resources: &PlayerResources) -> f64 {
    let ratio = if resources.potential_gdp > 0.0 {
        (resources.gdp / resources.potential_gdp).max(0.0)
    } else {
        1.0
    };
    ((1.0 - ratio.sqrt()) * 100.0 + 5.0).clamp(0.0, 25.0)
}

/// Resolve one player for one pass.
///
/// Capital flows, net exports and migration (steps 4, 5 and 8) read `basis`, the state
/// this player contributed to `world`, so their differentials compare like with like
/// and a lone player sees none. Everything else reads the state being resolved.
pub fn resolve_player(
    input: &ResolutionInput,
    basis: &PlayerResources,
    world: &WorldState,
    weights: &ScoringWeights,
) -> PlayerOutcome {
    let policies = &input.policies;
    let mut r = input.resources.clone();

    // 1
    apply_cabinet_effects(&mut r, policies);

    // 2: prior output gap stands in for the growth rate
    let money = money_supply(&r, policies, r.output_gap());

    // 3
    r.interest_rate = if policies.cbrf_autopilot {
        let mage = policies.cabinet.mage.effectiveness();
        cbrf_rate(&r, DEFAULT_ALPHA * mage, DEFAULT_GAMMA * mage)
    } else {
        clamp_range(policies.interest_rate, INTEREST_RATE_RANGE)
    };

    // 4, 5
    let capital = capital_flows(basis, policies, world);
    let trade = net_exports(basis, policies, world);
    let deficits = twin_deficits(trade.trade_balance);

    // 6
    let risk_premium = debt_risk_premium(r.debt_to_gdp) + deficits.risk_premium;
    let real_rate_diff = r.interest_rate + risk_premium - r.inflation - NEUTRAL_REAL_RATE;
    let spending_share = policies.total_gov_spending() / 100.0;
    let growth = -DEFAULT_BETA * real_rate_diff / 100.0
        + spending_share * 0.3
        + trade.net_exports
        + capital.gdp_effect;
    r.gdp = r.potential_gdp * (1.0 + growth);

    // 7
    r.inflation = phillips_inflation(&r, money.supply_shock);

    // 8
    let moving = migration(basis, policies, world);

    // 9
    let death_rate = (BASE_DEATH_RATE - r.healthcare_index / 10_000.0).max(MIN_DEATH_RATE);
    let quarterly_growth = (BIRTH_RATE - death_rate + moving.net_migration_rate) / 4.0;
    r.population = (r.population * (1.0 + quarterly_growth)).max(POPULATION_FLOOR);

    // 10
    r.gdp_per_capita = r.gdp / r.population;

    // 11
    let deficit = policies.total_gov_spending() - policies.tax_rate
        + r.interest_rate * r.debt_to_gdp / 100.0
        + deficits.debt_spillover;
    r.debt_to_gdp = (r.debt_to_gdp + deficit / 4.0).max(0.0);

    // 12
    r.exchange_rate *= 1.0 + capital.exchange_rate_change;

    // 13
    r.unemployment = okun_unemployment(&r);

    // 14
    r.trade_balance = trade.trade_balance;
    r.money_supply_index = money.money_supply_index;
    r.tax_rate = policies.tax_rate;

    // 15
    let mut rng = event_rng(input.rng_seed);
    let mut events = roll_random_events(&mut rng, &mut r);
    r.clamp_invariants();
    r.quality_of_life = r.compute_quality_of_life();

    // 16
    events.extend(detect_crises(&r));
    if !events.is_empty() {
        debug!(player = %input.player_id, count = events.len(), "quarter events");
    }

    // 17
    let score_breakdown = score(&r, &input.starting_resources, input.quarters_played, weights);
    PlayerOutcome {
        player_id: input.player_id,
        score: score_breakdown.total,
        resources: r,
        score_breakdown,
        events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{aggregate, Participant};
    use proptest::prelude::*;
    use sim_core::{CapitalControls, PlayerId, QeStance};

    fn input(id: i64, resources: PlayerResources, policies: PolicyChoices) -> ResolutionInput {
        ResolutionInput {
            player_id: PlayerId(id),
            resources,
            policies,
            starting_resources: PlayerResources::default(),
            quarters_played: 1,
            rng_seed: 1234,
        }
    }

    fn solo_world(i: &ResolutionInput) -> WorldState {
        aggregate(&[Participant {
            player_id: i.player_id,
            resources: &i.resources,
            policies: &i.policies,
        }])
    }

    #[test]
    fn cbrf_at_target_is_neutral() {
        let r = PlayerResources::default();
        assert!((cbrf_rate(&r, DEFAULT_ALPHA, DEFAULT_GAMMA) - 4.0).abs() < 1e-12);
        let hot = PlayerResources {
            inflation: 6.0,
            ..r
        };
        assert!((cbrf_rate(&hot, DEFAULT_ALPHA, DEFAULT_GAMMA) - 10.0).abs() < 1e-12);
        let wild = PlayerResources {
            inflation: 40.0,
            ..PlayerResources::default()
        };
        assert_eq!(cbrf_rate(&wild, DEFAULT_ALPHA, DEFAULT_GAMMA), 20.0);
    }

    #[test]
    fn inflation_targeting_needs_focus_three() {
        let mut policies = PolicyChoices::default();
        policies.cabinet.mage.assignment = MageAssignment::InflationTargeting;
        policies.cabinet.mage.focus = 4;
        let mut r = PlayerResources {
            inflation: 10.0,
            ..PlayerResources::default()
        };
        apply_cabinet_effects(&mut r, &policies);
        assert!((r.inflation - 8.0).abs() < 1e-12);

        policies.cabinet.mage.focus = 2;
        let mut r = PlayerResources {
            inflation: 10.0,
            ..PlayerResources::default()
        };
        apply_cabinet_effects(&mut r, &policies);
        assert_eq!(r.inflation, 10.0);
    }

    #[test]
    fn infrastructure_engineer_lifts_potential() {
        let policies = PolicyChoices::default();
        let mut r = PlayerResources::default();
        apply_cabinet_effects(&mut r, &policies);
        assert!((r.infrastructure_index - 50.65).abs() < 1e-12);
        assert!((r.potential_gdp / 2e12 - 1.0013).abs() < 1e-12);
    }

    #[test]
    fn immigration_diplomat_grows_population() {
        let mut policies = PolicyChoices {
            immigration_policy: ImmigrationPolicy::Open,
            ..PolicyChoices::default()
        };
        policies.cabinet.diplomat.assignment = DiplomatAssignment::ImmigrationPolicy;
        let mut r = PlayerResources::default();
        apply_cabinet_effects(&mut r, &policies);
        // 0.025 × 1.0 / 4
        assert!((r.population - 50_000_000.0 * 1.00625).abs() < 1e-3);
    }

    #[test]
    fn debt_crisis_is_reported() {
        let i = input(
            1,
            PlayerResources {
                debt_to_gdp: 160.0,
                ..PlayerResources::default()
            },
            PolicyChoices::default(),
        );
        let w = solo_world(&i);
        let out = resolve_player(&i, &i.resources, &w, &ScoringWeights::default());
        assert!(out.resources.debt_to_gdp > 150.0);
        assert!(out.events.iter().any(|e| e.title == "Debt Crisis"));
        assert!(out.score_breakdown.penalties <= -50.0);
    }

    #[test]
    fn quality_of_life_reflects_the_resolved_quarter() {
        let i = input(
            1,
            PlayerResources {
                unemployment: 12.0,
                inflation: 9.0,
                ..PlayerResources::default()
            },
            PolicyChoices::default(),
        );
        let w = solo_world(&i);
        let out = resolve_player(&i, &i.resources, &w, &ScoringWeights::default());
        assert_eq!(
            out.resources.quality_of_life,
            out.resources.compute_quality_of_life()
        );
        assert_ne!(
            out.resources.quality_of_life,
            i.resources.compute_quality_of_life()
        );
    }

    #[test]
    fn manual_rate_is_honoured() {
        let i = input(
            1,
            PlayerResources::default(),
            PolicyChoices {
                cbrf_autopilot: false,
                interest_rate: 11.5,
                ..PolicyChoices::default()
            },
        );
        let w = solo_world(&i);
        let out = resolve_player(&i, &i.resources, &w, &ScoringWeights::default());
        assert_eq!(out.resources.interest_rate, 11.5);
        assert_eq!(out.resources.tax_rate, 28.0);
    }

    #[test]
    fn resolution_is_deterministic() {
        let i = input(3, PlayerResources::default(), PolicyChoices::default());
        let w = solo_world(&i);
        let a = resolve_player(&i, &i.resources, &w, &ScoringWeights::default());
        let b = resolve_player(&i, &i.resources, &w, &ScoringWeights::default());
        assert_eq!(a, b);
    }

    #[test]
    fn default_budget_runs_a_surplus() {
        let i = input(1, PlayerResources::default(), PolicyChoices::default());
        let w = solo_world(&i);
        let out = resolve_player(&i, &i.resources, &w, &ScoringWeights::default());
        // 15 spending − 28 tax + ~2.4 interest: debt falls by ~2.65 points
        assert!(out.resources.debt_to_gdp < 60.0);
        assert!(out.resources.debt_to_gdp > 56.0);
        assert_eq!(out.resources.trade_balance, 0.0);
    }

    fn policies_strategy() -> impl Strategy<Value = PolicyChoices> {
        (
            -1.0f64..=20.0,
            any::<bool>(),
            0.0f64..=10.0,
            0.0f64..=15.0,
            0.0f64..=5.0,
            15.0f64..=45.0,
            0.0f64..=25.0,
            prop_oneof![
                Just(ImmigrationPolicy::Restrictive),
                Just(ImmigrationPolicy::Moderate),
                Just(ImmigrationPolicy::Open)
            ],
            prop_oneof![
                Just(QeStance::Tightening),
                Just(QeStance::Neutral),
                Just(QeStance::Easing)
            ],
            prop_oneof![
                Just(CapitalControls::Open),
                Just(CapitalControls::Moderate),
                Just(CapitalControls::Strict)
            ],
        )
            .prop_map(|(rate, auto, edu, health, infra, tax, tariff, imm, qe, cap)| {
                PolicyChoices {
                    interest_rate: rate,
                    cbrf_autopilot: auto,
                    gov_spending_education: edu,
                    gov_spending_healthcare: health,
                    gov_spending_infrastructure: infra,
                    tax_rate: tax,
                    tariff_rate: tariff,
                    immigration_policy: imm,
                    qe_stance: qe,
                    capital_controls: cap,
                    ..PolicyChoices::default()
                }
            })
    }

    proptest! {
        #[test]
        fn outcomes_respect_clamps(
            policies in policies_strategy(),
            inflation in -5.0f64..50.0,
            debt in 0.0f64..300.0,
            fx in 0.2f64..5.0,
            world_rate in -1.0f64..20.0,
            health in 0.0f64..=100.0,
            seed in any::<u64>(),
        ) {
            let resources = PlayerResources {
                inflation,
                debt_to_gdp: debt,
                exchange_rate: fx,
                healthcare_index: health,
                ..PlayerResources::default()
            };
            let mut i = input(1, resources, policies);
            i.rng_seed = seed;
            let world = WorldState {
                avg_interest_rate: world_rate,
                avg_inflation: 2.0,
                avg_exchange_rate: 1.0,
                avg_quality_of_life: 0.5,
                avg_tariff_rate: 5.0,
                player_count: 3,
                ..WorldState::default()
            };
            let out = resolve_player(&i, &i.resources, &world, &ScoringWeights::default());
            prop_assert!(out.resources.satisfies_invariants());
            prop_assert!(out.score.is_finite());
        }
    }
}
