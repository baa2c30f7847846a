//! Random shocks and crisis detection.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sim_core::{EventKind, GameEvent, PlayerResources};

/// Per-quarter chance of each random event.
pub const EVENT_PROBABILITY: f64 = 0.01;
pub const DEBT_CRISIS_THRESHOLD: f64 = 150.0;
pub const HYPERINFLATION_THRESHOLD: f64 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RandomEvent {
    OilPriceShock,
    ProductivityBoom,
    FinancialCrisis,
    TechBreakthrough,
}

impl RandomEvent {
    pub const ALL: [RandomEvent; 4] = [
        RandomEvent::OilPriceShock,
        RandomEvent::ProductivityBoom,
        RandomEvent::FinancialCrisis,
        RandomEvent::TechBreakthrough,
    ];

    /// Mutate `resources` and describe what happened.
    pub fn apply(self, resources: &mut PlayerResources) -> GameEvent {
        match self {
            RandomEvent::OilPriceShock => {
                resources.inflation += 3.0;
                GameEvent::new(
                    EventKind::Shock,
                    "Oil Price Shock",
                    "Global oil prices surge, causing inflation spike",
                    &[("inflation", 3.0)],
                )
            }
            RandomEvent::ProductivityBoom => {
                resources.potential_gdp *= 1.02;
                GameEvent::new(
                    EventKind::Shock,
                    "Productivity Boom",
                    "A wave of innovation boosts potential output",
                    &[("potential_gdp", 0.02)],
                )
            }
            RandomEvent::FinancialCrisis => {
                resources.gdp *= 0.97;
                resources.unemployment += 2.0;
                GameEvent::new(
                    EventKind::Crisis,
                    "Financial Crisis",
                    "Banking sector instability causes economic contraction",
                    &[("gdp", -0.03), ("unemployment", 2.0)],
                )
            }
            RandomEvent::TechBreakthrough => {
                resources.education_index = (resources.education_index + 10.0).min(100.0);
                resources.potential_gdp *= 1.005;
                GameEvent::new(
                    EventKind::Achievement,
                    "Tech Breakthrough",
                    "Major technological innovation drives growth",
                    &[("education_index", 10.0), ("potential_gdp", 0.005)],
                )
            }
        }
    }
}

/// Deterministic generator for one player's quarter.
pub fn event_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Sample every event independently; any number may fire in one pass.
pub fn roll_random_events<R: Rng>(rng: &mut R, resources: &mut PlayerResources) -> Vec<GameEvent> {
    let mut fired = Vec::new();
    for event in RandomEvent::ALL {
        if rng.gen_bool(EVENT_PROBABILITY) {
            fired.push(event.apply(resources));
        }
    }
    fired
}

/// Observational crisis events; never mutate state.
pub fn detect_crises(resources: &PlayerResources) -> Vec<GameEvent> {
    let mut crises = Vec::new();
    if resources.debt_to_gdp > DEBT_CRISIS_THRESHOLD {
        crises.push(GameEvent::new(
            EventKind::Crisis,
            "Debt Crisis",
            "Debt exceeds 150% of GDP. Austerity measures required.",
            &[("debt_to_gdp", resources.debt_to_gdp)],
        ));
    }
    if resources.inflation > HYPERINFLATION_THRESHOLD {
        crises.push(GameEvent::new(
            EventKind::Crisis,
            "Hyperinflation",
            "Inflation exceeds 20%. Currency collapsing.",
            &[("inflation", resources.inflation)],
        ));
    }
    crises
}

/// Mix a game seed, quarter number and player into one event seed.
pub fn pass_seed(game_seed: u64, quarter: u32, player: i64) -> u64 {
    // splitmix64 finalizer over the combined key
    let mut z = game_seed
        ^ u64::from(quarter).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (player as u64).rotate_left(32);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn crises_are_observational() {
        let r = PlayerResources {
            debt_to_gdp: 160.0,
            inflation: 25.0,
            ..PlayerResources::default()
        };
        let before = r.clone();
        let events = detect_crises(&r);
        assert_eq!(r, before);
        let titles: Vec<&str> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Debt Crisis", "Hyperinflation"]);
    }

    #[test]
    fn every_event_can_fire_in_one_pass() {
        // A generator stuck at zero passes every probability check.
        let mut rng = StepRng::new(0, 0);
        let mut r = PlayerResources::default();
        let events = roll_random_events(&mut rng, &mut r);
        assert_eq!(events.len(), 4);
        assert!((r.inflation - 5.0).abs() < 1e-12);
        assert!((r.unemployment - 7.0).abs() < 1e-12);
        assert_eq!(r.education_index, 60.0);
    }

    #[test]
    fn seeded_rolls_repeat() {
        let seed = pass_seed(42, 3, 7);
        let mut a = PlayerResources::default();
        let mut b = PlayerResources::default();
        let ea = roll_random_events(&mut event_rng(seed), &mut a);
        let eb = roll_random_events(&mut event_rng(seed), &mut b);
        assert_eq!(ea, eb);
        assert_eq!(a, b);
    }

    #[test]
    fn seeds_differ_across_players_and_quarters() {
        assert_ne!(pass_seed(42, 1, 1), pass_seed(42, 1, 2));
        assert_ne!(pass_seed(42, 1, 1), pass_seed(42, 2, 1));
        assert_ne!(pass_seed(42, 1, 1), pass_seed(43, 1, 1));
    }

    #[test]
    fn events_are_rare() {
        let mut rng = event_rng(7);
        let mut fired = 0usize;
        for _ in 0..10_000 {
            let mut r = PlayerResources::default();
            fired += roll_random_events(&mut rng, &mut r).len();
        }
        // Expectation is 400 over 40k independent draws.
        assert!((250..=550).contains(&fired), "fired {fired}");
    }
}
