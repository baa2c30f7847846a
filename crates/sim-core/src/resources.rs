//! National economy state owned by a player.

use serde::{Deserialize, Serialize};

/// Population never drops below this many people.
pub const POPULATION_FLOOR: f64 = 1_000_000.0;
/// Development indices live in [0, 100].
pub const INDEX_RANGE: (f64, f64) = (0.0, 100.0);
/// Annual inflation bounds in percent.
pub const INFLATION_RANGE: (f64, f64) = (-5.0, 50.0);
/// Policy rate bounds in percent.
pub const INTEREST_RATE_RANGE: (f64, f64) = (-1.0, 20.0);
/// Unemployment bounds in percent.
pub const UNEMPLOYMENT_RANGE: (f64, f64) = (0.0, 25.0);
/// Baseline of the money supply index.
pub const MONEY_SUPPLY_BASELINE: f64 = 100.0;
/// Inflation target (π*) used across the model.
pub const TARGET_INFLATION: f64 = 2.0;

/// Macro state of one country. Mutated only by the resolver between quarters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerResources {
    /// Realised output in USD.
    pub gdp: f64,
    /// Potential output (y*) in USD.
    pub potential_gdp: f64,
    pub gdp_per_capita: f64,
    pub population: f64,
    /// Annual inflation in percent.
    pub inflation: f64,
    /// Policy rate in percent.
    pub interest_rate: f64,
    /// Public debt as percent of GDP (>= 0).
    pub debt_to_gdp: f64,
    pub exchange_rate: f64,
    /// Unemployment in percent.
    pub unemployment: f64,
    pub education_index: f64,
    pub healthcare_index: f64,
    pub infrastructure_index: f64,
    pub tax_rate: f64,
    /// Net exports in percent of GDP.
    pub trade_balance: f64,
    pub money_supply_index: f64,
    /// Composite attractiveness score in [0, 1].
    pub quality_of_life: f64,
}

impl Default for PlayerResources {
    fn default() -> Self {
        let mut resources = Self {
            gdp: 2_000_000_000_000.0,
            potential_gdp: 2_000_000_000_000.0,
            gdp_per_capita: 40_000.0,
            population: 50_000_000.0,
            inflation: 2.0,
            interest_rate: 4.0,
            debt_to_gdp: 60.0,
            exchange_rate: 1.0,
            unemployment: 5.0,
            education_index: 50.0,
            healthcare_index: 50.0,
            infrastructure_index: 50.0,
            tax_rate: 28.0,
            trade_balance: 0.0,
            money_supply_index: MONEY_SUPPLY_BASELINE,
            quality_of_life: 0.0,
        };
        resources.quality_of_life = resources.compute_quality_of_life();
        resources
    }
}

impl PlayerResources {
    /// Weighted attractiveness used by the migration model.
    ///
    /// Each term is clamped into [0, 1] before weighting, so the result is in [0, 1].
    pub fn compute_quality_of_life(&self) -> f64 {
        let income = normalize(self.gdp_per_capita, 20_000.0, 80_000.0);
        let health = unit(self.healthcare_index / 100.0);
        let education = unit(self.education_index / 100.0);
        let jobs = unit(1.0 - self.unemployment / 25.0);
        let prices = unit(1.0 - (self.inflation - TARGET_INFLATION).abs() / 20.0);
        0.40 * income + 0.20 * health + 0.15 * education + 0.15 * jobs + 0.10 * prices
    }

    /// Output gap as a fraction of potential output. Zero when potential is degenerate.
    pub fn output_gap(&self) -> f64 {
        if self.potential_gdp > 0.0 {
            (self.gdp - self.potential_gdp) / self.potential_gdp
        } else {
            0.0
        }
    }

    /// Pull every field back inside its documented range.
    pub fn clamp_invariants(&mut self) {
        self.population = finite_or(self.population, POPULATION_FLOOR).max(POPULATION_FLOOR);
        self.education_index = clamp_range(self.education_index, INDEX_RANGE);
        self.healthcare_index = clamp_range(self.healthcare_index, INDEX_RANGE);
        self.infrastructure_index = clamp_range(self.infrastructure_index, INDEX_RANGE);
        self.inflation = clamp_range(self.inflation, INFLATION_RANGE);
        self.interest_rate = clamp_range(self.interest_rate, INTEREST_RATE_RANGE);
        self.unemployment = clamp_range(self.unemployment, UNEMPLOYMENT_RANGE);
        self.debt_to_gdp = finite_or(self.debt_to_gdp, 0.0).max(0.0);
    }

    /// True when every clamp invariant holds.
    pub fn satisfies_invariants(&self) -> bool {
        let within = |v: f64, (lo, hi): (f64, f64)| v >= lo && v <= hi;
        self.population >= POPULATION_FLOOR
            && within(self.education_index, INDEX_RANGE)
            && within(self.healthcare_index, INDEX_RANGE)
            && within(self.infrastructure_index, INDEX_RANGE)
            && within(self.inflation, INFLATION_RANGE)
            && within(self.interest_rate, INTEREST_RATE_RANGE)
            && within(self.unemployment, UNEMPLOYMENT_RANGE)
            && self.debt_to_gdp >= 0.0
    }
}

/// Map `value` linearly from [lo, hi] onto [0, 1], saturating at both ends.
pub fn normalize(value: f64, lo: f64, hi: f64) -> f64 {
    if hi <= lo {
        return 0.0;
    }
    unit((value - lo) / (hi - lo))
}

/// Clamp into [lo, hi]; NaN collapses to the lower bound.
pub fn clamp_range(value: f64, (lo, hi): (f64, f64)) -> f64 {
    if value.is_nan() {
        lo
    } else {
        value.clamp(lo, hi)
    }
}

fn unit(value: f64) -> f64 {
    clamp_range(value, (0.0, 1.0))
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
