//! Cross-country interaction models.
//!
//! Each model is a pure function of one player's state, their policies and the
//! world aggregate. None of them depends on the order players are resolved in.
//! The `resources` passed in must be the same state the world was aggregated
//! from; a lone player then sees zero differentials everywhere.

use sim_core::{
    CapitalControls, ImmigrationPolicy, PlayerResources, PolicyChoices, QeStance, WorldState,
};

/// Share of the real-rate differential that capital controls let through.
pub fn capital_dampening(controls: CapitalControls) -> f64 {
    match controls {
        CapitalControls::Open => 1.0,
        CapitalControls::Moderate => 0.4,
        CapitalControls::Strict => 0.1,
    }
}

/// Share of migration pull that immigration policy admits.
pub fn migration_gate(policy: ImmigrationPolicy) -> f64 {
    match policy {
        ImmigrationPolicy::Restrictive => 0.2,
        ImmigrationPolicy::Moderate => 0.6,
        ImmigrationPolicy::Open => 1.0,
    }
}

/// Quarterly money growth implied by the QE stance.
pub fn money_growth(stance: QeStance) -> f64 {
    match stance {
        QeStance::Tightening => -0.02,
        QeStance::Neutral => 0.0,
        QeStance::Easing => 0.03,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CapitalFlowEffect {
    pub real_rate_diff: f64,
    pub flow_pressure: f64,
    /// Fractional change applied to the exchange rate.
    pub exchange_rate_change: f64,
    /// Added to the IS-curve growth rate.
    pub gdp_effect: f64,
}

/// Uncovered interest parity: capital chases higher real rates.
pub fn capital_flows(
    resources: &PlayerResources,
    policies: &PolicyChoices,
    world: &WorldState,
) -> CapitalFlowEffect {
    let real_rate_diff = (resources.interest_rate - resources.inflation)
        - (world.avg_interest_rate - world.avg_inflation);
    let flow_pressure = real_rate_diff * capital_dampening(policies.capital_controls);
    CapitalFlowEffect {
        real_rate_diff,
        flow_pressure,
        exchange_rate_change: flow_pressure * 0.01,
        gdp_effect: flow_pressure * 0.002,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NetExportsEffect {
    pub competitiveness: f64,
    /// Fraction of GDP, fed into the IS curve.
    pub net_exports: f64,
    /// Percent of GDP.
    pub trade_balance: f64,
}

/// Net exports from relative currency strength and tariffs.
pub fn net_exports(
    resources: &PlayerResources,
    policies: &PolicyChoices,
    world: &WorldState,
) -> NetExportsEffect {
    let relative_rate = if world.avg_exchange_rate == 0.0 {
        1.0
    } else {
        resources.exchange_rate / world.avg_exchange_rate
    };
    let competitiveness = 1.0 - relative_rate;
    let net_exports = 0.5 * competitiveness + policies.tariff_rate * 0.005
        - world.avg_tariff_rate * 0.003;
    NetExportsEffect {
        competitiveness,
        net_exports,
        trade_balance: net_exports * 100.0,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MigrationEffect {
    pub quality_of_life: f64,
    pub migration_pull: f64,
    /// Annual net migration as a fraction of population.
    pub net_migration_rate: f64,
}

/// People move toward a higher quality of life, gated by immigration policy.
pub fn migration(
    resources: &PlayerResources,
    policies: &PolicyChoices,
    world: &WorldState,
) -> MigrationEffect {
    let quality_of_life = resources.compute_quality_of_life();
    let migration_pull = quality_of_life - world.avg_quality_of_life;
    MigrationEffect {
        quality_of_life,
        migration_pull,
        net_migration_rate: migration_pull * 0.01 * migration_gate(policies.immigration_policy),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MoneySupplyEffect {
    pub money_growth: f64,
    pub money_supply_index: f64,
    /// Inflation impulse handed to the Phillips curve.
    pub supply_shock: f64,
}

/// QE stance moves the money supply; growth in excess of output is inflationary.
pub fn money_supply(
    resources: &PlayerResources,
    policies: &PolicyChoices,
    gdp_growth_rate: f64,
) -> MoneySupplyEffect {
    let growth = money_growth(policies.qe_stance);
    MoneySupplyEffect {
        money_growth: growth,
        money_supply_index: resources.money_supply_index * (1.0 + growth),
        supply_shock: (growth - gdp_growth_rate) * 0.5,
    }
}

/// Trade balance (percent of GDP) below which markets charge a premium.
pub const TWIN_DEFICIT_THRESHOLD: f64 = -3.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TwinDeficitEffect {
    /// Added to the real rate in the IS curve.
    pub risk_premium: f64,
    /// Debt-to-GDP points that flow into the budget identity.
    pub debt_spillover: f64,
}

/// Link a trade deficit to borrowing costs and public debt.
pub fn twin_deficits(trade_balance: f64) -> TwinDeficitEffect {
    let risk_premium = if trade_balance < TWIN_DEFICIT_THRESHOLD {
        ((trade_balance - TWIN_DEFICIT_THRESHOLD).abs() * 0.02).max(0.0)
    } else {
        0.0
    };
    TwinDeficitEffect {
        risk_premium,
        debt_spillover: (-trade_balance * 0.1).max(0.0),
    }
}
