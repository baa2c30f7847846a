//! Choices a player submits once per quarter.

use crate::cabinet::CabinetAssignment;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImmigrationPolicy {
    Restrictive,
    Moderate,
    Open,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QeStance {
    Tightening,
    Neutral,
    Easing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapitalControls {
    Open,
    Moderate,
    Strict,
}

/// A player's policy package. Immutable once resolution starts.
///
/// Spending and rates are percentages (of GDP, or annual). Omitted fields
/// deserialize to the default policy's values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyChoices {
    pub cabinet: CabinetAssignment,
    /// Used only when `cbrf_autopilot` is off.
    pub interest_rate: f64,
    pub cbrf_autopilot: bool,
    pub gov_spending_education: f64,
    pub gov_spending_healthcare: f64,
    pub gov_spending_infrastructure: f64,
    pub tax_rate: f64,
    pub tariff_rate: f64,
    pub immigration_policy: ImmigrationPolicy,
    pub qe_stance: QeStance,
    pub capital_controls: CapitalControls,
}

impl PolicyChoices {
    /// Total government spending in percent of GDP.
    pub fn total_gov_spending(&self) -> f64 {
        self.gov_spending_education + self.gov_spending_healthcare + self.gov_spending_infrastructure
    }
}

impl Default for PolicyChoices {
    /// The fixed policy applied to players who did not submit in time.
    fn default() -> Self {
        Self {
            cabinet: CabinetAssignment::default(),
            interest_rate: 4.0,
            cbrf_autopilot: true,
            gov_spending_education: 3.0,
            gov_spending_healthcare: 7.0,
            gov_spending_infrastructure: 5.0,
            tax_rate: 28.0,
            tariff_rate: 0.0,
            immigration_policy: ImmigrationPolicy::Moderate,
            qe_stance: QeStance::Neutral,
            capital_controls: CapitalControls::Open,
        }
    }
}
