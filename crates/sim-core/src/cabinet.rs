//! Cabinet: four ministers, each with a focus budget and a role-specific assignment.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Focus points every cabinet must spend in total.
pub const TOTAL_FOCUS_POINTS: u8 = 10;
/// Upper bound on a single minister's focus.
pub const MAX_FOCUS_PER_MINISTER: u8 = 4;

/// Multiplier applied to a minister's effects at a given focus level.
///
/// Focus above the maximum is treated as the maximum; validation rejects it earlier.
pub fn focus_effectiveness(focus: u8) -> f64 {
    match focus {
        0 => 0.5,
        1 => 0.75,
        2 => 1.0,
        3 => 1.3,
        _ => 1.7,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinisterRole {
    Warrior,
    Mage,
    Engineer,
    Diplomat,
}

impl fmt::Display for MinisterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MinisterRole::Warrior => "warrior",
            MinisterRole::Mage => "mage",
            MinisterRole::Engineer => "engineer",
            MinisterRole::Diplomat => "diplomat",
        })
    }
}

/// Behaviour shared by every role's assignment enum.
pub trait Assignment: Copy {
    /// Stable identifier, matching the serialized form.
    fn id(self) -> &'static str;
    /// Minimum focus a minister needs before this assignment is selectable.
    fn min_focus(self) -> u8 {
        0
    }
}

/// Trade & competition minister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarriorAssignment {
    TariffManagement,
    StrategicReserves,
    CurrencyDefense,
    EconomicWarfare,
}

impl Assignment for WarriorAssignment {
    fn id(self) -> &'static str {
        match self {
            Self::TariffManagement => "tariff_management",
            Self::StrategicReserves => "strategic_reserves",
            Self::CurrencyDefense => "currency_defense",
            Self::EconomicWarfare => "economic_warfare",
        }
    }

    fn min_focus(self) -> u8 {
        match self {
            Self::EconomicWarfare => 4,
            _ => 0,
        }
    }
}

/// Central bank governor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MageAssignment {
    InterestRateControl,
    QeManagement,
    InflationTargeting,
    FinancialStability,
    ForwardGuidance,
}

impl Assignment for MageAssignment {
    fn id(self) -> &'static str {
        match self {
            Self::InterestRateControl => "interest_rate_control",
            Self::QeManagement => "qe_management",
            Self::InflationTargeting => "inflation_targeting",
            Self::FinancialStability => "financial_stability",
            Self::ForwardGuidance => "forward_guidance",
        }
    }

    fn min_focus(self) -> u8 {
        match self {
            Self::ForwardGuidance => 3,
            _ => 0,
        }
    }
}

/// Development minister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineerAssignment {
    Infrastructure,
    Education,
    Healthcare,
    ProductivityInnovation,
    GreenTransition,
}

impl Assignment for EngineerAssignment {
    fn id(self) -> &'static str {
        match self {
            Self::Infrastructure => "infrastructure",
            Self::Education => "education",
            Self::Healthcare => "healthcare",
            Self::ProductivityInnovation => "productivity_innovation",
            Self::GreenTransition => "green_transition",
        }
    }

    fn min_focus(self) -> u8 {
        match self {
            Self::GreenTransition => 3,
            _ => 0,
        }
    }
}

/// Foreign minister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiplomatAssignment {
    TradeNegotiations,
    ImmigrationPolicy,
    InternationalAid,
    CrisisManagement,
    GlobalInitiatives,
}

impl Assignment for DiplomatAssignment {
    fn id(self) -> &'static str {
        match self {
            Self::TradeNegotiations => "trade_negotiations",
            Self::ImmigrationPolicy => "immigration_policy",
            Self::InternationalAid => "international_aid",
            Self::CrisisManagement => "crisis_management",
            Self::GlobalInitiatives => "global_initiatives",
        }
    }

    fn min_focus(self) -> u8 {
        match self {
            Self::InternationalAid => 3,
            Self::GlobalInitiatives => 4,
            _ => 0,
        }
    }
}

/// One minister's focus and task for the quarter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting<A> {
    pub focus: u8,
    pub assignment: A,
}

impl<A: Assignment> Posting<A> {
    pub fn effectiveness(&self) -> f64 {
        focus_effectiveness(self.focus)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CabinetAssignment {
    pub warrior: Posting<WarriorAssignment>,
    pub mage: Posting<MageAssignment>,
    pub engineer: Posting<EngineerAssignment>,
    pub diplomat: Posting<DiplomatAssignment>,
}

impl CabinetAssignment {
    /// Sum of focus across all four ministers.
    pub fn total_focus(&self) -> u32 {
        [
            self.warrior.focus,
            self.mage.focus,
            self.engineer.focus,
            self.diplomat.focus,
        ]
        .iter()
        .map(|&f| u32::from(f))
        .sum()
    }
}

impl Default for CabinetAssignment {
    /// Balanced cabinet used for players that did not submit.
    fn default() -> Self {
        Self {
            warrior: Posting {
                focus: 2,
                assignment: WarriorAssignment::TariffManagement,
            },
            mage: Posting {
                focus: 3,
                assignment: MageAssignment::InterestRateControl,
            },
            engineer: Posting {
                focus: 3,
                assignment: EngineerAssignment::Infrastructure,
            },
            diplomat: Posting {
                focus: 2,
                assignment: DiplomatAssignment::TradeNegotiations,
            },
        }
    }
}
