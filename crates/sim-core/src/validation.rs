//! Bounds checks applied to submissions before any resolution work.

use crate::cabinet::{
    Assignment, CabinetAssignment, MinisterRole, Posting, MAX_FOCUS_PER_MINISTER,
    TOTAL_FOCUS_POINTS,
};
use crate::policy::PolicyChoices;
use crate::resources::INTEREST_RATE_RANGE;
use thiserror::Error;

/// Maximum combined government spending in percent of GDP.
pub const MAX_TOTAL_SPENDING: f64 = 30.0;
pub const TAX_RATE_RANGE: (f64, f64) = (15.0, 45.0);
pub const TARIFF_RATE_RANGE: (f64, f64) = (0.0, 25.0);
pub const EDUCATION_SPENDING_RANGE: (f64, f64) = (0.0, 10.0);
pub const HEALTHCARE_SPENDING_RANGE: (f64, f64) = (0.0, 15.0);
pub const INFRASTRUCTURE_SPENDING_RANGE: (f64, f64) = (0.0, 10.0);

/// A single violated bound in a submission.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{role} focus {focus} exceeds the per-minister maximum")]
    FocusOutOfRange { role: MinisterRole, focus: u8 },
    #[error("cabinet must use exactly 10 focus points (using {0})")]
    FocusTotal(u32),
    #[error("{role} assignment {assignment} requires focus {required}+ (has {focus})")]
    FocusBelowMinimum {
        role: MinisterRole,
        assignment: &'static str,
        required: u8,
        focus: u8,
    },
    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("total government spending {0}% exceeds 30% of GDP")]
    SpendingTotal(f64),
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}

fn check_posting<A: Assignment>(
    role: MinisterRole,
    posting: &Posting<A>,
    errors: &mut Vec<ValidationError>,
) {
    if posting.focus > MAX_FOCUS_PER_MINISTER {
        errors.push(ValidationError::FocusOutOfRange {
            role,
            focus: posting.focus,
        });
    }
    let required = posting.assignment.min_focus();
    if posting.focus < required {
        errors.push(ValidationError::FocusBelowMinimum {
            role,
            assignment: posting.assignment.id(),
            required,
            focus: posting.focus,
        });
    }
}

/// Validate a cabinet, reporting every violation at once.
pub fn validate_cabinet(cabinet: &CabinetAssignment) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_posting(MinisterRole::Warrior, &cabinet.warrior, &mut errors);
    check_posting(MinisterRole::Mage, &cabinet.mage, &mut errors);
    check_posting(MinisterRole::Engineer, &cabinet.engineer, &mut errors);
    check_posting(MinisterRole::Diplomat, &cabinet.diplomat, &mut errors);
    let total = cabinet.total_focus();
    if total != u32::from(TOTAL_FOCUS_POINTS) {
        errors.push(ValidationError::FocusTotal(total));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_range(
    field: &'static str,
    value: f64,
    (min, max): (f64, f64),
    errors: &mut Vec<ValidationError>,
) {
    if !value.is_finite() {
        errors.push(ValidationError::NonFinite(field));
    } else if value < min || value > max {
        errors.push(ValidationError::OutOfRange {
            field,
            min,
            max,
            value,
        });
    }
}

/// Validate a full policy package, including its cabinet.
pub fn validate_policies(policies: &PolicyChoices) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_range(
        "interest_rate",
        policies.interest_rate,
        INTEREST_RATE_RANGE,
        &mut errors,
    );
    check_range("tax_rate", policies.tax_rate, TAX_RATE_RANGE, &mut errors);
    check_range(
        "tariff_rate",
        policies.tariff_rate,
        TARIFF_RATE_RANGE,
        &mut errors,
    );
    check_range(
        "gov_spending_education",
        policies.gov_spending_education,
        EDUCATION_SPENDING_RANGE,
        &mut errors,
    );
    check_range(
        "gov_spending_healthcare",
        policies.gov_spending_healthcare,
        HEALTHCARE_SPENDING_RANGE,
        &mut errors,
    );
    check_range(
        "gov_spending_infrastructure",
        policies.gov_spending_infrastructure,
        INFRASTRUCTURE_SPENDING_RANGE,
        &mut errors,
    );
    let total = policies.total_gov_spending();
    if total.is_finite() && total > MAX_TOTAL_SPENDING {
        errors.push(ValidationError::SpendingTotal(total));
    }
    if let Err(cabinet_errors) = validate_cabinet(&policies.cabinet) {
        errors.extend(cabinet_errors);
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cabinet::{DiplomatAssignment, MageAssignment, WarriorAssignment};
    use proptest::prelude::*;

    #[test]
    fn default_policy_is_valid() {
        assert!(validate_policies(&PolicyChoices::default()).is_ok());
    }

    #[test]
    fn focus_sum_must_be_ten() {
        let mut cabinet = CabinetAssignment::default();
        cabinet.warrior.focus = 3;
        let errs = validate_cabinet(&cabinet).unwrap_err();
        assert_eq!(errs, vec![ValidationError::FocusTotal(11)]);
    }

    #[test]
    fn min_focus_assignments_are_gated() {
        let mut cabinet = CabinetAssignment::default();
        cabinet.warrior.assignment = WarriorAssignment::EconomicWarfare;
        cabinet.diplomat.assignment = DiplomatAssignment::InternationalAid;
        let errs = validate_cabinet(&cabinet).unwrap_err();
        assert_eq!(errs.len(), 2);
        assert!(errs.contains(&ValidationError::FocusBelowMinimum {
            role: MinisterRole::Warrior,
            assignment: "economic_warfare",
            required: 4,
            focus: 2,
        }));
    }

    #[test]
    fn forward_guidance_allowed_at_three() {
        let mut cabinet = CabinetAssignment::default();
        cabinet.mage.assignment = MageAssignment::ForwardGuidance;
        assert!(validate_cabinet(&cabinet).is_ok());
    }

    #[test]
    fn all_policy_violations_are_reported() {
        let policies = PolicyChoices {
            tax_rate: 50.0,
            tariff_rate: -1.0,
            gov_spending_education: 10.0,
            gov_spending_healthcare: 15.0,
            gov_spending_infrastructure: 10.0,
            interest_rate: f64::NAN,
            ..PolicyChoices::default()
        };
        let errs = validate_policies(&policies).unwrap_err();
        assert!(errs.contains(&ValidationError::SpendingTotal(35.0)));
        assert!(errs.contains(&ValidationError::NonFinite("interest_rate")));
        assert!(errs
            .iter()
            .any(|e| matches!(e, ValidationError::OutOfRange { field: "tax_rate", .. })));
        assert!(errs
            .iter()
            .any(|e| matches!(e, ValidationError::OutOfRange { field: "tariff_rate", .. })));
        assert_eq!(errs.len(), 4);
    }

    fn focus_split() -> impl Strategy<Value = [u8; 4]> {
        [0u8..=4, 0u8..=4, 0u8..=4, 0u8..=4]
    }

    proptest! {
        #[test]
        fn accepted_cabinets_sum_to_total(split in focus_split()) {
            let mut cabinet = CabinetAssignment::default();
            cabinet.warrior.focus = split[0];
            cabinet.mage.focus = split[1];
            cabinet.engineer.focus = split[2];
            cabinet.diplomat.focus = split[3];
            let sum: u32 = split.iter().map(|&f| u32::from(f)).sum();
            let ok = validate_cabinet(&cabinet).is_ok();
            prop_assert_eq!(ok, sum == u32::from(TOTAL_FOCUS_POINTS));
        }
    }
}
