use serde::Serialize;

use crate::model::SharedPropertyConsumption;

/// Largest gap (kWh) between the group total and the distributed
/// consumption that still counts as balanced.
pub const CONSUMPTION_TOLERANCE_KWH: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    pub is_valid: bool,
    pub message: String,
    /// `total_consumption - sum(proportional_consumption)`.
    pub difference: f64,
}

/// Check that the distributed consumption adds up to the group total.
pub fn validate(properties: &[SharedPropertyConsumption], total_consumption: f64) -> Validation {
    let distributed: f64 = properties.iter().map(|p| p.proportional_consumption).sum();
    let difference = total_consumption - distributed;

    if total_consumption <= 0.0 && properties.iter().any(|p| p.monthly_consumption > 0.0) {
        return Validation {
            is_valid: false,
            message: format!(
                "Group total consumption is {:.2} kWh but the meters recorded {:.2} kWh",
                total_consumption, distributed
            ),
            difference,
        };
    }

    if difference.abs() <= CONSUMPTION_TOLERANCE_KWH {
        Validation {
            is_valid: true,
            message: format!(
                "Distribution matches the group total of {:.2} kWh",
                total_consumption
            ),
            difference,
        }
    } else if difference > 0.0 {
        Validation {
            is_valid: false,
            message: format!(
                "Distributed consumption is {:.2} kWh short of the group total ({:.2} of {:.2} kWh)",
                difference, distributed, total_consumption
            ),
            difference,
        }
    } else {
        Validation {
            is_valid: false,
            message: format!(
                "Distributed consumption exceeds the group total by {:.2} kWh ({:.2} of {:.2} kWh)",
                -difference, distributed, total_consumption
            ),
            difference,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shares(values: &[f64]) -> Vec<SharedPropertyConsumption> {
        values
            .iter()
            .map(|&v| SharedPropertyConsumption {
                has_meter: true,
                monthly_consumption: v,
                proportional_consumption: v,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn balanced_distribution_is_valid() {
        let v = validate(&shares(&[50.0, 20.0, 30.0, 20.0]), 120.0);
        assert!(v.is_valid);
        assert_eq!(v.difference, 0.0);
        assert!(v.message.contains("120.00"));
    }

    #[test]
    fn gap_within_tolerance_is_valid() {
        let v = validate(&shares(&[50.0, 69.995]), 120.0);
        assert!(v.is_valid);
        assert!((v.difference - 0.005).abs() < 1e-9);
    }

    #[test]
    fn shortfall_is_invalid() {
        let v = validate(&shares(&[50.0, 20.0]), 120.0);
        assert!(!v.is_valid);
        assert!((v.difference - 50.0).abs() < 1e-9);
        assert!(v.message.contains("short"));
    }

    #[test]
    fn excess_is_invalid() {
        let v = validate(&shares(&[50.0, 20.0, 30.0]), 80.0);
        assert!(!v.is_valid);
        assert!((v.difference + 20.0).abs() < 1e-9);
        assert!(v.message.contains("exceeds"));
    }

    #[test]
    fn readings_without_group_total_are_flagged() {
        let v = validate(&shares(&[10.0]), 0.0);
        assert!(!v.is_valid);
        assert!(v.message.contains("meters recorded"));
    }

    #[test]
    fn empty_bill_is_valid() {
        let v = validate(&[], 0.0);
        assert!(v.is_valid);
    }
}
