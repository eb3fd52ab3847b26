use crate::model::SharedPropertyConsumption;

/// Split a group bill across its properties.
///
/// Metered properties keep their own `monthly_consumption`; the residual
/// receiver gets whatever the group total has left over (never below 0).
/// Each property then pays `consumption / total_consumption * total_value`.
/// When the metered sum exceeds the group total the residual share is 0 and
/// the group is under-covered; that is reported by `validate`, not fixed here.
pub fn allocate(
    total_value: f64,
    total_consumption: f64,
    properties: &[SharedPropertyConsumption],
) -> Vec<SharedPropertyConsumption> {
    let mut allocated = properties.to_vec();
    allocate_in_place(total_value, total_consumption, &mut allocated);
    allocated
}

/// Same as [`allocate`], writing the shares into `properties`.
pub fn allocate_in_place(
    total_value: f64,
    total_consumption: f64,
    properties: &mut [SharedPropertyConsumption],
) {
    let residual = residual_consumption(total_consumption, properties);

    for property in properties.iter_mut() {
        property.proportional_consumption = if property.is_residual_receiver {
            residual
        } else if property.has_meter {
            property.monthly_consumption
        } else {
            0.0
        };

        property.proportional_value = if total_consumption == 0.0 {
            0.0
        } else {
            property.proportional_consumption / total_consumption * total_value
        };
    }
}

/// Sum of `monthly_consumption` over metered properties.
pub fn metered_sum(properties: &[SharedPropertyConsumption]) -> f64 {
    properties
        .iter()
        .filter(|p| p.has_meter)
        .map(|p| p.monthly_consumption)
        .sum()
}

/// What the residual receiver absorbs: the group total minus metered usage.
pub fn residual_consumption(total_consumption: f64, properties: &[SharedPropertyConsumption]) -> f64 {
    (total_consumption - metered_sum(properties)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::compute_consumption;

    fn metered(name: &str, previous: f64, current: f64) -> SharedPropertyConsumption {
        let mut p = SharedPropertyConsumption::new(name, "g1", true, false);
        p.previous_reading = previous;
        p.current_reading = current;
        p.monthly_consumption = compute_consumption(current, previous);
        p
    }

    fn residual(name: &str) -> SharedPropertyConsumption {
        SharedPropertyConsumption::new(name, "g1", false, true)
    }

    fn scenario() -> Vec<SharedPropertyConsumption> {
        vec![
            metered("Casa 1", 100.0, 150.0),
            metered("Casa 2", 200.0, 220.0),
            metered("Casa 3", 50.0, 80.0),
            residual("Casa 4"),
        ]
    }

    #[test]
    fn splits_by_share_of_group_total() {
        let out = allocate(900.0, 120.0, &scenario());

        let consumption: Vec<f64> = out.iter().map(|p| p.proportional_consumption).collect();
        assert_eq!(consumption, vec![50.0, 20.0, 30.0, 20.0]);

        let expected = [375.0, 150.0, 225.0, 150.0];
        for (p, want) in out.iter().zip(expected) {
            assert!((p.proportional_value - want).abs() < 1e-9, "{}: {}", p.name, p.proportional_value);
        }

        let total: f64 = out.iter().map(|p| p.proportional_value).sum();
        assert!((total - 900.0).abs() < 1e-6);
    }

    #[test]
    fn consumption_covers_total_exactly_when_metered_fits() {
        let out = allocate(313.37, 173.9, &scenario());
        let total: f64 = out.iter().map(|p| p.proportional_consumption).sum();
        assert_eq!(total, 173.9);
        let value: f64 = out.iter().map(|p| p.proportional_value).sum();
        assert!((value - 313.37).abs() < 313.37 * 1e-6);
    }

    #[test]
    fn zero_total_consumption_gives_zero_values() {
        let out = allocate(900.0, 0.0, &scenario());
        assert!(out.iter().all(|p| p.proportional_value == 0.0));
        assert_eq!(out[3].proportional_consumption, 0.0);
    }

    #[test]
    fn residual_clamped_when_metered_exceeds_total() {
        let out = allocate(500.0, 80.0, &scenario());
        assert_eq!(out[3].proportional_consumption, 0.0);
        let consumption: f64 = out.iter().map(|p| p.proportional_consumption).sum();
        assert_eq!(consumption, 100.0);
    }

    #[test]
    fn negative_totals_do_not_panic() {
        let out = allocate(-10.0, -5.0, &scenario());
        assert_eq!(out.len(), 4);
        assert_eq!(out[3].proportional_consumption, 0.0);
    }

    #[test]
    fn input_slice_is_not_modified() {
        let input = scenario();
        let _ = allocate(900.0, 120.0, &input);
        assert!(input.iter().all(|p| p.proportional_value == 0.0));
    }

    #[test]
    fn recomputing_is_idempotent() {
        let once = allocate(900.0, 120.0, &scenario());
        let twice = allocate(900.0, 120.0, &once);
        assert_eq!(once, twice);
    }
}
