use crate::model::SharedPropertyConsumption;

/// Consumption between two meter readings. A reading that went backwards
/// (meter swap, typo) yields 0 instead of a negative share.
pub fn compute_consumption(current: f64, previous: f64) -> f64 {
    (current - previous).max(0.0)
}

/// Consumption recorded by the property's own meter; always 0 without one.
pub fn monthly_consumption(property: &SharedPropertyConsumption) -> f64 {
    if property.has_meter {
        compute_consumption(property.current_reading, property.previous_reading)
    } else {
        0.0
    }
}

/// True when a metered property's current reading is below the previous one.
/// A zero current reading has not been entered yet and is not a rollback.
pub fn is_meter_rollback(property: &SharedPropertyConsumption) -> bool {
    property.has_meter
        && property.current_reading > 0.0
        && property.current_reading < property.previous_reading
}
