use chrono::NaiveDate;
use log::{debug, warn};

use crate::allocate::allocate_in_place;
use crate::history::import_previous_month;
use crate::model::{EnergyBill, EnergyGroup, NewEnergyBill, Property, SharedPropertyConsumption};
use crate::reading::{is_meter_rollback, monthly_consumption};
use crate::validate::{validate, Validation};

/// Catalog entry whose energy unit is the given group member, if any.
pub fn find_property_for_unit<'a>(catalog: &'a [Property], unit_name: &str) -> Option<&'a Property> {
    catalog.iter().find(|p| p.energy_unit_name == unit_name)
}

/// Property records for a group, with zero readings and tenant linkage
/// taken from the catalog.
pub fn seed_group_properties(group: &EnergyGroup, catalog: &[Property]) -> Vec<SharedPropertyConsumption> {
    group
        .properties
        .iter()
        .map(|name| {
            let is_residual = group.is_residual_receiver(name);
            let property = SharedPropertyConsumption::new(name, &group.id, !is_residual, is_residual);
            match find_property_for_unit(catalog, name) {
                Some(linked) => property.with_property(linked),
                None => {
                    debug!("No catalog property for energy unit {}", name);
                    property
                }
            }
        })
        .collect()
}

/// A bill being filled in. Every setter re-derives consumption, the
/// allocation and the validation, so the draft is always consistent.
#[derive(Debug, Clone)]
pub struct BillDraft {
    /// Set when editing a stored bill.
    id: Option<String>,
    bill: NewEnergyBill,
    validation: Validation,
}

impl BillDraft {
    pub fn new(group: &EnergyGroup, catalog: &[Property], date: NaiveDate) -> Self {
        let bill = NewEnergyBill {
            date,
            group_id: group.id.clone(),
            group_name: group.name.clone(),
            total_group_value: 0.0,
            total_group_consumption: 0.0,
            is_paid: false,
            observations: String::new(),
            properties_in_group: seed_group_properties(group, catalog),
        };
        Self::from_parts(None, bill)
    }

    /// Start from a stored bill; the stored readings and flags are kept.
    pub fn from_bill(bill: &EnergyBill) -> Self {
        let new_bill = NewEnergyBill {
            date: bill.date,
            group_id: bill.group_id.clone(),
            group_name: bill.group_name.clone(),
            total_group_value: bill.total_group_value,
            total_group_consumption: bill.total_group_consumption,
            is_paid: bill.is_paid,
            observations: bill.observations.clone(),
            properties_in_group: bill.properties_in_group.clone(),
        };
        Self::from_parts(Some(bill.id.clone()), new_bill)
    }

    fn from_parts(id: Option<String>, mut bill: NewEnergyBill) -> Self {
        let validation = rederive(&mut bill);
        Self { id, bill, validation }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn bill(&self) -> &NewEnergyBill {
        &self.bill
    }

    pub fn validation(&self) -> &Validation {
        &self.validation
    }

    pub fn set_date(&mut self, date: NaiveDate) {
        self.bill.date = date;
    }

    pub fn set_paid(&mut self, is_paid: bool) {
        self.bill.is_paid = is_paid;
    }

    pub fn set_observations(&mut self, observations: impl Into<String>) {
        self.bill.observations = observations.into();
    }

    pub fn set_totals(&mut self, total_value: f64, total_consumption: f64) {
        self.bill.total_group_value = total_value;
        self.bill.total_group_consumption = total_consumption;
        self.recompute();
    }

    /// Set both readings of a metered property. Returns false if no metered
    /// property has that name; the residual receiver never takes readings.
    pub fn set_readings(&mut self, name: &str, previous: f64, current: f64) -> bool {
        let Some(property) = self.property_mut(name) else {
            return false;
        };
        if !property.has_meter {
            return false;
        }
        property.previous_reading = previous;
        property.current_reading = current;
        self.recompute();
        true
    }

    /// Set only the closing reading, keeping the opening one (imported from
    /// last month or stored with the bill). Same lookup rules as `set_readings`.
    pub fn set_current_reading(&mut self, name: &str, current: f64) -> bool {
        let Some(property) = self.property_mut(name) else {
            return false;
        };
        if !property.has_meter {
            return false;
        }
        property.current_reading = current;
        self.recompute();
        true
    }

    pub fn set_property_paid(&mut self, name: &str, is_paid: bool) -> bool {
        match self.property_mut(name) {
            Some(property) => {
                property.is_paid = is_paid;
                true
            }
            None => false,
        }
    }

    pub fn set_due_date(&mut self, name: &str, due_date: NaiveDate) -> bool {
        match self.property_mut(name) {
            Some(property) => {
                property.due_date = Some(due_date);
                true
            }
            None => false,
        }
    }

    /// Use the previous bill's closing readings as this draft's opening ones.
    pub fn import_previous_month(&mut self, previous: &EnergyBill) {
        self.bill = import_previous_month(std::mem::take(&mut self.bill), previous);
        self.recompute();
    }

    /// The record handed to the store.
    pub fn to_new_bill(&self) -> NewEnergyBill {
        self.bill.clone()
    }

    fn property_mut(&mut self, name: &str) -> Option<&mut SharedPropertyConsumption> {
        self.bill.properties_in_group.iter_mut().find(|p| p.name == name)
    }

    fn recompute(&mut self) {
        self.validation = rederive(&mut self.bill);
    }
}

/// Re-derive consumption and the allocation, then validate the result.
fn rederive(bill: &mut NewEnergyBill) -> Validation {
    for property in bill.properties_in_group.iter_mut() {
        if is_meter_rollback(property) {
            warn!(
                "Meter reading for {} went backwards ({} -> {}), counting 0 kWh",
                property.name, property.previous_reading, property.current_reading
            );
        }
        property.monthly_consumption = monthly_consumption(property);
    }

    allocate_in_place(
        bill.total_group_value,
        bill.total_group_consumption,
        &mut bill.properties_in_group,
    );
    let validation = validate(&bill.properties_in_group, bill.total_group_consumption);

    debug!("Recomputed {} bill: {}", bill.group_id, validation.message);
    validation
}
