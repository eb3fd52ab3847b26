use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// A set of properties sharing one utility meter and one bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyGroup {
    pub id: String,
    pub name: String,
    /// Member names, in display order.
    pub properties: Vec<String>,
    /// The one member without its own meter.
    pub residual_receiver: String,
}

impl EnergyGroup {
    pub fn is_residual_receiver(&self, name: &str) -> bool {
        self.residual_receiver == name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,
}

/// A rentable property from the catalog, linked to a group member by
/// `energy_unit_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: String,
    pub name: String,
    pub energy_unit_name: String,
    #[serde(default)]
    pub tenant: Option<Tenant>,
}

/// One property's share of a group bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SharedPropertyConsumption {
    pub id: String,
    pub name: String,
    pub group_id: String,
    pub property_id: Option<String>,
    pub tenant_id: Option<String>,
    pub tenant_name: Option<String>,
    pub has_meter: bool,
    pub is_residual_receiver: bool,
    /// Meter value at the start of the period (kWh). Only meaningful with a meter.
    pub previous_reading: f64,
    /// Meter value at the end of the period (kWh). Only meaningful with a meter.
    pub current_reading: f64,
    pub monthly_consumption: f64,
    pub proportional_consumption: f64,
    pub proportional_value: f64,
    pub is_paid: bool,
    pub due_date: Option<NaiveDate>,
}

impl SharedPropertyConsumption {
    /// Fresh record for a group member with zeroed readings.
    pub fn new(name: &str, group_id: &str, has_meter: bool, is_residual_receiver: bool) -> Self {
        Self {
            id: format!("{}-{}", group_id, name),
            name: name.to_string(),
            group_id: group_id.to_string(),
            has_meter,
            is_residual_receiver,
            ..Default::default()
        }
    }

    /// Attach catalog linkage. A property without a tenant leaves the
    /// tenant fields empty.
    pub fn with_property(mut self, property: &Property) -> Self {
        self.property_id = Some(property.id.clone());
        self.tenant_id = property.tenant.as_ref().map(|t| t.id.clone());
        self.tenant_name = property.tenant.as_ref().map(|t| t.name.clone());
        self
    }
}

/// One billing period of one group, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyBill {
    pub id: String,
    pub date: NaiveDate,
    pub group_id: String,
    pub group_name: String,
    /// Money owed for the whole group.
    pub total_group_value: f64,
    /// kWh billed for the whole group.
    pub total_group_consumption: f64,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub observations: String,
    pub properties_in_group: Vec<SharedPropertyConsumption>,
    pub created_at: DateTime<Local>,
    pub last_updated: DateTime<Local>,
}

/// A bill candidate before the store has assigned an id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewEnergyBill {
    pub date: NaiveDate,
    pub group_id: String,
    pub group_name: String,
    pub total_group_value: f64,
    pub total_group_consumption: f64,
    pub is_paid: bool,
    pub observations: String,
    pub properties_in_group: Vec<SharedPropertyConsumption>,
}

impl NewEnergyBill {
    pub fn into_bill(
        self,
        id: String,
        created_at: DateTime<Local>,
        last_updated: DateTime<Local>,
    ) -> EnergyBill {
        EnergyBill {
            id,
            date: self.date,
            group_id: self.group_id,
            group_name: self.group_name,
            total_group_value: self.total_group_value,
            total_group_consumption: self.total_group_consumption,
            is_paid: self.is_paid,
            observations: self.observations,
            properties_in_group: self.properties_in_group,
            created_at,
            last_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_property_uses_group_scoped_id() {
        let p = SharedPropertyConsumption::new("Casa 2", "g1", true, false);
        assert_eq!(p.id, "g1-Casa 2");
        assert_eq!(p.previous_reading, 0.0);
        assert!(p.tenant_id.is_none());
    }

    #[test]
    fn property_without_tenant_links_id_only() {
        let catalog = Property {
            id: "p-7".into(),
            name: "Kitnet 7".into(),
            energy_unit_name: "Casa 2".into(),
            tenant: None,
        };
        let p = SharedPropertyConsumption::new("Casa 2", "g1", true, false).with_property(&catalog);
        assert_eq!(p.property_id.as_deref(), Some("p-7"));
        assert!(p.tenant_name.is_none());
    }

    #[test]
    fn bill_reads_camel_case_json() {
        let json = r#"{
            "id": "bill-1",
            "date": "2024-03-01",
            "groupId": "g1",
            "groupName": "Group 1",
            "totalGroupValue": 900.0,
            "totalGroupConsumption": 120.0,
            "propertiesInGroup": [
                { "name": "Casa 1", "hasMeter": true, "previousReading": 100, "currentReading": 150 }
            ],
            "createdAt": "2024-03-02T10:00:00-03:00",
            "lastUpdated": "2024-03-02T10:00:00-03:00"
        }"#;
        let bill: EnergyBill = serde_json::from_str(json).unwrap();
        assert_eq!(bill.properties_in_group.len(), 1);
        assert!(bill.properties_in_group[0].has_meter);
        assert!(!bill.is_paid);
        assert_eq!(bill.observations, "");
    }
}
