use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::{EnergyGroup, Property};

#[derive(Parser, Debug)]
#[command(
    name = "energysplit",
    about = "Split a shared energy bill across the properties of a group"
)]
pub struct Config {
    /// JSON file with the energy group definitions
    #[arg(long, default_value = "energy-groups.json")]
    pub groups: PathBuf,

    /// JSON file holding the bill history
    #[arg(long, default_value = "energy-bills.json")]
    pub bills: PathBuf,

    /// JSON property catalog used to link group members to tenants
    #[arg(long)]
    pub properties: Option<PathBuf>,

    /// MQTT broker hostname; saved bills are published when set
    #[arg(long)]
    pub mqtt_host: Option<String>,

    /// MQTT broker port
    #[arg(long, default_value_t = 1883)]
    pub mqtt_port: u16,

    /// MQTT client ID
    #[arg(long, default_value = "energysplit")]
    pub mqtt_client_id: String,

    /// MQTT topic to publish saved bills to
    #[arg(long, default_value = "energy/bills")]
    pub mqtt_topic: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the configured energy groups
    Groups,
    /// Build a new bill for a group
    New(BillArgs),
    /// Edit a stored bill
    Edit {
        /// Id of the stored bill
        #[arg(long)]
        id: String,
        #[command(flatten)]
        bill: BillArgs,
    },
    /// Averages and trend for a group
    Stats {
        #[arg(long)]
        group: String,
    },
    /// List the stored bills of a group
    History {
        #[arg(long)]
        group: String,
    },
    /// Remove a stored bill
    Delete {
        /// Id of the stored bill
        #[arg(long)]
        id: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct BillArgs {
    /// Group id (required for new bills)
    #[arg(long)]
    pub group: Option<String>,

    /// Billing date, YYYY-MM-DD (defaults to today for new bills)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Total money value of the group bill
    #[arg(long)]
    pub value: Option<f64>,

    /// Total kWh of the group bill
    #[arg(long)]
    pub consumption: Option<f64>,

    /// Meter readings as NAME=PREVIOUS:CURRENT, or NAME=CURRENT to keep the
    /// opening reading (repeatable)
    #[arg(long = "reading", value_parser = parse_reading)]
    pub readings: Vec<ReadingArg>,

    /// Mark a property's share as paid (repeatable)
    #[arg(long = "paid-property")]
    pub paid_properties: Vec<String>,

    /// Due date for a property's share as NAME=YYYY-MM-DD (repeatable)
    #[arg(long = "due-date", value_parser = parse_due_date)]
    pub due_dates: Vec<(String, NaiveDate)>,

    /// Mark the whole group bill as paid
    #[arg(long)]
    pub paid: bool,

    /// Free-text note stored with the bill
    #[arg(long)]
    pub observations: Option<String>,

    /// Seed opening readings from the group's latest stored bill
    #[arg(long)]
    pub import_previous: bool,

    /// Persist the bill instead of only printing it
    #[arg(long)]
    pub save: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadingArg {
    pub name: String,
    /// Absent when only the closing value was given; the draft keeps its
    /// imported or stored opening reading.
    pub previous: Option<f64>,
    pub current: f64,
}

fn parse_reading(s: &str) -> Result<ReadingArg, String> {
    let (name, values) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=CURRENT or NAME=PREVIOUS:CURRENT, got {:?}", s))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid reading {:?}: {}", v, e))
    };
    let (previous, current) = match values.split_once(':') {
        Some((previous, current)) => (Some(parse(previous)?), parse(current)?),
        None => (None, parse(values)?),
    };
    Ok(ReadingArg {
        name: name.trim().to_string(),
        previous,
        current,
    })
}

fn parse_due_date(s: &str) -> Result<(String, NaiveDate), String> {
    let (name, date) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=YYYY-MM-DD, got {:?}", s))?;
    let date = date
        .trim()
        .parse::<NaiveDate>()
        .map_err(|e| format!("invalid date {:?}: {}", date, e))?;
    Ok((name.trim().to_string(), date))
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GroupConfigError {
    #[error("no energy groups configured")]
    Empty,
    #[error("energy group with empty id")]
    EmptyId,
    #[error("duplicate energy group id {0:?}")]
    DuplicateId(String),
    #[error("group {group:?} lists property {property:?} more than once")]
    DuplicateProperty { group: String, property: String },
    #[error("group {group:?} has residual receiver {receiver:?} which is not one of its properties")]
    ResidualNotMember { group: String, receiver: String },
}

/// The energy groups, loaded once at startup.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    groups: Vec<EnergyGroup>,
}

impl GroupConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read group config {}", path.display()))?;
        let groups: Vec<EnergyGroup> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse group config {}", path.display()))?;
        Ok(Self::new(groups)?)
    }

    /// Validate the group list: unique non-empty ids, unique members and
    /// exactly one residual receiver that belongs to the group.
    pub fn new(groups: Vec<EnergyGroup>) -> Result<Self, GroupConfigError> {
        if groups.is_empty() {
            return Err(GroupConfigError::Empty);
        }

        let mut ids = HashSet::new();
        for group in &groups {
            if group.id.trim().is_empty() {
                return Err(GroupConfigError::EmptyId);
            }
            if !ids.insert(group.id.as_str()) {
                return Err(GroupConfigError::DuplicateId(group.id.clone()));
            }

            let mut members = HashSet::new();
            for property in &group.properties {
                if !members.insert(property.as_str()) {
                    return Err(GroupConfigError::DuplicateProperty {
                        group: group.id.clone(),
                        property: property.clone(),
                    });
                }
            }
            if !members.contains(group.residual_receiver.as_str()) {
                return Err(GroupConfigError::ResidualNotMember {
                    group: group.id.clone(),
                    receiver: group.residual_receiver.clone(),
                });
            }
        }

        Ok(Self { groups })
    }

    pub fn groups(&self) -> &[EnergyGroup] {
        &self.groups
    }

    pub fn find(&self, id: &str) -> Option<&EnergyGroup> {
        self.groups.iter().find(|g| g.id == id)
    }
}

/// Load the property catalog. Without a path the catalog is empty and no
/// member gets tenant linkage.
pub fn load_properties(path: Option<&Path>) -> Result<Vec<Property>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read property catalog {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse property catalog {}", path.display()))
}
