use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use log::{error, info, warn};
use serde::Serialize;

use energysplit::config::{self, BillArgs, Command, GroupConfig};
use energysplit::draft::BillDraft;
use energysplit::history;
use energysplit::model::{EnergyBill, NewEnergyBill};
use energysplit::mqtt;
use energysplit::store::{BillStore, JsonFileStore};
use energysplit::validate::Validation;

/// What `new` and `edit` print: the recomputed draft and what to look at.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DraftReport<'a> {
    id: Option<&'a str>,
    bill: &'a NewEnergyBill,
    validation: &'a Validation,
    insights: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::init();

    let config = config::Config::parse();
    info!("Starting energysplit");

    let groups = GroupConfig::load(&config.groups)?;
    info!(
        "Loaded {} energy group(s) from {}",
        groups.groups().len(),
        config.groups.display()
    );
    let catalog = config::load_properties(config.properties.as_deref())?;
    let mut store = JsonFileStore::new(&config.bills);

    match &config.command {
        Command::Groups => print_json(groups.groups()),
        Command::Stats { group } => {
            let bills = store.list()?;
            print_json(&history::compute_stats(&bills, group))
        }
        Command::History { group } => {
            let bills: Vec<EnergyBill> = store
                .list()?
                .into_iter()
                .filter(|b| &b.group_id == group)
                .collect();
            print_json(&bills)
        }
        Command::Delete { id } => {
            let Some(bill) = store.get(id)? else {
                bail!("No bill with id {} in {}", id, store.path().display());
            };
            store
                .delete(id)
                .with_context(|| format!("Bill {} not deleted", id))?;
            print_json(&bill)
        }
        Command::New(args) => {
            let group_id = args
                .group
                .as_deref()
                .context("--group is required for a new bill")?;
            let group = groups
                .find(group_id)
                .with_context(|| format!("Unknown energy group {}", group_id))?;
            let bills = store.list()?;

            let date = args.date.unwrap_or_else(|| Local::now().date_naive());
            let mut draft = BillDraft::new(group, &catalog, date);
            if args.import_previous {
                import_previous(&mut draft, &bills);
            }
            apply_args(&mut draft, args);
            report(&draft, &bills)?;

            if args.save {
                let saved = store
                    .create(checked(&draft))
                    .context("Bill not saved; the draft above was not persisted")?;
                announce(&config, &saved);
            }
            Ok(())
        }
        Command::Edit { id, bill: args } => {
            let bills = store.list()?;
            let Some(position) = bills.iter().position(|b| &b.id == id) else {
                bail!("No bill with id {} in {}", id, store.path().display());
            };
            let stored = &bills[position];
            if let Some(group) = args.group.as_deref() {
                if group != stored.group_id {
                    bail!("Bill {} belongs to group {}, not {}", id, stored.group_id, group);
                }
            }

            let mut draft = BillDraft::from_bill(stored);
            if args.import_previous {
                import_previous(&mut draft, &bills[..position]);
            }
            apply_args(&mut draft, args);
            report(&draft, &bills[..position])?;

            if args.save {
                let saved = store
                    .update(id, checked(&draft))
                    .context("Bill not updated; the draft above was not persisted")?;
                announce(&config, &saved);
            }
            Ok(())
        }
    }
}

fn import_previous(draft: &mut BillDraft, bills: &[EnergyBill]) {
    let group_id = draft.bill().group_id.clone();
    match history::latest_bill_for_group(bills, &group_id) {
        Some(previous) => {
            info!("Importing opening readings from {}", previous.id);
            draft.import_previous_month(previous);
        }
        None => warn!("No previous bill for group {}, nothing to import", group_id),
    }
}

fn apply_args(draft: &mut BillDraft, args: &BillArgs) {
    if let Some(date) = args.date {
        draft.set_date(date);
    }
    if args.paid {
        draft.set_paid(true);
    }
    if let Some(observations) = &args.observations {
        draft.set_observations(observations.as_str());
    }

    for reading in &args.readings {
        let applied = match reading.previous {
            Some(previous) => draft.set_readings(&reading.name, previous, reading.current),
            None => draft.set_current_reading(&reading.name, reading.current),
        };
        if !applied {
            warn!("No metered property named {}, reading ignored", reading.name);
        }
    }

    if args.value.is_some() || args.consumption.is_some() {
        let bill = draft.bill();
        let value = args.value.unwrap_or(bill.total_group_value);
        let consumption = args.consumption.unwrap_or(bill.total_group_consumption);
        draft.set_totals(value, consumption);
    }

    for name in &args.paid_properties {
        if !draft.set_property_paid(name, true) {
            warn!("No property named {}, payment ignored", name);
        }
    }
    for (name, due_date) in &args.due_dates {
        if !draft.set_due_date(name, *due_date) {
            warn!("No property named {}, due date ignored", name);
        }
    }
}

fn report(draft: &BillDraft, bills: &[EnergyBill]) -> Result<()> {
    let bill = draft.bill();
    let insights = history::generate_insights(bill, bills, &bill.group_id);
    print_json(&DraftReport {
        id: draft.id(),
        bill,
        validation: draft.validation(),
        insights: insights.iter().collect(),
    })
}

/// The candidate for the store. An unbalanced draft is still saved; the
/// mismatch is logged so it can be fixed with `edit`.
fn checked(draft: &BillDraft) -> NewEnergyBill {
    if !draft.validation().is_valid {
        warn!("Saving unbalanced bill: {}", draft.validation().message);
    }
    draft.to_new_bill()
}

fn announce(config: &config::Config, saved: &EnergyBill) {
    info!("Saved {} ({})", saved.id, saved.group_name);
    if let Some(target) = mqtt::MqttTarget::from_config(config) {
        if let Err(e) = mqtt::publish_bill(&target, saved) {
            error!("Failed to publish {}: {}", saved.id, e);
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
