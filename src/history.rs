//! Month-over-month view of a group's bills: importing last month's meter
//! values, averages and trend, and short insights about a draft.
//!
//! Every function here expects `bills` in chronological order and never
//! sorts them.

use serde::Serialize;

use crate::model::{EnergyBill, NewEnergyBill};
use crate::reading::is_meter_rollback;
use crate::validate::validate;

/// Percentage change between the latest two bills that still counts as
/// `Trend::Stable`.
pub const TREND_DEADBAND_PCT: f64 = 5.0;

/// Relative deviation from the group average that triggers a consumption
/// or value insight.
const AVERAGE_DEVIATION_PCT: f64 = 20.0;

/// Relative deviation of the price per kWh that triggers a price insight.
const PRICE_DEVIATION_PCT: f64 = 10.0;

/// Share of the group total above which the residual receiver is flagged.
const RESIDUAL_SHARE_LIMIT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionStats {
    pub bill_count: usize,
    pub average_consumption: f64,
    pub average_value: f64,
    /// Total value over total consumption across the history; 0 without consumption.
    pub average_price_per_kwh: f64,
    pub trend: Trend,
    /// Percent change of `total_group_consumption` between the latest two bills.
    pub monthly_variation: f64,
}

/// Last bill of the group, in caller order.
pub fn latest_bill_for_group<'a>(bills: &'a [EnergyBill], group_id: &str) -> Option<&'a EnergyBill> {
    bills.iter().rev().find(|b| b.group_id == group_id)
}

/// Carry last month's closing meter values into the draft as opening values.
///
/// Only metered properties are touched, matched by name. `current_reading`
/// is left for the user to fill in.
pub fn import_previous_month(mut draft: NewEnergyBill, previous: &EnergyBill) -> NewEnergyBill {
    for property in draft.properties_in_group.iter_mut().filter(|p| p.has_meter) {
        if let Some(prior) = previous
            .properties_in_group
            .iter()
            .find(|p| p.name == property.name)
        {
            property.previous_reading = prior.current_reading;
        }
    }
    draft
}

/// Averages and trend over the group's bills. With no bills everything is
/// zero and the trend is stable.
pub fn compute_stats(bills: &[EnergyBill], group_id: &str) -> ConsumptionStats {
    let group: Vec<&EnergyBill> = bills.iter().filter(|b| b.group_id == group_id).collect();

    let count = group.len();
    let total_consumption: f64 = group.iter().map(|b| b.total_group_consumption).sum();
    let total_value: f64 = group.iter().map(|b| b.total_group_value).sum();

    let (average_consumption, average_value) = if count > 0 {
        (total_consumption / count as f64, total_value / count as f64)
    } else {
        (0.0, 0.0)
    };

    let average_price_per_kwh = if total_consumption > 0.0 {
        total_value / total_consumption
    } else {
        0.0
    };

    let monthly_variation = match group.as_slice() {
        [.., before, latest] if before.total_group_consumption > 0.0 => {
            (latest.total_group_consumption - before.total_group_consumption)
                / before.total_group_consumption
                * 100.0
        }
        _ => 0.0,
    };

    ConsumptionStats {
        bill_count: count,
        average_consumption,
        average_value,
        average_price_per_kwh,
        trend: classify_trend(monthly_variation),
        monthly_variation,
    }
}

pub fn classify_trend(variation_pct: f64) -> Trend {
    if variation_pct > TREND_DEADBAND_PCT {
        Trend::Increasing
    } else if variation_pct < -TREND_DEADBAND_PCT {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

type Check = fn(&NewEnergyBill, &ConsumptionStats) -> Vec<String>;

const CHECKS: &[Check] = &[
    consumption_vs_average,
    value_vs_average,
    price_vs_average,
    recent_trend,
    residual_share,
    meter_rollbacks,
    consumption_mismatch,
    unpaid_properties,
];

/// Insights about a draft bill against its group's history.
///
/// Messages are produced lazily by [`Insights::iter`], which can be called
/// any number of times. Without history for the group there are none.
#[derive(Debug, Clone)]
pub struct Insights<'a> {
    draft: &'a NewEnergyBill,
    stats: Option<ConsumptionStats>,
}

impl<'a> Insights<'a> {
    pub fn iter<'s>(&'s self) -> impl Iterator<Item = String> + 's {
        let draft: &'s NewEnergyBill = self.draft;
        self.stats
            .iter()
            .flat_map(move |stats| CHECKS.iter().flat_map(move |check| check(draft, stats)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

pub fn generate_insights<'a>(
    draft: &'a NewEnergyBill,
    bills: &[EnergyBill],
    group_id: &str,
) -> Insights<'a> {
    let stats = compute_stats(bills, group_id);
    Insights {
        draft,
        stats: (stats.bill_count > 0).then_some(stats),
    }
}

fn percent_change(value: f64, reference: f64) -> f64 {
    (value - reference) / reference * 100.0
}

fn consumption_vs_average(draft: &NewEnergyBill, stats: &ConsumptionStats) -> Vec<String> {
    if draft.total_group_consumption <= 0.0 || stats.average_consumption <= 0.0 {
        return vec![];
    }
    let change = percent_change(draft.total_group_consumption, stats.average_consumption);
    if change > AVERAGE_DEVIATION_PCT {
        vec![format!(
            "Consumption of {:.0} kWh is {:.0}% above the group average ({:.0} kWh)",
            draft.total_group_consumption, change, stats.average_consumption
        )]
    } else if change < -AVERAGE_DEVIATION_PCT {
        vec![format!(
            "Consumption of {:.0} kWh is {:.0}% below the group average ({:.0} kWh)",
            draft.total_group_consumption, -change, stats.average_consumption
        )]
    } else {
        vec![]
    }
}

fn value_vs_average(draft: &NewEnergyBill, stats: &ConsumptionStats) -> Vec<String> {
    if draft.total_group_value <= 0.0 || stats.average_value <= 0.0 {
        return vec![];
    }
    let change = percent_change(draft.total_group_value, stats.average_value);
    if change > AVERAGE_DEVIATION_PCT {
        vec![format!(
            "Bill value of {:.2} is {:.0}% above the group average ({:.2})",
            draft.total_group_value, change, stats.average_value
        )]
    } else if change < -AVERAGE_DEVIATION_PCT {
        vec![format!(
            "Bill value of {:.2} is {:.0}% below the group average ({:.2})",
            draft.total_group_value, -change, stats.average_value
        )]
    } else {
        vec![]
    }
}

fn price_vs_average(draft: &NewEnergyBill, stats: &ConsumptionStats) -> Vec<String> {
    if draft.total_group_consumption <= 0.0
        || draft.total_group_value <= 0.0
        || stats.average_price_per_kwh <= 0.0
    {
        return vec![];
    }
    let price = draft.total_group_value / draft.total_group_consumption;
    let change = percent_change(price, stats.average_price_per_kwh);
    if change.abs() > PRICE_DEVIATION_PCT {
        vec![format!(
            "Price per kWh is {:.4}, {:+.0}% against the historical {:.4}",
            price, change, stats.average_price_per_kwh
        )]
    } else {
        vec![]
    }
}

fn recent_trend(_draft: &NewEnergyBill, stats: &ConsumptionStats) -> Vec<String> {
    match stats.trend {
        Trend::Increasing => vec![format!(
            "Consumption rose {:.1}% between the last two bills",
            stats.monthly_variation
        )],
        Trend::Decreasing => vec![format!(
            "Consumption fell {:.1}% between the last two bills",
            -stats.monthly_variation
        )],
        Trend::Stable => vec![],
    }
}

fn residual_share(draft: &NewEnergyBill, _stats: &ConsumptionStats) -> Vec<String> {
    if draft.total_group_consumption <= 0.0 {
        return vec![];
    }
    draft
        .properties_in_group
        .iter()
        .filter(|p| p.is_residual_receiver)
        .filter(|p| p.proportional_consumption / draft.total_group_consumption > RESIDUAL_SHARE_LIMIT)
        .map(|p| {
            format!(
                "{} has no meter and absorbs {:.0}% of the group consumption; check the readings",
                p.name,
                p.proportional_consumption / draft.total_group_consumption * 100.0
            )
        })
        .collect()
}

fn meter_rollbacks(draft: &NewEnergyBill, _stats: &ConsumptionStats) -> Vec<String> {
    draft
        .properties_in_group
        .iter()
        .filter(|p| is_meter_rollback(p))
        .map(|p| {
            format!(
                "Meter reading for {} went backwards ({:.1} -> {:.1}); consumption counted as 0",
                p.name, p.previous_reading, p.current_reading
            )
        })
        .collect()
}

fn consumption_mismatch(draft: &NewEnergyBill, _stats: &ConsumptionStats) -> Vec<String> {
    if draft.total_group_consumption <= 0.0 {
        return vec![];
    }
    let validation = validate(&draft.properties_in_group, draft.total_group_consumption);
    if validation.is_valid {
        vec![]
    } else {
        vec![validation.message]
    }
}

fn unpaid_properties(draft: &NewEnergyBill, _stats: &ConsumptionStats) -> Vec<String> {
    let unpaid: Vec<_> = draft
        .properties_in_group
        .iter()
        .filter(|p| !p.is_paid && p.proportional_value > 0.0)
        .collect();
    if unpaid.is_empty() {
        return vec![];
    }
    let amount: f64 = unpaid.iter().map(|p| p.proportional_value).sum();
    let names: Vec<&str> = unpaid
        .iter()
        .map(|p| p.tenant_name.as_deref().unwrap_or(&p.name))
        .collect();
    vec![format!(
        "{} of {} properties still unpaid, {:.2} outstanding: {}",
        unpaid.len(),
        draft.properties_in_group.len(),
        amount,
        names.join(", ")
    )]
}
