// src/split.rs

use crate::error::ParseError;
use crate::heuristics::numbers::{from_cents, normalize, round2, to_cents};
use crate::model::{DEFAULT_COLOR, LineCharge, OrderLine, Person, SplitResult};
use indexmap::IndexMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// How the total gratuity is computed before it is shared out.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TipPolicy {
    #[default]
    None,
    /// Percentage of the grand subtotal, e.g. `10.0` for 10%.
    PercentOfSubtotal(f64),
    FixedCash(f64),
}

impl TipPolicy {
    /// Total tip for the whole table.
    pub fn total_tip(&self, grand_subtotal: f64) -> f64 {
        match *self {
            TipPolicy::None => 0.0,
            TipPolicy::PercentOfSubtotal(p) => round2(grand_subtotal * p / 100.0),
            TipPolicy::FixedCash(amount) => round2(amount),
        }
    }
}

impl FromStr for TipPolicy {
    type Err = ParseError;

    /// `none`, `10%`, `12,5 %`, `5,-`, `€5.00`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidTipPolicy {
            value: s.to_string(),
        };
        let value = s.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("none") {
            return Ok(TipPolicy::None);
        }

        let (number, percent) = match value.strip_suffix('%') {
            Some(head) => (head, true),
            None => (value, false),
        };
        let amount = normalize(number).map_err(|_| invalid())?;
        if amount < 0.0 {
            return Err(invalid());
        }
        Ok(if percent {
            TipPolicy::PercentOfSubtotal(amount)
        } else {
            TipPolicy::FixedCash(amount)
        })
    }
}

impl fmt::Display for TipPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TipPolicy::None => write!(f, "none"),
            TipPolicy::PercentOfSubtotal(p) => write!(f, "{p}%"),
            TipPolicy::FixedCash(amount) => write!(f, "{amount:.2}"),
        }
    }
}

/// Everything the presentation layer needs after a split.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitSummary {
    pub results: Vec<SplitResult>,
    /// Lines without a person. Never part of any total.
    pub unassigned: Vec<OrderLine>,
    /// Assigned lines with neither a real nor an estimated price.
    pub unpriced: Vec<OrderLine>,
    pub grand_subtotal: f64,
    pub total_tip: f64,
}

impl SplitSummary {
    pub fn grand_total(&self) -> f64 {
        from_cents(self.results.iter().map(|r| to_cents(r.total)).sum())
    }
}

struct Group {
    name: String,
    charges: Vec<LineCharge>,
    cents: i64,
}

/// Per-person bill. The tip is shared equally over everyone with at least one
/// priced line, regardless of how much each of them spent. All sums run on
/// whole cents; leftover cents of the tip go to the first people in order.
pub fn split(lines: &[OrderLine], people: &[Person], policy: TipPolicy) -> SplitSummary {
    let mut groups: IndexMap<String, Group> = IndexMap::new();
    let mut unassigned = Vec::new();
    let mut unpriced = Vec::new();

    for line in lines {
        let Some(name) = line.person_name.as_deref().filter(|_| line.is_assigned()) else {
            unassigned.push(line.clone());
            continue;
        };
        let Some(price) = line.effective_price() else {
            unpriced.push(line.clone());
            continue;
        };

        let cents = to_cents(price * f64::from(line.quantity));
        let group = groups
            .entry(name.trim().to_lowercase())
            .or_insert_with(|| Group {
                name: name.trim().to_string(),
                charges: Vec::new(),
                cents: 0,
            });
        group.charges.push(LineCharge {
            description: line.description(),
            amount: from_cents(cents),
        });
        group.cents += cents;
    }

    let grand_cents: i64 = groups.values().map(|g| g.cents).sum();
    let grand_subtotal = from_cents(grand_cents);
    let tip_cents = to_cents(policy.total_tip(grand_subtotal));

    let person_count = groups.len().max(1) as i64;
    let share = tip_cents.div_euclid(person_count);
    let leftover = tip_cents.rem_euclid(person_count);

    let results: Vec<SplitResult> = groups
        .into_values()
        .enumerate()
        .map(|(idx, group)| {
            let tip_cents = share + i64::from((idx as i64) < leftover);
            let person = people.iter().find(|p| p.matches_name(&group.name));
            let (person_id, person_name, initial, color) = match person {
                Some(p) => (Some(p.id), p.name.clone(), p.initial.clone(), p.color.clone()),
                None => {
                    debug!(name = %group.name, "No person record, using derived initial");
                    (
                        None,
                        group.name.clone(),
                        Person::initial_for(&group.name),
                        DEFAULT_COLOR.to_string(),
                    )
                }
            };
            SplitResult {
                person_id,
                person_name,
                initial,
                color,
                line_items: group.charges,
                subtotal: from_cents(group.cents),
                tip_and_tax: from_cents(tip_cents),
                total: from_cents(group.cents + tip_cents),
            }
        })
        .collect();

    info!(
        people = results.len(),
        unassigned = unassigned.len(),
        unpriced = unpriced.len(),
        subtotal = grand_subtotal,
        tip = from_cents(tip_cents),
        policy = %policy,
        "Bill split"
    );

    SplitSummary {
        results,
        unassigned,
        unpriced,
        grand_subtotal,
        total_tip: from_cents(tip_cents),
    }
}
