// src/matcher.rs

use crate::heuristics::ReceiptItem;
use crate::model::OrderLine;
use indexmap::IndexMap;
use tracing::{debug, info};

/// Result of back-filling prices from a receipt.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub lines: Vec<OrderLine>,
    /// Number of lines that had no price before and have one now.
    pub updated_count: usize,
    /// Positions in `lines` that were priced by this run.
    pub newly_priced: Vec<usize>,
}

/// Lowercase and collapse whitespace runs.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Label -> unit price, in receipt order. The first receipt line with a given
/// label wins; items without a positive price are left out.
pub fn price_map(items: &[ReceiptItem]) -> IndexMap<String, f64> {
    let mut prices = IndexMap::new();
    for item in items {
        let Some(price) = item.unit_price.filter(|p| *p > 0.0) else {
            continue;
        };
        let key = normalize_label(&item.label);
        if key.is_empty() {
            continue;
        }
        prices.entry(key).or_insert(price);
    }
    prices
}

/// Look up a price for one order label: exact match first, then the first
/// receipt label where one is a prefix of the other.
pub fn find_price(prices: &IndexMap<String, f64>, label: &str) -> Option<f64> {
    let key = normalize_label(label);
    if key.is_empty() {
        return None;
    }
    if let Some(price) = prices.get(&key) {
        return Some(*price);
    }
    prices
        .iter()
        .find(|(receipt_label, _)| {
            receipt_label.starts_with(key.as_str()) || key.starts_with(receipt_label.as_str())
        })
        .map(|(_, price)| *price)
}

/// Give every unpriced order line the receipt price of its item. Lines that
/// already carry a price are left untouched, so running this twice is a no-op.
pub fn apply(items: &[ReceiptItem], mut lines: Vec<OrderLine>) -> MatchOutcome {
    let prices = price_map(items);
    let mut newly_priced = Vec::new();

    for (idx, line) in lines.iter_mut().enumerate() {
        if line.has_price() {
            continue;
        }
        match find_price(&prices, &line.item_label) {
            Some(price) => {
                debug!(label = %line.item_label, price, "Order line priced from receipt");
                line.unit_price = Some(price);
                newly_priced.push(idx);
            }
            None => debug!(label = %line.item_label, "No receipt item for order line"),
        }
    }

    info!(
        receipt_items = prices.len(),
        updated = newly_priced.len(),
        "Receipt prices matched"
    );

    MatchOutcome {
        updated_count: newly_priced.len(),
        newly_priced,
        lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(label: &str, price: Option<f64>) -> ReceiptItem {
        ReceiptItem {
            label: label.to_string(),
            quantity: 1,
            unit_price: price,
            line_total: price,
        }
    }

    #[test]
    fn test_exact_match_ignores_case_and_spacing() {
        let items = vec![item("Witte  Wijn", Some(5.25))];
        let lines = vec![OrderLine::new("witte wijn", 2).for_person("Timo")];

        let outcome = apply(&items, lines);
        assert_eq!(outcome.updated_count, 1);
        assert_eq!(outcome.lines[0].unit_price, Some(5.25));
    }

    #[test]
    fn test_prefix_match_both_directions() {
        let items = vec![item("Bier tap 0,5L", Some(4.0)), item("Nachos", Some(7.5))];
        let lines = vec![
            OrderLine::new("bier", 1),
            OrderLine::new("nachos deluxe", 1),
            OrderLine::new("soep", 1),
        ];

        let outcome = apply(&items, lines);
        assert_eq!(outcome.lines[0].unit_price, Some(4.0));
        assert_eq!(outcome.lines[1].unit_price, Some(7.5));
        assert_eq!(outcome.lines[2].unit_price, None);
        assert_eq!(outcome.newly_priced, vec![0, 1]);
    }

    #[test]
    fn test_first_prefix_hit_wins() {
        let items = vec![item("Cola Zero", Some(2.8)), item("Cola Light", Some(2.6))];
        let outcome = apply(&items, vec![OrderLine::new("cola", 1)]);
        assert_eq!(outcome.lines[0].unit_price, Some(2.8));
    }

    #[test]
    fn test_never_overwrites_manual_price() {
        let items = vec![item("Bier", Some(3.2))];
        let lines = vec![
            OrderLine::new("bier", 1).with_price(5.0),
            OrderLine::new("bier", 1).with_price(0.0),
        ];

        let outcome = apply(&items, lines);
        assert_eq!(outcome.lines[0].unit_price, Some(5.0));
        // zero counts as missing
        assert_eq!(outcome.lines[1].unit_price, Some(3.2));
        assert_eq!(outcome.updated_count, 1);
    }

    #[test]
    fn test_second_run_is_noop() {
        let items = vec![item("Bier", Some(3.2)), item("Pizza", Some(9.0))];
        let lines = vec![OrderLine::new("bier", 2), OrderLine::new("pizza", 1)];

        let first = apply(&items, lines);
        assert_eq!(first.updated_count, 2);

        let second = apply(&items, first.lines.clone());
        assert_eq!(second.updated_count, 0);
        assert_eq!(second.lines, first.lines);
    }

    #[test]
    fn test_unpriced_and_empty_items_ignored() {
        let items = vec![item("Bier", None), item("  ", Some(1.0)), item("Bier", Some(0.0))];
        assert!(price_map(&items).is_empty());

        let outcome = apply(&items, vec![OrderLine::new("bier", 1)]);
        assert_eq!(outcome.updated_count, 0);
        assert_eq!(outcome.lines[0].unit_price, None);
    }
}
