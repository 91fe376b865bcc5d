// src/heuristics/mod.rs

pub mod catalog;
pub mod numbers;
pub mod order_text;
pub mod receipt;

use serde::Deserialize;
use serde::Serialize;

pub use catalog::{Catalog, CatalogEntry};
pub use order_text::OrderTextParser;
pub use receipt::ReceiptTextParser;

/// A single parsed receipt line, before it is matched to any order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub label: String,
    pub quantity: u32,
    pub unit_price: Option<f64>,
    /// The amount printed on the line, when the line carried one.
    pub line_total: Option<f64>,
}

/// Totals found on the receipt. Each one is detected independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptTotals {
    pub tip: Option<f64>,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub total: Option<f64>,
}

/// Everything we can extract from one OCR transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedReceipt {
    pub items: Vec<ReceiptItem>,
    pub totals: ReceiptTotals,
    pub discarded_lines: usize,
}

impl ParsedReceipt {
    /// How many items carry a unit price (out of all items).
    pub fn coverage(&self) -> (usize, usize) {
        let priced = self
            .items
            .iter()
            .filter(|item| item.unit_price.is_some())
            .count();
        (priced, self.items.len())
    }

    /// Sum of the printed line amounts, for comparing against `totals`.
    pub fn items_sum(&self) -> f64 {
        let cents: i64 = self
            .items
            .iter()
            .filter_map(|item| item.line_total)
            .map(numbers::to_cents)
            .sum();
        numbers::from_cents(cents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverage_and_items_sum() {
        let receipt = ReceiptTextParser::new()
            .unwrap()
            .parse("2 Cola .... €5,00\n3x nachos\nPizza 8,50\nTotaal 13,50");
        assert_eq!(receipt.coverage(), (2, 3));
        assert_eq!(receipt.items_sum(), 13.5);
        assert_eq!(receipt.totals.total, Some(13.5));
    }
}
