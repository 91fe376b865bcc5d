// src/model.rs

use serde::{Deserialize, Serialize};

/// Colors handed out to people in creation order.
pub const PALETTE: [&str; 6] = ["primary", "amber", "purple", "emerald", "red", "blue"];

/// Color for a name that has no matching person record.
pub const DEFAULT_COLOR: &str = "primary";

/// A diner in the current session. Names are unique case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub initial: String,
    pub color: String,
}

impl Person {
    /// Uppercase first character of `name`, or `?` for an empty name.
    pub fn initial_for(name: &str) -> String {
        name.trim()
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_else(|| "?".to_string())
    }

    /// `timo` -> `Timo`. The rest of the name is kept as typed.
    pub fn display_name(name: &str) -> String {
        let name = name.trim();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    pub fn palette_color(index: usize) -> &'static str {
        PALETTE[index % PALETTE.len()]
    }

    /// Case-folded form used for every name comparison.
    pub fn name_key(name: &str) -> String {
        name.trim().to_lowercase()
    }

    pub fn matches_name(&self, name: &str) -> bool {
        Self::name_key(&self.name) == Self::name_key(name)
    }
}

/// One (person, item, quantity, price) record of the group order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    /// `None` until the line is persisted.
    pub id: Option<i64>,
    pub item_label: String,
    pub quantity: u32,
    /// `None` means unassigned.
    pub person_name: Option<String>,
    /// Catalog estimate set by the order parser.
    pub estimated_price: Option<f64>,
    /// Receipt-matched or manually set price.
    pub unit_price: Option<f64>,
}

impl OrderLine {
    pub fn new(item_label: impl Into<String>, quantity: u32) -> Self {
        Self {
            id: None,
            item_label: item_label.into(),
            quantity,
            person_name: None,
            estimated_price: None,
            unit_price: None,
        }
    }

    pub fn for_person(mut self, name: impl Into<String>) -> Self {
        self.person_name = Some(name.into());
        self
    }

    pub fn with_estimate(mut self, price: f64) -> Self {
        self.estimated_price = Some(price);
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.unit_price = Some(price);
        self
    }

    /// A zero price counts as "no price", so it may be back-filled.
    pub fn has_price(&self) -> bool {
        self.unit_price.is_some_and(|p| p != 0.0)
    }

    /// The price used for splitting: the real price, else the estimate.
    pub fn effective_price(&self) -> Option<f64> {
        if self.has_price() {
            self.unit_price
        } else {
            self.estimated_price
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.person_name
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty())
    }

    pub fn description(&self) -> String {
        format!("{}x {}", self.quantity, self.item_label)
    }
}

/// One priced entry on a person's bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineCharge {
    pub description: String,
    pub amount: f64,
}

/// Final per-person breakdown. `total == subtotal + tip_and_tax`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitResult {
    /// `None` when the name on the lines has no person record.
    pub person_id: Option<i64>,
    pub person_name: String,
    pub initial: String,
    pub color: String,
    pub line_items: Vec<LineCharge>,
    pub subtotal: f64,
    pub tip_and_tax: f64,
    pub total: f64,
}
