// src/error.rs

/// Token- or line-scoped failures raised inside the text engines.
///
/// None of these ever aborts a whole parse: the offending token or line is
/// skipped and the rest of the input is still processed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("not a number: {token:?}")]
    NotNumeric { token: String },

    #[error("invalid quantity: {token:?}")]
    InvalidQuantity { token: String },

    #[error("no pattern matched line: {line:?}")]
    NoMatch { line: String },

    #[error("invalid tip policy {value:?} (expected none, <p>% or an amount)")]
    InvalidTipPolicy { value: String },
}

/// Session states a workflow step refuses to act on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error("No orders found. Add some orders first.")]
    NoOrders,
}
