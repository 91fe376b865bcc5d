pub mod config;
pub mod error;
pub mod heuristics;
pub mod matcher;
pub mod model;
pub mod receipt_source;
pub mod session_db;
pub mod split;
pub mod workflow;

pub use error::{ParseError, WorkflowError};
pub use heuristics::{OrderTextParser, ParsedReceipt, ReceiptItem, ReceiptTextParser, ReceiptTotals};
pub use model::{LineCharge, OrderLine, Person, SplitResult};
pub use split::{SplitSummary, TipPolicy};
