// src/workflow.rs

use crate::error::WorkflowError;
use crate::heuristics::{OrderTextParser, ParsedReceipt, ReceiptTextParser, ReceiptTotals};
use crate::matcher;
use crate::model::{OrderLine, Person};
use crate::session_db::{SessionStore, StoredReceipt};
use crate::split::{self, SplitSummary, TipPolicy};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

/// What one order utterance added to the session.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecorded {
    /// Stored lines, with their ids.
    pub lines: Vec<OrderLine>,
    /// People created because the utterance mentioned them first.
    pub new_people: Vec<Person>,
}

/// What processing one receipt produced.
#[derive(Debug, Clone)]
pub struct ReceiptProcessed {
    pub parsed: ParsedReceipt,
    /// Order lines that got their price from this receipt.
    pub updated_count: usize,
    pub tip: TipPolicy,
    pub summary: SplitSummary,
    pub stored: StoredReceipt,
}

/// Parse an utterance, create anyone not yet in the session and store the lines.
pub fn record_order(
    db: &SessionStore,
    parser: &OrderTextParser,
    text: &str,
) -> Result<OrderRecorded, Box<dyn std::error::Error>> {
    let people = db.list_people()?;
    let parsed = parser.parse(text, &people);
    if parsed.is_empty() {
        warn!(text = %text, "No order lines recognised");
    }

    let mut new_people = Vec::new();
    let mut lines = Vec::with_capacity(parsed.len());
    for mut line in parsed {
        if let Some(name) = line.person_name.clone().filter(|_| line.is_assigned()) {
            let (person, created) = db.find_or_create_person(&name)?;
            if created {
                new_people.push(person.clone());
            }
            line.person_name = Some(person.name);
        }
        line.id = Some(db.insert_order(&line)?);
        lines.push(line);
    }

    info!(
        orders = lines.len(),
        new_people = new_people.len(),
        "Order recorded"
    );
    Ok(OrderRecorded { lines, new_people })
}

/// Tip to apply: the one asked for, else the tip printed on the receipt,
/// else the configured default.
pub fn resolve_tip(
    requested: Option<TipPolicy>,
    totals: &ReceiptTotals,
    default_tip: TipPolicy,
) -> TipPolicy {
    requested
        .or_else(|| totals.tip.filter(|t| *t > 0.0).map(TipPolicy::FixedCash))
        .unwrap_or(default_tip)
}

/// Parse an OCR transcript, price the open order lines from it, split the
/// bill and keep the receipt. Refused while the session has no orders.
pub fn process_receipt(
    db: &SessionStore,
    parser: &ReceiptTextParser,
    filename: &str,
    ocr_text: &str,
    requested_tip: Option<TipPolicy>,
    default_tip: TipPolicy,
    processed_at: OffsetDateTime,
) -> Result<ReceiptProcessed, Box<dyn std::error::Error>> {
    let span = tracing::info_span!("receipt", filename = %filename);
    let _guard = span.enter();

    let orders = db.list_orders()?;
    if orders.is_empty() {
        warn!("Receipt refused, session has no orders");
        return Err(WorkflowError::NoOrders.into());
    }

    let parsed = parser.parse(ocr_text);
    let (priced, items) = parsed.coverage();
    info!(
        items,
        priced,
        discarded = parsed.discarded_lines,
        tip = ?parsed.totals.tip,
        total = ?parsed.totals.total,
        "Receipt parsed"
    );
    if let Some(total) = parsed.totals.total {
        let sum = parsed.items_sum();
        if (sum - total).abs() >= 0.01 {
            warn!(items_sum = sum, total, "Receipt items do not add up to the total");
        }
    }

    let outcome = matcher::apply(&parsed.items, orders);
    let priced_lines: Vec<OrderLine> = outcome
        .newly_priced
        .iter()
        .map(|&idx| outcome.lines[idx].clone())
        .collect();
    db.update_prices(&priced_lines)?;

    let tip = resolve_tip(requested_tip, &parsed.totals, default_tip);
    let people = db.list_people()?;
    let summary = split::split(&outcome.lines, &people, tip);

    let processed_at = processed_at.format(&Rfc3339)?;
    let stored = StoredReceipt {
        uid: SessionStore::generate_uid(filename, ocr_text, &processed_at),
        filename: filename.to_string(),
        ocr_text: ocr_text.to_string(),
        totals: parsed.totals.clone(),
        items: parsed.items.clone(),
        results: summary.results.clone(),
        tip_policy: tip.to_string(),
        processed_at,
    };
    db.insert_receipt(&stored)?;

    info!(
        uid = %stored.uid,
        updated = outcome.updated_count,
        people = summary.results.len(),
        "Receipt processed"
    );

    Ok(ReceiptProcessed {
        parsed,
        updated_count: outcome.updated_count,
        tip,
        summary,
        stored,
    })
}

/// Split the current session's orders.
pub fn split_bill(
    db: &SessionStore,
    tip: TipPolicy,
) -> Result<SplitSummary, Box<dyn std::error::Error>> {
    let orders = db.list_orders()?;
    let people = db.list_people()?;
    Ok(split::split(&orders, &people, tip))
}
