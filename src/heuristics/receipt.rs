// src/heuristics/receipt.rs

use super::numbers::{normalize, round2};
use super::{ParsedReceipt, ReceiptItem};
use crate::error::ParseError;
use regex::{Captures, Regex};
use tracing::{debug, trace};

/// A money amount on a labelled line: `23,50`, `€ 9,-`, `EUR 11,`, `12`.
const AMOUNT: &str = r"(?:€|\$|eur)?\s?-?\d+(?:[.,]\d{1,2}|[.,]-?)?";

/// A price on an item line must look like money: currency marker or cents part.
const MONEY: &str = r"(?:(?:€|\$|eur)\s?-?\d+(?:[.,]\d{1,2}|[.,]-?)?|-?\d+(?:[.,]\d{1,2}|[.,]-?))";

/// Item label: anything containing at least one letter.
const LABEL: &str = r"(?P<label>.*?[^\W\d_].*?)";

/// Labels on priced lines that are payments, not consumptions.
const PAYMENT_WORDS: &[&str] = &[
    "pin", "pinnen", "pinbetaling", "contant", "cash", "card", "kaart", "visa", "mastercard",
    "maestro", "wisselgeld", "change", "betaald", "paid", "retour",
];

/// What a single receipt line contributed.
#[derive(Debug, Clone, PartialEq)]
pub enum LineMatch {
    Tip(f64),
    Subtotal(f64),
    Tax(f64),
    Total(f64),
    Item(ReceiptItem),
}

type Handler = fn(&Captures<'_>) -> Result<LineMatch, ParseError>;

struct LineRule {
    name: &'static str,
    pattern: Regex,
    handler: Handler,
}

/// Line-oriented OCR receipt parser.
///
/// Each cleaned line is tested against an ordered list of anchored patterns;
/// the first pattern that matches decides what the line is. Lines nothing
/// matches are headers, footers or noise and are dropped.
pub struct ReceiptTextParser {
    rules: Vec<LineRule>,
    leaders: Regex,
}

impl ReceiptTextParser {
    pub fn new() -> Result<Self, regex::Error> {
        let rules = vec![
            rule(
                "tip",
                &format!(r"^(?:tip|fooi|gratuity|service\s*charge|servicekosten)\b.*?[\s:](?P<amount>{AMOUNT})$"),
                |c| amount(c).map(LineMatch::Tip),
            )?,
            rule(
                "subtotal",
                &format!(r"^sub\s*-?\s*tota?al\b.*?[\s:](?P<amount>{AMOUNT})$"),
                |c| amount(c).map(LineMatch::Subtotal),
            )?,
            rule(
                "tax",
                &format!(r"^(?:(?:tota?al\s+)?(?:btw|vat|tax)|b\.t\.w\.?)(?:\b|\s).*?[\s:](?P<amount>{AMOUNT})$"),
                |c| amount(c).map(LineMatch::Tax),
            )?,
            rule(
                "total",
                &format!(r"^(?:tota?al|te\s+betalen|amount\s+due|grand\s+total)\b.*?[\s:](?P<amount>{AMOUNT})$"),
                |c| amount(c).map(LineMatch::Total),
            )?,
            rule(
                "qty_label_total",
                &format!(r"^(?P<qty>\d+)\s*[x×]?\s+{LABEL}\s+(?P<price>{MONEY})$"),
                item_with_line_total,
            )?,
            rule(
                "label_qty_total",
                &format!(r"^{LABEL}\s+(?P<qty>\d+)\s*[x×]\s+(?P<price>{MONEY})$"),
                item_with_line_total,
            )?,
            rule(
                "label_total_qty",
                &format!(r"^{LABEL}\s+(?P<price>{MONEY})\s+(?P<qty>\d+)\s*[x×]$"),
                item_with_line_total,
            )?,
            rule(
                "qty_label",
                &format!(r"^(?P<qty>\d+)\s*[x×]\s*{LABEL}$"),
                item_without_price,
            )?,
            rule(
                "label_qty",
                &format!(r"^{LABEL}\s+(?P<qty>\d+)\s*[x×]$"),
                item_without_price,
            )?,
            rule(
                "label_total",
                &format!(r"^{LABEL}\s+(?P<price>{MONEY})$"),
                single_priced_item,
            )?,
        ];

        Ok(Self {
            rules,
            leaders: Regex::new(r"\.{2,}|…+|_{2,}")?,
        })
    }

    /// Rule names in evaluation order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    /// Parse a full OCR transcript. Never fails: unusable lines are counted
    /// in `discarded_lines` and skipped.
    pub fn parse(&self, ocr_text: &str) -> ParsedReceipt {
        let mut receipt = ParsedReceipt::default();

        for raw in ocr_text.lines() {
            let line = self.clean_line(raw);
            if line.is_empty() {
                continue;
            }
            match self.match_line(&line) {
                Ok((rule, found)) => {
                    trace!(rule, line = %line, "Receipt line matched");
                    match found {
                        LineMatch::Tip(v) => receipt.totals.tip = Some(v),
                        LineMatch::Subtotal(v) => receipt.totals.subtotal = Some(v),
                        LineMatch::Tax(v) => receipt.totals.tax = Some(v),
                        LineMatch::Total(v) => receipt.totals.total = Some(v),
                        LineMatch::Item(item) => receipt.items.push(item),
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Receipt line discarded");
                    receipt.discarded_lines += 1;
                }
            }
        }

        debug!(
            items = receipt.items.len(),
            discarded = receipt.discarded_lines,
            total = ?receipt.totals.total,
            "Receipt text parsed"
        );
        receipt
    }

    /// First matching rule wins; its handler decides the outcome.
    pub fn match_line(&self, line: &str) -> Result<(&'static str, LineMatch), ParseError> {
        for rule in &self.rules {
            if let Some(caps) = rule.pattern.captures(line) {
                return (rule.handler)(&caps).map(|m| (rule.name, m));
            }
        }
        Err(ParseError::NoMatch {
            line: line.to_string(),
        })
    }

    /// Trim, turn leader dots into spacing, collapse whitespace runs and strip
    /// trailing punctuation that is not part of a price.
    pub fn clean_line(&self, raw: &str) -> String {
        let spaced = self.leaders.replace_all(raw.trim(), " ");
        let mut line = spaced.split_whitespace().collect::<Vec<_>>().join(" ");

        loop {
            let Some(last) = line.chars().next_back() else { break };
            let strip = match last {
                ':' | ';' | '!' | '?' | '*' | '|' | '"' | '\'' => true,
                '.' => !ends_in_bare_separator(&line),
                _ => false,
            };
            if !strip {
                break;
            }
            line.pop();
            line.truncate(line.trim_end().len());
        }
        line
    }
}

/// `11.` keeps its dot: it is the whole-euro form. `2,50.` or `Thanks.` do not.
fn ends_in_bare_separator(line: &str) -> bool {
    let Some(head) = line.strip_suffix('.') else {
        return false;
    };
    let before_digits = head.trim_end_matches(|c: char| c.is_ascii_digit());
    before_digits.len() < head.len() && !before_digits.ends_with(['.', ','])
}

fn rule(name: &'static str, pattern: &str, handler: Handler) -> Result<LineRule, regex::Error> {
    Ok(LineRule {
        name,
        pattern: Regex::new(&format!("(?i){pattern}"))?,
        handler,
    })
}

fn amount(caps: &Captures<'_>) -> Result<f64, ParseError> {
    normalize(&caps["amount"])
}

fn quantity(caps: &Captures<'_>) -> Result<u32, ParseError> {
    let token = &caps["qty"];
    token.parse::<u32>().map_err(|_| ParseError::InvalidQuantity {
        token: token.to_string(),
    })
}

fn label(caps: &Captures<'_>) -> String {
    caps["label"]
        .trim()
        .trim_end_matches([':', '-', '.'])
        .trim()
        .to_string()
}

/// The captured price is the line total; the unit price is derived from it.
fn item_with_line_total(caps: &Captures<'_>) -> Result<LineMatch, ParseError> {
    let qty = quantity(caps)?;
    let line_total = normalize(&caps["price"])?;
    Ok(LineMatch::Item(ReceiptItem {
        label: label(caps),
        quantity: qty.max(1),
        unit_price: Some(derive_unit_price(line_total, qty)),
        line_total: Some(round2(line_total)),
    }))
}

fn item_without_price(caps: &Captures<'_>) -> Result<LineMatch, ParseError> {
    let qty = quantity(caps)?;
    Ok(LineMatch::Item(ReceiptItem {
        label: label(caps),
        quantity: qty.max(1),
        unit_price: None,
        line_total: None,
    }))
}

fn single_priced_item(caps: &Captures<'_>) -> Result<LineMatch, ParseError> {
    let label = label(caps);
    let first_word = label.split_whitespace().next().unwrap_or("").to_lowercase();
    if PAYMENT_WORDS.contains(&first_word.as_str()) {
        return Err(ParseError::NoMatch { line: label });
    }
    let price = round2(normalize(&caps["price"])?);
    Ok(LineMatch::Item(ReceiptItem {
        label,
        quantity: 1,
        unit_price: Some(price),
        line_total: Some(price),
    }))
}

/// `line_total / qty` rounded to cents. A zero quantity cannot divide, so the
/// captured amount is taken as the unit price.
pub fn derive_unit_price(line_total: f64, qty: u32) -> f64 {
    if qty == 0 {
        debug!(line_total, "Zero quantity on receipt line, using line amount as unit price");
        return round2(line_total);
    }
    round2(line_total / f64::from(qty))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ReceiptTextParser {
        ReceiptTextParser::new().expect("receipt patterns compile")
    }

    #[test]
    fn test_rule_order_is_fixed() {
        assert_eq!(
            parser().rule_names(),
            vec![
                "tip",
                "subtotal",
                "tax",
                "total",
                "qty_label_total",
                "label_qty_total",
                "label_total_qty",
                "qty_label",
                "label_qty",
                "label_total",
            ]
        );
    }

    #[test]
    fn test_leader_dots_and_noise_round_trip() {
        let receipt = parser().parse("   2 Cola .... €5,00   \n");
        assert_eq!(receipt.items.len(), 1);
        let item = &receipt.items[0];
        assert_eq!(item.label, "Cola");
        assert_eq!(item.quantity, 2);
        assert_eq!(item.unit_price, Some(2.50));
        assert_eq!(item.line_total, Some(5.00));
    }

    #[test]
    fn test_unit_price_is_rounded_line_total_share() {
        let p = parser();
        for (line, qty, unit) in [
            ("3 Bier 10,00", 3, 3.33),
            ("3x Bitterballen 19,50", 3, 6.50),
            ("Koffie 2x 4,-", 2, 2.00),
            ("Wijn €13,50 3x", 3, 4.50),
            ("7 Shots 11,", 7, 1.57),
        ] {
            let (_, found) = p.match_line(&p.clean_line(line)).expect(line);
            let LineMatch::Item(item) = found else {
                panic!("{line} was not an item");
            };
            assert_eq!(item.quantity, qty, "{line}");
            assert_eq!(item.unit_price, Some(unit), "{line}");
        }
    }

    #[test]
    fn test_zero_quantity_takes_amount_as_unit_price() {
        let receipt = parser().parse("0 Cola 2,50");
        assert_eq!(receipt.items[0].quantity, 1);
        assert_eq!(receipt.items[0].unit_price, Some(2.50));
        assert_eq!(derive_unit_price(4.0, 0), 4.0);
    }

    #[test]
    fn test_totals_detected_independently() {
        let text = "Cafe De Zwaan\n\
                    Tafel 12\n\
                    2 Bier 7,00\n\
                    Subtotaal 7,00\n\
                    Totaal BTW 21% 1,21\n\
                    Fooi: 1,-\n\
                    Totaal €8,00\n\
                    Pin 8,00\n\
                    Bedankt en tot ziens!";
        let receipt = parser().parse(text);
        assert_eq!(receipt.items.len(), 1);
        assert_eq!(receipt.totals.subtotal, Some(7.0));
        assert_eq!(receipt.totals.tax, Some(1.21));
        assert_eq!(receipt.totals.tip, Some(1.0));
        assert_eq!(receipt.totals.total, Some(8.0));
        // header, table number, payment line, footer
        assert_eq!(receipt.discarded_lines, 4);
    }

    #[test]
    fn test_subtotal_is_not_total() {
        let receipt = parser().parse("Subtotal: $20.00\nSub-total 20.00");
        assert_eq!(receipt.totals.subtotal, Some(20.0));
        assert_eq!(receipt.totals.total, None);
    }

    #[test]
    fn test_items_without_price() {
        let receipt = parser().parse("2x cola\nnachos 3x");
        assert_eq!(receipt.items.len(), 2);
        assert_eq!(receipt.items[0].label, "cola");
        assert_eq!(receipt.items[1].quantity, 3);
        assert!(receipt.items.iter().all(|i| i.unit_price.is_none()));
    }

    #[test]
    fn test_dates_and_bare_numbers_are_not_items() {
        let receipt = parser().parse("15 Maart 2024\nBon 1234\n12:30\n21% 1,23");
        assert!(receipt.items.is_empty());
        assert_eq!(receipt.discarded_lines, 4);
    }

    #[test]
    fn test_garbage_never_panics() {
        let receipt = parser().parse("\u{0}\u{7f}€€€\n,,,,\n-\n....\nx\n\r\n 9999999999999 Bier 1,00");
        assert!(receipt.items.iter().all(|i| i.quantity >= 1));
        assert!(parser().parse("").items.is_empty());
    }

    #[test]
    fn test_labelled_amount_is_a_whole_token() {
        let p = parser();
        assert_eq!(p.parse("Fooi 2,50.").totals.tip, Some(2.5));
        assert_eq!(p.parse("Totaal: 12,50.").totals.total, Some(12.5));
        assert_eq!(p.parse("Fooi: €3,-").totals.tip, Some(3.0));
        // never a fragment of a longer number
        assert_eq!(p.parse("Totaal 1.234,56").totals.total, None);
        assert_eq!(p.parse("Fooi 12,505").totals.tip, None);
        assert_eq!(p.parse("Subtotaal 7,001").totals.subtotal, None);
    }

    #[test]
    fn test_priced_item_ending_in_period() {
        let receipt = parser().parse("Cola 2,50.\n2 Bier 7,00.\n");
        assert_eq!(receipt.discarded_lines, 0);
        assert_eq!(receipt.items.len(), 2);
        assert_eq!(receipt.items[0].unit_price, Some(2.5));
        assert_eq!(receipt.items[1].unit_price, Some(3.5));
    }

    #[test]
    fn test_trailing_punctuation_stripped() {
        let p = parser();
        assert_eq!(p.clean_line("  Totaal:   12,50 . "), "Totaal: 12,50");
        assert_eq!(p.clean_line("Cola 11."), "Cola 11.");
        assert_eq!(p.clean_line("Cola 2,50."), "Cola 2,50");
        assert_eq!(p.clean_line("Tafel 12.5."), "Tafel 12.5");
        assert_eq!(p.clean_line("Thanks!!"), "Thanks");
    }
}
