// src/heuristics/order_text.rs

use super::catalog::Catalog;
use super::numbers::parse_quantity;
use crate::error::ParseError;
use crate::model::{OrderLine, Person};
use tracing::debug;

/// Words that join names or items: "Timo en Bart", "bier and pizza".
const SEPARATORS: &[&str] = &["en", "and", "&", "+", ","];

/// Determiners that mean a quantity of one.
const ARTICLES: &[&str] = &["een", "één", "a", "an"];

#[derive(Debug, Clone, PartialEq)]
struct ParsedItem {
    label: String,
    quantity: u32,
    estimated_price: f64,
}

/// Result of parsing one clause; `remainder` holds the tokens of the next clause.
struct Clause<'t> {
    lines: Vec<OrderLine>,
    remainder: &'t [String],
    rejected_quantity: bool,
}

/// Turns a free-text utterance ("Timo en Bart een biertje en pizza") into
/// order lines. Pure and deterministic.
#[derive(Debug, Clone, Default)]
pub struct OrderTextParser {
    catalog: Catalog,
}

impl OrderTextParser {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    /// Parse `text` against the current roster.
    ///
    /// Every person in the leading people span gets every item of the clause
    /// (N people x M items lines). A clause starting after a separator with a
    /// known person, or with a capitalised name followed by an item, begins a
    /// new group: "Timo 2 bier, Bart cola". When no item grammar matches at
    /// all, the first word is the person and the rest is one verbatim item.
    pub fn parse(&self, text: &str, known_people: &[Person]) -> Vec<OrderLine> {
        let tokens = tokenize(text);
        let mut lines = Vec::new();
        let mut rejected_quantity = false;

        let mut rest: &[String] = &tokens;
        while !rest.is_empty() {
            let clause = self.parse_clause(rest, known_people);
            lines.extend(clause.lines);
            rejected_quantity |= clause.rejected_quantity;
            rest = clause.remainder;
        }

        if lines.is_empty() && !rejected_quantity {
            return self.fallback(text, known_people);
        }
        debug!(lines = lines.len(), "Order text parsed");
        lines
    }

    fn parse_clause<'t>(&self, tokens: &'t [String], known: &[Person]) -> Clause<'t> {
        let (people, mut i) = self.people_span(tokens, known);

        let mut items: Vec<ParsedItem> = Vec::new();
        let mut rejected_quantity = false;
        let mut segment: Vec<&str> = Vec::new();
        let mut boundary = tokens.len();

        let mut flush = |segment: &mut Vec<&str>, items: &mut Vec<ParsedItem>| {
            if segment.is_empty() {
                return;
            }
            match self.item_from_segment(segment) {
                Ok(item) => items.push(item),
                Err(e) => {
                    debug!(error = %e, "Item segment skipped");
                    rejected_quantity |= matches!(e, ParseError::InvalidQuantity { .. });
                }
            }
            segment.clear();
        };

        while i < tokens.len() {
            let tok = tokens[i].as_str();
            if is_separator(tok) {
                flush(&mut segment, &mut items);
                if !items.is_empty() && self.starts_new_clause(&tokens[i + 1..], known) {
                    boundary = i + 1;
                    break;
                }
            } else {
                segment.push(tok);
            }
            i += 1;
        }
        flush(&mut segment, &mut items);

        Clause {
            lines: expand(&people, &items),
            remainder: &tokens[boundary..],
            rejected_quantity,
        }
    }

    /// Leading names joined by conjunctions. Returns the names and the index
    /// of the first token after the span.
    fn people_span(&self, tokens: &[String], known: &[Person]) -> (Vec<String>, usize) {
        let mut people: Vec<String> = Vec::new();
        let Some(first) = tokens.first() else {
            return (people, 0);
        };
        if !self.is_name_candidate(first, known) {
            return (people, 0);
        }
        push_unique(&mut people, resolve_name(first, known));

        let mut i = 1;
        while i + 1 < tokens.len()
            && is_separator(&tokens[i])
            && self.is_name_candidate(&tokens[i + 1], known)
        {
            push_unique(&mut people, resolve_name(&tokens[i + 1], known));
            i += 2;
        }
        (people, i)
    }

    fn is_name_candidate(&self, token: &str, known: &[Person]) -> bool {
        if known.iter().any(|p| p.matches_name(token)) {
            return true;
        }
        token.chars().any(char::is_alphabetic)
            && !is_separator(token)
            && !is_article(token)
            && parse_quantity(token).is_err()
            && !self.catalog.is_item_word(token)
    }

    fn opens_item(&self, token: &str) -> bool {
        parse_quantity(token).is_ok() || is_article(token) || self.catalog.is_item_word(token)
    }

    fn starts_new_clause(&self, rest: &[String], known: &[Person]) -> bool {
        let Some(first) = rest.first() else {
            return false;
        };
        if known.iter().any(|p| p.matches_name(first)) {
            return true;
        }
        let capitalised = first.chars().next().is_some_and(char::is_uppercase);
        capitalised
            && self.is_name_candidate(first, known)
            && rest.get(1).is_some_and(|next| self.opens_item(next))
    }

    /// `<int> <label>`, `<article> <label>`, `<label> <int>x` or bare `<label>`.
    fn item_from_segment(&self, segment: &[&str]) -> Result<ParsedItem, ParseError> {
        let no_match = || ParseError::NoMatch {
            line: segment.join(" "),
        };
        let (first, rest) = segment.split_first().ok_or_else(no_match)?;

        let (quantity, label_words) = if let Ok(q) = parse_quantity(first) {
            (q, rest)
        } else if is_article(first) {
            (1, rest)
        } else if let Some((q, head)) = trailing_quantity(segment) {
            (q, head)
        } else {
            (1, segment)
        };

        if label_words.is_empty() {
            return Err(no_match());
        }
        if quantity == 0 {
            return Err(ParseError::InvalidQuantity {
                token: segment.join(" "),
            });
        }

        let (label, estimated_price) = self.catalog.canonicalize(&label_words.join(" "));
        Ok(ParsedItem {
            label,
            quantity,
            estimated_price,
        })
    }

    fn fallback(&self, text: &str, known: &[Person]) -> Vec<OrderLine> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let [first, rest @ ..] = words.as_slice() else {
            return Vec::new();
        };
        let first = trim_punct(first);
        if rest.is_empty() || !first.chars().any(char::is_alphabetic) {
            return Vec::new();
        }
        let person = resolve_name(first, known);
        let label = rest.join(" ");
        debug!(person = %person, label = %label, "No item grammar matched, using verbatim fallback");
        vec![
            OrderLine::new(label, 1)
                .for_person(person)
                .with_estimate(self.catalog.default_price()),
        ]
    }
}

/// Each person gets each item, grouped by person in detection order.
/// Without people the lines are left unassigned.
fn expand(people: &[String], items: &[ParsedItem]) -> Vec<OrderLine> {
    let line = |item: &ParsedItem| {
        OrderLine::new(item.label.clone(), item.quantity).with_estimate(item.estimated_price)
    };
    if people.is_empty() {
        return items.iter().map(line).collect();
    }
    people
        .iter()
        .flat_map(|person| items.iter().map(move |item| line(item).for_person(person.clone())))
        .collect()
}

fn tokenize(text: &str) -> Vec<String> {
    text.replace([',', ';'], " , ")
        .split_whitespace()
        .map(|t| {
            if t == "," {
                t.to_string()
            } else {
                trim_punct(t).to_string()
            }
        })
        .filter(|t| !t.is_empty())
        .collect()
}

fn trim_punct(token: &str) -> &str {
    token.trim_matches(|c: char| matches!(c, '.' | '!' | '?' | ':' | '"' | '\'' | '(' | ')'))
}

fn trailing_quantity<'a, 'b>(segment: &'a [&'b str]) -> Option<(u32, &'a [&'b str])> {
    let (last, head) = segment.split_last()?;
    if head.is_empty() || !last.to_lowercase().contains('x') {
        return None;
    }
    parse_quantity(last).ok().map(|q| (q, head))
}

fn is_separator(token: &str) -> bool {
    SEPARATORS.iter().any(|s| s.eq_ignore_ascii_case(token))
}

fn is_article(token: &str) -> bool {
    let lower = token.to_lowercase();
    ARTICLES.contains(&lower.as_str())
}

fn resolve_name(token: &str, known: &[Person]) -> String {
    known
        .iter()
        .find(|p| p.matches_name(token))
        .map(|p| p.name.clone())
        .unwrap_or_else(|| Person::display_name(token))
}

fn push_unique(people: &mut Vec<String>, name: String) {
    if !people.iter().any(|p| p.eq_ignore_ascii_case(&name)) {
        people.push(name);
    }
}
