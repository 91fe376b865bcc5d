// src/heuristics/numbers.rs

use crate::error::ParseError;

/// Parse a locale-formatted price token into a number.
///
/// Accepts `"3,50"`, `"11,"`, `"9,-"`, `"€ 2.75"`, `"EUR 4,00"`. A trailing dash
/// means "no cents"; a bare trailing separator is dropped.
pub fn normalize(token: &str) -> Result<f64, ParseError> {
    let not_numeric = || ParseError::NotNumeric {
        token: token.to_string(),
    };

    let mut s = token.trim().to_string();

    if let Some(head) = s.strip_suffix('-') {
        let head = head.trim_end_matches([',', '.']);
        if !head.chars().any(|c| c.is_ascii_digit()) {
            return Err(not_numeric());
        }
        s = format!("{head}.00");
    }

    if s.ends_with(['.', ',']) {
        s.pop();
    }

    let mut cleaned = s.replace(['€', '$'], "");
    for marker in ["EUR", "Eur", "eur"] {
        cleaned = cleaned.replace(marker, "");
    }
    let cleaned: String = cleaned.chars().filter(|c| !c.is_whitespace()).collect();

    let decimal = cleaned.replacen(',', ".", 1);
    if !is_plain_decimal(&decimal) {
        return Err(not_numeric());
    }
    decimal.parse::<f64>().map_err(|_| not_numeric())
}

/// `[-]digits[.digits]` with at least one digit. Rejects what `f64::from_str`
/// would otherwise accept (`inf`, `NaN`, `1e5`).
fn is_plain_decimal(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    let mut parts = body.splitn(2, '.');
    let int = parts.next().unwrap_or("");
    let frac = parts.next().unwrap_or("");
    let digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    (!int.is_empty() || !frac.is_empty()) && digits(int) && digits(frac)
}

/// Parse a quantity token: `2`, `2x`, `x2`.
pub fn parse_quantity(token: &str) -> Result<u32, ParseError> {
    let t = token.trim();
    let digits = t
        .strip_suffix(['x', 'X'])
        .or_else(|| t.strip_prefix(['x', 'X']))
        .unwrap_or(t);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseError::InvalidQuantity {
            token: token.to_string(),
        });
    }
    digits.parse::<u32>().map_err(|_| ParseError::InvalidQuantity {
        token: token.to_string(),
    })
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn to_cents(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

pub fn from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Render an amount with exactly two decimals, e.g. `€3.50` or `-€1.25`.
pub fn format_amount(value: f64, symbol: &str) -> String {
    let cents = to_cents(value);
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{symbol}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dash_means_no_cents() {
        assert_eq!(normalize("9,-"), Ok(9.0));
        assert_eq!(normalize("12.-"), Ok(12.0));
    }

    #[test]
    fn test_trailing_separator_dropped() {
        assert_eq!(normalize("11,"), Ok(11.0));
        assert_eq!(normalize("11."), Ok(11.0));
    }

    #[test]
    fn test_currency_and_comma_decimal() {
        assert_eq!(normalize("€3,50"), Ok(3.5));
        assert_eq!(normalize("  € 2.75 "), Ok(2.75));
        assert_eq!(normalize("$4"), Ok(4.0));
        assert_eq!(normalize("EUR 4,00"), Ok(4.0));
        assert_eq!(normalize("-2,50"), Ok(-2.5));
    }

    #[test]
    fn test_rejects_non_numeric() {
        assert!(matches!(normalize("abc"), Err(ParseError::NotNumeric { .. })));
        assert!(normalize("").is_err());
        assert!(normalize("-").is_err());
        assert!(normalize("€").is_err());
        assert!(normalize("inf").is_err());
        assert!(normalize("1e5").is_err());
        assert!(normalize("1.234,50").is_err());
    }

    #[test]
    fn test_quantity_forms() {
        assert_eq!(parse_quantity("2"), Ok(2));
        assert_eq!(parse_quantity("3x"), Ok(3));
        assert_eq!(parse_quantity("X4"), Ok(4));
        assert_eq!(parse_quantity("0"), Ok(0));
        assert!(parse_quantity("x").is_err());
        assert!(parse_quantity("twee").is_err());
        assert!(parse_quantity("99999999999").is_err());
    }

    #[test]
    fn test_money_rendering() {
        assert_eq!(format_amount(3.5, "€"), "€3.50");
        assert_eq!(format_amount(0.1 + 0.2, "€"), "€0.30");
        assert_eq!(format_amount(-1.25, "$"), "-$1.25");
        assert_eq!(round2(5.0 / 3.0), 1.67);
        assert_eq!(to_cents(2.5), 250);
        assert_eq!(from_cents(150), 1.5);
    }
}
