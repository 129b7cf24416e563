use rust_decimal::Decimal;
use std::str::FromStr;
use tally_core::Money;

use crate::names::NameLedger;
use crate::types::TextBlock;

re!(re_slash_1b, r"(?i)/1b\b");
re!(re_spaced_1b, r"(?i)\s1b\s");
re!(re_1b_at, r"(?i)\s1b@");
re!(re_at_read_as_digit, r"\b(\d{1,2})\s+(\d)\s*(\d+)\s*/\s*\$");
re!(re_leading_sku, r"^\s*\d{5,7}\s+");
re!(re_comma_decimal, r"\d,\d{2}\b");

re!(re_weight_line, r"(?i)\d+(?:\.\d+)?\s*(?:lb|kg|oz)\s*@\s*\$?\d+(?:[.,]\d+)?\s*(?:/lb|/kg)?");
re!(re_multi_buy_line, r"\b\d{1,2}\s*@\s*\d+\s*/\s*\$?[\d.,]+");
re!(re_weight_strip, r"(?i)\d+(?:\.\d+)?\s*(?:lb|kg|oz)\s*@\s*\$?\d+(?:[.,]\d+)?\s*(?:/lb|/kg)?\s*");
re!(re_multi_buy_strip, r"\d+\s*@\s*\d+\s*/\s*\$?[\d.,]+\s*");

re!(re_weight_price, r"(?i)(\d+(?:\.\d+)?)\s*(kg|lb|oz|g|ml|l)\s*@\s*\$?(\d+(?:\.\d+)?)");
re!(re_each_price, r"(\d+(?:\.\d+)?)\s*@\s*\$?(\d+(?:\.\d+)?)");
re!(re_multi_buy_price, r"\b(\d{1,2})\s*@\s*\d+\s*/\s*\$?([\d.,]+)");

/// `1b` read for `lb`.
fn fix_pound_sign(text: &str) -> String {
    let t = re_slash_1b().replace_all(text, "/lb");
    let t = re_spaced_1b().replace_all(&t, " lb ");
    re_1b_at().replace_all(&t, " lb@").into_owned()
}

/// `3 83/$1.98` is `3@3/$1.98` with the `@` read as an 8.
fn fix_at_sign(text: &str) -> String {
    re_at_read_as_digit()
        .replace_all(text, "${1}@${3}/$$")
        .into_owned()
}

/// `3,99` becomes `3.99`; only the first comma is touched.
fn normalize_decimal(text: &str) -> String {
    if re_comma_decimal().is_match(text) {
        text.replacen(',', ".", 1)
    } else {
        text.to_string()
    }
}

fn decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(&normalize_decimal(text)).ok()
}

/// The text is (or contains) a weight or multi-buy price line.
pub fn looks_like_qty_line(text: &str) -> bool {
    let t = text.trim();
    if t.is_empty() {
        return false;
    }
    let t = fix_at_sign(&fix_pound_sign(t));
    re_weight_line().is_match(&t) || re_multi_buy_line().is_match(&t)
}

/// Removes weight and multi-buy patterns, leaving the product words.
pub fn strip_qty(text: &str) -> String {
    let t = fix_pound_sign(text);
    let t = re_weight_strip().replace_all(&t, " ");
    let t = re_multi_buy_strip().replace_all(&t, " ");
    t.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantityParse {
    /// Count, or weight in base units when `unit` is set.
    pub quantity: Decimal,
    pub unit_price: Money,
    pub unit: Option<String>,
}

impl QuantityParse {
    /// Distance between quantity × unit price and the printed line total.
    pub fn error(&self, line_total: Money) -> Decimal {
        (self.quantity * self.unit_price.as_decimal() - line_total.as_decimal()).abs()
    }
}

/// Reads a quantity line that reconciles with `line_total`.
///
/// Tried in order: weight (`q lb @ $p`, within max($0.10, 2%)), each
/// (`n @ $p`, within $0.05), multi-buy (`n @ m/$t` where `t` is the line total).
pub fn parse_quantity(text: &str, line_total: Money) -> Option<QuantityParse> {
    let text = re_leading_sku().replace(text, "");
    let text = fix_at_sign(&fix_pound_sign(&normalize_decimal(&text)));
    let total = line_total.as_decimal();

    if let Some(caps) = re_weight_price().captures(&text) {
        let qty = decimal(&caps[1]);
        let price = decimal(&caps[3]);
        if let (Some(qty), Some(price)) = (qty, price) {
            let tolerance = Decimal::new(10, 2).max(total * Decimal::new(2, 2));
            if (qty * price - total).abs() < tolerance {
                return Some(QuantityParse {
                    quantity: qty,
                    unit_price: Money::from_decimal(price),
                    unit: Some(format!("1/100 {}", caps[2].to_lowercase())),
                });
            }
        }
    }

    if let Some(caps) = re_each_price().captures(&text) {
        if let (Some(qty), Some(price)) = (decimal(&caps[1]), decimal(&caps[2])) {
            if (qty * price - total).abs() < Decimal::new(5, 2) {
                return Some(QuantityParse {
                    quantity: qty,
                    unit_price: Money::from_decimal(price),
                    unit: None,
                });
            }
        }
    }

    let caps = re_multi_buy_price().captures(&text)?;
    let qty = decimal(&caps[1])?;
    let group_total = decimal(&caps[2])?;
    if qty > Decimal::ZERO && (group_total - total).abs() < Decimal::new(5, 2) {
        return Some(QuantityParse {
            quantity: qty,
            unit_price: Money::from_decimal(group_total / qty),
            unit: None,
        });
    }
    None
}

/// A parsed quantity and the block it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantityMatch {
    pub parse: QuantityParse,
    pub y: f64,
    pub text: String,
}

impl QuantityMatch {
    /// Weighed in pounds but printed without a `/lb` suffix.
    pub fn missing_weight_suffix(&self) -> bool {
        let weighed_lb = self.parse.unit.as_deref().is_some_and(|u| u.contains("lb"));
        weighed_lb && !["/lb", "/1b", "/kg"].iter().any(|s| self.text.contains(s))
    }
}

/// The quantity block nearest the amount within `1.5h`, ties broken by arithmetic error.
/// Blocks whose y is already in `consumed` were used by an earlier item.
pub fn closest_quantity(
    blocks: &[&TextBlock],
    amount: &TextBlock,
    half_line: f64,
    consumed: &NameLedger,
) -> Option<QuantityMatch> {
    let line_total = amount.amount?;
    let reach = half_line * 1.5;

    let mut candidates: Vec<(f64, Decimal, QuantityMatch)> = blocks
        .iter()
        .filter(|b| !consumed.contains(b.center_y))
        .filter(|b| (b.center_y - amount.center_y).abs() <= reach)
        .filter_map(|b| {
            let text = b.text.trim();
            let parse = parse_quantity(text, line_total)?;
            let error = parse.error(line_total);
            let found = QuantityMatch { parse, y: b.center_y, text: text.to_string() };
            Some(((b.center_y - amount.center_y).abs(), error, found))
        })
        .collect();
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    tracing::debug!(amount = %line_total, candidates = candidates.len(), "quantity candidates");
    candidates.into_iter().next().map(|(_, _, m)| m)
}
