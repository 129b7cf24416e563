use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tally_core::Money;

use crate::types::{BlockId, TextBlock};

re!(re_amount_token, r"^(-)?\$?\s*(\d{1,3}(?:,\d{3})+|\d+)\.\d{2}$");

/// Mean block height times one half when no height is reported.
pub const DEFAULT_HALF_LINE: f64 = 0.006;

// ── Input record ──────────────────────────────────────────────────────────────

/// A positioned fragment as delivered by the recognition service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrBlock {
    pub text: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub center_x: Option<f64>,
    #[serde(default)]
    pub center_y: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub is_amount: Option<bool>,
    /// Pre-parsed value; wins over the text when present.
    #[serde(default)]
    pub amount: Option<f64>,
    /// 1-based page number for multi-page documents.
    #[serde(default)]
    pub page: Option<u32>,
}

impl OcrBlock {
    pub fn new(text: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            width: Some(width),
            height: Some(height),
            center_x: None,
            center_y: None,
            confidence: None,
            is_amount: None,
            amount: None,
            page: None,
        }
    }
}

// ── Ingestion ─────────────────────────────────────────────────────────────────

/// Parses a whole-token currency value such as `$1,234.56` or `4.99`.
///
/// Returns `None` for anything else, including negatives and values above 999,999.99.
pub fn parse_amount_token(text: &str) -> Option<Money> {
    let caps = re_amount_token().captures(text.trim())?;
    let money = Money::parse(caps.get(0)?.as_str())?;
    in_range(money).then_some(money)
}

fn in_range(money: Money) -> bool {
    let max = Decimal::new(99_999_999, 2);
    !money.as_decimal().is_sign_negative() && money.as_decimal() <= max
}

fn detect_amount(raw: &OcrBlock) -> Option<Money> {
    if raw.is_amount == Some(false) {
        return None;
    }
    match raw.amount {
        Some(v) => Money::from_f64(v).filter(|m| in_range(*m)),
        None => parse_amount_token(&raw.text),
    }
}

/// Assigns arena ids in input order and normalizes every record into a [`TextBlock`].
pub fn ingest(raw: Vec<OcrBlock>) -> Vec<TextBlock> {
    let blocks: Vec<TextBlock> = raw
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            let page_offset = r.page.map(|p| p.saturating_sub(1) as f64).unwrap_or(0.0);
            let center_x = r
                .center_x
                .unwrap_or_else(|| r.x + r.width.unwrap_or(0.0) / 2.0);
            let center_y = r
                .center_y
                .unwrap_or_else(|| r.y + r.height.unwrap_or(0.0) / 2.0);
            let amount = detect_amount(&r);
            TextBlock {
                id: BlockId(i),
                text: r.text.trim().to_string(),
                x: r.x,
                y: r.y + page_offset,
                width: r.width,
                height: r.height,
                center_x,
                center_y: center_y + page_offset,
                confidence: r.confidence,
                amount,
                skew_corrected: false,
            }
        })
        .collect();
    tracing::info!(
        blocks = blocks.len(),
        amounts = blocks.iter().filter(|b| b.is_amount()).count(),
        "ingested OCR blocks"
    );
    blocks
}

/// Half of the mean reported block height.
pub fn half_line_height(blocks: &[TextBlock]) -> f64 {
    let heights: Vec<f64> = blocks
        .iter()
        .filter_map(|b| b.height)
        .filter(|h| *h > 0.0)
        .collect();
    if heights.is_empty() {
        return DEFAULT_HALF_LINE;
    }
    let half = heights.iter().sum::<f64>() / heights.len() as f64 * 0.5;
    tracing::debug!(half_line = half, "computed half-line tolerance");
    half
}

// ── Cleanup passes ────────────────────────────────────────────────────────────

/// Clears the amount on every amount block whose text matches one of `patterns`.
pub fn wash(blocks: Vec<TextBlock>, patterns: &[Regex]) -> Vec<TextBlock> {
    if patterns.is_empty() {
        return blocks;
    }
    blocks
        .into_iter()
        .map(|b| {
            if b.is_amount() && patterns.iter().any(|p| p.is_match(b.text.trim())) {
                tracing::debug!(block = %b.id, text = %b.text, "washed amount");
                b.without_amount()
            } else {
                b
            }
        })
        .collect()
}

/// Reports groups of blocks that share an identical bounding box.
pub fn duplicate_boxes(blocks: &[TextBlock]) -> Vec<String> {
    fn key(v: f64) -> i64 {
        (v * 1e6).round() as i64
    }
    let mut seen: HashMap<(i64, i64, i64, i64), (usize, Vec<&str>)> = HashMap::new();
    let mut order = Vec::new();
    for b in blocks {
        let k = (
            key(b.x),
            key(b.y),
            key(b.width.unwrap_or(0.0)),
            key(b.height.unwrap_or(0.0)),
        );
        let (count, texts) = seen.entry(k).or_insert_with(|| {
            order.push(k);
            (0, Vec::new())
        });
        *count += 1;
        let t = b.text.trim();
        if !texts.contains(&t) {
            texts.push(t);
        }
    }
    order
        .into_iter()
        .filter_map(|k| seen.get(&k))
        .filter(|(count, _)| *count > 1)
        .map(|(_, unique)| {
            let msg = format!("Duplicate bbox with same coordinates: {unique:?}");
            tracing::warn!("{msg}");
            msg
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ocr, word};

    #[test]
    fn amount_token_accepts_currency_forms() {
        assert_eq!(parse_amount_token("4.99"), Some(Money::from_cents(499)));
        assert_eq!(parse_amount_token("$1,234.56"), Some(Money::from_cents(123456)));
        assert_eq!(parse_amount_token(" $0.00 "), Some(Money::zero()));
    }

    #[test]
    fn amount_token_rejects_partial_and_out_of_range() {
        assert_eq!(parse_amount_token("MILK 2L"), None);
        assert_eq!(parse_amount_token("2 @ $4.99"), None);
        assert_eq!(parse_amount_token("12.5"), None);
        assert_eq!(parse_amount_token("-0.50"), None);
        assert_eq!(parse_amount_token("1,000,000.00"), None);
    }

    #[test]
    fn ingest_assigns_ids_in_input_order() {
        let blocks = ingest(vec![ocr("MILK 2L", 0.25, 0.2), ocr("4.99", 0.85, 0.2)]);
        assert_eq!(blocks[0].id, BlockId(0));
        assert_eq!(blocks[1].id, BlockId(1));
        assert!(!blocks[0].is_amount());
        assert_eq!(blocks[1].amount, Some(Money::from_cents(499)));
    }

    #[test]
    fn preparsed_value_wins_and_flag_can_veto() {
        let mut pre = ocr("4.9g", 0.85, 0.2);
        pre.amount = Some(4.99);
        let mut veto = ocr("3.50", 0.85, 0.3);
        veto.is_amount = Some(false);
        let blocks = ingest(vec![pre, veto]);
        assert_eq!(blocks[0].amount, Some(Money::from_cents(499)));
        assert!(!blocks[1].is_amount());
    }

    #[test]
    fn centers_default_from_box_and_pages_stack() {
        let mut b = OcrBlock::new("TOTAL", 0.1, 0.4, 0.2, 0.02);
        b.page = Some(2);
        let blocks = ingest(vec![b]);
        assert!((blocks[0].center_x - 0.2).abs() < 1e-9);
        assert!((blocks[0].center_y - 1.41).abs() < 1e-9);
        assert!((blocks[0].y - 1.4).abs() < 1e-9);
    }

    #[test]
    fn half_line_defaults_without_heights() {
        let mut b = word(0, "x", 0.1, 0.1);
        b.height = None;
        assert_eq!(half_line_height(&[b]), DEFAULT_HALF_LINE);
        assert!((half_line_height(&[word(0, "x", 0.1, 0.1)]) - 0.01).abs() < 1e-9);
    }

    #[test]
    fn wash_clears_matching_amounts_only() {
        let patterns = vec![Regex::new(r"(?i)^SC-1").unwrap()];
        let mut sc = word(0, "SC-1 0.00", 0.8, 0.1);
        sc.amount = Some(Money::zero());
        let keep = crate::fixtures::amount(1, "4.99", 0.85, 0.2);
        let out = wash(vec![sc, keep], &patterns);
        assert!(!out[0].is_amount());
        assert!(out[1].is_amount());
    }

    #[test]
    fn duplicate_boxes_are_reported_once_per_box() {
        let a = word(0, "SWEET POTATO", 0.3, 0.2);
        let mut b = a.clone();
        b.id = BlockId(1);
        b.text = "/lb".into();
        let c = word(2, "BREAD", 0.3, 0.3);
        let errors = duplicate_boxes(&[a, b, c]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("SWEET POTATO"));
        assert!(errors[0].contains("/lb"));
    }
}
