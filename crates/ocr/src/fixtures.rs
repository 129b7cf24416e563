use tally_core::Money;

use crate::blocks::OcrBlock;
use crate::types::{BlockId, TextBlock};

pub const LINE_HEIGHT: f64 = 0.02;

fn width_for(text: &str) -> f64 {
    (text.chars().count() as f64 * 0.012).max(0.02)
}

/// A non-amount block centered at (`cx`, `cy`).
pub fn word(id: usize, text: &str, cx: f64, cy: f64) -> TextBlock {
    let width = width_for(text);
    TextBlock {
        id: BlockId(id),
        text: text.to_string(),
        x: cx - width / 2.0,
        y: cy - LINE_HEIGHT / 2.0,
        width: Some(width),
        height: Some(LINE_HEIGHT),
        center_x: cx,
        center_y: cy,
        confidence: Some(0.99),
        amount: None,
        skew_corrected: false,
    }
}

/// An amount block whose value is parsed from `text`.
pub fn amount(id: usize, text: &str, cx: f64, cy: f64) -> TextBlock {
    TextBlock {
        amount: Money::parse(text),
        ..word(id, text, cx, cy)
    }
}

/// Raw input record centered at (`cx`, `cy`); amount detection is left to ingestion.
pub fn ocr(text: &str, cx: f64, cy: f64) -> OcrBlock {
    let width = width_for(text);
    OcrBlock {
        text: text.to_string(),
        x: cx - width / 2.0,
        y: cy - LINE_HEIGHT / 2.0,
        width: Some(width),
        height: Some(LINE_HEIGHT),
        center_x: Some(cx),
        center_y: Some(cy),
        confidence: Some(0.99),
        is_amount: None,
        amount: None,
        page: None,
    }
}

/// The grocery receipt used across the end-to-end tests.
pub fn grocery_receipt() -> Vec<OcrBlock> {
    vec![
        ocr("FRESH MART", 0.50, 0.05),
        ocr("MILK 2L", 0.25, 0.20),
        ocr("4.99", 0.85, 0.20),
        ocr("BREAD", 0.22, 0.24),
        ocr("3.50", 0.85, 0.24),
        ocr("SUBTOTAL", 0.25, 0.30),
        ocr("8.49", 0.85, 0.30),
        ocr("Tax [5%]", 0.25, 0.34),
        ocr("0.42", 0.85, 0.34),
        ocr("TOTAL", 0.22, 0.38),
        ocr("8.91", 0.85, 0.38),
    ]
}
