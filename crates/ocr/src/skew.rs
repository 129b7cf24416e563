use regex::Regex;
use serde::Serialize;

use crate::types::TextBlock;

re!(re_date_time, r"(?i)\d{2}/\d{2}/\d{2}\s+\d{1,2}:\d{2}:\d{2}\s*[AP]M");
re!(re_transaction, r"(?i)Transaction\s+resumed|Trans:\s*\d+");
re!(re_cashier, r"(?i)Clerk|Cashier");
re!(re_terminal, r"(?i)Terminal:\s*[\d-]+");
re!(re_zero_marker, r"^\$0\.00$");

pub const IRREGULAR_SKEW: &str =
    "Irregular skew: top and bottom ref rows have different offset direction";

/// Minimum band height when grouping reference rows.
const MIN_REF_BAND: f64 = 0.04;
const MIN_ANCHOR_SPAN: f64 = 0.01;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SkewReport {
    pub applied: bool,
    pub offset_top: Option<f64>,
    pub offset_bottom: Option<f64>,
    pub uniform: bool,
    pub top_anchors: Option<(String, String)>,
    pub bottom_anchors: Option<(String, String)>,
}

/// Shear correction from a top and a bottom reference row.
///
/// A reference row pairs a left anchor (date/time or transaction line) with a
/// right anchor (cashier, terminal, or a bare `$0.00`). The vertical offset of the
/// top pair is spread across every block proportionally to its x position.
pub struct SkewCorrector<'a> {
    pub half_line: f64,
    pub extra_left: &'a [Regex],
    pub extra_right: &'a [Regex],
}

impl<'a> SkewCorrector<'a> {
    pub fn new(half_line: f64) -> Self {
        Self { half_line, extra_left: &[], extra_right: &[] }
    }

    pub fn with_anchors(mut self, extra_left: &'a [Regex], extra_right: &'a [Regex]) -> Self {
        self.extra_left = extra_left;
        self.extra_right = extra_right;
        self
    }

    fn is_left_anchor(&self, b: &TextBlock) -> bool {
        let t = b.text.trim();
        re_date_time().is_match(t)
            || re_transaction().is_match(t)
            || self.extra_left.iter().any(|p| p.is_match(t))
    }

    fn is_right_anchor(&self, b: &TextBlock) -> bool {
        let t = b.text.trim();
        re_cashier().is_match(t)
            || re_terminal().is_match(t)
            || re_zero_marker().is_match(t)
            || self.extra_right.iter().any(|p| p.is_match(t))
    }

    /// Every anchor pair found while sweeping the whole page top to bottom.
    fn reference_pairs<'b>(&self, blocks: &'b [TextBlock]) -> Vec<(&'b TextBlock, &'b TextBlock)> {
        let mut sorted: Vec<&TextBlock> = blocks.iter().collect();
        sorted.sort_by(|a, b| a.center_y.total_cmp(&b.center_y));
        let band = (self.half_line * 2.0).max(MIN_REF_BAND);

        let mut pairs = Vec::new();
        let mut i = 0;
        while i < sorted.len() {
            let start = sorted[i].center_y;
            let len = sorted[i..]
                .iter()
                .take_while(|b| (b.center_y - start).abs() <= band)
                .count();
            let group = &sorted[i..i + len];
            i += len;

            let Some(left) = group
                .iter()
                .copied()
                .filter(|b| self.is_left_anchor(b))
                .min_by(|a, b| a.center_x.total_cmp(&b.center_x))
            else {
                continue;
            };
            let right = group
                .iter()
                .copied()
                .filter(|b| self.is_right_anchor(b) && b.center_x > left.center_x)
                .min_by(|a, b| {
                    (a.center_y - left.center_y)
                        .abs()
                        .total_cmp(&(b.center_y - left.center_y).abs())
                });
            if let Some(right) = right {
                pairs.push((left, right));
            }
        }
        pairs
    }

    pub fn correct(
        &self,
        blocks: Vec<TextBlock>,
        error_log: &mut Vec<String>,
    ) -> (Vec<TextBlock>, SkewReport) {
        let mut report = SkewReport::default();
        if blocks.len() < 2 {
            return (blocks, report);
        }

        let pairs = self.reference_pairs(&blocks);
        let Some((left_top, right_top)) = pairs.first().copied() else {
            tracing::debug!("no top reference row, skew correction skipped");
            return (blocks, report);
        };
        let offset_top = right_top.center_y - left_top.center_y;
        let x_left = left_top.center_x;
        let x_right = right_top.center_x;
        let span = x_right - x_left;
        report.offset_top = Some(offset_top);
        report.top_anchors = Some((left_top.text.clone(), right_top.text.clone()));
        tracing::info!(
            left = %left_top.text,
            right = %right_top.text,
            offset = offset_top,
            "top skew reference"
        );
        if span.abs() < MIN_ANCHOR_SPAN {
            tracing::debug!(span, "reference span too small, skew correction skipped");
            return (blocks, report);
        }

        report.uniform = true;
        if pairs.len() > 1 {
            if let Some((left_bot, right_bot)) = pairs.last().copied() {
                let offset_bottom = right_bot.center_y - left_bot.center_y;
                report.offset_bottom = Some(offset_bottom);
                report.bottom_anchors = Some((left_bot.text.clone(), right_bot.text.clone()));
                let same_direction = (offset_top >= 0.0) == (offset_bottom >= 0.0);
                let close = (offset_top - offset_bottom).abs() < self.half_line;
                report.uniform = same_direction && close;
                if !report.uniform {
                    tracing::warn!(
                        offset_top,
                        offset_bottom,
                        half_line = self.half_line,
                        "irregular skew"
                    );
                    error_log.push(IRREGULAR_SKEW.to_string());
                }
            }
        }

        let corrected: Vec<TextBlock> = blocks
            .iter()
            .map(|b| b.with_y_shift(offset_top * (x_right - b.center_x) / span))
            .collect();
        report.applied = true;
        tracing::info!(offset_top, blocks = corrected.len(), "applied skew correction");
        (corrected, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{amount, word};

    fn receipt(terminal_y: f64) -> Vec<TextBlock> {
        vec![
            word(0, "FRESH MART", 0.5, 0.03),
            word(1, "01/10/26 1:45:58 PM", 0.2, 0.100),
            word(2, "Cashier 12", 0.8, 0.120),
            word(3, "MILK 2L", 0.25, 0.30),
            amount(4, "4.99", 0.85, 0.31),
            word(5, "TOTAL", 0.25, 0.50),
            amount(6, "4.99", 0.85, 0.51),
            word(7, "Trans: 1234", 0.2, 0.800),
            word(8, "Terminal: 01-02", 0.8, terminal_y),
        ]
    }

    #[test]
    fn uniform_skew_is_corrected_silently() {
        let mut log = Vec::new();
        let (out, report) = SkewCorrector::new(0.004).correct(receipt(0.818), &mut log);
        assert!(log.is_empty());
        assert!(report.applied);
        assert!(report.uniform);
        assert!((report.offset_top.unwrap() - 0.020).abs() < 1e-9);
        assert!((report.offset_bottom.unwrap() - 0.018).abs() < 1e-9);
        // left anchor moves down by the full offset, right anchor stays
        assert!((out[1].center_y - 0.120).abs() < 1e-9);
        assert!((out[2].center_y - 0.120).abs() < 1e-9);
        assert!(out.iter().all(|b| b.skew_corrected));
        assert_eq!(out[1].id, receipt(0.818)[1].id);
    }

    #[test]
    fn irregular_skew_still_applies_top_correction() {
        let mut log = Vec::new();
        let (out, report) = SkewCorrector::new(0.004).correct(receipt(0.790), &mut log);
        assert!(report.applied);
        assert!(!report.uniform);
        assert!((report.offset_bottom.unwrap() + 0.010).abs() < 1e-9);
        assert_eq!(log, vec![IRREGULAR_SKEW.to_string()]);
        assert!((out[1].center_y - 0.120).abs() < 1e-9);
    }

    #[test]
    fn proportional_shift_between_anchors() {
        let mut log = Vec::new();
        let (out, _) = SkewCorrector::new(0.004).correct(receipt(0.818), &mut log);
        // MILK 2L at x=0.25: 0.020 * (0.8 - 0.25) / 0.6
        let expected = 0.30 + 0.020 * 0.55 / 0.6;
        assert!((out[3].center_y - expected).abs() < 1e-9);
        assert!((out[4].y - (0.30 + 0.020 * -0.05 / 0.6)).abs() < 1e-9);
    }

    #[test]
    fn no_reference_row_leaves_blocks_untouched() {
        let blocks = vec![word(0, "MILK", 0.2, 0.2), amount(1, "4.99", 0.8, 0.21)];
        let mut log = Vec::new();
        let (out, report) = SkewCorrector::new(0.004).correct(blocks.clone(), &mut log);
        assert_eq!(out, blocks);
        assert!(!report.applied);
    }

    #[test]
    fn configured_anchor_patterns_extend_detection() {
        let left = vec![Regex::new(r"^Order #\d+").unwrap()];
        let right = vec![Regex::new(r"^Lane \d+").unwrap()];
        let blocks = vec![
            word(0, "Order #991", 0.2, 0.10),
            word(1, "Lane 4", 0.8, 0.11),
            word(2, "BREAD", 0.2, 0.3),
        ];
        let mut log = Vec::new();
        let (_, report) = SkewCorrector::new(0.004)
            .with_anchors(&left, &right)
            .correct(blocks, &mut log);
        assert!(report.applied);
        assert!((report.offset_top.unwrap() - 0.01).abs() < 1e-9);
    }
}
