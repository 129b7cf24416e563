use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tally_core::Money;

use crate::body::BodyBounds;
use crate::relative::RelativeBounds;
use crate::skew::SkewReport;
use crate::tracker::Claim;
use crate::types::{AmountColumn, ExtractedItem, LabeledAmount, PhysicalRow, ReceiptRegions, RowKind};
use crate::validate::ValidationReport;

pub const METHOD: &str = "pipeline";

const LABEL_WIDTH: usize = 40;
const RULE_WIDTH: usize = 50;

fn ten_thousandths(v: f64) -> i64 {
    (v * 10_000.0) as i64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputItem {
    pub product_name: String,
    /// Cents.
    pub line_total: i64,
    /// Hundredths of `unit` for weighed goods, otherwise a count.
    pub quantity: i64,
    pub unit: Option<String>,
    /// Cents.
    pub unit_price: Option<i64>,
    pub on_sale: bool,
    pub confidence: f32,
}

impl From<&ExtractedItem> for OutputItem {
    fn from(item: &ExtractedItem) -> Self {
        let quantity = if item.unit.is_some() {
            (item.quantity * Decimal::from(100)).round()
        } else {
            item.quantity.trunc()
        };
        Self {
            product_name: item.product_name.clone(),
            line_total: item.line_total.to_cents(),
            quantity: quantity.to_i64().unwrap_or_default(),
            unit: item.unit.clone(),
            unit_price: item.unit_price.map(Money::to_cents),
            on_sale: item.on_sale,
            confidence: item.confidence,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutputTotals {
    pub subtotal: Option<Money>,
    pub tax: Vec<LabeledAmount>,
    pub fees: Vec<LabeledAmount>,
    pub total: Option<Money>,
}

/// `"Tax $0.42"` → `"Tax"`.
pub fn strip_label_amount(label: &str) -> &str {
    match label.rsplit_once(" $") {
        Some((head, _)) if !head.trim().is_empty() => head.trim_end(),
        _ => label,
    }
}

/// Main amount column in ten-thousandths of the page width.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub main_x: i64,
    pub tolerance: i64,
    pub confidence: f64,
}

impl From<AmountColumn> for ColumnSummary {
    fn from(c: AmountColumn) -> Self {
        Self {
            main_x: ten_thousandths(c.center_x),
            tolerance: ten_thousandths(c.tolerance),
            confidence: c.confidence,
        }
    }
}

const REGION_KINDS: [RowKind; 4] = [RowKind::Header, RowKind::Item, RowKind::Totals, RowKind::Payment];

fn region_key(kind: RowKind) -> &'static str {
    match kind {
        RowKind::Header => "header",
        RowKind::Item => "items",
        RowKind::Totals => "totals",
        RowKind::Payment => "payment",
        RowKind::Unknown => "unknown",
    }
}

fn extent(rows: &[PhysicalRow]) -> Option<(f64, f64)> {
    let top = rows.iter().map(|r| r.y_top).reduce(f64::min)?;
    let bottom = rows.iter().map(|r| r.y_bottom).reduce(f64::max)?;
    Some((top, bottom))
}

/// Region extents as `[y_top, y_bottom] × 10000`; `[0, 0]` for an empty region.
pub fn region_y_bounds(regions: &ReceiptRegions) -> BTreeMap<&'static str, [i64; 2]> {
    REGION_KINDS
        .iter()
        .map(|&kind| {
            let bounds = extent(regions.rows(kind))
                .map_or([0, 0], |(top, bottom)| [ten_thousandths(top), ten_thousandths(bottom)]);
            (region_key(kind), bounds)
        })
        .collect()
}

/// Region extents as fractions of the span from the first item row to the total row.
pub fn region_fractions(regions: &ReceiptRegions, span: RelativeBounds) -> BTreeMap<&'static str, [f64; 2]> {
    REGION_KINDS
        .iter()
        .filter_map(|&kind| {
            let (top, bottom) = extent(regions.rows(kind))?;
            Some((region_key(kind), [span.fraction(top), span.fraction(bottom)]))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptOutput {
    /// The totals reconciled.
    pub success: bool,
    pub method: String,
    pub chain_id: Option<String>,
    pub store: Option<String>,
    pub membership: Option<String>,
    pub error_log: Vec<String>,
    pub items: Vec<OutputItem>,
    pub totals: OutputTotals,
    pub validation: ValidationReport,
    pub regions_y_bounds: BTreeMap<&'static str, [i64; 2]>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relative_bounds: BTreeMap<&'static str, [f64; 2]>,
    pub amount_column: ColumnSummary,
    pub body_bounds: Option<BodyBounds>,
    pub skew: SkewReport,
    pub claims: Vec<Claim>,
}

impl ReceiptOutput {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn items_sum(&self) -> Money {
        self.items.iter().map(|i| Money::from_cents(i.line_total)).sum()
    }
}

fn write_line(f: &mut fmt::Formatter<'_>, label: &str, amount: Money) -> fmt::Result {
    let label = if label.chars().count() > LABEL_WIDTH {
        format!("{}...", label.chars().take(LABEL_WIDTH - 3).collect::<String>())
    } else {
        label.to_string()
    };
    writeln!(f, "{label:<LABEL_WIDTH$} ${:>8.2}", amount.as_decimal())
}

/// Vertical-addition layout: items, a rule, subtotal with tax and fees, a rule, total.
impl fmt::Display for ReceiptOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(RULE_WIDTH);
        for item in &self.items {
            write_line(f, &item.product_name, Money::from_cents(item.line_total))?;
        }
        if !self.items.is_empty() {
            writeln!(f, "{rule}")?;
        }
        if let Some(subtotal) = self.totals.subtotal {
            write_line(f, "SUBTOTAL", subtotal)?;
        }
        for line in self.totals.tax.iter().chain(&self.totals.fees) {
            write_line(f, &line.label, line.amount)?;
        }
        if let Some(total) = self.totals.total {
            writeln!(f, "{rule}")?;
            write_line(f, "TOTAL", total)?;
        }
        Ok(())
    }
}
