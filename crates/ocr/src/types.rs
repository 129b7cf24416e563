use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tally_core::Money;

/// Arena index of a block, assigned in input order at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub usize);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

// ── Blocks ────────────────────────────────────────────────────────────────────

/// A single positioned OCR fragment in normalized page coordinates.
///
/// Blocks are never edited in place: skew correction and washing hand back
/// copies that keep the same [`BlockId`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextBlock {
    pub id: BlockId,
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub center_x: f64,
    pub center_y: f64,
    pub confidence: Option<f32>,
    /// Parsed currency value; `Some` exactly when the block is an amount block.
    pub amount: Option<Money>,
    pub skew_corrected: bool,
}

impl TextBlock {
    pub fn is_amount(&self) -> bool {
        self.amount.is_some()
    }

    pub fn is_zero_amount(&self) -> bool {
        self.amount.is_some_and(Money::is_zero)
    }

    /// Height if known, otherwise twice the distance from top edge to center.
    pub fn effective_height(&self) -> Option<f64> {
        match self.height {
            Some(h) if h > 0.0 => Some(h),
            _ if self.center_y > self.y => Some(2.0 * (self.center_y - self.y)),
            _ => None,
        }
    }

    pub fn bottom(&self) -> f64 {
        self.effective_height()
            .map(|h| self.y + h)
            .unwrap_or(self.center_y)
    }

    /// Taller-than-wide fragments are background text running down the photo.
    pub fn is_vertical(&self) -> bool {
        match (self.width, self.height) {
            (Some(w), Some(h)) => w > 0.0 && h > w * 1.5,
            _ => false,
        }
    }

    pub fn with_y_shift(&self, dy: f64) -> Self {
        Self {
            y: self.y + dy,
            center_y: self.center_y + dy,
            skew_corrected: true,
            ..self.clone()
        }
    }

    pub fn without_amount(&self) -> Self {
        Self { amount: None, ..self.clone() }
    }
}

// ── Rows ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowKind {
    Header,
    Item,
    Totals,
    Payment,
    Unknown,
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKind::Header => write!(f, "HEADER"),
            RowKind::Item => write!(f, "ITEM"),
            RowKind::Totals => write!(f, "TOTALS"),
            RowKind::Payment => write!(f, "PAYMENT"),
            RowKind::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Blocks sharing one vertical band, ordered left to right.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhysicalRow {
    pub id: RowId,
    pub blocks: Vec<TextBlock>,
    pub text: String,
    pub y_top: f64,
    pub y_bottom: f64,
    pub y_center: f64,
    pub kind: RowKind,
}

impl PhysicalRow {
    /// Builds a row from its blocks; `None` for an empty list.
    pub fn new(id: RowId, mut blocks: Vec<TextBlock>) -> Option<Self> {
        if blocks.is_empty() {
            return None;
        }
        blocks.sort_by(|a, b| a.x.total_cmp(&b.x));
        let y_top = blocks.iter().map(|b| b.y).fold(f64::INFINITY, f64::min);
        let y_bottom = blocks.iter().map(TextBlock::bottom).fold(f64::NEG_INFINITY, f64::max);
        let text = blocks
            .iter()
            .map(|b| b.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Some(Self {
            id,
            blocks,
            text,
            y_top,
            y_bottom,
            y_center: (y_top + y_bottom) / 2.0,
            kind: RowKind::Unknown,
        })
    }

    pub fn amount_blocks(&self) -> impl Iterator<Item = &TextBlock> {
        self.blocks.iter().filter(|b| b.is_amount())
    }

    pub fn has_amount(&self) -> bool {
        self.blocks.iter().any(TextBlock::is_amount)
    }

    pub fn has_zero_amount(&self) -> bool {
        self.blocks.iter().any(TextBlock::is_zero_amount)
    }

    /// Blocks whose center lies left of `boundary`.
    pub fn left_of(&self, boundary: f64) -> impl Iterator<Item = &TextBlock> {
        self.blocks.iter().filter(move |b| b.center_x < boundary)
    }
}

// ── Columns ───────────────────────────────────────────────────────────────────

/// A right-aligned currency column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AmountColumn {
    pub center_x: f64,
    pub tolerance: f64,
    pub confidence: f64,
    pub block_count: usize,
}

impl AmountColumn {
    pub fn contains(&self, x: f64) -> bool {
        (x - self.center_x).abs() <= self.tolerance
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmountColumns {
    pub main: AmountColumn,
    /// Every qualifying histogram peak, left to right.
    pub all: Vec<AmountColumn>,
}

// ── Regions ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReceiptRegions {
    pub header: Vec<PhysicalRow>,
    pub items: Vec<PhysicalRow>,
    pub totals: Vec<PhysicalRow>,
    pub payment: Vec<PhysicalRow>,
    pub membership_id: Option<String>,
}

impl ReceiptRegions {
    pub fn rows(&self, kind: RowKind) -> &[PhysicalRow] {
        match kind {
            RowKind::Header => &self.header,
            RowKind::Item => &self.items,
            RowKind::Totals => &self.totals,
            RowKind::Payment => &self.payment,
            RowKind::Unknown => &[],
        }
    }

    pub fn find_row(&self, id: RowId) -> Option<&PhysicalRow> {
        self.header
            .iter()
            .chain(&self.items)
            .chain(&self.totals)
            .chain(&self.payment)
            .find(|r| r.id == id)
    }
}

// ── Roles ─────────────────────────────────────────────────────────────────────

/// The single semantic role an amount block is claimed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Item,
    Subtotal,
    Total,
    Tax,
    Fee,
    FeeGeneric,
    FeeUnknown,
    SkipNonItem,
    SkipRowNoLeft,
    SkipNoUnusedName,
}

impl Role {
    pub fn is_skip(self) -> bool {
        matches!(self, Role::SkipNonItem | Role::SkipRowNoLeft | Role::SkipNoUnusedName)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Item => "ITEM",
            Role::Subtotal => "SUBTOTAL",
            Role::Total => "TOTAL",
            Role::Tax => "TAX",
            Role::Fee => "FEE",
            Role::FeeGeneric => "FEE_GENERIC",
            Role::FeeUnknown => "FEE_UNKNOWN",
            Role::SkipNonItem => "SKIP_NON_ITEM",
            Role::SkipRowNoLeft => "SKIP_ROW_NO_LEFT",
            Role::SkipNoUnusedName => "SKIP_NO_UNUSED_NAME",
        };
        write!(f, "{s}")
    }
}

// ── Extraction results ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedItem {
    pub product_name: String,
    pub line_total: Money,
    /// Count, or weight in base units when `unit` is set.
    pub quantity: Decimal,
    /// `"1/100 lb"` style unit for weighed goods.
    pub unit: Option<String>,
    pub unit_price: Option<Money>,
    pub on_sale: bool,
    pub confidence: f32,
    pub row_id: RowId,
    pub amount_block_id: BlockId,
    pub raw_text: String,
}

/// An amount bound to the row it was read from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowAmount {
    pub block: TextBlock,
    pub row_id: RowId,
    pub row_y: f64,
    pub row_text: String,
}

impl RowAmount {
    pub fn new(block: &TextBlock, row: &PhysicalRow) -> Self {
        Self {
            block: block.clone(),
            row_id: row.id,
            row_y: row.y_center,
            row_text: row.text.clone(),
        }
    }

    pub fn amount(&self) -> Money {
        self.block.amount.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TotalsSequence {
    pub subtotal: Option<RowAmount>,
    pub total: Option<RowAmount>,
    /// Unclaimed amounts between the subtotal and total rows, in row order.
    pub middle: Vec<RowAmount>,
}

impl TotalsSequence {
    pub fn subtotal_amount(&self) -> Option<Money> {
        self.subtotal.as_ref().map(RowAmount::amount)
    }

    pub fn total_amount(&self) -> Option<Money> {
        self.total.as_ref().map(RowAmount::amount)
    }
}

/// A tax or fee line as reported in the totals block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledAmount {
    pub label: String,
    pub amount: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_percent: Option<Decimal>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_text: String,
}

impl LabeledAmount {
    pub fn new(label: impl Into<String>, amount: Money) -> Self {
        Self {
            label: label.into(),
            amount,
            rate_percent: None,
            source_text: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{amount, word};

    #[test]
    fn physical_row_requires_blocks() {
        assert!(PhysicalRow::new(RowId(0), vec![]).is_none());
    }

    #[test]
    fn physical_row_orders_blocks_and_joins_text() {
        let row = PhysicalRow::new(
            RowId(3),
            vec![amount(1, "4.99", 0.85, 0.20), word(0, "MILK 2L", 0.25, 0.20)],
        )
        .unwrap();
        assert_eq!(row.text, "MILK 2L 4.99");
        assert_eq!(row.blocks[0].id, BlockId(0));
        assert!(row.has_amount());
        assert!((row.y_center - 0.20).abs() < 1e-9);
        assert_eq!(row.kind, RowKind::Unknown);
    }

    #[test]
    fn shifted_copy_keeps_identity() {
        let b = word(7, "Cashier", 0.8, 0.12);
        let s = b.with_y_shift(0.02);
        assert_eq!(s.id, b.id);
        assert!(s.skew_corrected);
        assert!((s.center_y - 0.14).abs() < 1e-9);
        assert!((s.y - b.y - 0.02).abs() < 1e-9);
    }

    #[test]
    fn washed_copy_is_not_an_amount() {
        let b = amount(2, "3.50", 0.85, 0.24);
        assert!(b.is_amount());
        assert!(!b.without_amount().is_amount());
    }

    #[test]
    fn column_contains_within_tolerance() {
        let col = AmountColumn { center_x: 0.85, tolerance: 0.02, confidence: 1.0, block_count: 5 };
        assert!(col.contains(0.86));
        assert!(!col.contains(0.88));
    }

    #[test]
    fn role_display_matches_ledger_names() {
        assert_eq!(Role::SkipNoUnusedName.to_string(), "SKIP_NO_UNUSED_NAME");
        assert!(Role::SkipRowNoLeft.is_skip());
        assert!(!Role::Tax.is_skip());
    }
}
