use regex::Regex;

use crate::config::{CompiledConfig, Layout, StoreConfig};
use crate::relative::RelativeBounds;
use crate::text::fuzzy_contains_any;
use crate::types::{PhysicalRow, ReceiptRegions, RowKind};

pub const DEFAULT_SUBTOTAL_MARKERS: &[&str] = &["SUB TOTAL", "SUBTOTAL", "SUB-TOTAL"];
pub const DEFAULT_PAYMENT_MARKERS: &[&str] = &[
    "VISA", "MASTERCARD", "CARD", "AMOUNT : USD", "AMOUNT:USD", "AMEX", "DISCOVER", "CASH",
    "PAYMENT", "TENDER",
];
const TOTAL_MARKERS: &[&str] = &["TOTAL", "TOTAL SALES"];

re!(re_date_time_row, r"\d{2}/\d{2}/\d{2}\s+\d{1,2}:\d{2}:\d{2}\s+[AP]M");
re!(re_membership_id, r"\*{2,}(\d+)");
re!(re_zero_text, r"\$?\s*0\.00\b");
re!(re_points_row, r"(?i)Points?\s+\d+");
re!(re_product_code, r"\d{6,7}\s+\S+");
re!(re_member_row, r"(?i)Member\s*\d+");
re!(re_member_number, r"(?i)Member\s*(\d{10,12})");

/// Rows of a total-first receipt that stay with the totals wherever they print.
const TOTAL_FIRST_TOTALS_ROWS: &[&str] = &[
    "TAX", "HST", "GST", "INSTANT SAVINGS", "TPD/", "THANK YOU", "PLEASE COME", "TOTAL NUMBER",
    "ITEMS SOLD",
];

// ── Markers ───────────────────────────────────────────────────────────────────

/// Subtotal, total and payment markers, shared with the totals extractor.
#[derive(Debug, Clone)]
pub struct Markers {
    pub subtotal: Vec<String>,
    pub total: Vec<String>,
    pub payment: Vec<String>,
}

impl Default for Markers {
    fn default() -> Self {
        let owned = |m: &[&str]| m.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            subtotal: owned(DEFAULT_SUBTOTAL_MARKERS),
            total: owned(TOTAL_MARKERS),
            payment: owned(DEFAULT_PAYMENT_MARKERS),
        }
    }
}

impl Markers {
    /// Built-in markers with the store's replacements and additions applied.
    pub fn from_config(config: &StoreConfig) -> Self {
        let mut markers = Self::default();
        if !config.totals.subtotal_markers.is_empty() {
            markers.subtotal = config.totals.subtotal_markers.clone();
        }
        markers.total.extend(config.totals.total_markers.iter().cloned());
        if !config.payment.section_start_markers.is_empty() {
            markers.payment = config.payment.section_start_markers.clone();
        }
        markers
    }

    pub fn is_subtotal(&self, text: &str) -> bool {
        fuzzy_contains_any(text, &self.subtotal)
    }

    /// A grand-total line; never a subtotal line.
    pub fn is_total(&self, text: &str) -> bool {
        let upper = text.to_uppercase();
        if upper.contains("SUB") && upper.contains("TOTAL") {
            return false;
        }
        !self.is_subtotal(text) && fuzzy_contains_any(text, &self.total)
    }

    pub fn is_payment(&self, text: &str) -> bool {
        fuzzy_contains_any(text, &self.payment)
    }
}

// ── Splitter ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Header,
    Item,
    Totals,
    Payment,
}

impl Mode {
    fn kind(self) -> RowKind {
        match self {
            Mode::Header => RowKind::Header,
            Mode::Item => RowKind::Item,
            Mode::Totals => RowKind::Totals,
            Mode::Payment => RowKind::Payment,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegionSplitter {
    pub markers: Markers,
    /// Header end row for chains with a fixed preamble; implies membership extraction.
    pub items_start: Option<Regex>,
    pub membership_extraction: bool,
    pub layout: Layout,
}

fn has_zero(row: &PhysicalRow) -> bool {
    re_zero_text().is_match(row.text.trim()) || row.has_zero_amount()
}

fn push(regions: &mut ReceiptRegions, row: PhysicalRow) {
    match row.kind {
        RowKind::Header => regions.header.push(row),
        RowKind::Item => regions.items.push(row),
        RowKind::Totals => regions.totals.push(row),
        RowKind::Payment | RowKind::Unknown => regions.payment.push(row),
    }
}

/// TOTAL and SUBTOTAL row indices of a total-first receipt.
#[derive(Debug, Clone, Copy)]
struct TotalFirstAnchors {
    total: Option<usize>,
    subtotal: usize,
}

impl TotalFirstAnchors {
    fn totals_end(self) -> usize {
        self.total.map_or(self.subtotal, |t| t.max(self.subtotal))
    }

    /// The header runs down to TOTAL only when TOTAL prints above SUBTOTAL.
    fn header_end(self) -> usize {
        self.total.filter(|&t| t < self.subtotal).unwrap_or(0)
    }
}

impl RegionSplitter {
    pub fn new(config: &StoreConfig, compiled: &CompiledConfig) -> Self {
        Self {
            markers: Markers::from_config(config),
            items_start: compiled.items_start.clone(),
            membership_extraction: config.pipeline.membership_extraction,
            layout: config.layout,
        }
    }

    /// Window from the first item row down to the subtotal row (or the first totals
    /// row), used to measure the amount column on item lines only.
    pub fn items_window(&self, regions: &ReceiptRegions) -> Option<RelativeBounds> {
        let start = regions.items.first()?.y_center;
        let end = regions
            .totals
            .iter()
            .find(|r| self.markers.is_subtotal(&r.text))
            .or(regions.totals.first())?
            .y_center;
        (end > start).then(|| RelativeBounds::new(start, end))
    }

    /// Index of the first item row when the header ends at a known row.
    fn fixed_items_start(&self, rows: &[PhysicalRow]) -> Option<usize> {
        if !self.membership_extraction {
            return None;
        }
        let header_end = self.items_start.as_ref().unwrap_or_else(|| re_date_time_row());
        let i = rows.iter().position(|r| header_end.is_match(r.text.trim()))?;
        tracing::info!(row = %rows[i].id, text = %rows[i].text, "header ends at fixed row");
        Some(i + 1)
    }

    pub fn split(&self, rows: Vec<PhysicalRow>) -> ReceiptRegions {
        if self.layout == Layout::TotalFirst {
            if let Some(anchors) = self.total_first_anchors(&rows) {
                return self.split_total_first(rows, anchors);
            }
            tracing::debug!("total-first layout without a subtotal row, standard split");
        }
        self.split_standard(rows)
    }

    fn split_standard(&self, rows: Vec<PhysicalRow>) -> ReceiptRegions {
        let items_start = self.fixed_items_start(&rows);
        let mut regions = ReceiptRegions::default();
        let mut mode = Mode::Header;

        for (i, mut row) in rows.into_iter().enumerate() {
            let text = row.text.as_str();
            let next = if matches!(mode, Mode::Header | Mode::Item)
                && (self.markers.is_subtotal(text) || self.markers.is_total(text))
            {
                tracing::debug!(row = %row.id, "totals start");
                Mode::Totals
            } else if mode == Mode::Totals && self.markers.is_payment(text) {
                tracing::debug!(row = %row.id, "payment start");
                Mode::Payment
            } else if mode == Mode::Header && items_start == Some(i) {
                Mode::Item
            } else if mode == Mode::Header && items_start.is_none() && row.has_amount() {
                tracing::debug!(row = %row.id, "first priced row, items start");
                Mode::Item
            } else {
                mode
            };
            mode = next;
            row.kind = mode.kind();
            push(&mut regions, row);
        }

        if self.membership_extraction {
            regions.membership_id = extract_membership(&mut regions.items);
        }
        tracing::info!(
            header = regions.header.len(),
            items = regions.items.len(),
            totals = regions.totals.len(),
            payment = regions.payment.len(),
            membership = regions.membership_id.is_some(),
            "split regions"
        );
        regions
    }
}

impl RegionSplitter {
    fn total_first_anchors(&self, rows: &[PhysicalRow]) -> Option<TotalFirstAnchors> {
        let subtotal = rows.iter().position(|r| self.markers.is_subtotal(&r.text))?;
        let total = rows
            .iter()
            .position(|r| r.has_amount() && self.markers.is_total(&r.text));
        Some(TotalFirstAnchors { total, subtotal })
    }

    fn total_first_kind(&self, row: &PhysicalRow, i: usize, anchors: TotalFirstAnchors) -> RowKind {
        let text = row.text.trim();
        let upper = text.to_uppercase();
        if i < anchors.header_end() {
            RowKind::Header
        } else if anchors.total == Some(i) || anchors.subtotal == i {
            RowKind::Totals
        } else if i > anchors.totals_end() {
            RowKind::Payment
        } else if TOTAL_FIRST_TOTALS_ROWS.iter().any(|m| upper.contains(m)) {
            RowKind::Totals
        } else if self.markers.is_payment(text) || re_member_row().is_match(text) {
            RowKind::Payment
        } else if row.has_amount() && (re_product_code().is_match(text) || text.chars().count() > 8) {
            RowKind::Item
        } else {
            RowKind::Payment
        }
    }

    /// TOTAL near the top, items between it and SUBTOTAL, payment below the later of the two.
    fn split_total_first(&self, rows: Vec<PhysicalRow>, anchors: TotalFirstAnchors) -> ReceiptRegions {
        let mut regions = ReceiptRegions::default();
        for (i, mut row) in rows.into_iter().enumerate() {
            row.kind = self.total_first_kind(&row, i, anchors);
            push(&mut regions, row);
        }
        regions.membership_id = regions
            .header
            .iter()
            .chain(&regions.items)
            .chain(&regions.payment)
            .find_map(|r| re_member_number().captures(&r.text).map(|c| c[1].to_string()));
        tracing::info!(
            header = regions.header.len(),
            items = regions.items.len(),
            totals = regions.totals.len(),
            payment = regions.payment.len(),
            total_row = ?anchors.total,
            subtotal_row = anchors.subtotal,
            "split total-first regions"
        );
        regions
    }
}

/// Pulls a `***digits` + `$0.00` membership line off the top of the items.
///
/// Two layouts are seen: both on one row, or the zero row directly above the id
/// row. A trailing `Points N` + zero row goes with it.
fn extract_membership(items: &mut Vec<PhysicalRow>) -> Option<String> {
    let first = items.first()?;
    let mut remove = Vec::new();
    let id = match re_membership_id().captures(first.text.trim()) {
        Some(caps) if has_zero(first) => {
            remove.push(0);
            caps[1].to_string()
        }
        Some(_) => return None,
        None => {
            let second = items.get(1)?;
            let caps = re_membership_id().captures(second.text.trim())?;
            if !has_zero(first) {
                return None;
            }
            remove.extend([0, 1]);
            caps[1].to_string()
        }
    };
    let last = items.len() - 1;
    if last >= remove.len() {
        let row = &items[last];
        if re_points_row().is_match(row.text.trim()) && has_zero(row) {
            tracing::info!(text = %row.text, "membership points footer");
            remove.push(last);
        }
    }
    tracing::info!(membership = %id, rows = remove.len(), "extracted membership");
    let mut index = 0;
    items.retain(|_| {
        let keep = !remove.contains(&index);
        index += 1;
        keep
    });
    Some(id)
}
