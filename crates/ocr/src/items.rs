use rust_decimal::Decimal;

use crate::cleanup::{clean_product_name, SectionWords};
use crate::config::{CompiledConfig, StoreConfig};
use crate::names::{self, NameCandidate, NameLedger, NameScan};
use crate::quantity::{closest_quantity, parse_quantity, QuantityMatch};
use crate::tracker::{claim_or_log, AmountUsageTracker};
use crate::types::{AmountColumn, ExtractedItem, LabeledAmount, PhysicalRow, Role, TextBlock};

/// Boundary used when the items region has fewer than two blocks.
pub const DEFAULT_BOUNDARY: f64 = 0.6;

re!(re_points_line, r"(?i)Points\s*\d+");

/// Splits names from amounts: the midpoint of the widest horizontal gap between block centers.
pub fn left_right_boundary(rows: &[PhysicalRow]) -> f64 {
    let mut xs: Vec<f64> = rows
        .iter()
        .flat_map(|r| r.blocks.iter().map(|b| b.center_x))
        .collect();
    if xs.len() < 2 {
        return DEFAULT_BOUNDARY;
    }
    xs.sort_by(f64::total_cmp);
    let (left, right) = xs
        .windows(2)
        .map(|w| (w[0], w[1]))
        .fold((0.0, 0.0), |best, (l, r)| if r - l > best.1 - best.0 { (l, r) } else { best });
    let boundary = (left + right) / 2.0;
    tracing::info!(boundary, gap = right - left, "left/right boundary");
    boundary
}

pub struct ItemExtractor<'a> {
    pub column: AmountColumn,
    pub half_line: f64,
    pub rules: &'a CompiledConfig,
    pub sections: SectionWords,
    pub points_line_not_item: bool,
    /// Fee rows inside the items region count as fees (provinces such as BC).
    pub fees_in_items: bool,
}

impl<'a> ItemExtractor<'a> {
    pub fn new(
        column: AmountColumn,
        half_line: f64,
        rules: &'a CompiledConfig,
        config: Option<&StoreConfig>,
    ) -> Self {
        Self {
            column,
            half_line,
            rules,
            sections: SectionWords::new(&rules.section_headers),
            points_line_not_item: config.is_some_and(|c| c.items.points_line_not_item),
            fees_in_items: config.is_some_and(|c| c.is_region("BC")),
        }
    }

    /// Unclaimed main-column amounts of a row, top first.
    fn row_amounts<'r>(&self, row: &'r PhysicalRow, tracker: &AmountUsageTracker) -> Vec<&'r TextBlock> {
        let mut out: Vec<&TextBlock> = row
            .amount_blocks()
            .filter(|b| !tracker.is_claimed(b.id) && self.column.contains(b.center_x))
            .collect();
        out.sort_by(|a, b| a.center_y.total_cmp(&b.center_y).then(a.center_x.total_cmp(&b.center_x)));
        out
    }

    /// Fee rows, `Points N` lines and membership lines priced at zero.
    fn is_non_item(&self, row: &PhysicalRow, amount: &TextBlock) -> bool {
        let text = row.text.trim();
        if text.is_empty() {
            return false;
        }
        if self.rules.is_fee_row(text) {
            return true;
        }
        if !amount.is_zero_amount() {
            return false;
        }
        (self.points_line_not_item && re_points_line().is_match(text))
            || self.rules.membership.as_ref().is_some_and(|rx| rx.is_match(text))
    }

    /// An amount printed on a section-caption row belongs to the product line below it.
    /// When that product line carries its own amount, that amount moves one row further down.
    fn section_redirect(
        &self,
        scan: &NameScan<'_>,
        ledger: &NameLedger,
        pending: &mut Option<usize>,
    ) -> Option<NameCandidate> {
        let i = scan.index;
        let next = scan.rows.get(i + 1)?;
        if *pending == Some(i) {
            *pending = None;
            let found = scan.product_line_of(next, ledger);
            if found.is_some() {
                tracing::info!(row = %scan.row().id, "amount goes to the row below a redirected product");
            }
            return found;
        }
        if !self.sections.is_section_only(&scan.row_name_part()) {
            return None;
        }
        let found = scan.product_line_of(next, ledger)?;
        tracing::info!(row = %scan.row().id, name = %found.name, "section caption amount moved to next row");
        *pending = Some(i + 1);
        Some(found)
    }

    /// Extracts one item per unclaimed main-column amount, claiming each amount exactly once.
    pub fn extract(
        &self,
        rows: &[PhysicalRow],
        tracker: &mut AmountUsageTracker,
        error_log: &mut Vec<String>,
    ) -> Vec<ExtractedItem> {
        let boundary = left_right_boundary(rows);
        let mut names_used = NameLedger::default();
        let mut qty_used = NameLedger::default();
        let mut last_amount_y: Option<f64> = None;
        let mut pending: Option<usize> = None;
        let mut items = Vec::new();

        for (i, row) in rows.iter().enumerate() {
            let amounts = self.row_amounts(row, tracker);
            for (k, &block) in amounts.iter().enumerate() {
                if self.is_non_item(row, block) {
                    claim_or_log(tracker, error_log, block.id, Role::SkipNonItem, row.id);
                    tracing::debug!(row = %row.id, text = %row.text, "non-item row");
                    continue;
                }
                if row.left_of(boundary).next().is_none() {
                    claim_or_log(tracker, error_log, block.id, Role::SkipRowNoLeft, row.id);
                    tracing::warn!(row = %row.id, amount = ?block.amount, "amount row has nothing left of the boundary");
                    continue;
                }

                let scan = NameScan {
                    rows,
                    index: i,
                    amount: block,
                    prev_in_row_x: k.checked_sub(1).map(|p| amounts[p].center_x),
                    prev_amount_y: last_amount_y,
                    boundary,
                    half_line: self.half_line,
                    sections: &self.sections,
                };
                let candidate = match self.section_redirect(&scan, &names_used, &mut pending) {
                    Some(found) => Some(found),
                    None => {
                        pending = None;
                        names::resolve(&scan, &names_used).map(|(strategy, found)| {
                            tracing::debug!(row = %row.id, ?strategy, name = %found.name, "name resolved");
                            found
                        })
                    }
                };
                let Some(candidate) = candidate else {
                    claim_or_log(tracker, error_log, block.id, Role::SkipNoUnusedName, row.id);
                    tracing::warn!(row = %row.id, amount = ?block.amount, "no unused name line");
                    continue;
                };

                let item = self.build_item(&scan, candidate, &mut names_used, &mut qty_used, error_log);
                if claim_or_log(tracker, error_log, block.id, Role::Item, row.id) {
                    tracing::debug!(row = %row.id, name = %item.product_name, total = %item.line_total, "item");
                    items.push(item);
                    last_amount_y = Some(block.center_y);
                }
            }
        }

        tracing::info!(items = items.len(), rows = rows.len(), "extracted items");
        items
    }

    fn build_item(
        &self,
        scan: &NameScan<'_>,
        candidate: NameCandidate,
        names_used: &mut NameLedger,
        qty_used: &mut NameLedger,
        error_log: &mut Vec<String>,
    ) -> ExtractedItem {
        let row = scan.row();
        let block = scan.amount;
        let line_total = block.amount.unwrap_or_default();

        let clean = clean_product_name(&candidate.name, &self.sections, &self.rules.typos);
        names_used.insert(candidate.y);
        for y in &candidate.auxiliary {
            names_used.insert(*y);
        }

        let quantity = closest_quantity(&scan.window_blocks(), block, self.half_line, qty_used).or_else(|| {
            let line = candidate.attached_qty.as_ref()?;
            let parse = parse_quantity(&line.text, line_total)?;
            Some(QuantityMatch { parse, y: line.y, text: line.text.clone() })
        });
        if let Some(found) = &quantity {
            qty_used.insert(found.y);
            if found.missing_weight_suffix() {
                let text: String = found.text.chars().take(50).collect();
                let message = format!("qty/unit '{text}' missing /lb suffix, math validates");
                tracing::info!(row = %row.id, "{message}");
                error_log.push(message);
            }
        }

        let product_name = if clean.name.is_empty() { row.text.clone() } else { clean.name };
        let (quantity, unit, unit_price) = match quantity {
            Some(found) => (found.parse.quantity, found.parse.unit, Some(found.parse.unit_price)),
            None => (Decimal::ONE, None, None),
        };
        ExtractedItem {
            product_name,
            line_total,
            quantity,
            unit,
            unit_price,
            on_sale: clean.on_sale,
            confidence: 1.0,
            row_id: row.id,
            amount_block_id: block.id,
            raw_text: row.text.clone(),
        }
    }

    /// Fee rows inside the items region with their main-column amounts, for provinces
    /// that print deposits among the items. Those amounts were claimed as non-items.
    pub fn fees_in_items_region(&self, rows: &[PhysicalRow]) -> Vec<LabeledAmount> {
        if !self.fees_in_items {
            return Vec::new();
        }
        let mut fees = Vec::new();
        for row in rows {
            let text = row.text.trim();
            if text.is_empty() {
                continue;
            }
            let Some(label) = self.rules.fee_label(text) else {
                continue;
            };
            let label = if label.is_empty() { text.chars().take(50).collect() } else { label };
            for block in row.amount_blocks() {
                let Some(amount) = block.amount else { continue };
                if amount.is_positive() && self.column.contains(block.center_x) {
                    tracing::debug!(row = %row.id, %label, %amount, "fee in items region");
                    let mut fee = LabeledAmount::new(label.clone(), amount);
                    fee.source_text = row.text.clone();
                    fees.push(fee);
                }
            }
        }
        fees
    }
}
