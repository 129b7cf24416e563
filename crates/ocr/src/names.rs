use std::collections::BTreeSet;

use crate::cleanup::{is_suffix_line, remove_sku, remove_tax_markers, strip_fp_and_amounts, SectionWords};
use crate::quantity::looks_like_qty_line;
use crate::text::{is_mostly_upper, join_texts};
use crate::types::{PhysicalRow, TextBlock};

/// Rows scanned below the amount's row when looking ahead.
const LOOK_AHEAD_ROWS: usize = 5;

fn ledger_key(y: f64) -> i64 {
    (y * 10_000.0).round() as i64
}

/// Y positions already consumed, as `round(y × 10000)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameLedger {
    keys: BTreeSet<i64>,
}

impl NameLedger {
    pub fn insert(&mut self, y: f64) {
        self.keys.insert(ledger_key(y));
    }

    pub fn contains(&self, y: f64) -> bool {
        self.keys.contains(&ledger_key(y))
    }

    /// Some consumed position lies within `tolerance` of `y`.
    pub fn is_used(&self, y: f64, tolerance: f64) -> bool {
        let key = ledger_key(y);
        let tol = ledger_key(tolerance).max(1);
        self.keys.range(key - tol..=key + tol).next().is_some()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// ── Lines ─────────────────────────────────────────────────────────────────────

/// Blocks sharing a y band, text read left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub y: f64,
    pub text: String,
}

fn mean_y(blocks: &[&TextBlock]) -> f64 {
    blocks.iter().map(|b| b.center_y).sum::<f64>() / blocks.len() as f64
}

fn line_of(mut blocks: Vec<&TextBlock>) -> Line {
    let y = mean_y(&blocks);
    blocks.sort_by(|a, b| a.center_x.total_cmp(&b.center_x));
    Line { y, text: join_texts(blocks.iter().map(|b| b.text.as_str())) }
}

/// Groups blocks top to bottom; a block joins the current line when within `eps` of its last block.
pub fn group_lines(mut blocks: Vec<&TextBlock>, eps: f64) -> Vec<Line> {
    blocks.sort_by(|a, b| a.center_y.total_cmp(&b.center_y));
    let mut lines = Vec::new();
    let mut current: Vec<&TextBlock> = Vec::new();
    for block in blocks {
        if let Some(last) = current.last() {
            if (block.center_y - last.center_y).abs() > eps {
                lines.push(line_of(std::mem::take(&mut current)));
            }
        }
        current.push(block);
    }
    if !current.is_empty() {
        lines.push(line_of(current));
    }
    lines
}

/// Index of the line closest to `y` among `candidates`; the first one wins ties.
fn closest(lines: &[Line], candidates: impl IntoIterator<Item = usize>, y: f64) -> Option<usize> {
    candidates.into_iter().fold(None, |best, i| match best {
        Some(b) if (lines[b].y - y).abs() <= (lines[i].y - y).abs() => Some(b),
        _ => Some(i),
    })
}

pub fn is_all_caps_name(text: &str) -> bool {
    !text.trim().is_empty() && !looks_like_qty_line(text) && is_mostly_upper(text)
}

// ── Scan context ──────────────────────────────────────────────────────────────

/// Everything a strategy may look at for one amount.
#[derive(Debug, Clone, Copy)]
pub struct NameScan<'r> {
    pub rows: &'r [PhysicalRow],
    pub index: usize,
    pub amount: &'r TextBlock,
    /// x of the amount handled just before this one on the same row.
    pub prev_in_row_x: Option<f64>,
    /// y of the previous item's amount; upward scans stop there.
    pub prev_amount_y: Option<f64>,
    pub boundary: f64,
    pub half_line: f64,
    pub sections: &'r SectionWords,
}

impl<'r> NameScan<'r> {
    pub fn row(&self) -> &'r PhysicalRow {
        &self.rows[self.index]
    }

    pub fn line_eps(&self) -> f64 {
        self.half_line * 0.75
    }

    fn left_cutoff(&self) -> f64 {
        self.prev_in_row_x.unwrap_or(-1.0)
    }

    /// Left-side blocks of rows `i-2..=i+2` within `[y - 8h, y + 2h]` of the amount,
    /// amount-flagged ones included since they may carry a quantity line.
    pub fn window_blocks(&self) -> Vec<&'r TextBlock> {
        let y = self.amount.center_y;
        let (y_min, y_max) = (y - self.half_line * 8.0, y + self.half_line * 2.0);
        let start = self.index.saturating_sub(2);
        let end = (self.index + 3).min(self.rows.len());
        self.rows[start..end]
            .iter()
            .flat_map(|r| r.blocks.iter())
            .filter(|b| b.center_x < self.boundary && b.center_y >= y_min && b.center_y <= y_max)
            .collect()
    }

    /// Non-amount blocks of the amount's own row between the previous amount and the boundary.
    fn same_row_blocks(&self) -> Vec<&'r TextBlock> {
        let row = self.row();
        let section_row = self.sections.is_section_only(&row.text);
        row.blocks
            .iter()
            .filter(|b| !b.is_amount() && b.center_x > self.left_cutoff())
            .take_while(|b| b.center_x < self.boundary)
            .filter(|b| !(section_row && self.sections.contains(&b.text)))
            .filter(|b| !b.is_vertical())
            .collect()
    }

    /// The name part of the amount's row, falling back to the row text minus amounts.
    pub fn row_name_part(&self) -> String {
        let part = join_texts(self.same_row_blocks().iter().map(|b| b.text.as_str()));
        let amount_text = self.amount.text.trim();
        let part = if !part.trim().is_empty() {
            part
        } else if amount_text.is_empty() {
            self.row().text.clone()
        } else {
            self.row().text.replace(amount_text, "")
        };
        strip_fp_and_amounts(&part)
    }

    /// A following row's left text as a product line, when it is one and is unclaimed.
    pub fn product_line_of(&self, row: &PhysicalRow, ledger: &NameLedger) -> Option<NameCandidate> {
        let left: Vec<&TextBlock> = row.left_of(self.boundary).collect();
        if left.is_empty() {
            return None;
        }
        let text = join_texts(left.iter().map(|b| b.text.as_str()));
        if text.is_empty() || self.sections.is_section_only(&text) || looks_like_qty_line(&text) {
            return None;
        }
        let y = mean_y(&left);
        if ledger.is_used(y, self.line_eps()) {
            return None;
        }
        Some(NameCandidate::new(remove_sku(&text), y))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NameCandidate {
    pub name: String,
    /// y of the name line, recorded in the ledger.
    pub y: f64,
    /// Quantity lines passed over on the way; recorded so they never become names.
    pub auxiliary: Vec<f64>,
    /// A quantity line found below a looked-ahead name.
    pub attached_qty: Option<Line>,
}

impl NameCandidate {
    pub fn new(name: String, y: f64) -> Self {
        Self { name, y, auxiliary: Vec::new(), attached_qty: None }
    }

    fn with_auxiliary(mut self, y: f64) -> Self {
        self.auxiliary.push(y);
        self
    }
}

// ── Strategies ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStrategy {
    /// Text left of the amount on its own row.
    SameRow,
    /// Upper-case line in the window above the amount, through quantity lines.
    LinesAbove,
    /// Topmost usable line among the row's own blocks.
    TopmostInRow,
    /// Upper-case line in the next few rows.
    LookAhead,
    /// The whole row text.
    RowText,
}

pub const RESOLVER_CHAIN: [NameStrategy; 5] = [
    NameStrategy::SameRow,
    NameStrategy::LinesAbove,
    NameStrategy::TopmostInRow,
    NameStrategy::LookAhead,
    NameStrategy::RowText,
];

/// Runs [`RESOLVER_CHAIN`]; `None` means every strategy came up empty.
pub fn resolve(scan: &NameScan<'_>, ledger: &NameLedger) -> Option<(NameStrategy, NameCandidate)> {
    RESOLVER_CHAIN
        .iter()
        .find_map(|s| s.resolve(scan, ledger).map(|c| (*s, c)))
}

impl NameStrategy {
    pub fn resolve(self, scan: &NameScan<'_>, ledger: &NameLedger) -> Option<NameCandidate> {
        match self {
            NameStrategy::SameRow => same_row(scan, ledger),
            NameStrategy::LinesAbove => lines_above(scan, ledger),
            NameStrategy::TopmostInRow => topmost_in_row(scan, ledger),
            NameStrategy::LookAhead => look_ahead(scan, ledger),
            NameStrategy::RowText => row_text(scan, ledger),
        }
    }
}

fn same_row(scan: &NameScan<'_>, ledger: &NameLedger) -> Option<NameCandidate> {
    let blocks = scan.same_row_blocks();
    if blocks.is_empty() {
        return None;
    }
    let raw = join_texts(blocks.iter().map(|b| b.text.as_str()));
    if looks_like_qty_line(&raw) || is_suffix_line(&raw) {
        return None;
    }
    let text = strip_fp_and_amounts(&raw);
    if !text.chars().any(char::is_alphabetic) || scan.sections.is_section_only(&text) {
        return None;
    }
    let y = mean_y(&blocks);
    if ledger.is_used(y, scan.line_eps()) {
        return None;
    }
    Some(NameCandidate::new(remove_sku(&remove_tax_markers(&text)), y))
}

/// The line directly above a quantity line, if it still belongs to this item.
fn above_qty_line(
    scan: &NameScan<'_>,
    ledger: &NameLedger,
    lines: &[Line],
    qty_idx: usize,
) -> Option<NameCandidate> {
    let above = lines.get(qty_idx.checked_sub(1)?)?;
    if scan.prev_amount_y.is_some_and(|p| above.y <= p) {
        return None;
    }
    if above.text.is_empty()
        || scan.sections.is_section_only(&above.text)
        || ledger.is_used(above.y, scan.line_eps())
    {
        return None;
    }
    Some(NameCandidate::new(remove_sku(&above.text), above.y).with_auxiliary(lines[qty_idx].y))
}

fn lines_above(scan: &NameScan<'_>, ledger: &NameLedger) -> Option<NameCandidate> {
    let lines = group_lines(scan.window_blocks(), scan.line_eps());
    if lines.is_empty() {
        return None;
    }
    let y = scan.amount.center_y;
    let h = scan.half_line;
    let eps = scan.line_eps();

    let above: Vec<usize> = (0..lines.len())
        .filter(|&i| lines[i].y <= y && y - lines[i].y <= h)
        .collect();
    let band = if above.is_empty() {
        (0..lines.len())
            .filter(|&i| lines[i].y > y && lines[i].y - y <= h)
            .collect()
    } else {
        above
    };
    let usable_name = |l: &Line| {
        is_all_caps_name(&l.text) && !scan.sections.is_section_only(&l.text) && !ledger.is_used(l.y, eps)
    };
    let caps_in_band: Vec<usize> = band.into_iter().filter(|&i| usable_name(&lines[i])).collect();
    let pool: Vec<usize> = if caps_in_band.is_empty() {
        (0..lines.len()).collect()
    } else {
        caps_in_band
    };
    let at = closest(&lines, pool, y)?;

    let at_line = &lines[at];
    if usable_name(at_line) {
        return Some(NameCandidate::new(remove_sku(&remove_tax_markers(&at_line.text)), at_line.y));
    }
    if looks_like_qty_line(&at_line.text) {
        if let Some(found) = above_qty_line(scan, ledger, &lines, at) {
            return Some(found);
        }
    }

    for idx in (0..at).rev() {
        let line = &lines[idx];
        if scan.prev_amount_y.is_some_and(|p| line.y <= p) {
            break;
        }
        if line.text.is_empty() || scan.sections.is_section_only(&line.text) {
            continue;
        }
        if is_all_caps_name(&line.text) {
            if !ledger.is_used(line.y, eps) {
                return Some(NameCandidate::new(remove_sku(&remove_tax_markers(&line.text)), line.y));
            }
            continue;
        }
        if looks_like_qty_line(&line.text) {
            return above_qty_line(scan, ledger, &lines, idx);
        }
    }
    None
}

fn topmost_in_row(scan: &NameScan<'_>, ledger: &NameLedger) -> Option<NameCandidate> {
    let right_cutoff = scan.amount.center_x - 0.05;
    let blocks: Vec<&TextBlock> = scan
        .row()
        .blocks
        .iter()
        .filter(|b| !b.is_amount() && b.center_x > scan.left_cutoff())
        .take_while(|b| b.center_x < right_cutoff)
        .collect();
    let lines = group_lines(blocks, scan.line_eps());
    let at = closest(&lines, 0..lines.len(), scan.amount.center_y)?;
    lines[..=at]
        .iter()
        .rev()
        .find(|l| {
            !l.text.is_empty()
                && !scan.sections.is_section_only(&l.text)
                && !looks_like_qty_line(&l.text)
                && !is_suffix_line(&l.text)
                && !ledger.is_used(l.y, scan.line_eps())
        })
        .map(|l| NameCandidate::new(remove_sku(&l.text), l.y))
}

fn look_ahead(scan: &NameScan<'_>, ledger: &NameLedger) -> Option<NameCandidate> {
    let end = (scan.index + 1 + LOOK_AHEAD_ROWS).min(scan.rows.len());
    for (offset, row) in scan.rows[scan.index + 1..end].iter().enumerate() {
        let left: Vec<&TextBlock> = row.left_of(scan.boundary).collect();
        if left.is_empty() {
            if row.has_amount() {
                tracing::debug!(row = %row.id, "look-ahead stopped at an amount-only row");
                break;
            }
            continue;
        }
        let text = join_texts(left.iter().map(|b| b.text.as_str()));
        if scan.sections.is_section_only(&text) || looks_like_qty_line(&text) {
            continue;
        }
        if !is_all_caps_name(&text) {
            continue;
        }
        let y = mean_y(&left);
        if ledger.is_used(y, scan.line_eps()) {
            continue;
        }

        let mut found = NameCandidate::new(remove_sku(&text), y);
        let next = scan.rows.get(scan.index + 2 + offset);
        if let Some(next) = next {
            let below: Vec<&TextBlock> = next.left_of(scan.boundary).collect();
            let below_text = join_texts(below.iter().map(|b| b.text.as_str()));
            if !below.is_empty() && looks_like_qty_line(&below_text) {
                let below_y = mean_y(&below);
                if !ledger.is_used(below_y, scan.line_eps()) {
                    found = found.with_auxiliary(below_y);
                    found.attached_qty = Some(Line { y: below_y, text: below_text });
                }
            }
        }
        return Some(found);
    }
    None
}

fn row_text(scan: &NameScan<'_>, ledger: &NameLedger) -> Option<NameCandidate> {
    let row = scan.row();
    let left: Vec<&TextBlock> = row.left_of(scan.boundary).collect();
    let y = if left.is_empty() { row.y_center } else { mean_y(&left) };
    if ledger.is_used(y, scan.line_eps()) {
        tracing::debug!(row = %row.id, y, "row text already used as a name");
        return None;
    }
    Some(NameCandidate::new(row.text.clone(), y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{amount, word};
    use crate::types::RowId;

    const H: f64 = 0.01;

    fn row(id: usize, blocks: Vec<TextBlock>) -> PhysicalRow {
        PhysicalRow::new(RowId(id), blocks).unwrap()
    }

    fn scan<'r>(rows: &'r [PhysicalRow], index: usize, amount: &'r TextBlock, sections: &'r SectionWords) -> NameScan<'r> {
        NameScan {
            rows,
            index,
            amount,
            prev_in_row_x: None,
            prev_amount_y: None,
            boundary: 0.55,
            half_line: H,
            sections,
        }
    }

    #[test]
    fn ledger_matches_within_tolerance() {
        let mut ledger = NameLedger::default();
        ledger.insert(0.2000);
        assert!(ledger.contains(0.20004));
        assert!(ledger.is_used(0.2070, 0.0075));
        assert!(!ledger.is_used(0.2090, 0.0075));
        assert!(ledger.is_used(0.20009, 0.0));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn lines_group_by_y_and_read_left_to_right() {
        let a = word(0, "2L", 0.40, 0.2003);
        let b = word(1, "MILK", 0.25, 0.1998);
        let c = word(2, "BREAD", 0.25, 0.24);
        let lines = group_lines(vec![&c, &a, &b], 0.0075);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "MILK 2L");
        assert_eq!(lines[1].text, "BREAD");
    }

    #[test]
    fn same_row_name_comes_first() {
        let rows = vec![row(0, vec![word(0, "MILK 2L", 0.25, 0.20), amount(1, "4.99", 0.85, 0.20)])];
        let sections = SectionWords::default();
        let s = scan(&rows, 0, &rows[0].blocks[1], &sections);
        let (strategy, found) = resolve(&s, &NameLedger::default()).unwrap();
        assert_eq!(strategy, NameStrategy::SameRow);
        assert_eq!(found.name, "MILK 2L");
        assert!((found.y - 0.20).abs() < 1e-9);
    }

    #[test]
    fn quantity_line_points_to_the_name_above() {
        let rows = vec![
            row(0, vec![word(0, "BANANAS", 0.25, 0.20)]),
            row(1, vec![word(1, "1.20 lb @ $1.38/lb", 0.30, 0.22), amount(2, "1.66", 0.85, 0.22)]),
        ];
        let sections = SectionWords::default();
        let s = scan(&rows, 1, &rows[1].blocks[1], &sections);
        assert!(NameStrategy::SameRow.resolve(&s, &NameLedger::default()).is_none());
        let found = NameStrategy::LinesAbove.resolve(&s, &NameLedger::default()).unwrap();
        assert_eq!(found.name, "BANANAS");
        assert_eq!(found.auxiliary.len(), 1);
        assert!((found.auxiliary[0] - 0.22).abs() < 1e-9);
    }

    #[test]
    fn upward_walk_stops_at_the_previous_amount() {
        let rows = vec![
            row(0, vec![word(0, "BANANAS", 0.25, 0.20)]),
            row(1, vec![word(1, "1.20 lb @ $1.38/lb", 0.30, 0.22), amount(2, "1.66", 0.85, 0.22)]),
        ];
        let sections = SectionWords::default();
        let mut s = scan(&rows, 1, &rows[1].blocks[1], &sections);
        s.prev_amount_y = Some(0.21);
        assert!(NameStrategy::LinesAbove.resolve(&s, &NameLedger::default()).is_none());
    }

    #[test]
    fn topmost_skips_suffix_lines() {
        let rows = vec![row(
            0,
            vec![
                word(0, "HOT FOOD BY WEIGHT", 0.25, 0.195),
                word(1, "Tare removed", 0.25, 0.21),
                amount(2, "7.25", 0.85, 0.21),
            ],
        )];
        let sections = SectionWords::default();
        let s = scan(&rows, 0, &rows[0].blocks[2], &sections);
        let found = NameStrategy::TopmostInRow.resolve(&s, &NameLedger::default()).unwrap();
        assert_eq!(found.name, "HOT FOOD BY WEIGHT");
    }

    #[test]
    fn look_ahead_attaches_the_quantity_below() {
        let rows = vec![
            row(0, vec![amount(0, "6.50", 0.85, 0.20)]),
            row(1, vec![word(1, "FOOD", 0.25, 0.23)]),
            row(2, vec![word(2, "EGG TRAY BUN", 0.25, 0.26)]),
            row(3, vec![word(3, "1.20 lb @ $1.38/lb", 0.30, 0.29)]),
        ];
        let sections = SectionWords::default();
        let s = scan(&rows, 0, &rows[0].blocks[0], &sections);
        let found = NameStrategy::LookAhead.resolve(&s, &NameLedger::default()).unwrap();
        assert_eq!(found.name, "EGG TRAY BUN");
        assert_eq!(found.attached_qty.unwrap().text, "1.20 lb @ $1.38/lb");
        assert_eq!(found.auxiliary.len(), 1);
    }

    #[test]
    fn look_ahead_stops_at_amount_only_rows() {
        let rows = vec![
            row(0, vec![amount(0, "6.50", 0.85, 0.20)]),
            row(1, vec![amount(1, "1.00", 0.85, 0.23)]),
            row(2, vec![word(2, "EGG TRAY BUN", 0.25, 0.26)]),
        ];
        let sections = SectionWords::default();
        let s = scan(&rows, 0, &rows[0].blocks[0], &sections);
        assert!(NameStrategy::LookAhead.resolve(&s, &NameLedger::default()).is_none());
    }

    #[test]
    fn used_row_text_is_refused() {
        let rows = vec![row(0, vec![word(0, "eggs", 0.25, 0.20), amount(1, "2.00", 0.85, 0.20)])];
        let sections = SectionWords::default();
        let s = scan(&rows, 0, &rows[0].blocks[1], &sections);
        let mut ledger = NameLedger::default();
        assert_eq!(NameStrategy::RowText.resolve(&s, &ledger).unwrap().name, "eggs 2.00");
        ledger.insert(0.20);
        assert!(resolve(&s, &ledger).is_none());
    }
}
