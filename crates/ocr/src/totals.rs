use crate::regions::Markers;
use crate::relative::RelativeBounds;
use crate::tracker::{claim_or_log, AmountUsageTracker};
use crate::types::{AmountColumn, PhysicalRow, Role, RowAmount, TextBlock, TotalsSequence};

/// Middle amounts off the main column still count right of this x.
const MIDDLE_MIN_X: f64 = 0.4;

pub struct TotalsExtractor<'a> {
    pub markers: &'a Markers,
    pub column: AmountColumn,
}

fn unclaimed<'r>(row: &'r PhysicalRow, tracker: &AmountUsageTracker) -> Vec<&'r TextBlock> {
    row.amount_blocks().filter(|b| !tracker.is_claimed(b.id)).collect()
}

impl<'a> TotalsExtractor<'a> {
    pub fn new(markers: &'a Markers, column: AmountColumn) -> Self {
        Self { markers, column }
    }

    fn in_column<'r>(&self, row: &'r PhysicalRow, tracker: &AmountUsageTracker) -> Option<&'r TextBlock> {
        unclaimed(row, tracker)
            .into_iter()
            .find(|b| self.column.contains(b.center_x))
    }

    /// Claims the subtotal and total amounts from the totals rows.
    pub fn find_subtotal_and_total(
        &self,
        rows: &[PhysicalRow],
        tracker: &mut AmountUsageTracker,
        error_log: &mut Vec<String>,
    ) -> TotalsSequence {
        let mut seq = TotalsSequence::default();

        for row in rows {
            let is_subtotal = self.markers.is_subtotal(&row.text);
            if seq.subtotal.is_none() && is_subtotal {
                if let Some(block) = self.in_column(row, tracker) {
                    if claim_or_log(tracker, error_log, block.id, Role::Subtotal, row.id) {
                        tracing::info!(row = %row.id, amount = ?block.amount, "subtotal");
                        seq.subtotal = Some(RowAmount::new(block, row));
                    }
                }
            }
            if seq.total.is_none() && !is_subtotal && self.markers.is_total(&row.text) {
                let block = self
                    .in_column(row, tracker)
                    .or_else(|| unclaimed(row, tracker).first().copied());
                match block {
                    Some(block) => {
                        if claim_or_log(tracker, error_log, block.id, Role::Total, row.id) {
                            tracing::info!(row = %row.id, amount = ?block.amount, "total");
                            seq.total = Some(RowAmount::new(block, row));
                        }
                    }
                    None => tracing::debug!(row = %row.id, "total marker without a free amount"),
                }
            }
        }

        if seq.total.is_none() {
            seq.total = self.total_from_next_row(rows, tracker, error_log);
        }
        if seq.total.is_none() && !rows.is_empty() {
            tracing::warn!(rows = rows.len(), "no total amount in totals region");
        }
        seq
    }

    /// A total label whose amount was reconstructed onto the following row.
    fn total_from_next_row(
        &self,
        rows: &[PhysicalRow],
        tracker: &mut AmountUsageTracker,
        error_log: &mut Vec<String>,
    ) -> Option<RowAmount> {
        for (i, row) in rows.iter().enumerate() {
            if self.markers.is_subtotal(&row.text) || !self.markers.is_total(&row.text) {
                continue;
            }
            let Some(next) = rows.get(i + 1) else {
                continue;
            };
            let Some(block) = unclaimed(next, tracker).first().map(|b| (*b).clone()) else {
                continue;
            };
            if claim_or_log(tracker, error_log, block.id, Role::Total, next.id) {
                tracing::info!(label_row = %row.id, amount_row = %next.id, "total from next row");
                return Some(RowAmount {
                    block,
                    row_id: next.id,
                    row_y: row.y_center,
                    row_text: row.text.clone(),
                });
            }
        }
        None
    }

    /// Unclaimed amounts strictly between the subtotal and total rows. Nothing is claimed here.
    pub fn collect_middle(&self, rows: &[PhysicalRow], seq: &mut TotalsSequence, tracker: &AmountUsageTracker) {
        let Some(subtotal) = &seq.subtotal else {
            tracing::debug!("no subtotal, no middle amounts");
            return;
        };
        let y_sub = subtotal.row_y;
        let y_tot = seq.total.as_ref().map_or(y_sub + 1.0, |t| t.row_y);
        let window = RelativeBounds::new(y_sub, y_tot).with_tolerance(0.0);
        let column = self.column;

        let middle: Vec<RowAmount> = rows
            .iter()
            .filter(|r| window.interior(r.y_center))
            .flat_map(|r| {
                unclaimed(r, tracker)
                    .into_iter()
                    .filter(move |b| column.contains(b.center_x) || b.center_x > MIDDLE_MIN_X)
                    .map(move |b| RowAmount::new(b, r))
            })
            .collect();
        tracing::info!(middle = middle.len(), "collected middle amounts");
        seq.middle = middle;
    }
}
