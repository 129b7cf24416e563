use std::collections::BTreeMap;

use crate::types::{AmountColumn, AmountColumns, TextBlock};

pub const BIN_WIDTH: f64 = 0.01;
/// Minimum supporting amounts for a histogram bin to count as a column.
pub const MIN_COLUMN_COUNT: usize = 3;

/// Finds the right-aligned currency column from the x-centers of amount blocks.
pub fn detect_amount_columns(blocks: &[TextBlock]) -> AmountColumns {
    let xs: Vec<f64> = blocks
        .iter()
        .filter(|b| b.is_amount())
        .map(|b| b.center_x)
        .collect();
    let tolerance = BIN_WIDTH * 2.0;

    if xs.is_empty() {
        tracing::warn!("no amount blocks for column detection");
        let main = AmountColumn { center_x: 0.5, tolerance: 0.1, confidence: 0.0, block_count: 0 };
        return AmountColumns { main, all: vec![main] };
    }

    let mut histogram: BTreeMap<i64, usize> = BTreeMap::new();
    for x in &xs {
        *histogram.entry((x / BIN_WIDTH).round() as i64).or_default() += 1;
    }
    let bins: Vec<(i64, usize)> = histogram.into_iter().collect();
    let max_count = bins.iter().map(|(_, c)| *c).max().unwrap_or(0);

    let peaks: Vec<AmountColumn> = bins
        .iter()
        .enumerate()
        .filter(|(i, (_, count))| {
            *count >= MIN_COLUMN_COUNT
                && (*i == 0 || bins[i - 1].1 < *count)
                && bins.get(i + 1).map_or(true, |next| next.1 < *count)
        })
        .map(|(_, (bin, count))| AmountColumn {
            center_x: *bin as f64 * BIN_WIDTH,
            tolerance,
            confidence: *count as f64 / max_count as f64,
            block_count: *count,
        })
        .collect();

    let Some(main) = peaks.last().copied() else {
        let rightmost = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        tracing::warn!(x = rightmost, "no column peak, using right-most amount");
        let main = AmountColumn {
            center_x: rightmost,
            tolerance,
            confidence: 0.5,
            block_count: xs.len(),
        };
        return AmountColumns { main, all: vec![main] };
    };

    tracing::info!(
        columns = peaks.len(),
        main_x = main.center_x,
        confidence = main.confidence,
        blocks = main.block_count,
        "detected amount columns"
    );
    AmountColumns { main, all: peaks }
}
