use std::collections::HashMap;

use crate::types::{PhysicalRow, RowId, TextBlock};

/// Floor for a block's row tolerance, small enough that adjacent lines never merge.
const MIN_ROW_EPS: f64 = 0.0025;
/// Tolerance cap as a fraction of the typical block height.
const ROW_EPS_CAP: f64 = 0.5;
const DEFAULT_BLOCK_HEIGHT: f64 = 0.02;
const HEIGHT_SAMPLE: usize = 10;

/// Typical block height: modal 0.001 bucket over the first ten blocks, averaged.
pub fn typical_block_height(blocks: &[TextBlock]) -> f64 {
    let heights: Vec<f64> = blocks
        .iter()
        .take(HEIGHT_SAMPLE)
        .filter_map(TextBlock::effective_height)
        .collect();
    if heights.is_empty() {
        return DEFAULT_BLOCK_HEIGHT;
    }
    let bucket = |h: f64| (h * 1000.0).round() as i64;
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for h in &heights {
        *counts.entry(bucket(*h)).or_default() += 1;
    }
    // first bucket seen wins a tie
    let mut mode = bucket(heights[0]);
    for h in &heights {
        let b = bucket(*h);
        if counts[&b] > counts[&mode] {
            mode = b;
        }
    }
    let in_bucket: Vec<f64> = heights.into_iter().filter(|h| bucket(*h) == mode).collect();
    in_bucket.iter().sum::<f64>() / in_bucket.len() as f64
}

fn row_tolerance(block: &TextBlock, cap: f64) -> f64 {
    let eps = block
        .effective_height()
        .map(|h| (h / 2.0).max(MIN_ROW_EPS))
        .unwrap_or(MIN_ROW_EPS);
    eps.min(cap)
}

/// Clusters blocks into physical rows, top to bottom.
///
/// A block joins the open row when its center is within tolerance of the row's
/// *first* block, which keeps a tall row from drifting into the next line.
pub fn build_rows(blocks: &[TextBlock]) -> Vec<PhysicalRow> {
    if blocks.is_empty() {
        return Vec::new();
    }
    let cap = typical_block_height(blocks) * ROW_EPS_CAP;

    let mut sorted: Vec<&TextBlock> = blocks.iter().collect();
    sorted.sort_by(|a, b| a.center_y.total_cmp(&b.center_y));

    let mut groups: Vec<Vec<TextBlock>> = Vec::new();
    let mut current: Vec<TextBlock> = Vec::new();
    for block in sorted {
        let joins = current.first().is_some_and(|first| {
            let eps = row_tolerance(first, cap).max(row_tolerance(block, cap));
            (block.center_y - first.center_y).abs() <= eps
        });
        if !joins && !current.is_empty() {
            groups.push(std::mem::take(&mut current));
        }
        current.push(block.clone());
    }
    groups.push(current);

    let rows: Vec<PhysicalRow> = groups
        .into_iter()
        .enumerate()
        .filter_map(|(i, g)| PhysicalRow::new(RowId(i), g))
        .collect();
    tracing::info!(rows = rows.len(), blocks = blocks.len(), "built physical rows");
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{amount, word};

    #[test]
    fn empty_input_has_no_rows() {
        assert!(build_rows(&[]).is_empty());
    }

    #[test]
    fn same_line_blocks_merge_and_sort_by_x() {
        let blocks = vec![
            amount(0, "4.99", 0.85, 0.201),
            word(1, "MILK 2L", 0.25, 0.200),
            word(2, "BREAD", 0.22, 0.240),
            amount(3, "3.50", 0.85, 0.239),
        ];
        let rows = build_rows(&blocks);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text, "MILK 2L 4.99");
        assert_eq!(rows[1].text, "BREAD 3.50");
        assert_eq!(rows[0].id, RowId(0));
        assert_eq!(rows[1].id, RowId(1));
    }

    #[test]
    fn compares_against_first_block_not_last() {
        // each step is within tolerance of its neighbour, but the third is too far from the first
        let blocks = vec![
            word(0, "A", 0.1, 0.100),
            word(1, "B", 0.2, 0.108),
            word(2, "C", 0.3, 0.116),
        ];
        let rows = build_rows(&blocks);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text, "A B");
        assert_eq!(rows[1].text, "C");
    }

    #[test]
    fn typical_height_uses_modal_bucket() {
        let mut tall = word(0, "HEADER", 0.5, 0.05);
        tall.height = Some(0.06);
        let blocks = vec![tall, word(1, "a", 0.1, 0.2), word(2, "b", 0.1, 0.3)];
        assert!((typical_block_height(&blocks) - 0.02).abs() < 1e-9);
    }

    #[test]
    fn tall_block_tolerance_is_capped() {
        let mut tall = word(0, "LOGO", 0.5, 0.100);
        tall.height = Some(0.08);
        let blocks = vec![
            tall,
            word(1, "x", 0.1, 0.125),
            word(2, "y", 0.1, 0.3),
            word(3, "z", 0.1, 0.4),
        ];
        let rows = build_rows(&blocks);
        // cap = 0.01, so the 0.025 gap splits despite the tall block
        assert_eq!(rows.len(), 4);
    }
}
