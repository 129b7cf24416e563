use thiserror::Error;
use tally_core::Money;

use crate::blocks::{self, OcrBlock};
use crate::body::BodyDetector;
use crate::classify::TaxFeeClassifier;
use crate::columns::{detect_amount_columns, MIN_COLUMN_COUNT};
use crate::config::{CompiledConfig, ConfigError, StoreConfig};
use crate::items::ItemExtractor;
use crate::output::{region_fractions, region_y_bounds, strip_label_amount, OutputItem, OutputTotals, ReceiptOutput, METHOD};
use crate::regions::RegionSplitter;
use crate::relative::RelativeBounds;
use crate::rows::build_rows;
use crate::skew::{SkewCorrector, SkewReport};
use crate::source::{BlockSource, SourceError};
use crate::totals::TotalsExtractor;
use crate::tracker::AmountUsageTracker;
use crate::types::{AmountColumn, ReceiptRegions, TextBlock};
use crate::validate::{Charges, ValidationParams};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Block source failed: {0}")]
    Source(#[from] SourceError),
    #[error("Store config rejected: {0}")]
    Config(#[from] ConfigError),
}

/// Orchestrates: ingest → body → wash → skew → rows → regions → column → items
/// → totals → tax/fees → item math → validation.
///
/// Everything derived from the store configuration is built once in [`new`](Self::new);
/// a run only reads it, so one pipeline can serve many threads.
pub struct ReceiptPipeline {
    config: Option<StoreConfig>,
    compiled: CompiledConfig,
    body: BodyDetector,
    splitter: RegionSplitter,
    classifier: TaxFeeClassifier,
    params: ValidationParams,
}

impl ReceiptPipeline {
    pub fn new(config: Option<&StoreConfig>) -> Result<Self, ConfigError> {
        let base = config.cloned().unwrap_or_default();
        let compiled = CompiledConfig::compile(&base)?;
        let pipeline = Self {
            body: BodyDetector::new(base.store_names()),
            splitter: RegionSplitter::new(&base, &compiled),
            classifier: TaxFeeClassifier::new(base.totals.tax_ceiling_percent),
            params: ValidationParams::default(),
            compiled,
            config: config.cloned(),
        };
        tracing::info!(
            chain_id = ?pipeline.config.as_ref().and_then(|c| c.chain_id.as_deref()),
            "receipt pipeline ready"
        );
        Ok(pipeline)
    }

    pub fn with_params(mut self, params: ValidationParams) -> Self {
        self.params = params;
        self
    }

    pub fn config(&self) -> Option<&StoreConfig> {
        self.config.as_ref()
    }

    fn skew_enabled(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.pipeline.skew_correction)
    }

    /// Main amount column, measured on the item window when it holds enough amounts.
    fn amount_column(&self, blocks: &[TextBlock], regions: &ReceiptRegions) -> AmountColumn {
        if let Some(window) = self.splitter.items_window(regions) {
            let inside = window.select(blocks);
            if inside.iter().filter(|b| b.is_amount()).count() >= MIN_COLUMN_COUNT {
                tracing::debug!(start = window.start, end = window.end, "amount column from item window");
                return detect_amount_columns(&inside).main;
            }
        }
        detect_amount_columns(blocks).main
    }

    /// Process blocks pulled from a source.
    pub fn run_source(&self, source: &impl BlockSource) -> Result<ReceiptOutput, PipelineError> {
        Ok(self.run(source.blocks()?))
    }

    pub fn run(&self, raw: Vec<OcrBlock>) -> ReceiptOutput {
        self.run_for_merchant(raw, None)
    }

    /// Like [`run`](Self::run), reporting `merchant` as the store name.
    pub fn run_for_merchant(&self, raw: Vec<OcrBlock>, merchant: Option<&str>) -> ReceiptOutput {
        let mut error_log = Vec::new();

        // 1. Ingest and size the claim ledger.
        let all = blocks::ingest(raw);
        let mut tracker = AmountUsageTracker::new(all.len());
        let half_line = blocks::half_line_height(&all);

        // 2. Keep the receipt body, clear excluded amounts.
        let (kept, body_bounds) = self.body.filter(all);
        let washed = blocks::wash(kept, &self.compiled.amount_exclude);

        // 3. Straighten a sheared photo.
        let (text_blocks, skew) = if self.skew_enabled() {
            SkewCorrector::new(half_line)
                .with_anchors(&self.compiled.skew_left, &self.compiled.skew_right)
                .correct(washed, &mut error_log)
        } else {
            (washed, SkewReport::default())
        };
        error_log.extend(blocks::duplicate_boxes(&text_blocks));

        // 4. Layout: rows, regions, amount column.
        let rows = build_rows(&text_blocks);
        let regions = self.splitter.split(rows);
        let column = self.amount_column(&text_blocks, &regions);

        // 5. Items.
        let extractor = ItemExtractor::new(column, half_line, &self.compiled, self.config.as_ref());
        let mut items = extractor.extract(&regions.items, &mut tracker, &mut error_log);

        // 6. Totals and what lies between them.
        let totals_extractor = TotalsExtractor::new(&self.splitter.markers, column);
        let mut sequence = totals_extractor.find_subtotal_and_total(&regions.totals, &mut tracker, &mut error_log);
        totals_extractor.collect_middle(&regions.totals, &mut sequence, &tracker);
        let charges_found = self.classifier.extract(
            &sequence.middle,
            sequence.subtotal_amount(),
            &mut tracker,
            &mut error_log,
        );
        let fees_from_items = extractor.fees_in_items_region(&regions.items);
        let fees_from_items_sum: Money = fees_from_items.iter().map(|f| f.amount).sum();
        if !fees_from_items.is_empty() {
            tracing::info!(fees = fees_from_items.len(), sum = %fees_from_items_sum, "fees in items region");
        }

        // 7. Arithmetic checks.
        for item in &mut items {
            if let Some(row) = regions.items.iter().find(|r| r.id == item.row_id) {
                self.params.check_item_math(item, &row.text);
            }
        }
        let charges = Charges {
            fees: charges_found.total_fees() + fees_from_items_sum,
            tax: charges_found.total_tax(),
            fees_from_items: fees_from_items_sum,
        };
        let validation = self.params.validate_totals(&items, &sequence, charges);
        tracing::info!(
            items = items.len(),
            passed = validation.passed,
            errors = error_log.len(),
            "receipt pipeline finished"
        );

        // 8. Assemble.
        let first_item_y = regions.items.first().map(|r| r.y_center);
        let total_y = sequence.total.as_ref().map(|t| t.row_y);
        let relative_bounds = match (first_item_y, total_y) {
            (Some(start), Some(end)) => region_fractions(&regions, RelativeBounds::new(start, end)),
            _ => Default::default(),
        };
        let tax = charges_found
            .taxes
            .iter()
            .map(|t| {
                let mut t = t.clone();
                t.label = strip_label_amount(&t.label).to_string();
                t
            })
            .collect();
        let fees = charges_found.fees.iter().chain(&fees_from_items).cloned().collect();

        ReceiptOutput {
            success: validation.passed,
            method: METHOD.to_string(),
            chain_id: self.config.as_ref().and_then(|c| c.chain_id.clone()),
            store: merchant
                .map(str::to_string)
                .or_else(|| self.config.as_ref().and_then(|c| c.identification.primary_name.clone())),
            membership: regions.membership_id.clone(),
            error_log,
            items: items.iter().map(OutputItem::from).collect(),
            totals: OutputTotals {
                subtotal: sequence.subtotal_amount(),
                tax,
                fees,
                total: sequence.total_amount(),
            },
            validation,
            regions_y_bounds: region_y_bounds(&regions),
            relative_bounds,
            amount_column: column.into(),
            body_bounds,
            skew,
            claims: tracker.claims().copied().collect(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
