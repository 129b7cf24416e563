// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static ::regex::Regex {
            static R: ::std::sync::OnceLock<::regex::Regex> = ::std::sync::OnceLock::new();
            R.get_or_init(|| ::regex::Regex::new($pat).expect("invalid regex"))
        }
    };
}

pub mod blocks;
pub mod body;
pub mod classify;
pub mod cleanup;
pub mod columns;
pub mod config;
pub mod fuzzy;
pub mod items;
pub mod names;
pub mod output;
pub mod pipeline;
pub mod quantity;
pub mod regions;
pub mod relative;
pub mod rows;
pub mod skew;
pub mod source;
pub mod text;
pub mod totals;
pub mod tracker;
pub mod types;
pub mod validate;

#[cfg(test)]
pub(crate) mod fixtures;

pub use blocks::OcrBlock;
pub use config::{ConfigError, Layout, StoreConfig, StoreConfigRegistry};
pub use fuzzy::{FuzzyLabelMatcher, LabelContext, LabelRole};
pub use output::{OutputItem, OutputTotals, ReceiptOutput};
pub use pipeline::{PipelineError, ReceiptPipeline};
pub use relative::RelativeBounds;
pub use source::{BlockSource, JsonSource, SourceError, StaticSource};
pub use tracker::{AmountUsageTracker, ClaimError};
pub use types::{
    AmountColumn, AmountColumns, BlockId, ExtractedItem, LabeledAmount, PhysicalRow,
    ReceiptRegions, Role, RowAmount, RowId, RowKind, TextBlock, TotalsSequence,
};
pub use validate::{Charges, Check, ValidationParams, ValidationReport};
