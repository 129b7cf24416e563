use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use tally_core::Money;

use crate::fuzzy::{FuzzyLabelMatcher, LabelContext, LabelRole, TAX_LABELS};
use crate::text::marker_normalize;
use crate::tracker::{claim_or_log, AmountUsageTracker};
use crate::types::{BlockId, LabeledAmount, Role, RowAmount, RowId, RowKind};

re!(re_percent, r"(\d+(?:\.\d+)?)\s*%");
re!(re_bracketed_number, r"[\[(][^\])]*\d[^\])]*[\])]");
re!(re_trailing_amount, r"\s*\$?\s*-?\d[\d,]*\.\d{2}\s*$");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeKind {
    Tax,
    Fee,
    FeeGeneric,
    Unknown,
}

impl FeeKind {
    pub fn role(self) -> Role {
        match self {
            FeeKind::Tax => Role::Tax,
            FeeKind::Fee => Role::Fee,
            FeeKind::FeeGeneric => Role::FeeGeneric,
            FeeKind::Unknown => Role::FeeUnknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub kind: FeeKind,
    /// Canonical label when the fuzzy matcher recognized the text.
    pub label: Option<&'static str>,
}

/// Row text reduced to its label, with any rate pulled out.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelCore {
    pub text: String,
    pub rate_percent: Option<Decimal>,
}

/// Strips bracketed annotations, percentages and trailing amounts: `"Tax [5%] 0.42"` → `"Tax"`.
pub fn label_core(row_text: &str) -> LabelCore {
    let rate_percent = re_percent()
        .captures(row_text)
        .and_then(|c| Decimal::from_str(&c[1]).ok());
    let mut text = re_bracketed_number().replace_all(row_text, " ").into_owned();
    text = re_percent().replace_all(&text, " ").into_owned();
    while re_trailing_amount().is_match(&text) {
        text = re_trailing_amount().replace(&text, "").into_owned();
    }
    LabelCore {
        text: text.split_whitespace().collect::<Vec<_>>().join(" "),
        rate_percent,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaxesAndFees {
    pub taxes: Vec<LabeledAmount>,
    pub fees: Vec<LabeledAmount>,
    /// Tax exceeded the ceiling and was moved to fees.
    pub tax_guard_tripped: bool,
}

impl TaxesAndFees {
    pub fn total_tax(&self) -> Money {
        self.taxes.iter().map(|t| t.amount).sum()
    }

    pub fn total_fees(&self) -> Money {
        self.fees.iter().map(|f| f.amount).sum()
    }
}

#[derive(Debug, Clone)]
pub struct TaxFeeClassifier {
    pub matcher: FuzzyLabelMatcher,
    /// Tax above this share of the subtotal is treated as misread.
    pub tax_ceiling_percent: Decimal,
}

impl Default for TaxFeeClassifier {
    fn default() -> Self {
        Self::new(Decimal::from(20))
    }
}

impl TaxFeeClassifier {
    pub fn new(tax_ceiling_percent: Decimal) -> Self {
        Self { matcher: FuzzyLabelMatcher::default(), tax_ceiling_percent }
    }

    /// Classifies a label: tax labels, then fee labels, then keywords.
    pub fn classify(&self, label: &str) -> Classification {
        let tax_ctx = LabelContext::new(RowKind::Totals, true, LabelRole::Tax);
        if let Some(m) = self.matcher.match_label(label, Some(&tax_ctx)) {
            return Classification { kind: FeeKind::Tax, label: Some(m.label) };
        }
        let fee_ctx = LabelContext::new(RowKind::Totals, true, LabelRole::FeeOrTax);
        if let Some(m) = self.matcher.match_label(label, Some(&fee_ctx)) {
            let is_tax = TAX_LABELS.iter().any(|t| t.label == m.label);
            let kind = if is_tax { FeeKind::Tax } else { FeeKind::Fee };
            return Classification { kind, label: Some(m.label) };
        }

        let norm = marker_normalize(label);
        let has = |kw: &[&str]| kw.iter().any(|k| norm.contains(k));
        let kind = if has(&["FEE"]) && has(&["TAX"]) {
            FeeKind::FeeGeneric
        } else if has(&["TAX", "VAT", "GST"]) || label.contains('%') {
            FeeKind::Tax
        } else if has(&["FEE", "ENVIRONMENTAL", "BOTTLE", "DEPOSIT", "CRF"]) {
            FeeKind::Fee
        } else {
            FeeKind::Unknown
        };
        Classification { kind, label: None }
    }

    /// Labels every unclaimed middle amount, applies the tax ceiling, then claims
    /// each amount under its final role.
    pub fn extract(
        &self,
        middle: &[RowAmount],
        subtotal: Option<Money>,
        tracker: &mut AmountUsageTracker,
        error_log: &mut Vec<String>,
    ) -> TaxesAndFees {
        let mut lines: Vec<ChargeLine> = Vec::new();
        let mut unknown = 0;

        for m in middle {
            if tracker.is_claimed(m.block.id) || lines.iter().any(|l| l.block == m.block.id) {
                continue;
            }
            let core = label_core(&m.row_text);
            let class = if core.text.is_empty() {
                self.classify(&m.row_text)
            } else {
                self.classify(&core.text)
            };
            let label = match (class.label, class.kind) {
                (Some(l), _) => l.to_string(),
                (None, FeeKind::Unknown) => {
                    unknown += 1;
                    format!("Fee/Tax {unknown}")
                }
                (None, _) if !core.text.is_empty() => core.text.clone(),
                (None, _) => m.row_text.clone(),
            };
            let mut entry = LabeledAmount::new(label, m.amount());
            entry.source_text = m.row_text.clone();
            if class.kind == FeeKind::Tax {
                entry.rate_percent = core.rate_percent;
            }
            lines.push(ChargeLine { block: m.block.id, row: m.row_id, role: class.kind.role(), entry });
        }

        let tax_guard_tripped = self.apply_tax_ceiling(&mut lines, subtotal);
        let mut out = TaxesAndFees { tax_guard_tripped, ..TaxesAndFees::default() };
        for line in lines {
            if !claim_or_log(tracker, error_log, line.block, line.role, line.row) {
                continue;
            }
            let entry = line.entry;
            match line.role {
                Role::Tax => {
                    tracing::info!(label = %entry.label, amount = %entry.amount, "tax line");
                    out.taxes.push(entry);
                }
                Role::FeeUnknown => {
                    tracing::warn!(text = %entry.source_text, amount = %entry.amount, "unclassified amount kept as fee");
                    out.fees.push(entry);
                }
                _ => {
                    tracing::info!(label = %entry.label, amount = %entry.amount, "fee line");
                    out.fees.push(entry);
                }
            }
        }
        out
    }

    /// Turns every tax line into a fee when the tax sum exceeds the ceiling share of
    /// the subtotal. Returns whether it did.
    fn apply_tax_ceiling(&self, lines: &mut [ChargeLine], subtotal: Option<Money>) -> bool {
        let tax: Money = lines.iter().filter(|l| l.role == Role::Tax).map(|l| l.entry.amount).sum();
        let Some(subtotal) = subtotal.filter(|s| s.is_positive()) else {
            return false;
        };
        if !tax.is_positive() {
            return false;
        }
        let Some(percent) = tax.percent_of(subtotal) else {
            return false;
        };
        if percent <= self.tax_ceiling_percent {
            tracing::debug!(%tax, %percent, "tax within ceiling");
            return false;
        }
        tracing::warn!(
            %tax,
            %subtotal,
            %percent,
            ceiling = %self.tax_ceiling_percent,
            "tax above ceiling, moved to fees"
        );
        let suffix = format!(" (invalid - >{}%)", self.tax_ceiling_percent.normalize());
        for line in lines.iter_mut().filter(|l| l.role == Role::Tax) {
            line.role = Role::Fee;
            line.entry.label.push_str(&suffix);
            line.entry.rate_percent = None;
        }
        true
    }
}

/// A classified middle amount waiting to be claimed.
struct ChargeLine {
    block: BlockId,
    row: RowId,
    role: Role,
    entry: LabeledAmount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{amount, word};
    use crate::types::PhysicalRow;

    fn middle(id: usize, label: &str, price: &str, y: f64) -> RowAmount {
        let block = amount(id * 2 + 1, price, 0.85, y);
        let row = PhysicalRow::new(RowId(id), vec![word(id * 2, label, 0.25, y), block.clone()]).unwrap();
        RowAmount::new(&block, &row)
    }

    #[test]
    fn label_core_strips_rate_and_amount() {
        let core = label_core("Tax [5%] 0.42");
        assert_eq!(core.text, "Tax");
        assert_eq!(core.rate_percent, Some(Decimal::from(5)));
        let core = label_core("GST 4.712 % $1,204.50");
        assert_eq!(core.text, "GST");
        assert_eq!(core.rate_percent, Some(Decimal::from_str("4.712").unwrap()));
        assert_eq!(label_core("Env fee (CRF) 0.01").text, "Env fee (CRF)");
    }

    #[test]
    fn classifies_labels() {
        let c = TaxFeeClassifier::default();
        assert_eq!(c.classify("Tax").kind, FeeKind::Tax);
        assert_eq!(c.classify("Sa1es Tax").label, Some("Sales Tax"));
        let fee = c.classify("Env.ronment fee");
        assert_eq!(fee.kind, FeeKind::Fee);
        assert_eq!(fee.label, Some("Environmental Fee"));
        assert_eq!(c.classify("HST ON").kind, FeeKind::Unknown);
        assert_eq!(c.classify("Provincial TAX").kind, FeeKind::Tax);
        assert_eq!(c.classify("Bag Fee").kind, FeeKind::Fee);
        assert_eq!(c.classify("Fee/Tax").kind, FeeKind::FeeGeneric);
        assert_eq!(c.classify("xyz 5%").kind, FeeKind::Tax);
    }

    #[test]
    fn extracts_and_claims_middle_amounts() {
        let rows = vec![
            middle(0, "Tax [5%]", "0.42", 0.34),
            middle(1, "Bottle Deposit", "0.10", 0.36),
            middle(2, "ZZQ", "0.05", 0.37),
        ];
        let mut tracker = AmountUsageTracker::new(6);
        let mut log = Vec::new();
        let out = TaxFeeClassifier::default().extract(
            &rows,
            Some(Money::from_cents(849)),
            &mut tracker,
            &mut log,
        );
        assert!(log.is_empty());
        assert_eq!(out.taxes.len(), 1);
        assert_eq!(out.taxes[0].label, "Tax");
        assert_eq!(out.taxes[0].rate_percent, Some(Decimal::from(5)));
        assert_eq!(out.taxes[0].source_text, "Tax [5%] 0.42");
        assert_eq!(out.fees[0].label, "Bottle Deposit");
        assert_eq!(out.fees[1].label, "Fee/Tax 1");
        assert_eq!(out.total_fees(), Money::from_cents(15));
        assert_eq!(tracker.role_of(BlockId(1)), Some(Role::Tax));
        assert_eq!(tracker.role_of(BlockId(3)), Some(Role::Fee));
        assert_eq!(tracker.role_of(BlockId(5)), Some(Role::FeeUnknown));
        assert!(!out.tax_guard_tripped);
    }

    #[test]
    fn claimed_amounts_are_skipped() {
        let rows = vec![middle(0, "Tax", "0.42", 0.34)];
        let mut tracker = AmountUsageTracker::new(2);
        tracker.claim(BlockId(1), Role::Item, RowId(0)).unwrap();
        let mut log = Vec::new();
        let out = TaxFeeClassifier::default().extract(&rows, None, &mut tracker, &mut log);
        assert!(out.taxes.is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn tax_above_ceiling_moves_to_fees() {
        let rows = vec![middle(0, "Tax", "3.00", 0.34)];
        let mut tracker = AmountUsageTracker::new(2);
        let mut log = Vec::new();
        let out = TaxFeeClassifier::default().extract(
            &rows,
            Some(Money::from_cents(1000)),
            &mut tracker,
            &mut log,
        );
        assert!(out.tax_guard_tripped);
        assert!(out.taxes.is_empty());
        assert_eq!(out.fees[0].label, "Tax (invalid - >20%)");
        assert_eq!(out.total_tax(), Money::zero());
        assert_eq!(tracker.role_of(BlockId(1)), Some(Role::Fee));
        assert_eq!(tracker.count(Role::Tax), 0);
    }

    #[test]
    fn ceiling_is_configurable() {
        let rows = vec![middle(0, "Tax", "3.00", 0.34)];
        let mut tracker = AmountUsageTracker::new(2);
        let mut log = Vec::new();
        let out = TaxFeeClassifier::new(Decimal::from(35)).extract(
            &rows,
            Some(Money::from_cents(1000)),
            &mut tracker,
            &mut log,
        );
        assert!(!out.tax_guard_tripped);
        assert_eq!(out.total_tax(), Money::from_cents(300));
    }
}
