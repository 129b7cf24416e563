use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use tally_core::Money;

use crate::types::{ExtractedItem, TotalsSequence};

re!(re_number, r"\d+\.?\d*");

pub const ITEMS_VS_SUBTOTAL: &str = "items_vs_subtotal";
pub const ITEMS_VS_TOTAL: &str = "items_vs_total";
pub const SUBTOTAL_FEES_TAX_VS_TOTAL: &str = "subtotal_fees_tax_vs_total";
pub const ITEMS_FEES_VS_SUBTOTAL: &str = "items_fees_vs_subtotal";
pub const SUBTOTAL_TAX_VS_TOTAL: &str = "subtotal_tax_vs_total";

/// Reports only; totals are never adjusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationParams {
    /// Allowed drift between computed and printed sums.
    pub tolerance: Money,
    /// Allowed drift between quantity × unit price and a line total.
    pub item_tolerance: Money,
}

impl Default for ValidationParams {
    fn default() -> Self {
        Self {
            tolerance: Money::from_cents(3),
            item_tolerance: Money::from_cents(2),
        }
    }
}

/// One arithmetic comparison and what went into it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Check {
    pub name: &'static str,
    pub computed: Money,
    pub expected: Money,
    pub difference: Money,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub breakdown: BTreeMap<&'static str, Money>,
}

impl Check {
    fn new(name: &'static str, computed: Money, expected: Money, tolerance: Money) -> Self {
        let difference = computed.distance(expected);
        Self {
            name,
            computed,
            expected,
            difference,
            passed: difference <= tolerance,
            note: None,
            breakdown: BTreeMap::new(),
        }
    }

    fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    fn with_part(mut self, part: &'static str, amount: Money) -> Self {
        self.breakdown.insert(part, amount);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub passed: bool,
    /// Why a verdict could only be partial, e.g. `"no_subtotal"`, `"no_total"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub items_sum: Money,
    pub checks: Vec<Check>,
}

impl ValidationReport {
    pub fn check(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// Sums to compare against the printed totals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Charges {
    /// Every fee, including those found in the items region.
    pub fees: Money,
    pub tax: Money,
    /// Fees printed among the items (deposit and environmental fee lines).
    pub fees_from_items: Money,
}

impl ValidationParams {
    pub fn validate_totals(
        &self,
        items: &[ExtractedItem],
        totals: &TotalsSequence,
        charges: Charges,
    ) -> ValidationReport {
        let items_sum: Money = items.iter().map(|i| i.line_total).sum();
        let subtotal = totals.subtotal_amount().filter(|s| !s.is_zero());
        let total = totals.total_amount();

        let report = match (subtotal, total) {
            (None, Some(total)) => self.items_against_total(items_sum, total, charges),
            (None, None) => ValidationReport {
                passed: false,
                reason: Some("no_subtotal".into()),
                items_sum,
                checks: Vec::new(),
            },
            (Some(subtotal), total) => self.with_subtotal(items_sum, subtotal, total, charges),
        };

        if report.passed {
            tracing::info!(items_sum = %items_sum, checks = report.checks.len(), "totals reconcile");
        } else {
            tracing::warn!(
                items_sum = %items_sum,
                reason = ?report.reason,
                failed = ?report.checks.iter().filter(|c| !c.passed).map(|c| c.name).collect::<Vec<_>>(),
                "totals do not reconcile"
            );
        }
        report
    }

    /// Receipts without a subtotal line: the items (plus fees printed among them) make the total.
    fn items_against_total(&self, items_sum: Money, total: Money, charges: Charges) -> ValidationReport {
        let mut note = String::from("items sum = total (no subtotal)");
        let mut check = Check::new(ITEMS_VS_TOTAL, items_sum + charges.fees_from_items, total, self.tolerance)
            .with_part("items_sum", items_sum);
        if charges.fees_from_items.is_positive() {
            note.push_str(&format!("; + fees from items {}", charges.fees_from_items));
            check = check.with_part("fees_from_items", charges.fees_from_items);
        }
        ValidationReport {
            passed: check.passed,
            reason: None,
            items_sum,
            checks: vec![check.with_note(note)],
        }
    }

    fn with_subtotal(
        &self,
        items_sum: Money,
        subtotal: Money,
        total: Option<Money>,
        charges: Charges,
    ) -> ValidationReport {
        let items = Check::new(ITEMS_VS_SUBTOTAL, items_sum, subtotal, self.tolerance);
        let Some(total) = total else {
            return ValidationReport {
                passed: items.passed,
                reason: Some("no_total".into()),
                items_sum,
                checks: vec![items],
            };
        };

        let sum = subtotal + charges.fees + charges.tax;
        let standard = Check::new(SUBTOTAL_FEES_TAX_VS_TOTAL, sum, total, self.tolerance)
            .with_part("subtotal", subtotal)
            .with_part("fees", charges.fees)
            .with_part("tax", charges.tax);

        if items.passed && standard.passed {
            return ValidationReport { passed: true, reason: None, items_sum, checks: vec![items, standard] };
        }

        // Some chains print fees above the subtotal line, folded into it.
        let folded = Check::new(ITEMS_FEES_VS_SUBTOTAL, items_sum + charges.fees, subtotal, self.tolerance)
            .with_part("items_sum", items_sum)
            .with_part("fees", charges.fees);
        let taxed = Check::new(SUBTOTAL_TAX_VS_TOTAL, subtotal + charges.tax, total, self.tolerance)
            .with_part("subtotal", subtotal)
            .with_part("tax", charges.tax);
        let alternate = charges.fees.is_positive() && folded.passed && taxed.passed;
        if alternate {
            tracing::debug!(fees = %charges.fees, "fees already included in subtotal");
        }

        ValidationReport {
            passed: alternate,
            reason: None,
            items_sum,
            checks: vec![
                items,
                standard,
                folded.with_note("alternate: fees inside subtotal"),
                taxed.with_note("alternate: fees inside subtotal"),
            ],
        }
    }

    /// Scores one item's arithmetic and stores the result in `item.confidence`.
    ///
    /// With a quantity and unit price: 1.0 when they multiply to the line
    /// total, otherwise 1.0 if any two numbers in the row text do, else 0.5.
    /// Items carrying no unit price are left as they are.
    pub fn check_item_math(&self, item: &mut ExtractedItem, row_text: &str) -> f32 {
        let Some(unit_price) = item.unit_price else {
            return item.confidence;
        };
        let tolerance = self.item_tolerance.as_decimal();
        let total = item.line_total.as_decimal();

        let direct = (item.quantity * unit_price.as_decimal() - total).abs() < tolerance;
        let confidence = if direct || number_pair_reconciles(row_text, total, tolerance) {
            1.0
        } else {
            0.5
        };
        tracing::debug!(
            item = %item.product_name,
            qty = %item.quantity,
            unit_price = %unit_price,
            line_total = %item.line_total,
            confidence,
            "item arithmetic"
        );
        item.confidence = confidence;
        confidence
    }
}

fn number_pair_reconciles(text: &str, total: Decimal, tolerance: Decimal) -> bool {
    let numbers: Vec<Decimal> = re_number()
        .find_iter(text)
        .filter_map(|m| Decimal::from_str(m.as_str().trim_end_matches('.')).ok())
        .collect();
    numbers.iter().enumerate().any(|(i, a)| {
        numbers
            .iter()
            .enumerate()
            .any(|(j, b)| i != j && (*a * *b - total).abs() < tolerance)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::amount;
    use crate::types::{BlockId, PhysicalRow, RowAmount, RowId};

    fn item(name: &str, cents: i64) -> ExtractedItem {
        ExtractedItem {
            product_name: name.into(),
            line_total: Money::from_cents(cents),
            quantity: Decimal::ONE,
            unit: None,
            unit_price: None,
            on_sale: false,
            confidence: 1.0,
            row_id: RowId(0),
            amount_block_id: BlockId(0),
            raw_text: name.into(),
        }
    }

    fn row_amount(id: usize, text: &str, y: f64) -> RowAmount {
        let block = amount(id, text, 0.85, y);
        let row = PhysicalRow::new(RowId(id), vec![block.clone()]).unwrap();
        RowAmount::new(&block, &row)
    }

    fn totals(subtotal: Option<&str>, total: Option<&str>) -> TotalsSequence {
        TotalsSequence {
            subtotal: subtotal.map(|s| row_amount(1, s, 0.30)),
            total: total.map(|t| row_amount(2, t, 0.38)),
            middle: Vec::new(),
        }
    }

    fn charges(fees: i64, tax: i64, fees_from_items: i64) -> Charges {
        Charges {
            fees: Money::from_cents(fees),
            tax: Money::from_cents(tax),
            fees_from_items: Money::from_cents(fees_from_items),
        }
    }

    #[test]
    fn consistent_receipt_passes() {
        let items = vec![item("MILK 2L", 499), item("BREAD", 350)];
        let report = ValidationParams::default().validate_totals(
            &items,
            &totals(Some("8.49"), Some("8.91")),
            charges(0, 42, 0),
        );
        assert!(report.passed);
        assert_eq!(report.items_sum, Money::from_cents(849));
        let standard = report.check(SUBTOTAL_FEES_TAX_VS_TOTAL).unwrap();
        assert_eq!(standard.breakdown["tax"], Money::from_cents(42));
        assert!(standard.difference.is_zero());
    }

    #[test]
    fn drift_within_three_cents_passes() {
        let items = vec![item("A", 1000)];
        let report = ValidationParams::default().validate_totals(
            &items,
            &totals(Some("10.03"), Some("10.03")),
            Charges::default(),
        );
        assert!(report.passed);

        let report = ValidationParams::default().validate_totals(
            &items,
            &totals(Some("10.04"), Some("10.04")),
            Charges::default(),
        );
        assert!(!report.passed);
        assert!(!report.check(ITEMS_VS_SUBTOTAL).unwrap().passed);
    }

    #[test]
    fn no_subtotal_compares_items_with_total() {
        let items = vec![item("A", 500), item("B", 300)];
        let report = ValidationParams::default().validate_totals(
            &items,
            &totals(None, Some("8.10")),
            charges(10, 0, 10),
        );
        assert!(report.passed);
        let check = report.check(ITEMS_VS_TOTAL).unwrap();
        assert_eq!(check.computed, Money::from_cents(810));
        assert_eq!(check.breakdown["fees_from_items"], Money::from_cents(10));
        assert!(check.note.as_deref().unwrap().contains("fees from items"));
    }

    #[test]
    fn missing_subtotal_and_total_fails_with_reason() {
        let report = ValidationParams::default().validate_totals(
            &[item("A", 100)],
            &TotalsSequence::default(),
            Charges::default(),
        );
        assert!(!report.passed);
        assert_eq!(report.reason.as_deref(), Some("no_subtotal"));
    }

    #[test]
    fn missing_total_uses_items_check() {
        let report = ValidationParams::default().validate_totals(
            &[item("A", 849)],
            &totals(Some("8.49"), None),
            Charges::default(),
        );
        assert!(report.passed);
        assert_eq!(report.reason.as_deref(), Some("no_total"));
        assert_eq!(report.checks.len(), 1);
    }

    #[test]
    fn zero_middle_with_equal_subtotal_and_total() {
        let report = ValidationParams::default().validate_totals(
            &[item("A", 1299)],
            &totals(Some("12.99"), Some("12.99")),
            Charges::default(),
        );
        assert!(report.passed);
    }

    #[test]
    fn fees_folded_into_subtotal_pass_the_alternate_accounting() {
        // items 10.00, deposit 0.10 printed above the subtotal line
        let report = ValidationParams::default().validate_totals(
            &[item("A", 1000)],
            &totals(Some("10.10"), Some("10.60")),
            charges(10, 50, 0),
        );
        assert!(report.passed);
        assert!(!report.check(ITEMS_VS_SUBTOTAL).unwrap().passed);
        assert!(report.check(ITEMS_FEES_VS_SUBTOTAL).unwrap().passed);
        assert!(report.check(SUBTOTAL_TAX_VS_TOTAL).unwrap().passed);
    }

    #[test]
    fn item_math_scores_confidence() {
        let params = ValidationParams::default();
        let mut weighed = item("BANANAS", 166);
        weighed.quantity = Decimal::new(120, 2);
        weighed.unit_price = Some(Money::from_cents(138));
        assert_eq!(params.check_item_math(&mut weighed, "BANANAS 1.66"), 1.0);

        let mut off = item("LIMES", 200);
        off.quantity = Decimal::from(3);
        off.unit_price = Some(Money::from_cents(99));
        assert_eq!(params.check_item_math(&mut off, "LIMES 2.00"), 0.5);
        assert_eq!(off.confidence, 0.5);
        assert_eq!(off.line_total, Money::from_cents(200));

        let mut from_text = item("LIMES", 200);
        from_text.quantity = Decimal::from(3);
        from_text.unit_price = Some(Money::from_cents(99));
        assert_eq!(params.check_item_math(&mut from_text, "LIMES 2 @ 1.00 2.00"), 1.0);

        let mut plain = item("MILK", 499);
        assert_eq!(params.check_item_math(&mut plain, "MILK 2L 4.99"), 1.0);
    }
}
