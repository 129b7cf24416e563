use regex::{NoExpand, Regex};
use std::collections::BTreeSet;

use crate::quantity::strip_qty;
use crate::text::edit_distance_one;

/// Grocery department captions that are never part of a product name.
pub const SECTION_HEADERS: [&str; 8] =
    ["FOOD", "PRODUCE", "DELI", "DAIRY", "BAKERY", "MEAT", "FROZEN", "GROCERY"];

/// Vocabulary for single-edit typo correction.
pub const RECEIPT_WORDS: [&str; 37] = [
    "TARE", "TAIWANESE", "REMOVED", "SALE", "FOOD", "PRODUCE", "DELI", "MEAT", "BABY", "NAPA",
    "BROCCOLI", "ONION", "GREEN", "DONUTS", "LAMB", "ROLLS", "SHANGHAI", "BOK", "CHOY", "KOREAN",
    "ENOKI", "MUSHROOM", "PAPER", "PACKAGE", "WEIGHT", "HOT", "GROCERY", "CHINESE", "CROWN",
    "PONKAN", "YU-CHOY", "SUM", "SPROUT", "SLICED", "ITEM", "COUNT", "SOYMILK",
];

/// Tax and fee flags printed after a product name.
const TAX_MARKERS: [&str; 6] = ["FP", "P", "T", "F", "N", "E"];

re!(re_points_plus_zero, r"^\s*\+1\s+0\s+");
re!(re_points_plus, r"^\s*\+1\s+");
re!(re_leading_zero, r"^\s*0\s+");
re!(re_trailing_unit, r"(?i)\s+/(?:lb|kg|oz)\s*$");
re!(re_sale_prefix, r"(?i)^\(SALE\)\s*");
re!(re_tere, r"(?i)\bTere\b");
re!(re_at_read_as_eight, r"(\d+)\s+8\s+(\d+\s*/\s*\$)");
re!(re_weight_read_as_16, r"\b(\d+\.\d{2})\s+16\b");
re!(re_sku, r"\b\d{5,7}\b");
re!(re_fp_amount, r"(?i)\bFP\s*\$?\d*\.?\d*\s*");
re!(re_inline_amount, r"\$?\d+\.\d{2}\b");
re!(re_suffix_line, r"^(?:TARE\s+REMOVED|REMOVED\s*$)");

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Section words ─────────────────────────────────────────────────────────────

/// Built-in department captions plus the store's own, upper-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionWords(BTreeSet<String>);

impl Default for SectionWords {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl SectionWords {
    pub fn new(extra: &[String]) -> Self {
        let words = SECTION_HEADERS
            .iter()
            .map(|w| w.to_string())
            .chain(extra.iter().map(|w| w.trim().to_uppercase()))
            .filter(|w| !w.is_empty())
            .collect();
        Self(words)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.0.contains(&word.trim().to_uppercase())
    }

    /// Non-empty text made only of section words: `"DELI"` yes, `"HOT FOOD BY WEIGHT"` no.
    pub fn is_section_only(&self, text: &str) -> bool {
        let mut words = text.split_whitespace().peekable();
        words.peek().is_some() && words.all(|w| self.contains(w))
    }

    /// Drops section words from both ends only.
    pub fn strip_edges(&self, text: &str) -> String {
        let mut words: Vec<&str> = text.split_whitespace().collect();
        while words.first().is_some_and(|w| self.contains(w)) {
            words.remove(0);
        }
        while words.last().is_some_and(|w| self.contains(w)) {
            words.pop();
        }
        words.join(" ")
    }
}

// ── Single steps ──────────────────────────────────────────────────────────────

/// Leading `+1 0`, `+1` or `0` left over from a points column.
pub fn strip_points_noise(text: &str) -> String {
    let t = re_points_plus_zero().replace(text.trim(), "");
    let t = re_points_plus().replace(&t, "");
    re_leading_zero().replace(&t, "").trim().to_string()
}

/// Removes `FP`, `FP $x.xx` and any inline `$x.xx`.
pub fn strip_fp_and_amounts(text: &str) -> String {
    let t = re_fp_amount().replace_all(text.trim(), "");
    re_inline_amount().replace_all(&t, "").trim().to_string()
}

/// Removes 5 to 7 digit article numbers.
pub fn remove_sku(text: &str) -> String {
    collapse(&re_sku().replace_all(text, ""))
}

pub fn remove_tax_markers(text: &str) -> String {
    let mut words: Vec<&str> = text.split_whitespace().collect();
    while words
        .last()
        .is_some_and(|w| w.len() <= 2 && TAX_MARKERS.contains(&w.to_uppercase().as_str()))
    {
        words.pop();
    }
    words.join(" ")
}

/// `Tare removed` and similar continuation lines.
pub fn is_suffix_line(text: &str) -> bool {
    re_suffix_line().is_match(&text.trim().to_uppercase())
}

/// The unique vocabulary word one edit away, unless the word is already known.
pub fn one_edit_correct(word: &str) -> Option<&'static str> {
    let upper = word.to_uppercase();
    if RECEIPT_WORDS.contains(&upper.as_str()) {
        return None;
    }
    let mut hits = RECEIPT_WORDS.iter().filter(|d| edit_distance_one(&upper, d));
    match (hits.next(), hits.next()) {
        (Some(only), None) => Some(*only),
        _ => None,
    }
}

fn match_case(corrected: &str, original: &str) -> String {
    let has_cased = original.chars().any(char::is_alphabetic);
    if has_cased && !original.chars().any(char::is_lowercase) {
        return corrected.to_string();
    }
    if original.chars().next().is_some_and(char::is_uppercase) {
        let lower = corrected.to_lowercase();
        let mut chars = lower.chars();
        return chars
            .next()
            .map(|c| c.to_uppercase().chain(chars).collect())
            .unwrap_or_default();
    }
    corrected.to_lowercase()
}

/// Built-in OCR fixes, the store's typo pairs, then one-edit correction per word.
pub fn fix_typos(name: &str, typos: &[(Regex, String)]) -> String {
    if name.trim().is_empty() {
        return name.to_string();
    }
    let t = re_tere().replace_all(name, "Tare");
    let t = re_at_read_as_eight().replace_all(&t, "${1} @ ${2}");
    let mut t = re_weight_read_as_16().replace_all(&t, "${1} lb").into_owned();
    for (wrong, right) in typos {
        t = wrong.replace_all(&t, NoExpand(right)).into_owned();
    }
    t.split_whitespace()
        .map(|w| match one_edit_correct(w) {
            Some(fixed) => match_case(fixed, w),
            None => w.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Full cleanup ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanName {
    pub name: String,
    pub on_sale: bool,
}

/// Turns a resolved name line into the product name.
pub fn clean_product_name(raw: &str, sections: &SectionWords, typos: &[(Regex, String)]) -> CleanName {
    let t = strip_points_noise(raw);
    let t = strip_qty(&t);
    let t = sections.strip_edges(&t);
    let t = re_trailing_unit().replace(&t, "").trim().to_string();

    let on_sale = t.to_uppercase().starts_with("(SALE)");
    let t = if on_sale {
        re_sale_prefix().replace(&t, "").trim().to_string()
    } else {
        t
    };

    let t = fix_typos(&t, typos);
    let t = remove_sku(&t);
    CleanName { name: remove_tax_markers(&t), on_sale }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::RegexBuilder;

    fn typo(wrong: &str, right: &str) -> (Regex, String) {
        let rx = RegexBuilder::new(&regex::escape(wrong))
            .case_insensitive(true)
            .build()
            .unwrap();
        (rx, right.to_string())
    }

    #[test]
    fn section_words_only_match_whole_text() {
        let s = SectionWords::new(&["seafood".to_string()]);
        assert!(s.is_section_only("DELI"));
        assert!(s.is_section_only("Seafood  Produce"));
        assert!(!s.is_section_only("HOT FOOD BY WEIGHT"));
        assert!(!s.is_section_only(""));
        assert_eq!(s.strip_edges("PRODUCE GREEN ONION FOOD"), "GREEN ONION");
        assert_eq!(s.strip_edges("HOT FOOD BY WEIGHT"), "HOT FOOD BY WEIGHT");
    }

    #[test]
    fn noise_and_amount_stripping() {
        assert_eq!(strip_points_noise("+1 0 GREEN ONION"), "GREEN ONION");
        assert_eq!(strip_points_noise("0 LAMB ROLLS"), "LAMB ROLLS");
        assert_eq!(strip_points_noise("0.99 LAMB"), "0.99 LAMB");
        assert_eq!(strip_fp_and_amounts("FP $6.50"), "");
        assert_eq!(strip_fp_and_amounts("EGG TRAY BUN 3.99"), "EGG TRAY BUN");
    }

    #[test]
    fn sku_and_markers() {
        assert_eq!(remove_sku("573791 NAPA 12"), "NAPA 12");
        assert_eq!(remove_tax_markers("MILK 2L FP"), "MILK 2L");
        assert_eq!(remove_tax_markers("VITAMIN E"), "VITAMIN");
        assert_eq!(remove_tax_markers("BOK CHOY"), "BOK CHOY");
        assert!(is_suffix_line("Tare removed"));
        assert!(is_suffix_line("REMOVED"));
        assert!(!is_suffix_line("REMOVED BY HAND"));
    }

    #[test]
    fn one_edit_needs_a_unique_candidate() {
        assert_eq!(one_edit_correct("TAIVANESE"), Some("TAIWANESE"));
        assert_eq!(one_edit_correct("Brocoli"), Some("BROCCOLI"));
        assert_eq!(one_edit_correct("BOK"), None);
        assert_eq!(one_edit_correct("MILK"), None);
    }

    #[test]
    fn typo_fixes_keep_the_case_pattern() {
        assert_eq!(fix_typos("Tere removed", &[]), "Tare removed");
        assert_eq!(fix_typos("Taivanese cabbage", &[]), "Taiwanese cabbage");
        assert_eq!(fix_typos("NEAT BUN", &[typo("NEAT", "MEAT")]), "MEAT BUN");
        assert_eq!(fix_typos("3 8 3/$1.98", &[]), "3 @ 3/$1.98");
        assert_eq!(fix_typos("0.92 16", &[]), "0.92 lb");
    }

    #[test]
    fn full_cleanup() {
        let s = SectionWords::default();
        let sale = clean_product_name("(SALE) BOK CHOY 12345 FP", &s, &[]);
        assert_eq!(sale, CleanName { name: "BOK CHOY".into(), on_sale: true });

        let produce = clean_product_name("+1 0 PRODUCE GREEN ONION /lb", &s, &[]);
        assert_eq!(produce.name, "GREEN ONION");
        assert!(!produce.on_sale);

        let weighed = clean_product_name("BANANAS 1.20 lb @ $1.38/lb", &s, &[]);
        assert_eq!(weighed.name, "BANANAS");
    }
}
