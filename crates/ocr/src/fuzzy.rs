use serde::Serialize;
use std::collections::HashSet;

use crate::text::levenshtein;
use crate::types::RowKind;

const W_LEV: f64 = 0.35;
const W_LCS: f64 = 0.20;
const W_SKELETON: f64 = 0.20;
const W_TOKENS: f64 = 0.15;
const W_TRIGRAMS: f64 = 0.10;

/// A standard label and the spellings that map to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalLabel {
    pub label: &'static str,
    pub aliases: &'static [&'static str],
}

const fn label(label: &'static str, aliases: &'static [&'static str]) -> CanonicalLabel {
    CanonicalLabel { label, aliases }
}

pub const TOTAL_LABELS: &[CanonicalLabel] = &[
    label("Subtotal", &["SUB TOTAL"]),
    label("Total", &[]),
    label("Total Sales", &[]),
];

pub const FEE_LABELS: &[CanonicalLabel] = &[
    label("Bottle Deposit", &["Bottle Deposit Single", "Deposit Single"]),
    label("Environmental Fee", &["Env Fee", "Environment Fee", "Env fee (CRF)"]),
    label("CRF", &[]),
];

pub const TAX_LABELS: &[CanonicalLabel] = &[
    label("Tax", &["Tax [4.712%]"]),
    label("Sales Tax", &[]),
    label("VAT", &[]),
    label("GST", &[]),
];

/// What the amount next to a label is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabelRole {
    Total,
    Tax,
    FeeOrTax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelContext {
    pub region: RowKind,
    pub has_amount_on_right: bool,
    pub role: Option<LabelRole>,
}

impl LabelContext {
    pub fn new(region: RowKind, has_amount_on_right: bool, role: LabelRole) -> Self {
        Self { region, has_amount_on_right, role: Some(role) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelMatch {
    /// Canonical label.
    pub label: &'static str,
    /// The spelling that scored best.
    pub matched: &'static str,
    pub score: f64,
}

// ── Normalization ─────────────────────────────────────────────────────────────

fn visual(c: char) -> char {
    match c {
        '0' => 'o',
        '1' => 'l',
        '5' => 's',
        '7' => 't',
        '$' => 's',
        '@' => 'a',
        other => other,
    }
}

/// Lowercase, punctuation to spaces, whitespace collapsed, look-alike digits mapped.
pub fn normalize_for_match(text: &str) -> String {
    let spaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    spaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .map(visual)
        .collect()
}

fn skeleton(text: &str) -> String {
    let mut out = String::new();
    let mut last = None;
    for c in text.chars() {
        if "aeiou".contains(c) || !c.is_alphanumeric() || Some(c) == last {
            continue;
        }
        out.push(c);
        last = Some(c);
    }
    out
}

fn trigrams(text: &str) -> HashSet<String> {
    let chars: Vec<char> = text.chars().filter(|c| *c != ' ').collect();
    if chars.len() < 3 {
        return if chars.is_empty() {
            HashSet::new()
        } else {
            HashSet::from([chars.iter().collect()])
        };
    }
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

fn jaccard<T: Eq + std::hash::Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    a.intersection(b).count() as f64 / a.union(b).count() as f64
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y { prev[j] + 1 } else { prev[j + 1].max(curr[j]) };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn edit_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Blended similarity of two already-normalized strings, in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let ac: Vec<char> = a.chars().collect();
    let bc: Vec<char> = b.chars().collect();
    let lcs = if ac.is_empty() || bc.is_empty() {
        0.0
    } else {
        lcs_len(&ac, &bc) as f64 / ac.len().max(bc.len()) as f64
    };
    let tokens = |s: &str| s.split_whitespace().map(str::to_string).collect::<HashSet<_>>();

    W_LEV * edit_similarity(a, b)
        + W_LCS * lcs
        + W_SKELETON * edit_similarity(&skeleton(a), &skeleton(b))
        + W_TOKENS * jaccard(&tokens(a), &tokens(b))
        + W_TRIGRAMS * jaccard(&trigrams(a), &trigrams(b))
}

// ── Matcher ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyLabelMatcher {
    pub default_threshold: f64,
    /// Applies to totals-region fee/tax rows with an amount on the right.
    pub relaxed_threshold: f64,
}

impl Default for FuzzyLabelMatcher {
    fn default() -> Self {
        Self { default_threshold: 0.85, relaxed_threshold: 0.60 }
    }
}

fn candidates(role: Option<LabelRole>) -> Vec<&'static CanonicalLabel> {
    let sets: &[&'static [CanonicalLabel]] = match role {
        Some(LabelRole::Total) => &[TOTAL_LABELS],
        Some(LabelRole::Tax) => &[TAX_LABELS],
        Some(LabelRole::FeeOrTax) => &[FEE_LABELS, TAX_LABELS],
        None => &[TOTAL_LABELS, FEE_LABELS, TAX_LABELS],
    };
    sets.iter().copied().flat_map(|s| s.iter()).collect()
}

impl FuzzyLabelMatcher {
    pub fn threshold(&self, ctx: Option<&LabelContext>) -> f64 {
        match ctx {
            Some(c)
                if c.region == RowKind::Totals
                    && c.has_amount_on_right
                    && c.role == Some(LabelRole::FeeOrTax) =>
            {
                self.relaxed_threshold
            }
            _ => self.default_threshold,
        }
    }

    /// Highest-scoring candidate regardless of threshold; earlier candidates win ties.
    pub fn best_match(&self, text: &str, ctx: Option<&LabelContext>) -> Option<LabelMatch> {
        let norm = normalize_for_match(text);
        let mut best: Option<LabelMatch> = None;
        for canonical in candidates(ctx.and_then(|c| c.role)) {
            for spelling in std::iter::once(&canonical.label).chain(canonical.aliases) {
                let score = similarity(&norm, &normalize_for_match(spelling));
                if score > best.as_ref().map_or(0.0, |b| b.score) {
                    best = Some(LabelMatch { label: canonical.label, matched: *spelling, score });
                }
            }
        }
        best
    }

    pub fn match_label(&self, text: &str, ctx: Option<&LabelContext>) -> Option<LabelMatch> {
        let threshold = self.threshold(ctx);
        let best = self.best_match(text, ctx)?;
        tracing::debug!(
            text,
            candidate = best.matched,
            score = best.score,
            threshold,
            "fuzzy label match"
        );
        (best.score >= threshold).then_some(best)
    }
}
