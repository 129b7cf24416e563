use serde::Serialize;

use crate::text::{edit_distance_one, normalize_name};
use crate::types::TextBlock;

/// Top share of the content height treated as the header band.
const HEADER_FRACTION: f64 = 0.25;
/// Blocks above this share of the distance down to the store-name row are dropped.
const ABOVE_STORE_KEEP: f64 = 0.8;
const SIDE_PADDING: f64 = 0.2;
const MIN_PADDING: f64 = 0.02;
const MIN_LEFT: f64 = 0.01;
const MAX_RIGHT: f64 = 0.99;

const GROCERY_NAMES: &[&str] = &[
    "walmart", "costco", "target", "kroger", "safeway", "trader joe's", "trader joes",
    "whole foods", "whole foods market", "publix", "albertsons", "heb", "meijer", "sams club",
    "sam's club", "cvs", "walgreens", "food lion", "hannaford", "giant", "giant eagle",
    "stop & shop", "ralphs", "fred meyer", "king soopers", "smith's", "fry's", "vons",
    "pavilions", "acme", "jewel-osco", "loblaws", "sobeys", "metro", "iga", "t&t", "tnt",
    "99 ranch market", "ranch 99", "h mart", "hmart", "mitsuwa", "wegmans", "aldi", "lidl",
    "save mart", "food 4 less", "winco", "sprouts", "pick n save", "mariano's",
    "harris teeter", "piggly wiggly", "hy-vee", "market basket", "shoprite", "price chopper",
    "weis", "cub foods", "food city", "stater bros", "gelson's", "bristol farms",
    "grocery outlet", "smart & final", "northgate market", "vallarta", "super king",
    "zion market", "great wall", "longo's", "freshco", "no frills",
    "real canadian superstore", "superstore", "zehrs", "fortinos", "provigo", "maxi",
    "save-on-foods", "thrifty foods", "city market", "amazon fresh", "fresh thyme",
    "natural grocers",
];

const PROMO_WORDS: &[&str] = &[
    "download", "join now", "offer", "earn", "rewards", "enjoy ", "grocery delivery", "app",
    "online",
];

/// Whole-word containment on normalized (single-space separated) names.
fn contains_words(haystack: &str, needle: &str) -> bool {
    format!(" {haystack} ").contains(&format!(" {needle} "))
}

fn x_extent(
    blocks: &[&TextBlock],
    keep: impl Fn(&TextBlock) -> bool,
    pick: fn(f64, f64) -> f64,
) -> Option<f64> {
    blocks
        .iter()
        .filter(|b| keep(**b))
        .map(|b| b.center_x)
        .reduce(pick)
}

/// Diagnostic view of the estimated receipt body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BodyBounds {
    pub left: f64,
    pub right: f64,
    pub y_keep_min: f64,
    pub header_y_cutoff: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub store_center_x: f64,
    pub store_name_y: Option<f64>,
}

impl BodyBounds {
    pub fn contains(&self, b: &TextBlock) -> bool {
        b.center_y >= self.y_keep_min && (self.left..=self.right).contains(&b.center_x)
    }
}

/// Bounds are relative to the content span, never to the photo frame.
pub struct BodyDetector {
    names: Vec<String>,
}

impl Default for BodyDetector {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}

impl BodyDetector {
    /// Built-in retailer names plus `extra` (store identification names).
    pub fn new<S: AsRef<str>>(extra: impl IntoIterator<Item = S>) -> Self {
        let names = GROCERY_NAMES
            .iter()
            .copied()
            .map(normalize_name)
            .chain(extra.into_iter().map(|s| normalize_name(s.as_ref())))
            .filter(|n| n.chars().count() >= 3)
            .collect();
        Self { names }
    }

    pub fn is_store_name(&self, text: &str) -> bool {
        if text.trim().chars().count() < 3 {
            return false;
        }
        let lowered = text.to_lowercase();
        if PROMO_WORDS.iter().any(|w| lowered.contains(w)) {
            return false;
        }
        let t = normalize_name(text);
        if t.is_empty() {
            return false;
        }
        self.names
            .iter()
            .any(|n| contains_words(&t, n) || contains_words(n, &t) || edit_distance_one(&t, n))
    }

    pub fn bounds(&self, blocks: &[TextBlock]) -> Option<BodyBounds> {
        let (y_min, y_max) = blocks.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), b| {
            (lo.min(b.center_y), hi.max(b.center_y))
        });
        if !y_min.is_finite() {
            return None;
        }
        let header_y_cutoff = y_min + HEADER_FRACTION * (y_max - y_min);
        let header: Vec<&TextBlock> = blocks.iter().filter(|b| b.center_y < header_y_cutoff).collect();
        let header: Vec<&TextBlock> = if header.is_empty() {
            blocks.iter().take((blocks.len() / 5).max(1)).collect()
        } else {
            header
        };
        let store_center_x = header.iter().map(|b| b.center_x).sum::<f64>() / header.len() as f64;

        let mut by_y: Vec<&TextBlock> = blocks.iter().filter(|b| !b.is_amount()).collect();
        by_y.sort_by(|a, b| a.center_y.total_cmp(&b.center_y));
        let store_name_y = by_y
            .into_iter()
            .find(|b| self.is_store_name(&b.text))
            .map(|b| {
                tracing::info!(y = b.center_y, text = %b.text, "store name row");
                b.center_y
            });
        let y_keep_min = match store_name_y {
            Some(y) => y_min + ABOVE_STORE_KEEP * (y - y_min),
            None => y_min,
        };

        let body: Vec<&TextBlock> = blocks.iter().filter(|b| b.center_y >= y_keep_min).collect();
        let body = if body.is_empty() { blocks.iter().collect() } else { body };
        let right = x_extent(&body, TextBlock::is_amount, f64::max)
            .or_else(|| x_extent(&body, |_| true, f64::max))
            .unwrap_or(MAX_RIGHT);
        let left = x_extent(&body, |b| !b.is_amount(), f64::min)
            .or_else(|| x_extent(&body, |_| true, f64::min))
            .unwrap_or(MIN_LEFT);
        let span = right - left;
        let padding = if span > 0.0 { SIDE_PADDING * span } else { MIN_PADDING };

        Some(BodyBounds {
            left: (left - padding).max(MIN_LEFT),
            right: (right + padding).min(MAX_RIGHT),
            y_keep_min,
            header_y_cutoff,
            y_min,
            y_max,
            store_center_x,
            store_name_y,
        })
    }

    /// Drops blocks outside the estimated body; returns the kept blocks and the bounds used.
    pub fn filter(&self, blocks: Vec<TextBlock>) -> (Vec<TextBlock>, Option<BodyBounds>) {
        let Some(bounds) = self.bounds(&blocks) else {
            return (blocks, None);
        };
        let before = blocks.len();
        let kept: Vec<TextBlock> = blocks.into_iter().filter(|b| bounds.contains(b)).collect();
        tracing::info!(
            kept = kept.len(),
            dropped = before - kept.len(),
            left = bounds.left,
            right = bounds.right,
            y_keep_min = bounds.y_keep_min,
            "receipt body filter"
        );
        (kept, Some(bounds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{amount, word};

    #[test]
    fn store_names_match_with_one_edit() {
        let d = BodyDetector::default();
        assert!(d.is_store_name("SAFEWAY"));
        assert!(d.is_store_name("SAFEWY"));
        assert!(d.is_store_name("T&T Supermarket"));
        assert!(!d.is_store_name("Download our app"));
        assert!(!d.is_store_name("BREAD"));
        assert!(!d.is_store_name("ab"));
    }

    #[test]
    fn store_names_match_whole_words_only() {
        let d = BodyDetector::default();
        assert!(d.is_store_name("H MART"));
        assert!(d.is_store_name("H Mart Koreatown"));
        assert!(d.is_store_name("HMART"));
        assert!(!d.is_store_name("FRESH MART"));
        assert!(!d.is_store_name("Metropolitan Diner"));
        assert!(d.is_store_name("METRO"));
    }

    #[test]
    fn configured_names_join_the_set() {
        let d = BodyDetector::new(["Fresh Mart"]);
        assert!(d.is_store_name("FRESH MART"));
        assert!(!BodyDetector::default().is_store_name("FRESH MART"));
    }

    #[test]
    fn drops_text_above_store_name_and_outside_columns() {
        let blocks = vec![
            word(0, "Scan to earn", 0.5, 0.02),
            word(1, "SAFEWAY", 0.5, 0.12),
            word(2, "MILK", 0.3, 0.30),
            amount(3, "4.99", 0.7, 0.30),
            word(4, "BREAD", 0.3, 0.40),
            amount(5, "3.50", 0.7, 0.40),
            word(6, "vertical noise", 0.98, 0.35),
        ];
        let (kept, bounds) = BodyDetector::default().filter(blocks);
        let bounds = bounds.unwrap();
        // 0.02 + 0.8 * (0.12 - 0.02)
        assert!((bounds.y_keep_min - 0.10).abs() < 1e-9);
        assert!((bounds.left - 0.22).abs() < 1e-9);
        assert!((bounds.right - 0.78).abs() < 1e-9);
        let texts: Vec<&str> = kept.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["SAFEWAY", "MILK", "4.99", "BREAD", "3.50"]);
    }

    #[test]
    fn without_store_name_nothing_is_dropped_vertically() {
        let blocks = vec![
            word(0, "FRESH MART", 0.5, 0.05),
            word(1, "MILK 2L", 0.25, 0.20),
            amount(2, "4.99", 0.85, 0.20),
        ];
        let (kept, bounds) = BodyDetector::default().filter(blocks);
        assert_eq!(kept.len(), 3);
        assert_eq!(bounds.unwrap().store_name_y, None);
    }

    #[test]
    fn caption_above_an_unknown_store_is_kept() {
        let blocks = vec![
            word(0, "Kitchen table", 0.5, 0.02),
            word(1, "FRESH MART", 0.5, 0.10),
            word(2, "MILK 2L", 0.25, 0.20),
            amount(3, "4.99", 0.85, 0.20),
        ];
        let (kept, bounds) = BodyDetector::default().filter(blocks);
        let bounds = bounds.unwrap();
        assert_eq!(bounds.store_name_y, None);
        assert!((bounds.y_keep_min - 0.02).abs() < 1e-9);
        assert_eq!(kept.len(), 4);
    }

    #[test]
    fn empty_input_has_no_bounds() {
        let (kept, bounds) = BodyDetector::default().filter(vec![]);
        assert!(kept.is_empty());
        assert!(bounds.is_none());
    }
}
