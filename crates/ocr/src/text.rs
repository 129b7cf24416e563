/// Levenshtein edit distance using the two-row O(min(m,n)) space algorithm, over chars.
pub fn levenshtein(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    let (m, n) = (a.len(), b.len());

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let (a, b, m, n) = if m <= n { (a, b, m, n) } else { (b, a, n, m) };

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// True when `a` and `b` differ by exactly one insert, delete or substitution.
pub fn edit_distance_one(a: &str, b: &str) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a == b || a.len().abs_diff(b.len()) > 1 {
        return false;
    }
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    let i = short.iter().zip(long.iter()).take_while(|(x, y)| x == y).count();
    if i == short.len() {
        return long.len() == short.len() + 1;
    }
    if short.len() == long.len() {
        short[i + 1..] == long[i + 1..]
    } else {
        short[i..] == long[i + 1..]
    }
}

/// Equal, or one edit apart.
pub fn within_one_edit(a: &str, b: &str) -> bool {
    a == b || edit_distance_one(a, b)
}

// ── Marker matching ───────────────────────────────────────────────────────────

/// Uppercases and drops `.`, whitespace, `-` and `_` so `SUB-TOTAL` and `S U B T O T A L` collapse.
pub fn marker_normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '.' | '-' | '_') && !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

fn fold_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '0' => 'O',
            '5' | '$' => 'S',
            other => other,
        })
        .collect()
}

/// Marker containment tolerant of spacing, punctuation and `0/O`, `5/S`, `$/S` confusion.
pub fn fuzzy_contains(text: &str, marker: &str) -> bool {
    let needle = fold_digits(&marker_normalize(marker));
    !needle.is_empty() && fold_digits(&marker_normalize(text)).contains(&needle)
}

pub fn fuzzy_contains_any<S: AsRef<str>>(text: &str, markers: &[S]) -> bool {
    markers.iter().any(|m| fuzzy_contains(text, m.as_ref()))
}

// ── Casing ────────────────────────────────────────────────────────────────────

/// At least 80% of the letters are upper-case.
pub fn is_mostly_upper(text: &str) -> bool {
    let (upper, letters) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(u, n), c| (u + usize::from(c.is_uppercase()), n + 1));
    letters > 0 && upper * 5 >= letters * 4
}

/// Lowercase, `&` spelled out, everything but letters and digits folded to single spaces.
pub fn normalize_name(text: &str) -> String {
    let lowered = text.to_lowercase().replace('&', " and ");
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Joins block texts with single spaces, skipping empty ones.
pub fn join_texts<'a>(texts: impl IntoIterator<Item = &'a str>) -> String {
    texts
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_are_zero() {
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("", ""), 0);
    }

    #[test]
    fn empty_string_is_length_of_other() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn counts_chars_not_bytes() {
        assert_eq!(levenshtein("café", "cafe"), 1);
    }

    #[test]
    fn commutative() {
        assert_eq!(levenshtein("environment", "env"), levenshtein("env", "environment"));
    }

    #[test]
    fn one_edit_detection() {
        assert!(edit_distance_one("TERE", "TARE"));
        assert!(edit_distance_one("SAFEWAY", "SAFEWY"));
        assert!(edit_distance_one("COSTCO", "COSTCOS"));
        assert!(!edit_distance_one("TARE", "TARE"));
        assert!(!edit_distance_one("TARE", "TIRES"));
        assert!(within_one_edit("TARE", "TARE"));
    }

    #[test]
    fn marker_containment_survives_ocr_noise() {
        assert!(fuzzy_contains("SUB-TOTAL 8.49", "SUBTOTAL"));
        assert!(fuzzy_contains("S U B T O T A L", "SUB TOTAL"));
        assert!(fuzzy_contains("T0TAL", "TOTAL"));
        assert!(fuzzy_contains("$UBTOTAL", "SUBTOTAL"));
        assert!(!fuzzy_contains("BREAD", "TOTAL"));
        assert!(!fuzzy_contains("anything", ""));
    }

    #[test]
    fn upper_case_ratio() {
        assert!(is_mostly_upper("MILK 2L"));
        assert!(is_mostly_upper("BROCCOLI lb"));
        assert!(!is_mostly_upper("Tare removed"));
        assert!(!is_mostly_upper("2 @ 3.99"));
    }

    #[test]
    fn name_normalization() {
        assert_eq!(normalize_name("T&T Supermarket!"), "t and t supermarket");
        assert_eq!(normalize_name("  Whole-Foods  "), "whole foods");
    }
}
