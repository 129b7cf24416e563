use serde::Serialize;

use crate::types::TextBlock;

/// Spans shorter than this fall back to an absolute comparison.
const MIN_SPAN: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RelativeBounds {
    pub start: f64,
    pub end: f64,
    /// Buffer on either side, as a fraction of the span.
    pub tolerance: f64,
}

impl Default for RelativeBounds {
    fn default() -> Self {
        Self { start: 0.0, end: 1.0, tolerance: 0.1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub within: bool,
    /// 0 at `start`, 1 at `end`; negative above, above 1 below.
    pub fraction: f64,
}

impl RelativeBounds {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end, ..Self::default() }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn degenerate(&self) -> bool {
        (self.end - self.start).abs() < MIN_SPAN
    }

    pub fn fraction(&self, y: f64) -> f64 {
        if self.degenerate() {
            (y - self.start) / MIN_SPAN
        } else {
            (y - self.start) / (self.end - self.start)
        }
    }

    pub fn locate(&self, y: f64) -> Placement {
        if self.end - self.start < MIN_SPAN {
            let within = self.start <= y && y <= self.end;
            let fraction = if within { 0.5 } else { (y - self.start) / MIN_SPAN };
            return Placement { within, fraction };
        }
        let fraction = self.fraction(y);
        Placement {
            within: -self.tolerance <= fraction && fraction <= 1.0 + self.tolerance,
            fraction,
        }
    }

    /// Strictly between the anchors, whichever way round they are.
    pub fn interior(&self, y: f64) -> bool {
        if self.degenerate() {
            let (lo, hi) = (self.start.min(self.end), self.start.max(self.end));
            return lo < y && y < hi;
        }
        let f = self.fraction(y);
        0.0 < f && f < 1.0
    }

    /// Blocks whose center falls inside the buffered window.
    pub fn select(&self, blocks: &[TextBlock]) -> Vec<TextBlock> {
        blocks
            .iter()
            .filter(|b| self.locate(b.center_y).within)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::word;

    #[test]
    fn locate_reports_fraction_and_buffer() {
        let b = RelativeBounds::new(0.2, 0.6);
        let p = b.locate(0.4);
        assert!(p.within);
        assert!((p.fraction - 0.5).abs() < 1e-9);
        // 5% above start is inside the 10% buffer
        assert!(b.locate(0.18).within);
        assert!(!b.locate(0.15).within);
        assert!(b.locate(0.63).within);
        assert!(!b.locate(0.7).within);
    }

    #[test]
    fn tight_span_falls_back_to_absolute() {
        let b = RelativeBounds::new(0.300, 0.305);
        assert!(b.locate(0.302).within);
        assert_eq!(b.locate(0.302).fraction, 0.5);
        assert!(!b.locate(0.31).within);
    }

    #[test]
    fn interior_is_strict_and_order_free() {
        let b = RelativeBounds::new(0.30, 0.38).with_tolerance(0.0);
        assert!(b.interior(0.34));
        assert!(!b.interior(0.30));
        assert!(!b.interior(0.38));
        let flipped = RelativeBounds::new(0.38, 0.30);
        assert!(flipped.interior(0.34));
        assert!(!flipped.interior(0.40));
    }

    #[test]
    fn select_keeps_offset_rows_inside_the_buffer() {
        let blocks: Vec<TextBlock> = [0.15, 0.195, 0.25, 0.305, 0.33, 0.40]
            .iter()
            .enumerate()
            .map(|(i, y)| word(i, "x", 0.3, *y))
            .collect();
        // span 0.20..0.30, buffer 0.01 either side
        let kept: Vec<usize> = RelativeBounds::new(0.20, 0.30)
            .select(&blocks)
            .iter()
            .map(|b| b.id.0)
            .collect();
        assert_eq!(kept, vec![1, 2, 3]);
    }
}
