//! Span overlap measure.

use riscan_core::{RiError, Span};

/// Overlap ratio `|a ∩ b| / min(|a|, |b|)`, in `[0, 1]`.
///
/// Symmetric. A span fully inside another scores `1.0`; disjoint or
/// touching spans score `0.0`.
///
/// # Examples
///
/// ```
/// use riscan_core::Span;
/// use riscan_dedup::overlap;
///
/// let a = Span { start: 0, end: 10 };
/// let b = Span { start: 5, end: 25 };
/// assert_eq!(overlap(&a, &b), 0.5);
/// assert_eq!(overlap(&b, &a), 0.5);
/// assert_eq!(overlap(&a, &Span { start: 10, end: 12 }), 0.0);
/// ```
pub fn overlap(a: &Span, b: &Span) -> f64 {
    let shorter = a.len().min(b.len());
    if shorter == 0 {
        return 0.0;
    }
    a.intersection_len(b) as f64 / shorter as f64
}

/// `true` if `a` and `b` intersect and their overlap reaches `threshold`.
///
/// # Examples
///
/// ```
/// use riscan_core::Span;
/// use riscan_dedup::connects;
///
/// let a = Span { start: 0, end: 10 };
/// assert!(connects(&a, &Span { start: 5, end: 15 }, 0.5));
/// assert!(!connects(&a, &Span { start: 6, end: 16 }, 0.5));
/// // Threshold zero still needs a shared character.
/// assert!(!connects(&a, &Span { start: 10, end: 20 }, 0.0));
/// ```
pub fn connects(a: &Span, b: &Span, threshold: f64) -> bool {
    a.intersection_len(b) > 0 && overlap(a, b) >= threshold
}

/// Reject thresholds outside `[0, 1]`.
pub(crate) fn validate_threshold(threshold: f64) -> Result<(), RiError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(RiError::InvalidParameter(format!(
            "overlap threshold must be within [0, 1], got {threshold}"
        )));
    }
    Ok(())
}
