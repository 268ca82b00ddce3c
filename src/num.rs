//! Utilities for numerics.

use std::cmp::Ordering;

/// Applies the standard sigmoid/logistic function to the input.
pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// An [`f32`] wrapper that implements [`Ord`] using [`f32::total_cmp`].
///
/// Useful for sorting detections by confidence.
#[derive(Debug, Clone, Copy)]
pub struct TotalF32(pub f32);

impl PartialEq for TotalF32 {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TotalF32 {}

impl PartialOrd for TotalF32 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TotalF32 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_range() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn total_order() {
        let mut v = vec![TotalF32(0.5), TotalF32(-1.0), TotalF32(2.0)];
        v.sort();
        assert_eq!(v.iter().map(|f| f.0).collect::<Vec<_>>(), [-1.0, 0.5, 2.0]);
        assert!(TotalF32(f32::NAN) > TotalF32(f32::INFINITY));
    }
}
