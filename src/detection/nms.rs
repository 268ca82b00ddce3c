//! Non-Maximum Suppression and Averaging.
//!
//! Single-Shot MultiBox Detectors (SSD) like the palm detector produce many overlapping detections
//! for a single object. Non-Maximum Suppression (NMS) filters these duplicates out, leaving one
//! detection per object.
//!
//! Two variants are implemented, selected with [`SuppressionMode`]: classic NMS removes every
//! overlapping detection with lower confidence ([`SuppressionMode::Remove`]), while Non-Maximum
//! Averaging ([`SuppressionMode::Average`]) replaces a group of overlapping detections with their
//! confidence-weighted average. Averaging is the default, since it gives steadier results.

use crate::{image::Rect, num::TotalF32};

use super::{Detection, Keypoint};

/// A non-maximum suppression algorithm.
pub struct NonMaxSuppression {
    iou_thresh: f32,
    mode: SuppressionMode,
}

impl NonMaxSuppression {
    /// The default intersection-over-union threshold used to determine if two detections overlap.
    pub const DEFAULT_IOU_THRESH: f32 = 0.3;

    /// Creates a new non-maximum suppressor using [`SuppressionMode::Average`] and
    /// [`Self::DEFAULT_IOU_THRESH`].
    pub fn new() -> Self {
        Self {
            iou_thresh: Self::DEFAULT_IOU_THRESH,
            mode: SuppressionMode::Average,
        }
    }

    /// Sets the intersection-over-union threshold to consider two detections as overlapping.
    pub fn set_iou_thresh(&mut self, iou_thresh: f32) {
        self.iou_thresh = iou_thresh;
    }

    pub fn set_mode(&mut self, mode: SuppressionMode) {
        self.mode = mode;
    }

    /// Performs non-maximum suppression on `detections`, in place.
    ///
    /// The remaining detections are ordered by descending confidence.
    pub fn process(&self, detections: &mut Vec<Detection>) {
        // Ascending confidence, so the best remaining detection can be popped off the back.
        let mut pending = std::mem::take(detections);
        pending.sort_unstable_by_key(|det| TotalF32(det.confidence));

        while let Some(seed) = pending.pop() {
            let (overlapping, rest): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|other| seed.rect.iou(&other.rect) >= self.iou_thresh);
            pending = rest;

            match self.mode {
                SuppressionMode::Remove => detections.push(seed),
                SuppressionMode::Average => {
                    let confidence = seed.confidence;
                    let mut group = overlapping;
                    group.push(seed);
                    detections.push(average(&group, confidence));
                }
            }
        }
    }
}

impl Default for NonMaxSuppression {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the confidence-weighted average of `group`, which is never empty.
fn average(group: &[Detection], confidence: f32) -> Detection {
    let keypoint_count = group[0].keypoints.len();
    assert!(
        group.iter().all(|det| det.keypoints.len() == keypoint_count),
        "keypoint count must be constant"
    );

    let mut keypoints = vec![Keypoint::new(0.0, 0.0); keypoint_count];
    let [mut x, mut y, mut w, mut h, mut divisor] = [0.0; 5];
    for det in group {
        let factor = det.confidence;
        divisor += factor;
        for (acc, kp) in keypoints.iter_mut().zip(&det.keypoints) {
            acc.x += kp.x * factor;
            acc.y += kp.y * factor;
        }
        x += det.rect.x_center() * factor;
        y += det.rect.y_center() * factor;
        w += det.rect.width() * factor;
        h += det.rect.height() * factor;
    }

    for kp in &mut keypoints {
        kp.x /= divisor;
        kp.y /= divisor;
    }

    Detection::with_keypoints(
        confidence,
        Rect::from_center(x / divisor, y / divisor, w / divisor, h / divisor),
        keypoints,
    )
}

/// Describes how [`NonMaxSuppression`] should deal with overlapping detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SuppressionMode {
    /// Remove overlapping detections, only retain the detection with highest confidence score.
    Remove,

    /// Compute a confidence-weighted average of overlapping detections.
    Average,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nms_suppresses_non_maximum() {
        let mut nms = NonMaxSuppression::new();
        nms.set_mode(SuppressionMode::Remove);

        let rect = Rect::from_center(0.0, 0.0, 1.0, 1.0);
        let mut detections = vec![
            Detection::new(0.55, rect.scale(1.5)),
            Detection::new(0.6, rect),
        ];
        nms.process(&mut detections);
        assert_eq!(detections.len(), 1);

        let d = &detections[0];
        assert_eq!(d.confidence(), 0.6);
        assert_eq!(d.bounding_rect(), rect);
    }

    #[test]
    fn nms_ignores_nonoverlapping() {
        let mut nms = NonMaxSuppression::new();
        nms.set_mode(SuppressionMode::Remove);

        let mut detections = vec![
            Detection::new(0.7, Rect::from_center(0.0, 0.0, 1.0, 1.0)),
            Detection::new(0.9, Rect::from_center(5.0, 0.0, 1.0, 1.0)),
        ];
        nms.process(&mut detections);
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].confidence(), 0.9);
        assert_eq!(detections[1].confidence(), 0.7);
    }

    #[test]
    fn nma_averages_detections() {
        let mut nms = NonMaxSuppression::new();
        nms.set_iou_thresh(0.0);

        let rect = Rect::from_center(-1.0, 3.0, 1.0, 1.0);
        let a = Detection::with_keypoints(1.0, rect, vec![Keypoint::new(0.0, 0.0)]);
        let b = Detection::with_keypoints(0.5, rect.scale(4.0), vec![Keypoint::new(3.0, -6.0)]);
        let mut detections = vec![a, b];
        nms.process(&mut detections);
        assert_eq!(detections.len(), 1);

        let d = &detections[0];
        assert_eq!(d.confidence(), 1.0);
        assert_eq!(d.bounding_rect(), Rect::from_center(-1.0, 3.0, 2.0, 2.0));
        assert_eq!(d.keypoints(), &[Keypoint::new(1.0, -2.0)]);
    }

    #[test]
    fn empty_input() {
        let mut detections = Vec::new();
        NonMaxSuppression::new().process(&mut detections);
        assert!(detections.is_empty());
    }
}
