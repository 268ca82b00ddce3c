//! Common functionality for object detection.
//!
//! [`hand::detection`](crate::hand::detection) builds its palm detector from these parts.

pub mod nms;
pub mod ssd;

use crate::image::Rect;

/// A detected object.
///
/// A [`Detection`] consists of a [`Rect`] enclosing the detected object, a confidence value, and a
/// possibly empty set of located keypoints.
///
/// The confidence value lies between 0.0 and 1.0, which networks achieve by passing their raw
/// output through [`crate::num::sigmoid`]. It is used as the weight when averaging overlapping
/// detections, see [`nms::SuppressionMode::Average`].
#[derive(Debug, Clone)]
pub struct Detection {
    confidence: f32,
    rect: Rect,
    keypoints: Vec<Keypoint>,
}

impl Detection {
    pub fn new(confidence: f32, rect: Rect) -> Self {
        Self::with_keypoints(confidence, rect, Vec::new())
    }

    pub fn with_keypoints(confidence: f32, rect: Rect, keypoints: Vec<Keypoint>) -> Self {
        Self {
            confidence,
            rect,
            keypoints,
        }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Returns the axis-aligned bounding rectangle containing the detected object.
    pub fn bounding_rect(&self) -> Rect {
        self.rect
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    /// Transforms the rectangle and all keypoints from a network's input coordinates to image
    /// coordinates.
    ///
    /// Positions are multiplied by `scale`, then moved by `(x, y)`.
    pub fn map_to_image(&mut self, scale: f32, x: f32, y: f32) {
        let (xc, yc) = self.rect.center();
        self.rect = Rect::from_center(
            xc * scale + x,
            yc * scale + y,
            self.rect.width() * scale,
            self.rect.height() * scale,
        );
        for kp in &mut self.keypoints {
            kp.x = kp.x * scale + x;
            kp.y = kp.y * scale + y;
        }
    }

}

/// A 2D keypoint produced as part of a [`Detection`].
///
/// The meaning of a keypoint depends on the detector and on its index in the keypoint list. The
/// palm detector, for example, locates the wrist and the knuckles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    x: f32,
    y: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }
}
