//! Per-frame finger counting and the counting overlay.

use crate::{
    hand::{
        fingers::{self, FingerStates},
        landmark::{HandLandmarks, Handedness, LandmarkIdx, CONNECTIVITY},
    },
    image::{draw, Color, Image},
    perception::HandDetection,
};

/// The classified fingers of one hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandCount {
    pub handedness: Handedness,
    pub fingers: FingerStates,
}

/// Finger counts of all hands in a frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameCount {
    hands: Vec<HandCount>,
}

impl FrameCount {
    /// Classifies the fingers of every hand in a frame.
    pub fn new<'a, I>(hands: I) -> Self
    where
        I: IntoIterator<Item = (&'a HandLandmarks, Handedness)>,
    {
        Self::with_classifier(hands, fingers::classify)
    }

    /// Counts the fingers of the hands found by a [`HandPerception`].
    ///
    /// [`HandPerception`]: crate::perception::HandPerception
    pub fn from_detections(detections: &[HandDetection]) -> Self {
        Self::new(
            detections
                .iter()
                .map(|det| (det.landmarks(), det.handedness())),
        )
    }

    /// Like [`FrameCount::new`], but with a custom classifier.
    pub fn with_classifier<'a, I, F>(hands: I, mut classify: F) -> Self
    where
        I: IntoIterator<Item = (&'a HandLandmarks, Handedness)>,
        F: FnMut(&HandLandmarks, Handedness) -> FingerStates,
    {
        let hands = hands
            .into_iter()
            .map(|(landmarks, handedness)| HandCount {
                handedness,
                fingers: classify(landmarks, handedness),
            })
            .collect();
        Self { hands }
    }

    /// Returns the results of the individual hands, in detection order.
    pub fn hands(&self) -> &[HandCount] {
        &self.hands
    }

    /// Returns the number of raised fingers over all hands.
    pub fn total(&self) -> u32 {
        self.hands.iter().map(|hand| hand.fingers.count()).sum()
    }

    /// Draws the hand skeletons, the state of every finger and the total count onto `image`.
    ///
    /// `detections` must be the hands this count was computed from, in the same order.
    pub fn draw(&self, image: &mut Image, detections: &[HandDetection]) {
        debug_assert_eq!(self.hands.len(), detections.len());

        let (width, height) = (image.width() as f32, image.height() as f32);
        let px = |landmarks: &HandLandmarks, idx: LandmarkIdx| {
            let [x, y, _] = landmarks.position(idx);
            ((x * width).round() as i32, (y * height).round() as i32)
        };

        for (hand, det) in self.hands.iter().zip(detections) {
            let landmarks = det.landmarks();
            for &(a, b) in CONNECTIVITY {
                let (ax, ay) = px(landmarks, a);
                let (bx, by) = px(landmarks, b);
                draw::line(image, ax, ay, bx, by)
                    .color(Color::WHITE)
                    .stroke_width(2);
            }
            for &[x, y, _] in landmarks.positions() {
                draw::marker(image, (x * width).round() as i32, (y * height).round() as i32)
                    .color(Color::RED);
            }

            for (finger, raised) in hand.fingers.iter() {
                let (x, y) = px(landmarks, finger.tip());
                let color = if raised { Color::GREEN } else { Color::RED };
                draw::circle(image, x, y, 11).filled().color(color);
            }

            let (x, y) = px(landmarks, LandmarkIdx::Wrist);
            draw::text(
                image,
                x,
                y + 8,
                &format!("{} {}", hand.handedness.short_label(), hand.fingers.count()),
            )
            .align_top()
            .color(Color::YELLOW);
        }

        draw::text(image, 10, 50, &format!("Total Fingers: {}", self.total()))
            .large()
            .align_left()
            .align_bottom()
            .color(Color::BLUE);
    }
}
