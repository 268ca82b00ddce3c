//! The boundary between finger counting and hand perception.
//!
//! Everything downstream of perception only depends on the [`HandPerception`] trait: "given a
//! frame, find the hands in it". [`NetworkPerception`] implements it with the palm detection and
//! hand landmark networks, tests implement it with scripted results.

use std::{cmp::Reverse, path::Path};

use itertools::Itertools;

use crate::{
    hand::{
        detection::{hand_roi, PalmDetector},
        landmark::{HandLandmarks, Handedness, Landmarker},
    },
    image::Image,
    num::TotalF32,
    timer::Timer,
};

/// A hand found in a frame.
#[derive(Debug, Clone)]
pub struct HandDetection {
    landmarks: HandLandmarks,
    handedness: Handedness,
    presence: f32,
}

impl HandDetection {
    pub fn new(landmarks: HandLandmarks, handedness: Handedness, presence: f32) -> Self {
        Self {
            landmarks,
            handedness,
            presence,
        }
    }

    /// Returns the 21 landmarks of the hand, normalized to the frame.
    #[inline]
    pub fn landmarks(&self) -> &HandLandmarks {
        &self.landmarks
    }

    #[inline]
    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    /// Returns the confidence (0.0 to 1.0) that this actually is a hand.
    #[inline]
    pub fn presence(&self) -> f32 {
        self.presence
    }
}

/// Finds hands in frames.
pub trait HandPerception {
    /// Returns all hands visible in `image`.
    ///
    /// Finding no hand is not an error, an empty list is returned instead.
    fn detect(&mut self, image: &Image) -> anyhow::Result<Vec<HandDetection>>;

    /// Returns the profiling timers of the individual perception stages.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

impl<P: HandPerception + ?Sized> HandPerception for &mut P {
    fn detect(&mut self, image: &Image) -> anyhow::Result<Vec<HandDetection>> {
        (**self).detect(image)
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}

impl<P: HandPerception + ?Sized> HandPerception for Box<P> {
    fn detect(&mut self, image: &Image) -> anyhow::Result<Vec<HandDetection>> {
        (**self).detect(image)
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}

/// [`HandPerception`] using the MediaPipe palm detection and hand landmark networks.
///
/// Palms are detected in the whole frame, then the landmark network is run on a region around
/// each of the most confident palms.
pub struct NetworkPerception {
    palm_detector: PalmDetector,
    landmarker: Landmarker,
    presence_thresh: f32,
    max_hands: usize,
}

impl NetworkPerception {
    pub const DEFAULT_PRESENCE_THRESHOLD: f32 = 0.7;
    pub const DEFAULT_MAX_HANDS: usize = 2;

    pub fn new(palm_detector: PalmDetector, landmarker: Landmarker) -> Self {
        Self {
            palm_detector,
            landmarker,
            presence_thresh: Self::DEFAULT_PRESENCE_THRESHOLD,
            max_hands: Self::DEFAULT_MAX_HANDS,
        }
    }

    /// Loads both networks from ONNX files.
    pub fn load<P, L>(palm_model: P, landmark_model: L) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
        L: AsRef<Path>,
    {
        Ok(Self::new(
            PalmDetector::load(palm_model)?,
            Landmarker::load(landmark_model)?,
        ))
    }

    /// Sets the minimum palm detection confidence.
    pub fn set_detection_threshold(&mut self, thresh: f32) {
        self.palm_detector.set_threshold(thresh);
    }

    /// Sets the minimum hand presence confidence reported by the landmark network.
    pub fn set_presence_threshold(&mut self, thresh: f32) {
        self.presence_thresh = thresh;
    }

    /// Sets the maximum number of hands reported per frame.
    pub fn set_max_hands(&mut self, max_hands: usize) {
        self.max_hands = max_hands;
    }
}

impl HandPerception for NetworkPerception {
    fn detect(&mut self, image: &Image) -> anyhow::Result<Vec<HandDetection>> {
        let palms = self.palm_detector.detect(image)?;
        log::trace!("{} palm detections", palms.len());

        let mut hands = Vec::new();
        for palm in palms
            .iter()
            .sorted_by_key(|palm| Reverse(TotalF32(palm.confidence())))
            .take(self.max_hands)
        {
            let result = self.landmarker.compute(image, hand_roi(palm))?;
            if result.presence() < self.presence_thresh {
                log::trace!(
                    "dropping hand with presence {:.2} (palm confidence {:.2})",
                    result.presence(),
                    palm.confidence()
                );
                continue;
            }

            hands.push(HandDetection::new(
                *result.landmarks(),
                result.handedness(),
                result.presence(),
            ));
        }

        Ok(hands)
    }

    fn timers(&self) -> Vec<&Timer> {
        self.palm_detector
            .timers()
            .chain(self.landmarker.timers())
            .collect()
    }
}
