//! Finger state classification.
//!
//! Decides for each finger of a hand whether it is raised, using nothing but the positions of its
//! tip and of a joint further down the finger:
//!
//! - The index, middle, ring and pinky fingers are raised when the tip is *above* the joint two
//!   positions below it (the PIP), ie. when its Y coordinate is smaller.
//! - The thumb mostly moves sideways, so it is compared along the X axis against the joint directly
//!   below the tip (the IP). It is raised when the tip points away from the palm, which is to the
//!   right for a left hand and to the left for a right hand.
//!
//! Equal coordinates count as folded.
//!
//! This assumes an upright hand with the palm facing the camera. Rotated hands are classified with
//! the same rules, which may not give useful results.

use std::fmt;

use crate::hand::landmark::{HandLandmarks, Handedness, LandmarkIdx};

/// The five fingers of a hand, in classification order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    /// All fingers, in the order used by [`FingerStates`].
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    /// Returns the landmark on the tip of this finger.
    pub fn tip(self) -> LandmarkIdx {
        match self {
            Finger::Thumb => LandmarkIdx::ThumbTip,
            Finger::Index => LandmarkIdx::IndexFingerTip,
            Finger::Middle => LandmarkIdx::MiddleFingerTip,
            Finger::Ring => LandmarkIdx::RingFingerTip,
            Finger::Pinky => LandmarkIdx::PinkyTip,
        }
    }

    /// Returns the joint the tip is compared against.
    pub fn reference(self) -> LandmarkIdx {
        match self {
            Finger::Thumb => LandmarkIdx::ThumbIp,
            Finger::Index => LandmarkIdx::IndexFingerPip,
            Finger::Middle => LandmarkIdx::MiddleFingerPip,
            Finger::Ring => LandmarkIdx::RingFingerPip,
            Finger::Pinky => LandmarkIdx::PinkyPip,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Finger::Thumb => "thumb",
            Finger::Index => "index",
            Finger::Middle => "middle",
            Finger::Ring => "ring",
            Finger::Pinky => "pinky",
        }
    }
}

/// Raised/folded state of the five fingers of one hand.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FingerStates([bool; 5]);

impl FingerStates {
    /// Creates finger states from booleans in [`Finger::ALL`] order (`true` means raised).
    pub const fn from_array(raised: [bool; 5]) -> Self {
        Self(raised)
    }

    #[inline]
    pub fn is_raised(&self, finger: Finger) -> bool {
        self.0[finger as usize]
    }

    /// Returns the number of raised fingers.
    pub fn count(&self) -> u32 {
        self.0.iter().filter(|&&raised| raised).count() as u32
    }

    /// Iterates over all fingers and their state, thumb first.
    pub fn iter(&self) -> impl Iterator<Item = (Finger, bool)> + '_ {
        Finger::ALL.into_iter().zip(self.0)
    }

    #[inline]
    pub fn to_array(self) -> [bool; 5] {
        self.0
    }
}

impl From<FingerStates> for [bool; 5] {
    fn from(states: FingerStates) -> Self {
        states.0
    }
}

/// Formats the states like `[0,1,0,0,0]`.
impl fmt::Display for FingerStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, raised) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_str(",")?;
            }
            f.write_str(if *raised { "1" } else { "0" })?;
        }
        f.write_str("]")
    }
}

impl fmt::Debug for FingerStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (finger, raised) in self.iter() {
            map.entry(&finger.name(), &raised);
        }
        map.finish()
    }
}

/// Classifies every finger of a hand as raised or folded.
pub fn classify(landmarks: &HandLandmarks, handedness: Handedness) -> FingerStates {
    FingerStates(Finger::ALL.map(|finger| {
        let [tip_x, tip_y, _] = landmarks.position(finger.tip());
        let [ref_x, ref_y, _] = landmarks.position(finger.reference());
        match (finger, handedness) {
            (Finger::Thumb, Handedness::Left) => tip_x > ref_x,
            (Finger::Thumb, Handedness::Right) => tip_x < ref_x,
            _ => tip_y < ref_y,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{hand::landmark::NUM_LANDMARKS, test};

    #[test]
    fn finger_landmarks() {
        for finger in Finger::ALL {
            let (tip, reference) = (finger.tip() as usize, finger.reference() as usize);
            let below = if finger == Finger::Thumb { 1 } else { 2 };
            assert_eq!(reference, tip - below, "{}", finger.name());
        }
        assert_eq!(Finger::ALL.map(|f| f.tip() as usize), [4, 8, 12, 16, 20]);
    }

    #[test]
    fn all_raised_right_hand() {
        let states = classify(&test::open_hand(), Handedness::Right);
        assert_eq!(states.to_array(), [true; 5]);
        assert_eq!(states.count(), 5);
    }

    #[test]
    fn all_folded_right_hand() {
        let states = classify(&test::fist(), Handedness::Right);
        assert_eq!(states.to_array(), [false; 5]);
        assert_eq!(states.count(), 0);
    }

    #[test]
    fn only_index_raised() {
        let states = classify(&test::pointing(), Handedness::Right);
        assert_eq!(states.to_string(), "[0,1,0,0,0]");
        assert_eq!(states.count(), 1);
        assert!(states.is_raised(Finger::Index));
        assert!(!states.is_raised(Finger::Thumb));
    }

    #[test]
    fn thumb_depends_on_handedness() {
        // Tip left of the IP joint.
        let hand = test::fist()
            .with_position(LandmarkIdx::ThumbIp, [0.5, 0.5, 0.0])
            .with_position(LandmarkIdx::ThumbTip, [0.4, 0.5, 0.0]);
        assert!(classify(&hand, Handedness::Right).is_raised(Finger::Thumb));
        assert!(!classify(&hand, Handedness::Left).is_raised(Finger::Thumb));

        // Only the thumb flips.
        let left = classify(&test::open_hand(), Handedness::Left);
        let right = classify(&test::open_hand(), Handedness::Right);
        for finger in &Finger::ALL[1..] {
            assert_eq!(left.is_raised(*finger), right.is_raised(*finger));
        }
        assert_ne!(left.is_raised(Finger::Thumb), right.is_raised(Finger::Thumb));
    }

    #[test]
    fn ties_are_folded() {
        let mut hand = test::open_hand();
        for finger in Finger::ALL {
            let reference = hand.position(finger.reference());
            hand = hand.with_position(finger.tip(), reference);
        }
        assert_eq!(classify(&hand, Handedness::Left).to_array(), [false; 5]);
        assert_eq!(classify(&hand, Handedness::Right).to_array(), [false; 5]);
    }

    #[test]
    fn display_and_debug() {
        let states = FingerStates::from_array([true, false, true, false, false]);
        assert_eq!(states.to_string(), "[1,0,1,0,0]");
        assert_eq!(
            format!("{states:?}"),
            r#"{"thumb": true, "index": false, "middle": true, "ring": false, "pinky": false}"#
        );
        assert_eq!(<[bool; 5]>::from(states), states.to_array());
        assert_eq!(
            states.iter().filter(|(_, raised)| *raised).map(|(f, _)| f).collect::<Vec<_>>(),
            [Finger::Thumb, Finger::Middle]
        );
    }

    fn random_hand(rng: &mut fastrand::Rng) -> HandLandmarks {
        let mut positions = [[0.0; 3]; NUM_LANDMARKS];
        for pos in &mut positions {
            // Coarse grid, so that ties actually happen.
            *pos = [
                rng.u8(0..=10) as f32 / 10.0,
                rng.u8(0..=10) as f32 / 10.0,
                rng.f32() - 0.5,
            ];
        }
        HandLandmarks::new(positions)
    }

    #[test]
    fn random_hands() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        for _ in 0..1000 {
            let hand = random_hand(&mut rng);
            let handedness = if rng.bool() {
                Handedness::Left
            } else {
                Handedness::Right
            };

            let states = classify(&hand, handedness);
            assert_eq!(states, classify(&hand, handedness), "not deterministic");
            assert_eq!(states.count() as usize, states.iter().filter(|s| s.1).count());
            assert!(states.count() <= 5);

            let [tip_x, ..] = hand.position(LandmarkIdx::ThumbTip);
            let [ref_x, ..] = hand.position(LandmarkIdx::ThumbIp);
            let swapped = classify(&hand, handedness.flipped());
            if tip_x == ref_x {
                assert!(!states.is_raised(Finger::Thumb));
                assert!(!swapped.is_raised(Finger::Thumb));
            } else {
                assert_ne!(states.is_raised(Finger::Thumb), swapped.is_raised(Finger::Thumb));
            }

            // Mirroring the frame turns a left hand into a right hand and vice versa.
            assert_eq!(
                classify(&hand.flip_horizontal(), handedness.flipped()),
                states
            );
        }
    }
}
