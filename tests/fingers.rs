//! Counts fingers of synthetic hands through the public API only.

use fingercount::{
    count::FrameCount,
    hand::{
        fingers::{classify, Finger, FingerStates},
        landmark::{HandLandmarks, Handedness, LandmarkIdx, NUM_LANDMARKS},
    },
    perception::HandDetection,
};

/// Builds an upright hand whose wrist is at the bottom of the frame.
///
/// Every finger is a vertical chain of 4 landmarks starting at its base. Raised fingers extend
/// upwards, folded fingers curl back down so that the tip ends up below the PIP joint. The thumb
/// sits left of the palm, and extends further left when raised.
fn hand(raised: [bool; 5]) -> HandLandmarks {
    let mut positions = [[0.0; 3]; NUM_LANDMARKS];
    positions[0] = [0.5, 0.9, 0.0];

    let thumb_x = if raised[0] {
        [0.42, 0.37, 0.33, 0.28]
    } else {
        [0.42, 0.39, 0.37, 0.41]
    };
    for (i, x) in thumb_x.into_iter().enumerate() {
        positions[1 + i] = [x, 0.8 - 0.04 * i as f32, 0.0];
    }

    for (finger, &up) in raised.iter().enumerate().skip(1) {
        let x = 0.38 + 0.08 * finger as f32;
        let ys = if up {
            [0.6, 0.5, 0.42, 0.35]
        } else {
            [0.6, 0.55, 0.6, 0.62]
        };
        for (joint, y) in ys.into_iter().enumerate() {
            positions[1 + 4 * finger + joint] = [x, y, 0.0];
        }
    }

    HandLandmarks::new(positions)
}

#[test]
fn classify_open_hand_and_fist() {
    let open = classify(&hand([true; 5]), Handedness::Right);
    assert_eq!(open.count(), 5);
    assert_eq!(open.to_array(), [true; 5]);

    let fist = classify(&hand([false; 5]), Handedness::Right);
    assert_eq!(fist.count(), 0);
    assert_eq!(fist.to_string(), "[0,0,0,0,0]");
}

#[test]
fn thumb_direction_depends_on_handedness() {
    let landmarks = hand([true, false, false, false, false]);
    assert!(classify(&landmarks, Handedness::Right).is_raised(Finger::Thumb));
    assert!(!classify(&landmarks, Handedness::Left).is_raised(Finger::Thumb));

    let mirrored = landmarks.flip_horizontal();
    assert!(classify(&mirrored, Handedness::Left).is_raised(Finger::Thumb));
}

#[test]
fn tip_level_with_pip_is_folded() {
    let [x, y, z] = hand([true; 5]).position(LandmarkIdx::RingFingerPip);
    let landmarks = hand([true; 5]).with_position(LandmarkIdx::RingFingerTip, [x, y, z]);
    let states = classify(&landmarks, Handedness::Right);
    assert!(!states.is_raised(Finger::Ring));
    assert_eq!(states.count(), 4);
}

#[test]
fn frame_total_sums_all_hands() {
    let detections = [
        HandDetection::new(
            hand([false, true, true, true, false]),
            Handedness::Right,
            0.95,
        ),
        HandDetection::new(
            hand([true, true, false, false, false]),
            Handedness::Right,
            0.9,
        ),
    ];
    let count = FrameCount::from_detections(&detections);
    assert_eq!(count.total(), 5);
    assert_eq!(
        count
            .hands()
            .iter()
            .map(|hand| hand.fingers)
            .collect::<Vec<_>>(),
        [
            FingerStates::from_array([false, true, true, true, false]),
            FingerStates::from_array([true, true, false, false, false]),
        ]
    );

    assert_eq!(FrameCount::from_detections(&[]).total(), 0);
}

#[test]
fn untrusted_landmarks_are_validated() {
    let err = HandLandmarks::from_positions(&[[0.5, 0.5, 0.0]; 20]).unwrap_err();
    assert_eq!(err.found(), 20);
    assert_eq!(err.to_string(), "expected 21 hand landmarks, got 20");

    let positions = *hand([true; 5]).positions();
    let landmarks = HandLandmarks::from_positions(&positions).unwrap();
    assert_eq!(classify(&landmarks, Handedness::Right).count(), 5);
}
