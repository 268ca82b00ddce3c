//! Hand landmarks and landmark prediction.

use std::{error::Error, fmt, path::Path};

use nalgebra::{Point2, Rotation2, Vector2};

use crate::{
    image::{Image, Resolution, RotatedRect},
    nn::{Cnn, ColorMapper, NeuralNetwork, Outputs},
    timer::Timer,
};

/// The number of landmarks of a single hand.
pub const NUM_LANDMARKS: usize = 21;

/// The 21 landmarks of one hand.
///
/// Positions are `[x, y, z]`. X and Y are normalized to the frame the hand was found in (0.0 to
/// 1.0, origin at the top left, Y pointing down). Z is the relative depth with the wrist as the
/// origin; smaller values are closer to the camera.
#[derive(Clone, Copy, PartialEq)]
pub struct HandLandmarks {
    positions: [[f32; 3]; NUM_LANDMARKS],
}

impl HandLandmarks {
    pub fn new(positions: [[f32; 3]; NUM_LANDMARKS]) -> Self {
        Self { positions }
    }

    /// Creates a landmark set from untrusted position data.
    ///
    /// Returns an error unless `positions` contains exactly [`NUM_LANDMARKS`] entries.
    pub fn from_positions(positions: &[[f32; 3]]) -> Result<Self, LandmarkCountError> {
        let positions = positions.try_into().map_err(|_| LandmarkCountError {
            found: positions.len(),
        })?;
        Ok(Self { positions })
    }

    /// Returns the position of a landmark.
    #[inline]
    pub fn position(&self, idx: LandmarkIdx) -> [f32; 3] {
        self.positions[idx as usize]
    }

    #[inline]
    pub fn positions(&self) -> &[[f32; 3]; NUM_LANDMARKS] {
        &self.positions
    }

    /// Returns a copy of `self` with the position of one landmark replaced.
    #[must_use]
    pub fn with_position(mut self, idx: LandmarkIdx, position: [f32; 3]) -> Self {
        self.positions[idx as usize] = position;
        self
    }

    /// Mirrors the landmarks along the vertical center line of the frame.
    ///
    /// A left hand turns into a right hand in the process.
    #[must_use]
    pub fn flip_horizontal(&self) -> Self {
        Self {
            positions: self.positions.map(|[x, y, z]| [1.0 - x, y, z]),
        }
    }

    /// Computes the clockwise rotation of the palm compared to an upright position.
    ///
    /// A rotation of 0° means that the fingers point upwards.
    ///
    /// Landmarks are normalized to the frame, so this is only exact for square frames.
    pub fn rotation_radians(&self) -> f32 {
        let [x, y, _] = self.position(LandmarkIdx::MiddleFingerMcp);
        let finger = Point2::new(x, y);
        let [x, y, _] = self.position(LandmarkIdx::Wrist);
        let wrist = Point2::new(x, y);

        let rel = wrist - finger;
        Rotation2::rotation_between(&Vector2::y(), &rel).angle()
    }
}

impl fmt::Debug for HandLandmarks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.positions.iter()).finish()
    }
}

/// Error returned by [`HandLandmarks::from_positions`] when given the wrong number of landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandmarkCountError {
    found: usize,
}

impl LandmarkCountError {
    /// Returns the number of landmarks that was passed in.
    pub fn found(&self) -> usize {
        self.found
    }
}

impl fmt::Display for LandmarkCountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {} hand landmarks, got {}",
            NUM_LANDMARKS, self.found
        )
    }
}

impl Error for LandmarkCountError {}

/// Chirality of a hand, as it appears in the (mirrored) frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// Returns the opposite chirality.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// Returns a one-letter label (`L` or `R`).
    pub fn short_label(self) -> &'static str {
        match self {
            Self::Left => "L",
            Self::Right => "R",
        }
    }
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "Left",
            Self::Right => "Right",
        })
    }
}

/// Names for the hand landmarks, in the order the landmark network outputs them.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// The thumb has no PIP or DIP, its joint below the tip is the **IP** (Interphalangeal joint).
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LandmarkIdx {
    Wrist = 0,
    ThumbCmc = 1,
    ThumbMcp = 2,
    ThumbIp = 3,
    ThumbTip = 4,
    IndexFingerMcp = 5,
    IndexFingerPip = 6,
    IndexFingerDip = 7,
    IndexFingerTip = 8,
    MiddleFingerMcp = 9,
    MiddleFingerPip = 10,
    MiddleFingerDip = 11,
    MiddleFingerTip = 12,
    RingFingerMcp = 13,
    RingFingerPip = 14,
    RingFingerDip = 15,
    RingFingerTip = 16,
    PinkyMcp = 17,
    PinkyPip = 18,
    PinkyDip = 19,
    PinkyTip = 20,
}

/// Pairs of landmarks that are connected by bones, for drawing the hand skeleton.
pub(crate) const CONNECTIVITY: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Palm
        (Wrist, ThumbCmc),
        (ThumbCmc, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (PinkyMcp, Wrist),
        // Fingers
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

/// Output of the [`Landmarker`] for one hand region.
#[derive(Debug, Clone)]
pub struct LandmarkResult {
    landmarks: HandLandmarks,
    presence: f32,
    raw_handedness: f32,
}

impl LandmarkResult {
    /// Returns the landmarks, normalized to the frame passed to [`Landmarker::compute`].
    #[inline]
    pub fn landmarks(&self) -> &HandLandmarks {
        &self.landmarks
    }

    /// Returns the network's confidence that the region actually contains a hand.
    #[inline]
    pub fn presence(&self) -> f32 {
        self.presence
    }

    /// Returns the estimated chirality of the hand.
    ///
    /// The network expects a mirrored (selfie-view) image; on a mirrored frame the result names the
    /// hand of the person in front of the camera.
    pub fn handedness(&self) -> Handedness {
        if self.raw_handedness > 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }
}

/// Estimates hand landmarks inside a region of a frame.
///
/// Runs the MediaPipe hand landmark network (224x224 input). Outputs are expected in this order:
/// screen landmarks `[1, 63]`, hand presence `[1, 1]`, handedness `[1, 1]`. Further outputs (the
/// world-space landmarks) are ignored.
pub struct Landmarker {
    cnn: Cnn,
    t_infer: Timer,
}

impl Landmarker {
    /// Factor by which a palm's bounding box is enlarged to cover the whole hand.
    pub const ROI_SCALE: f32 = 2.6;

    pub fn new(nn: NeuralNetwork) -> anyhow::Result<Self> {
        Ok(Self {
            cnn: Cnn::new(nn, ColorMapper::linear(0.0..=1.0))?,
            t_infer: Timer::new("landmarks"),
        })
    }

    /// Loads the landmark network from an ONNX file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::new(NeuralNetwork::from_path(path)?)
    }

    /// Estimates the landmarks of the hand inside `roi` (in pixel coordinates of `image`).
    ///
    /// The network sees `roi` upright, and the landmarks are rotated back into the frame. Parts of
    /// `roi` outside of `image` are treated as black.
    pub fn compute(&mut self, image: &Image, roi: RotatedRect) -> anyhow::Result<LandmarkResult> {
        let outputs = self.t_infer.time(|| self.cnn.estimate(image, roi))?;

        let mut result = extract(&outputs)?;
        map_to_frame(
            &mut result.landmarks,
            roi,
            self.cnn.input_resolution(),
            image.resolution(),
        );
        Ok(result)
    }

    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_infer].into_iter()
    }
}

/// Maps landmarks from network input coordinates to normalized coordinates of the frame `roi` was
/// cropped from.
fn map_to_frame(
    landmarks: &mut HandLandmarks,
    roi: RotatedRect,
    input_res: Resolution,
    frame_res: Resolution,
) {
    let scale_x = roi.rect().width() / input_res.width() as f32;
    let scale_y = roi.rect().height() / input_res.height() as f32;
    let (width, height) = (frame_res.width() as f32, frame_res.height() as f32);
    for pos in &mut landmarks.positions {
        let (x, y) = roi.transform_out(pos[0] * scale_x, pos[1] * scale_y);
        pos[0] = x / width;
        pos[1] = y / height;
        pos[2] = pos[2] * scale_x / width;
    }
}

/// Reads the raw network outputs. Landmarks stay in the network's input coordinates.
fn extract(outputs: &Outputs) -> anyhow::Result<LandmarkResult> {
    if outputs.len() < 3 {
        anyhow::bail!(
            "hand landmark network must have at least 3 outputs, this one has {}",
            outputs.len()
        );
    }

    let screen_landmarks = &outputs[0];
    let presence = &outputs[1];
    let handedness = &outputs[2];
    for (name, tensor, expected) in [
        ("landmark", screen_landmarks, &[1, NUM_LANDMARKS * 3][..]),
        ("presence", presence, &[1, 1][..]),
        ("handedness", handedness, &[1, 1][..]),
    ] {
        if tensor.shape() != expected {
            anyhow::bail!(
                "unexpected {} output shape {:?} (expected {:?})",
                name,
                tensor.shape(),
                expected,
            );
        }
    }

    let mut positions = [[0.0; 3]; NUM_LANDMARKS];
    for (out, xyz) in positions
        .iter_mut()
        .zip(screen_landmarks.as_slice().chunks_exact(3))
    {
        out.copy_from_slice(xyz);
    }

    Ok(LandmarkResult {
        landmarks: HandLandmarks::new(positions),
        presence: presence.as_slice()[0],
        raw_handedness: handedness.as_slice()[0],
    })
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{image::Rect, nn::Tensor, test};

    #[test]
    fn from_positions_checks_count() {
        let positions = [[0.5, 0.5, 0.0]; NUM_LANDMARKS];
        let landmarks = HandLandmarks::from_positions(&positions).unwrap();
        assert_eq!(landmarks.positions(), &positions);

        let err = HandLandmarks::from_positions(&positions[..20]).unwrap_err();
        assert_eq!(err.found(), 20);
        assert_eq!(err.to_string(), "expected 21 hand landmarks, got 20");

        let too_many = vec![[0.0; 3]; 22];
        assert_eq!(HandLandmarks::from_positions(&too_many).unwrap_err().found(), 22);
        assert!(HandLandmarks::from_positions(&[]).is_err());
    }

    #[test]
    fn flip_horizontal_mirrors_x() {
        let landmarks = test::open_hand().with_position(LandmarkIdx::Wrist, [0.25, 0.9, 0.1]);
        let flipped = landmarks.flip_horizontal();
        assert_eq!(flipped.position(LandmarkIdx::Wrist), [0.75, 0.9, 0.1]);
        assert_eq!(flipped.flip_horizontal(), landmarks);
    }

    #[test]
    fn upright_hand_has_no_rotation() {
        let hand = test::open_hand();
        assert_abs_diff_eq!(hand.rotation_radians(), 0.0, epsilon = 1e-5);

        // Fingers pointing to the right of the frame.
        let sideways = hand
            .with_position(LandmarkIdx::Wrist, [0.3, 0.5, 0.0])
            .with_position(LandmarkIdx::MiddleFingerMcp, [0.5, 0.5, 0.0]);
        assert_abs_diff_eq!(
            sideways.rotation_radians().abs(),
            std::f32::consts::FRAC_PI_2,
            epsilon = 1e-5
        );
    }

    #[test]
    fn handedness() {
        assert_eq!(Handedness::Left.flipped(), Handedness::Right);
        assert_eq!(Handedness::Right.to_string(), "Right");
        assert_eq!(Handedness::Left.short_label(), "L");
    }

    #[test]
    fn connectivity_covers_all_landmarks() {
        let mut seen = [false; NUM_LANDMARKS];
        for &(a, b) in CONNECTIVITY {
            seen[a as usize] = true;
            seen[b as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    fn outputs(raw_handedness: f32) -> Outputs {
        let landmarks = Tensor::from_array_shape_fn([1, 63], |[_, i]| i as f32);
        [
            landmarks,
            Tensor::from_vec(vec![1, 1], vec![0.9]),
            Tensor::from_vec(vec![1, 1], vec![raw_handedness]),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn extract_reads_outputs() {
        let result = extract(&outputs(0.8)).unwrap();
        assert_eq!(result.presence(), 0.9);
        assert_eq!(result.handedness(), Handedness::Right);
        assert_eq!(result.landmarks().position(LandmarkIdx::Wrist), [0.0, 1.0, 2.0]);
        assert_eq!(
            result.landmarks().position(LandmarkIdx::PinkyTip),
            [60.0, 61.0, 62.0]
        );

        assert_eq!(extract(&outputs(0.2)).unwrap().handedness(), Handedness::Left);
        assert_eq!(extract(&outputs(0.5)).unwrap().handedness(), Handedness::Left);
    }

    #[test]
    fn landmarks_are_rotated_back_into_the_frame() {
        const INPUT: Resolution = Resolution::new(224, 224);
        const FRAME: Resolution = Resolution::new(400, 400);
        let roi = Rect::from_center(200.0, 200.0, 224.0, 224.0);

        // Upright in the crop: wrist at the bottom, fingers above it.
        let crop = HandLandmarks::new([[112.0, 112.0, 10.0]; NUM_LANDMARKS])
            .with_position(LandmarkIdx::Wrist, [112.0, 200.0, 0.0])
            .with_position(LandmarkIdx::MiddleFingerMcp, [112.0, 100.0, 0.0]);

        let mut upright = crop;
        map_to_frame(&mut upright, roi.into(), INPUT, FRAME);
        let [x, y, z] = upright.position(LandmarkIdx::Wrist);
        assert_abs_diff_eq!(x, 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(y, 0.72, epsilon = 1e-5);
        assert_abs_diff_eq!(z, 0.0);
        assert_abs_diff_eq!(upright.position(LandmarkIdx::IndexFingerTip)[2], 0.025);
        assert_abs_diff_eq!(upright.rotation_radians(), 0.0, epsilon = 1e-5);

        // A palm turned by 90° has its fingers pointing to the right of the frame.
        let mut rotated = crop;
        map_to_frame(&mut rotated, RotatedRect::new(roi, FRAC_PI_2), INPUT, FRAME);
        let [x, y, _] = rotated.position(LandmarkIdx::Wrist);
        assert_abs_diff_eq!(x, 0.28, epsilon = 1e-5);
        assert_abs_diff_eq!(y, 0.5, epsilon = 1e-5);
        let [x, y, _] = rotated.position(LandmarkIdx::MiddleFingerMcp);
        assert_abs_diff_eq!(x, 0.53, epsilon = 1e-5);
        assert_abs_diff_eq!(y, 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(rotated.rotation_radians(), FRAC_PI_2, epsilon = 1e-5);
    }

    #[test]
    fn extract_rejects_bad_shapes() {
        let outputs: Outputs = [
            Tensor::from_vec(vec![1, 42], vec![0.0; 42]),
            Tensor::from_vec(vec![1, 1], vec![0.9]),
            Tensor::from_vec(vec![1, 1], vec![0.9]),
        ]
        .into_iter()
        .collect();
        let err = extract(&outputs).unwrap_err();
        assert!(err.to_string().contains("landmark output shape"), "{err}");

        let outputs: Outputs = [Tensor::from_vec(vec![1, 63], vec![0.0; 63])]
            .into_iter()
            .collect();
        assert!(extract(&outputs).is_err());
    }
}
