//! Palm detection.

use std::path::Path;

use nalgebra::{Rotation2, Vector2};

use crate::{
    detection::{
        nms::NonMaxSuppression,
        ssd::{Anchor, Anchors, LayerInfo},
        Detection, Keypoint,
    },
    image::{Image, Rect, Resolution, RotatedRect},
    nn::{Cnn, ColorMapper, NeuralNetwork, Outputs},
    num::sigmoid,
    timer::Timer,
};

/// A keypoint of a palm [`Detection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PalmKeypoint {
    Wrist = 0,
    IndexFingerMcp = 1,
    MiddleFingerMcp = 2,
    RingFingerMcp = 3,
    PinkyMcp = 4,
    ThumbCmc = 5,
    ThumbMcp = 6,
}

const NUM_KEYPOINTS: usize = 7;

/// Number of values per anchor in the box output: box center and size, then 7 keypoints.
const BOX_PARAMS: usize = 4 + NUM_KEYPOINTS * 2;

/// Detects palms in a full frame, using the MediaPipe palm detection network.
///
/// The network takes a 192x192 image and outputs regressed boxes `[1, 2016, 18]` and raw scores
/// `[1, 2016, 1]` for the anchors of its two output layers (strides 8 and 16).
pub struct PalmDetector {
    cnn: Cnn,
    anchors: Anchors,
    nms: NonMaxSuppression,
    thresh: f32,
    t_infer: Timer,
    t_extract: Timer,
    t_nms: Timer,
}

impl PalmDetector {
    pub const DEFAULT_THRESHOLD: f32 = 0.7;

    pub fn new(nn: NeuralNetwork) -> anyhow::Result<Self> {
        let cnn = Cnn::new(nn, ColorMapper::linear(0.0..=1.0))?;
        let res = cnn.input_resolution();
        if res.width() % 16 != 0 || res.height() % 16 != 0 {
            anyhow::bail!("palm detection input resolution {} is not a multiple of 16", res);
        }
        let anchors = Anchors::calculate(&[
            LayerInfo::new(2, res.width() / 8, res.height() / 8),
            LayerInfo::new(6, res.width() / 16, res.height() / 16),
        ]);

        Ok(Self {
            cnn,
            anchors,
            nms: NonMaxSuppression::new(),
            thresh: Self::DEFAULT_THRESHOLD,
            t_infer: Timer::new("palm infer"),
            t_extract: Timer::new("palm extract"),
            t_nms: Timer::new("palm nms"),
        })
    }

    /// Loads the palm detection network from an ONNX file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::new(NeuralNetwork::from_path(path)?)
    }

    /// Sets the minimum confidence of reported palms.
    #[inline]
    pub fn set_threshold(&mut self, thresh: f32) {
        self.thresh = thresh;
    }

    /// Detects palms in `image`.
    ///
    /// Positions of the returned detections are in pixel coordinates of `image`. The detections
    /// are ordered by descending confidence.
    pub fn detect(&mut self, image: &Image) -> anyhow::Result<Vec<Detection>> {
        let input_res = self.cnn.input_resolution();

        // If the image's aspect ratio doesn't match the network's input, extend it with black bars
        // so that it does.
        let aspect = input_res
            .aspect_ratio()
            .ok_or_else(|| anyhow::anyhow!("network input resolution {} is empty", input_res))?;
        let rect = image.rect().grow_to_fit_aspect(aspect);
        let outputs = self.t_infer.time(|| self.cnn.estimate(image, rect))?;

        let mut detections = self.t_extract.time(|| {
            extract_outputs(&self.anchors, input_res, &outputs, self.thresh)
        })?;
        self.t_nms.time(|| self.nms.process(&mut detections));

        let scale = rect.width() / input_res.width() as f32;
        for det in &mut detections {
            det.map_to_image(scale, rect.x(), rect.y());
        }

        Ok(detections)
    }

    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_infer, &self.t_extract, &self.t_nms].into_iter()
    }
}

fn extract_outputs(
    anchors: &Anchors,
    input_res: Resolution,
    outputs: &Outputs,
    thresh: f32,
) -> anyhow::Result<Vec<Detection>> {
    if outputs.len() < 2 {
        anyhow::bail!(
            "palm detection network must have 2 outputs, this one has {}",
            outputs.len()
        );
    }

    let num_anchors = anchors.anchor_count();
    let boxes = &outputs[0];
    let scores = &outputs[1];
    if boxes.shape() != [1, num_anchors, BOX_PARAMS] || scores.shape() != [1, num_anchors, 1] {
        anyhow::bail!(
            "unexpected palm detection output shapes {:?} and {:?} for {} anchors",
            boxes.shape(),
            scores.shape(),
            num_anchors,
        );
    }

    let detections = scores
        .as_slice()
        .iter()
        .enumerate()
        .filter_map(|(index, &raw)| {
            let confidence = sigmoid(raw);
            (confidence >= thresh).then(|| {
                extract_detection(
                    &anchors[index],
                    input_res,
                    boxes.index(&[0, index]),
                    confidence,
                )
            })
        })
        .collect();
    Ok(detections)
}

fn extract_detection(
    anchor: &Anchor,
    input_res: Resolution,
    box_params: &[f32],
    confidence: f32,
) -> Detection {
    let x_offset = anchor.x_center() * input_res.width() as f32;
    let y_offset = anchor.y_center() * input_res.height() as f32;

    let rect = Rect::from_center(
        box_params[0] + x_offset,
        box_params[1] + y_offset,
        box_params[2],
        box_params[3],
    );
    let keypoints = box_params[4..]
        .chunks_exact(2)
        .map(|xy| Keypoint::new(xy[0] + x_offset, xy[1] + y_offset))
        .collect::<Vec<_>>();

    Detection::with_keypoints(confidence, rect, keypoints)
}

/// Computes the clockwise rotation of a palm, from the wrist to the middle finger's knuckle.
///
/// Palms without keypoints are treated as upright.
fn palm_angle(det: &Detection) -> f32 {
    match wrist_to_finger(det) {
        Some(finger) => Rotation2::rotation_between(&Vector2::y(), &-finger).angle(),
        None => 0.0,
    }
}

/// Returns the vector from the wrist to the middle finger's knuckle, if the detection has palm
/// keypoints.
fn wrist_to_finger(det: &Detection) -> Option<Vector2<f32>> {
    let kp = |which: PalmKeypoint| {
        let kp = det.keypoints().get(which as usize)?;
        Some(Vector2::new(kp.x(), kp.y()))
    };
    Some(kp(PalmKeypoint::MiddleFingerMcp)? - kp(PalmKeypoint::Wrist)?)
}

/// Computes the square region to run the landmark network on, for a palm detected by
/// [`PalmDetector`].
///
/// The region is rotated so that the fingers point up inside of it. The palm's box is moved by
/// half its height towards the fingers and enlarged by
/// [`Landmarker::ROI_SCALE`](crate::hand::landmark::Landmarker::ROI_SCALE), so that it covers the
/// whole hand.
pub fn hand_roi(det: &Detection) -> RotatedRect {
    let rect = det.bounding_rect();
    let angle = palm_angle(det);

    let shift = Rotation2::new(angle) * Vector2::new(0.0, -rect.height() * 0.5);
    let size = rect.width().max(rect.height()) * crate::hand::landmark::Landmarker::ROI_SCALE;
    RotatedRect::new(
        Rect::from_center(
            rect.x_center() + shift.x,
            rect.y_center() + shift.y,
            size,
            size,
        ),
        angle,
    )
}
