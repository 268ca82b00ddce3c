//! The finger counting loop.
//!
//! Every frame goes through the same steps, one frame at a time: acquire, mirror, detect hands,
//! classify fingers, present. Nothing is carried over from one frame to the next.

use crate::{
    count::FrameCount,
    image::Image,
    perception::{HandDetection, HandPerception},
    timer::{FpsCounter, Timer},
    video::FrameSource,
};

/// Hands rotated further than this (in either direction) are outside of what the finger
/// classification rules were made for.
const MAX_UPRIGHT_DEGREES: f32 = 45.0;

/// Returned by the presentation callback of [`run`] to continue or stop the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

/// A frame, the hands found in it, and their finger counts.
#[derive(Debug)]
pub struct ProcessedFrame {
    pub image: Image,
    pub detections: Vec<HandDetection>,
    pub count: FrameCount,
}

impl ProcessedFrame {
    /// Draws the counting overlay onto the frame and returns it.
    pub fn annotated(mut self) -> Image {
        self.count.draw(&mut self.image, &self.detections);
        self.image
    }
}

/// Counts the raised fingers in individual frames.
pub struct FingerCounter<P> {
    perception: P,
    mirror: bool,
    t_mirror: Timer,
    t_detect: Timer,
    t_classify: Timer,
    fps: FpsCounter,
}

impl<P: HandPerception> FingerCounter<P> {
    pub fn new(perception: P) -> Self {
        Self {
            perception,
            mirror: true,
            t_mirror: Timer::new("mirror"),
            t_detect: Timer::new("detect"),
            t_classify: Timer::new("classify"),
            fps: FpsCounter::new("fingercount"),
        }
    }

    /// Sets whether frames are flipped horizontally before detection.
    ///
    /// Enabled by default, which results in a selfie view where raising the right hand moves the
    /// hand on the right side of the displayed image.
    pub fn set_mirror(&mut self, mirror: bool) {
        self.mirror = mirror;
    }

    pub fn perception(&self) -> &P {
        &self.perception
    }

    /// Finds the hands in a frame and counts their raised fingers.
    pub fn process(&mut self, image: Image) -> anyhow::Result<ProcessedFrame> {
        self.process_with_timers(image, std::iter::empty())
    }

    /// Like [`FingerCounter::process`], and also reports the timers of the stages that produced
    /// `image` in the FPS log.
    pub fn process_with_timers<'t>(
        &mut self,
        mut image: Image,
        source_timers: impl IntoIterator<Item = &'t Timer>,
    ) -> anyhow::Result<ProcessedFrame> {
        if self.mirror {
            self.t_mirror.time(|| image.flip_horizontal_in_place());
        }

        let detections = self.t_detect.time(|| self.perception.detect(&image))?;
        let count = self
            .t_classify
            .time(|| FrameCount::from_detections(&detections));

        for (hand, det) in count.hands().iter().zip(&detections) {
            log::trace!(
                "{} hand (presence {:.2}): {}",
                hand.handedness,
                det.presence(),
                hand.fingers
            );
            let degrees = det.landmarks().rotation_radians().to_degrees();
            if degrees.abs() > MAX_UPRIGHT_DEGREES {
                log::debug!(
                    "{} hand is rotated by {:.0}°, its finger count may be wrong",
                    hand.handedness,
                    degrees
                );
            }
        }
        log::debug!("{} hands, {} fingers", count.hands().len(), count.total());

        let mut timers: Vec<&Timer> = source_timers.into_iter().collect();
        timers.extend([&self.t_mirror, &self.t_detect, &self.t_classify]);
        timers.extend(self.perception.timers());
        self.fps.tick_with(timers);

        Ok(ProcessedFrame {
            image,
            detections,
            count,
        })
    }
}

/// Runs the counting loop until the source ends, `present` asks to quit, or `max_frames` frames
/// were processed.
///
/// Errors from the source, the perception or `present` end the loop immediately and are returned.
/// Returns the number of processed frames.
pub fn run<S, P, F>(
    source: &mut S,
    counter: &mut FingerCounter<P>,
    max_frames: Option<u64>,
    mut present: F,
) -> anyhow::Result<u64>
where
    S: FrameSource + ?Sized,
    P: HandPerception,
    F: FnMut(ProcessedFrame) -> anyhow::Result<Control>,
{
    let mut frames = 0;
    while max_frames.map_or(true, |max| frames < max) {
        let Some(image) = source.read()? else {
            log::debug!("end of stream after {} frames", frames);
            break;
        };

        let processed = counter.process_with_timers(image, source.timers())?;
        frames += 1;
        if present(processed)? == Control::Quit {
            log::debug!("quit requested after {} frames", frames);
            break;
        }
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, time::Duration};

    use super::*;
    use crate::{
        hand::landmark::{Handedness, LandmarkIdx},
        image::Color,
        test,
    };

    /// Yields a fixed number of frames, then either ends or fails.
    struct Frames {
        left: u32,
        fail_at_end: bool,
        reads: u32,
        t_read: Timer,
    }

    impl Frames {
        fn new(left: u32) -> Self {
            Self {
                left,
                fail_at_end: false,
                reads: 0,
                t_read: Timer::new("read"),
            }
        }
    }

    impl FrameSource for Frames {
        fn read(&mut self) -> anyhow::Result<Option<Image>> {
            self.reads += 1;
            if self.left == 0 {
                if self.fail_at_end {
                    anyhow::bail!("camera unplugged");
                }
                return Ok(None);
            }
            self.left -= 1;
            Ok(Some(self.t_read.time(|| Image::new(4, 4))))
        }

        fn timers(&self) -> Vec<&Timer> {
            vec![&self.t_read]
        }
    }

    /// Returns scripted hands, one list per frame, and remembers what it was shown.
    #[derive(Default)]
    struct Scripted {
        frames: VecDeque<Vec<HandDetection>>,
        seen: Vec<Image>,
    }

    impl HandPerception for Scripted {
        fn detect(&mut self, image: &Image) -> anyhow::Result<Vec<HandDetection>> {
            self.seen.push(image.clone());
            Ok(self.frames.pop_front().unwrap_or_default())
        }
    }

    fn hand(raised: [bool; 5]) -> HandDetection {
        HandDetection::new(test::with_raised(raised), Handedness::Right, 1.0)
    }

    #[test]
    fn counts_every_frame() {
        let perception = Scripted {
            frames: [
                vec![],
                vec![hand([true; 5])],
                vec![
                    hand([false, true, true, true, false]),
                    hand([true, true, false, false, false]),
                ],
            ]
            .into(),
            ..Default::default()
        };
        let mut counter = FingerCounter::new(perception);

        let mut totals = Vec::new();
        let frames = run(&mut Frames::new(3), &mut counter, None, |frame| {
            totals.push(frame.count.total());
            Ok(Control::Continue)
        })
        .unwrap();

        assert_eq!(frames, 3);
        assert_eq!(totals, [0, 5, 5]);
    }

    #[test]
    fn stops_at_end_of_stream() {
        let mut source = Frames::new(2);
        let mut counter = FingerCounter::new(Scripted::default());
        let frames = run(&mut source, &mut counter, None, |_| Ok(Control::Continue)).unwrap();
        assert_eq!(frames, 2);
        assert_eq!(source.reads, 3);
    }

    #[test]
    fn source_errors_are_fatal() {
        let mut source = Frames::new(1);
        source.fail_at_end = true;
        let mut counter = FingerCounter::new(Scripted::default());
        let mut presented = 0;
        let err = run(&mut source, &mut counter, None, |_| {
            presented += 1;
            Ok(Control::Continue)
        })
        .unwrap_err();

        assert_eq!(err.to_string(), "camera unplugged");
        assert_eq!(presented, 1);
        assert_eq!(source.reads, 2);
    }

    #[test]
    fn quit_and_frame_limit() {
        let mut counter = FingerCounter::new(Scripted::default());
        let mut source = Frames::new(10);
        let frames = run(&mut source, &mut counter, None, |_| Ok(Control::Quit)).unwrap();
        assert_eq!(frames, 1);
        assert_eq!(source.reads, 1);

        let frames = run(&mut source, &mut counter, Some(4), |_| Ok(Control::Continue)).unwrap();
        assert_eq!(frames, 4);
        assert_eq!(source.left, 5);

        let frames = run(&mut source, &mut counter, Some(0), |_| Ok(Control::Continue)).unwrap();
        assert_eq!(frames, 0);
    }

    #[test]
    fn source_timers_are_reported() {
        let mut counter = FingerCounter::new(Scripted::default());
        let mut source = Frames::new(3);
        run(&mut source, &mut counter, Some(2), |_| Ok(Control::Continue)).unwrap();
        // Not a second into the run yet, so nothing was logged.
        assert_eq!(source.t_read.take().0, 2);

        // Reporting formats the timers, which resets them.
        counter.fps.set_interval(Duration::ZERO);
        run(&mut source, &mut counter, None, |_| Ok(Control::Continue)).unwrap();
        assert_eq!(source.left, 0);
        assert_eq!(source.t_read.take().0, 0);
    }

    #[test]
    fn mirrors_before_detection() {
        let mut image = Image::new(2, 1);
        image.set(0, 0, Color::RED);

        let mut counter = FingerCounter::new(Scripted::default());
        let frame = counter.process(image.clone()).unwrap();
        assert_eq!(counter.perception().seen[0].get(1, 0), Color::RED);
        assert_eq!(frame.image.get(1, 0), Color::RED);

        counter.set_mirror(false);
        counter.process(image).unwrap();
        assert_eq!(counter.perception().seen[1].get(0, 0), Color::RED);
    }

    #[test]
    fn annotated_frame_has_overlay() {
        let mut counter = FingerCounter::new(Scripted {
            frames: [vec![hand([true; 5])]].into(),
            ..Default::default()
        });
        counter.set_mirror(false);
        let frame = counter.process(Image::new(400, 400)).unwrap();
        assert_eq!(frame.count.total(), 5);

        let [x, y, _] = frame.detections[0]
            .landmarks()
            .position(LandmarkIdx::IndexFingerTip);
        let annotated = frame.annotated();
        let (x, y) = ((x * 400.0).round() as u32, (y * 400.0).round() as u32);
        assert_eq!(annotated.get(x, y), Color::GREEN);
    }
}
