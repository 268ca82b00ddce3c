//! Frame sources.
//!
//! The counting loop reads frames from a [`FrameSource`]: a [`webcam::Webcam`] for live use, or
//! an [`files::ImageSequence`] to replay recorded frames.

pub mod files;
pub mod webcam;

use crate::{image::Image, timer::Timer};

/// A source of video frames.
pub trait FrameSource {
    /// Reads the next frame.
    ///
    /// Returns `Ok(None)` once the source has no more frames. Errors are not recoverable: the
    /// source should not be read from again after one was returned.
    fn read(&mut self) -> anyhow::Result<Option<Image>>;

    /// Returns the profiling timers of the source, reported along with the rest of the loop.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn read(&mut self) -> anyhow::Result<Option<Image>> {
        (**self).read()
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> anyhow::Result<Option<Image>> {
        (**self).read()
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}
