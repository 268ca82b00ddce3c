//! V4L2 webcam access.
//!
//! Only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are supported.

use std::env;

use anyhow::bail;
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::{
    image::{Image, Resolution},
    num::TotalF32,
    timer::Timer,
    video::FrameSource,
};

/// Environment variable that selects the webcam by name, when [`WebcamOptions::name`] is not set.
pub const ENV_VAR_WEBCAM_NAME: &str = "FINGERCOUNT_WEBCAM_NAME";

/// Indicates whether to prefer a higher resolution or frame rate.
///
/// By default, [`ParamPreference::Resolution`] is used, selecting the maximum resolution at the
/// desired frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamPreference {
    /// Prefer increased resolution over higher frame rates.
    #[default]
    Resolution,
    /// Prefer higher frame rate over higher image resolution.
    Framerate,
}

#[derive(Debug, Default, Clone, Copy)]
struct FramePrefs {
    resolution: Option<Resolution>,
    fps: Option<u32>,
    pref: ParamPreference,
}

/// Format negotiation options.
#[derive(Debug, Default, Clone)]
pub struct WebcamOptions {
    name: Option<String>,
    frame: FramePrefs,
}

impl WebcamOptions {
    /// Sets the name of the webcam device to open.
    ///
    /// If no webcam with the given name can be found, opening the webcam will result in an error.
    #[inline]
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the desired image resolution.
    ///
    /// A lower resolution might be selected if the webcam cannot deliver it.
    #[inline]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.frame.resolution = Some(resolution);
        self
    }

    /// Sets the desired frame rate.
    ///
    /// A lower frame rate might be selected if the webcam cannot deliver it.
    #[inline]
    pub fn fps(mut self, fps: u32) -> Self {
        self.frame.fps = Some(fps);
        self
    }

    /// Selects which of resolution and frame rate to keep when the camera cannot deliver both,
    /// and which one to maximize when it can.
    #[inline]
    pub fn prefer(mut self, pref: ParamPreference) -> Self {
        self.frame.pref = pref;
        self
    }
}

#[derive(Clone, Copy)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

impl FrameFormat {
    fn fps(&self) -> f32 {
        1.0 / self.frame_interval.as_f32()
    }
}

fn negotiate_format(device: &Device, prefs: FramePrefs) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixel_format() == PixelFormat::JPEG || format.pixel_format() == PixelFormat::MJPG {
            pixel_format = Some(format.pixel_format());
            break;
        }
    }

    let Some(pixel_format) = pixel_format else {
        bail!("no JPEG or MJPG pixel format supported");
    };

    let mut formats = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let intervals =
                    match device.frame_intervals(pixel_format, size.width(), size.height())? {
                        FrameIntervals::Discrete(intervals) => intervals,
                        FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                            bail!("stepwise or continuous frame rates are not supported")
                        }
                    };
                formats.extend(intervals.iter().map(|rate| FrameFormat {
                    resolution: Resolution::new(size.width(), size.height()),
                    frame_interval: *rate.fract(),
                }));
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }

    match select_format(&formats, prefs) {
        Some(fmt) => Ok((
            PixFormat::new(
                fmt.resolution.width(),
                fmt.resolution.height(),
                pixel_format,
            ),
            fmt.frame_interval,
        )),
        None => bail!("failed to negotiate a webcam format"),
    }
}

/// Picks the best format, dropping the less important preference if nothing satisfies both.
fn select_format(formats: &[FrameFormat], mut prefs: FramePrefs) -> Option<FrameFormat> {
    loop {
        if let Some(fmt) = select_format_step(formats, prefs) {
            return Some(fmt);
        }

        log::debug!("no format matches {:?}", prefs);
        let relaxed = match prefs.pref {
            ParamPreference::Resolution => {
                prefs.fps.take().is_some() || prefs.resolution.take().is_some()
            }
            ParamPreference::Framerate => {
                prefs.resolution.take().is_some() || prefs.fps.take().is_some()
            }
        };
        if !relaxed {
            return None;
        }
    }
}

fn select_format_step(formats: &[FrameFormat], prefs: FramePrefs) -> Option<FrameFormat> {
    let mut eligible = formats
        .iter()
        .filter(|fmt| {
            prefs.resolution.map_or(true, |res| {
                fmt.resolution.width() >= res.width() && fmt.resolution.height() >= res.height()
            }) && prefs
                .fps
                .map_or(true, |fps| fmt.fps().round() >= fps as f32)
        })
        .copied()
        .collect::<Vec<_>>();
    match prefs.pref {
        ParamPreference::Resolution => {
            eligible.sort_by_key(|fmt| (fmt.resolution.num_pixels(), TotalF32(fmt.fps())))
        }
        ParamPreference::Framerate => {
            eligible.sort_by_key(|fmt| (TotalF32(fmt.fps()), fmt.resolution.num_pixels()))
        }
    }
    eligible.last().copied()
}

/// A V4L2 webcam yielding a stream of [`Image`]s.
///
/// The device is held open for as long as the [`Webcam`] exists and released when it is
/// dropped.
pub struct Webcam {
    stream: ReadStream,
    name: String,
    resolution: Resolution,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the first supported webcam found.
    ///
    /// This can block for a significant amount of time while the webcam initializes (on the order
    /// of hundreds of milliseconds).
    pub fn open(options: WebcamOptions) -> anyhow::Result<Self> {
        let env_name = env::var(ENV_VAR_WEBCAM_NAME).ok();
        if let Some(name) = &env_name {
            log::debug!(
                "webcam override: `{}` is set to '{}'",
                ENV_VAR_WEBCAM_NAME,
                name
            );
        }
        let name = options.name.as_deref().or(env_name.as_deref());

        for res in linuxvideo::list()? {
            match res {
                Ok(dev) => match Self::open_device(dev, name, options.frame) {
                    Ok(Some(webcam)) => return Ok(webcam),
                    Ok(None) => {}
                    Err(e) => log::debug!("skipping device: {:#}", e),
                },
                Err(e) => log::warn!("{}", e),
            }
        }

        match name {
            Some(name) => bail!("no supported webcam named '{}' found", name),
            None => bail!("no supported webcam device found"),
        }
    }

    fn open_device(
        dev: Device,
        name: Option<&str>,
        prefs: FramePrefs,
    ) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        if let Some(name) = name {
            if caps.card() != name {
                return Ok(None);
            }
        }

        let cap_flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        );

        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixfmt, fract) = negotiate_format(&dev, prefs)?;
        let capture = dev.video_capture(pixfmt)?;
        let format = capture.format();
        let resolution = Resolution::new(format.width(), format.height());
        let actual = capture.set_frame_interval(fract)?;

        log::info!(
            "opened {} ({}), {} @ {:.1}Hz",
            caps.card(),
            path.display(),
            resolution,
            1.0 / actual.as_f32(),
        );

        Ok(Some(Self {
            stream: capture.into_stream()?,
            name: caps.card().to_string(),
            resolution,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    /// Reads the next frame from the camera, blocking until one is available.
    ///
    /// Frames that fail to decode are replaced with a blank image.
    pub fn read(&mut self) -> anyhow::Result<Image> {
        let dequeue_guard = self.t_dequeue.start();
        let resolution = self.resolution;
        let t_decode = &self.t_decode;
        let image = self.stream.dequeue(|buf| {
            drop(dequeue_guard);
            let image = match t_decode.time(|| Image::decode_jpeg(&buf)) {
                Ok(image) => image,
                Err(e) => {
                    // Even good webcams occasionally deliver corrupted MJPG frames. Skipping them
                    // would double the latency, a blank frame just contains no hands.
                    log::error!("webcam decode error: {}", e);
                    Image::new(resolution.width(), resolution.height())
                }
            };
            Ok(image)
        })?;
        Ok(image)
    }
}

/// A webcam never runs out of frames.
impl FrameSource for Webcam {
    fn read(&mut self) -> anyhow::Result<Option<Image>> {
        Webcam::read(self).map(Some)
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_dequeue, &self.t_decode]
    }
}

impl Drop for Webcam {
    fn drop(&mut self) {
        log::debug!("releasing webcam {}", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(width: u32, height: u32, fps: u32) -> FrameFormat {
        FrameFormat {
            resolution: Resolution::new(width, height),
            frame_interval: Fract::new(1, fps),
        }
    }

    fn formats() -> Vec<FrameFormat> {
        vec![
            format(640, 480, 30),
            format(640, 480, 60),
            format(1280, 720, 30),
            format(1920, 1080, 15),
        ]
    }

    fn select(
        resolution: Option<(u32, u32)>,
        fps: Option<u32>,
        pref: ParamPreference,
    ) -> Option<(u32, u32, u32)> {
        let prefs = FramePrefs {
            resolution: resolution.map(|(w, h)| Resolution::new(w, h)),
            fps,
            pref,
        };
        select_format(&formats(), prefs).map(|fmt| {
            (
                fmt.resolution.width(),
                fmt.resolution.height(),
                fmt.fps().round() as u32,
            )
        })
    }

    #[test]
    fn maximizes_resolution_by_default() {
        assert_eq!(
            select(None, None, ParamPreference::default()),
            Some((1920, 1080, 15))
        );
        assert_eq!(
            select(None, Some(30), ParamPreference::Resolution),
            Some((1280, 720, 30))
        );
    }

    #[test]
    fn maximizes_framerate() {
        assert_eq!(
            select(None, None, ParamPreference::Framerate),
            Some((640, 480, 60))
        );
    }

    #[test]
    fn relaxes_less_important_preference() {
        // Nothing delivers 1080p at 60 FPS: keep the resolution, drop the frame rate.
        assert_eq!(
            select(Some((1920, 1080)), Some(60), ParamPreference::Resolution),
            Some((1920, 1080, 15))
        );

        // ...or keep the frame rate and drop the resolution.
        assert_eq!(
            select(Some((1920, 1080)), Some(60), ParamPreference::Framerate),
            Some((640, 480, 60))
        );
    }

    #[test]
    fn no_formats() {
        assert!(select_format(&[], FramePrefs::default()).is_none());
    }
}
