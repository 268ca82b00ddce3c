//! Counts raised fingers in camera images.
//!
//! Each frame is handled on its own: a [`perception::HandPerception`] implementation locates the
//! 21 landmarks of every visible hand, [`hand::fingers::classify`] decides which fingers of a hand
//! are raised, and [`count::FrameCount`] sums the result over all hands in the frame.
//!
//! # Coordinates
//!
//! Landmark positions handed to the classifier are normalized to the frame: X and Y range from 0.0
//! to 1.0, the origin is the top left corner, and Y points *down*. Pixel coordinates used by the
//! image and detection code follow the same orientation.
//!
//! # Environment Variables
//!
//! * `FINGERCOUNT_WEBCAM_NAME`: Forces the device to use for [`Webcam`]s created without an
//!   explicit device name. If unset, the first device that supports a compatible image format will
//!   be used.
//! * `RUST_LOG`: Overrides the log filter set up by [`init_logger!`].
//!
//! [`Webcam`]: video::webcam::Webcam

use log::LevelFilter;

pub mod app;
pub mod count;
pub mod detection;
pub mod gui;
pub mod hand;
pub mod image;
pub mod nn;
pub mod num;
pub mod perception;
pub mod termination;
pub mod timer;
pub mod video;


/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and this library will log at *debug* level, `wgpu` at *warn* level. The
/// `RUST_LOG` environment variable is applied on top of that.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
