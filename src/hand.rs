//! Hand detection, landmark estimation and finger classification.
//!
//! Hands are processed in three steps:
//!
//! - [`detection::PalmDetector`] locates palms in the full frame.
//! - [`landmark::Landmarker`] estimates 21 landmarks and the chirality of the hand around each palm.
//! - [`fingers::classify`] decides which fingers of a hand are raised, based only on the landmarks.

pub mod detection;
pub mod fingers;
pub mod landmark;
