//! Image handling.
//!
//! This module provides:
//!
//! - The [`Image`] type, an owned RGBA image.
//! - A variety of [`draw`] functions to visualize hands and counts.
//! - [`Rect`] and [`RotatedRect`], floating-point rectangles describing parts of an image.
//! - [`Resolution`], the size of an image, camera, or network input.

pub mod draw;
mod rect;
mod resolution;


use std::{fmt, ops::Index, path::Path};

use anyhow::Context;
use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};
use image::{ImageBuffer, Rgba, RgbaImage};

pub use rect::*;
pub use resolution::*;

#[derive(Debug, Clone, Copy)]
enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") => {
                Some(Self::Jpeg)
            }
            Some(ext) if ext.eq_ignore_ascii_case("png") => Some(Self::Png),
            _ => None,
        }
    }

    fn to_image_crate(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

/// Returns whether `path` has an extension that [`Image::load`] can handle.
pub fn is_supported_path(path: &Path) -> bool {
    ImageFormat::from_path(path).is_some()
}

/// An 8-bit sRGB image with alpha channel.
#[derive(Clone)]
pub struct Image {
    // RGBA8 so that the GUI can upload it to the GPU without conversion.
    buf: RgbaImage,
}

impl Image {
    /// Loads an image from the filesystem.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let format = ImageFormat::from_path(path).with_context(|| {
            format!(
                "invalid image path '{}' (must have one of the supported extensions)",
                path.display()
            )
        })?;
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read image '{}'", path.display()))?;
        let buf = image::load_from_memory_with_format(&data, format.to_image_crate())
            .with_context(|| format!("failed to decode image '{}'", path.display()))?
            .to_rgba8();
        Ok(Self { buf })
    }

    /// Decodes a JFIF JPEG or Motion JPEG from a byte slice.
    pub fn decode_jpeg(data: &[u8]) -> anyhow::Result<Self> {
        let buf = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgba8();
        Ok(Self { buf })
    }

    /// Creates an [`Image`] from raw RGBA pixel data.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is not exactly `width * height * 4` bytes long.
    pub fn from_rgba8(res: Resolution, buf: &[u8]) -> Self {
        let expected_size = res.width() as usize * res.height() as usize * 4;
        assert_eq!(
            expected_size,
            buf.len(),
            "incorrect buffer size {} for {} image (expected {} bytes)",
            buf.len(),
            res,
            expected_size,
        );

        Self {
            buf: ImageBuffer::from_vec(res.width(), res.height(), buf.to_vec())
                .expect("buffer size does not match image resolution"),
        }
    }

    /// Creates an empty image of a specified size.
    ///
    /// The image will start out black and fully transparent.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Saves the image to the file system.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let format = ImageFormat::from_path(path).with_context(|| {
            format!("unsupported image file extension: '{}'", path.display())
        })?;
        match format {
            // JPEG has no alpha channel.
            ImageFormat::Jpeg => image::DynamicImage::ImageRgba8(self.buf.clone())
                .to_rgb8()
                .save_with_format(path, format.to_image_crate()),
            ImageFormat::Png => self.buf.save_with_format(path, format.to_image_crate()),
        }
        .with_context(|| format!("failed to save image '{}'", path.display()))
    }

    /// Returns the width of this image, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this image, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Returns the size of this image.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Returns a [`Rect`] covering this image.
    ///
    /// The rectangle will be positioned at `(0, 0)` and have the width and height of the image.
    #[inline]
    pub fn rect(&self) -> Rect {
        Rect::from_top_left(0.0, 0.0, self.width() as f32, self.height() as f32)
    }

    /// Gets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf[(x, y)].0)
    }

    /// Sets the image color at the given pixel coordinates.
    ///
    /// Writes outside of the image are ignored.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        if x < self.width() && y < self.height() {
            self.buf[(x, y)] = Rgba(color.0);
        }
    }

    /// Samples the pixel closest to the (fractional) image coordinates `(x, y)`.
    ///
    /// Coordinates outside of the image yield [`Color::NULL`], which acts as black padding when
    /// feeding regions that extend past the image border into a neural network.
    pub fn sample(&self, x: f32, y: f32) -> Color {
        let (x, y) = (x.floor(), y.floor());
        if x < 0.0 || y < 0.0 || x >= self.width() as f32 || y >= self.height() as f32 {
            return Color::NULL;
        }
        self.get(x as u32, y as u32)
    }

    /// Mirrors the image along the vertical axis.
    pub fn flip_horizontal_in_place(&mut self) {
        image::imageops::flip_horizontal_in_place(&mut self.buf);
    }

    /// Returns a copy of this image, mirrored along the vertical axis.
    pub fn flip_horizontal(&self) -> Image {
        Image {
            buf: image::imageops::flip_horizontal(&self.buf),
        }
    }

    /// Clears the image, setting every pixel value to `color`.
    pub fn clear(&mut self, color: Color) {
        self.buf.pixels_mut().for_each(|pix| pix.0 = color.0);
    }

    /// Returns the raw RGBA8 pixel data, row by row.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Image", self.width(), self.height())
    }
}

/// An 8-bit RGBA color.
///
/// Colors are always in the sRGB color space and use non-premultiplied alpha.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    /// Fully transparent black (all components are 0).
    pub const NULL: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);
    pub const GREEN: Self = Self([0, 255, 0, 255]);
    pub const BLUE: Self = Self([0, 0, 255, 255]);
    pub const YELLOW: Self = Self([255, 255, 0, 255]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r(),
            self.g(),
            self.b(),
            self.a(),
        )
    }
}

impl Index<usize> for Color {
    type Output = u8;

    #[inline]
    fn index(&self, index: usize) -> &u8 {
        &self.0[index]
    }
}

// FIXME leaks `embedded-graphics` dependency
impl PixelColor for Color {
    type Raw = RawU32;
}
