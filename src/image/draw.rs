//! Drawing primitives for annotating frames.
//!
//! Every function returns a guard that draws the shape when dropped, so that optional settings
//! can be chained onto the call:
//!
//! ```no_run
//! # use fingercount::image::{draw, Color, Image};
//! let mut image = Image::new(64, 64);
//! draw::text(&mut image, 10, 10, "hi").color(Color::WHITE).align_left();
//! ```

use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{ascii, MonoFont, MonoTextStyle},
    prelude::*,
    primitives::{self, Line, PrimitiveStyle, Rectangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};

use crate::image::{Color, Image};

/// Guard returned by [`marker`]; draws the marker when dropped and allows customization.
pub struct DrawMarker<'a> {
    image: &'a mut Image,
    x: i32,
    y: i32,
    color: Color,
    size: u32,
}

impl DrawMarker<'_> {
    /// Sets the marker's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the width and height of the marker.
    ///
    /// The default size is 5. The size must be *uneven* and *non-zero*. A size of 1 will result in
    /// a single pixel getting drawn.
    pub fn size(&mut self, size: u32) -> &mut Self {
        assert!(size != 0, "marker size must be greater than zero");
        assert!(size % 2 == 1, "marker size must be an uneven number");
        self.size = size;
        self
    }
}

impl Drop for DrawMarker<'_> {
    fn drop(&mut self) {
        let offset = ((self.size - 1) / 2) as i32;
        let (x, y, color) = (self.x, self.y, self.color);
        let pixels = (-offset..=offset)
            .zip(-offset..=offset)
            .chain((-offset..=offset).rev().zip(-offset..=offset))
            .map(|(xoff, yoff)| Pixel(Point::new(x + xoff, y + yoff), color));
        match Target(&mut *self.image).draw_iter(pixels) {
            Ok(_) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Guard returned by [`line`][line()]; draws the line when dropped and allows customization.
pub struct DrawLine<'a> {
    image: &'a mut Image,
    start: Point,
    end: Point,
    color: Color,
    stroke_width: u32,
}

impl DrawLine<'_> {
    /// Sets the line's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the line's stroke width.
    ///
    /// By default, a stroke width of 1 is used.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl Drop for DrawLine<'_> {
    fn drop(&mut self) {
        match Line::new(self.start, self.end)
            .into_styled(PrimitiveStyle::with_stroke(self.color, self.stroke_width))
            .draw(&mut Target(&mut *self.image))
        {
            Ok(_) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Guard returned by [`text`]; draws the text when dropped and allows customization.
pub struct DrawText<'a> {
    image: &'a mut Image,
    x: i32,
    y: i32,
    text: &'a str,
    color: Color,
    font: &'static MonoFont<'static>,
    alignment: Alignment,
    baseline: Baseline,
}

impl DrawText<'_> {
    /// Sets the text color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Uses a larger font (10x20 pixels per glyph instead of 6x10).
    pub fn large(&mut self) -> &mut Self {
        self.font = &ascii::FONT_10X20;
        self
    }

    /// Aligns the top of the text with the `y` coordinate.
    pub fn align_top(&mut self) -> &mut Self {
        self.baseline = Baseline::Top;
        self
    }

    /// Aligns the bottom of the text with the `y` coordinate.
    pub fn align_bottom(&mut self) -> &mut Self {
        self.baseline = Baseline::Bottom;
        self
    }

    /// Aligns the left side of the text with the `x` coordinate.
    pub fn align_left(&mut self) -> &mut Self {
        self.alignment = Alignment::Left;
        self
    }
}

impl Drop for DrawText<'_> {
    fn drop(&mut self) {
        let character_style = MonoTextStyle::new(self.font, self.color);
        let text_style = TextStyleBuilder::new()
            .alignment(self.alignment)
            .baseline(self.baseline)
            .build();
        match Text::with_text_style(
            self.text,
            Point::new(self.x, self.y),
            character_style,
            text_style,
        )
        .draw(&mut Target(&mut *self.image))
        {
            Ok(_) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Guard returned by [`circle`]; draws the circle when dropped and allows customization.
pub struct DrawCircle<'a> {
    image: &'a mut Image,
    x: i32,
    y: i32,
    diameter: u32,
    stroke_width: u32,
    filled: bool,
    color: Color,
}

impl DrawCircle<'_> {
    /// Sets the circle's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the circle's stroke width.
    ///
    /// By default, a stroke width of 1 is used.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }

    /// Fills the circle instead of only drawing its outline.
    pub fn filled(&mut self) -> &mut Self {
        self.filled = true;
        self
    }
}

impl Drop for DrawCircle<'_> {
    fn drop(&mut self) {
        let top_left = Point {
            x: self.x - (self.diameter / 2) as i32,
            y: self.y - (self.diameter / 2) as i32,
        };
        let circle = primitives::Circle {
            top_left,
            diameter: self.diameter,
        };
        let style = if self.filled {
            PrimitiveStyle::with_fill(self.color)
        } else {
            PrimitiveStyle::with_stroke(self.color, self.stroke_width)
        };
        match circle.into_styled(style).draw(&mut Target(&mut *self.image)) {
            Ok(_) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Draws a marker onto an image.
///
/// This can be used to visualize landmarks or points of interest.
pub fn marker(image: &mut Image, x: i32, y: i32) -> DrawMarker<'_> {
    DrawMarker {
        image,
        x,
        y,
        color: Color::RED,
        size: 5,
    }
}

/// Draws a line onto an image.
pub fn line(image: &mut Image, start_x: i32, start_y: i32, end_x: i32, end_y: i32) -> DrawLine<'_> {
    DrawLine {
        image,
        start: Point::new(start_x, start_y),
        end: Point::new(end_x, end_y),
        color: Color::BLUE,
        stroke_width: 1,
    }
}

/// Draws a text string onto an image.
///
/// By default, the text is drawn centered horizontally and vertically around `x` and `y`.
pub fn text<'a>(image: &'a mut Image, x: i32, y: i32, text: &'a str) -> DrawText<'a> {
    DrawText {
        image,
        x,
        y,
        text,
        color: Color::RED,
        font: &ascii::FONT_6X10,
        alignment: Alignment::Center,
        baseline: Baseline::Middle,
    }
}

/// Draws a circle onto an image.
pub fn circle(image: &mut Image, x: i32, y: i32, diameter: u32) -> DrawCircle<'_> {
    DrawCircle {
        image,
        x,
        y,
        diameter,
        stroke_width: 1,
        filled: false,
        color: Color::GREEN,
    }
}

struct Target<'a>(&'a mut Image);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: Size {
                width: self.0.width(),
                height: self.0.height(),
            },
        }
    }
}

impl DrawTarget for Target<'_> {
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0 && point.y >= 0 {
                self.0.set(point.x as u32, point.y as u32, color);
            }
        }

        Ok(())
    }
}
