use std::convert::Infallible;

use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, Line, PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};

use crate::render::graphics::{
    Graphics, Image, MAX_EXTENT, Region, Rgba, buffer_len,
};

/// Window changes the script asked for, applied by the host after a frame.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WindowRequests {
    pub title: Option<String>,
    pub size: Option<(u32, u32)>,
    pub cursor_visible: Option<bool>,
}

impl WindowRequests {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.size.is_none()
            && self.cursor_visible.is_none()
    }
}

/// Software RGBA frame buffer. Every pixel is opaque; drawing colors are
/// blended on top with their alpha.
#[derive(Clone, Debug)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
    offset: Point,
    requests: WindowRequests,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.min(MAX_EXTENT),
            height: height.min(MAX_EXTENT),
            pixels: vec![Rgba::BLACK; buffer_len(width, height)],
            offset: Point::zero(),
            requests: WindowRequests::default(),
        }
    }

    /// Resizes the buffer to match the window, without issuing a request.
    /// Contents are not preserved. Each side is clamped to [`MAX_EXTENT`].
    pub fn set_size(&mut self, width: u32, height: u32) {
        let width = width.min(MAX_EXTENT);
        let height = height.min(MAX_EXTENT);
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;
        self.pixels = vec![Rgba::BLACK; buffer_len(width, height)];
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(self.index(x, y)).copied()
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn take_requests(&mut self) -> WindowRequests {
        std::mem::take(&mut self.requests)
    }

    fn blend(&mut self, x: i32, y: i32, color: Rgba) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32
        {
            return;
        }
        let index = self.index(x as u32, y as u32);
        let dst = self.pixels[index];
        self.pixels[index] = color.over(dst);
    }

    fn target(&mut self, alpha: u8) -> BlendTarget<'_> {
        BlendTarget {
            offset: self.offset,
            alpha,
            canvas: self,
        }
    }
}

/// Adapts the canvas to `embedded-graphics`, which has no alpha channel.
struct BlendTarget<'a> {
    canvas: &'a mut Canvas,
    offset: Point,
    alpha: u8,
}

impl OriginDimensions for BlendTarget<'_> {
    fn size(&self) -> Size {
        Size::new(self.canvas.width, self.canvas.height)
    }
}

impl DrawTarget for BlendTarget<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            let point = point + self.offset;
            let rgba = Rgba::new(color.r(), color.g(), color.b(), self.alpha);
            self.canvas.blend(point.x, point.y, rgba);
        }
        Ok(())
    }
}

fn rgb(color: Rgba) -> Rgb888 {
    Rgb888::new(color.r, color.g, color.b)
}

impl Graphics for Canvas {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn set_title(&mut self, title: &str) {
        self.requests.title = Some(title.to_string());
    }

    fn resize(&mut self, width: u32, height: u32) {
        let width = width.clamp(1, MAX_EXTENT);
        let height = height.clamp(1, MAX_EXTENT);
        self.set_size(width, height);
        self.requests.size = Some((width, height));
    }

    fn hide_cursor(&mut self) {
        self.requests.cursor_visible = Some(false);
    }

    fn show_cursor(&mut self) {
        self.requests.cursor_visible = Some(true);
    }

    fn reset_frame(&mut self) {
        self.offset = Point::zero();
    }

    fn translate(&mut self, dx: i32, dy: i32) {
        self.offset += Point::new(dx, dy);
    }

    fn clear(&mut self, color: Rgba) {
        let color = color.with_alpha(255);
        self.pixels.fill(color);
    }

    fn fill_rect(&mut self, region: Region, color: Rgba) {
        let rect = Rectangle::new(
            Point::new(region.x, region.y),
            Size::new(region.width, region.height),
        );
        let _ = rect
            .into_styled(PrimitiveStyle::with_fill(rgb(color)))
            .draw(&mut self.target(color.a));
    }

    fn fill_circle(&mut self, cx: i32, cy: i32, radius: u32, color: Rgba) {
        let circle =
            Circle::with_center(Point::new(cx, cy), radius.saturating_mul(2));
        let _ = circle
            .into_styled(PrimitiveStyle::with_fill(rgb(color)))
            .draw(&mut self.target(color.a));
    }

    fn draw_line(&mut self, from: (i32, i32), to: (i32, i32), color: Rgba) {
        let line = Line::new(Point::new(from.0, from.1), Point::new(to.0, to.1));
        let _ = line
            .into_styled(PrimitiveStyle::with_stroke(rgb(color), 1))
            .draw(&mut self.target(color.a));
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32, color: Rgba) {
        let style = MonoTextStyle::new(&FONT_6X10, rgb(color));
        let _ = Text::with_baseline(text, Point::new(x, y), style, Baseline::Top)
            .draw(&mut self.target(color.a));
    }

    fn capture(&self, region: Region) -> Image {
        let mut image = Image::new(region.width, region.height, Rgba::BLACK);
        for row in 0..image.height {
            for col in 0..image.width {
                let x = region.x + col as i32;
                let y = region.y + row as i32;
                if x < 0 || y < 0 {
                    continue;
                }
                if let Some(pixel) = self.pixel(x as u32, y as u32) {
                    let index = row as usize * image.width as usize + col as usize;
                    image.pixels[index] = pixel;
                }
            }
        }
        image
    }

    fn draw_image(&mut self, image: &Image, x: i32, y: i32) {
        for row in 0..image.height {
            for col in 0..image.width {
                let index = row as usize * image.width as usize + col as usize;
                let Some(&pixel) = image.pixels.get(index) else {
                    return;
                };
                self.blend(x + col as i32, y + row as i32, pixel);
            }
        }
    }
}
