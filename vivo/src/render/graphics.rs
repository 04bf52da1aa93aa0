use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 255);
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self::new(self.r, self.g, self.b, a)
    }

    /// Source-over blend of `self` onto an opaque `dst`.
    pub fn over(self, dst: Rgba) -> Rgba {
        let alpha = self.a as u32;
        let mix = |src: u8, dst: u8| {
            ((src as u32 * alpha + dst as u32 * (255 - alpha) + 127) / 255)
                as u8
        };
        Rgba::new(mix(self.r, dst.r), mix(self.g, dst.g), mix(self.b, dst.b), 255)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

/// A captured block of pixels, row major.
/// Largest width or height a frame buffer may have.
pub const MAX_EXTENT: u32 = 16_384;

/// Pixel count of a `width` x `height` buffer, with both sides clamped to
/// [`MAX_EXTENT`].
pub fn buffer_len(width: u32, height: u32) -> usize {
    let width = width.min(MAX_EXTENT) as usize;
    let height = height.min(MAX_EXTENT) as usize;
    width.checked_mul(height).unwrap_or(0)
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Rgba>,
}

impl Image {
    pub fn new(width: u32, height: u32, fill: Rgba) -> Self {
        Self {
            width: width.min(MAX_EXTENT),
            height: height.min(MAX_EXTENT),
            pixels: vec![fill; buffer_len(width, height)],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = y as usize * self.width as usize + x as usize;
        self.pixels.get(index).copied()
    }
}

/// What the interpreter needs from the drawing backend. Window creation and
/// presentation belong to the host.
pub trait Graphics {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn set_title(&mut self, title: &str);
    fn resize(&mut self, width: u32, height: u32);
    fn hide_cursor(&mut self);
    fn show_cursor(&mut self);

    /// Restores per-frame drawing state (currently the translation) before
    /// the draw entry point runs.
    fn reset_frame(&mut self);
    fn translate(&mut self, dx: i32, dy: i32);

    fn clear(&mut self, color: Rgba);
    fn fill_rect(&mut self, region: Region, color: Rgba);
    fn fill_circle(&mut self, cx: i32, cy: i32, radius: u32, color: Rgba);
    fn draw_line(&mut self, from: (i32, i32), to: (i32, i32), color: Rgba);
    fn draw_text(&mut self, text: &str, x: i32, y: i32, color: Rgba);

    fn capture(&self, region: Region) -> Image;
    fn draw_image(&mut self, image: &Image, x: i32, y: i32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_alpha_white_over_black_is_mid_gray() {
        let blended = Rgba::WHITE.with_alpha(128).over(Rgba::BLACK);
        assert_eq!(blended, Rgba::opaque(128, 128, 128));
    }

    #[test]
    fn opaque_source_replaces_destination() {
        let red = Rgba::opaque(255, 0, 0);
        assert_eq!(red.over(Rgba::WHITE), red);
        assert_eq!(Rgba::TRANSPARENT.over(Rgba::WHITE), Rgba::WHITE);
    }

    #[test]
    fn image_pixel_bounds() {
        let image = Image::new(2, 2, Rgba::WHITE);
        assert_eq!(image.pixel(1, 1), Some(Rgba::WHITE));
        assert_eq!(image.pixel(2, 0), None);
    }
}
