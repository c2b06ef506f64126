use image::{imageops, DynamicImage, Rgba, RgbaImage};

use crate::format::PixelFormat;

/// Colour returned for queries against an image with nothing loaded.
pub const DEFAULT_PIXEL: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// One CPU-visible raster layer, always RGBA8 row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    pixels: RgbaImage,
    src_bit_depth: Option<u32>,
    opaque: bool,
}

impl Picture {
    /// Fully transparent picture.
    pub fn transparent(width: u32, height: u32) -> Self {
        Self::from_image(RgbaImage::new(width, height), None)
    }

    pub fn from_image(pixels: RgbaImage, src_bit_depth: Option<u32>) -> Self {
        let opaque = pixels.pixels().all(|pixel| pixel[3] == u8::MAX);
        Self {
            pixels,
            src_bit_depth,
            opaque,
        }
    }

    /// Wraps an RGBA8 buffer; `None` when the buffer does not cover `width` x `height`.
    pub fn from_rgba8(
        width: u32,
        height: u32,
        data: Vec<u8>,
        src_bit_depth: Option<u32>,
    ) -> Option<Self> {
        RgbaImage::from_raw(width, height, data).map(|pixels| Self::from_image(pixels, src_bit_depth))
    }

    /// Normalises any decoded raster to RGBA8, remembering the source depth.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let depth = u32::from(image.color().bits_per_pixel());
        Self::from_image(image.into_rgba8(), Some(depth))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn src_bit_depth(&self) -> Option<u32> {
        self.src_bit_depth
    }

    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Pixel at `(x, y)`, or `None` outside the picture.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.pixels.get_pixel_checked(x, y).copied()
    }

    pub fn as_rgba8(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Pixel format of the in-memory buffer.
    pub fn format(&self) -> PixelFormat {
        PixelFormat::R8G8B8A8
    }

    /// Copies `source` into this picture with its top-left corner at `(x, y)`,
    /// replacing rather than blending. Pixels falling outside are clipped.
    pub fn blit(&mut self, source: &Picture, x: u32, y: u32) {
        imageops::replace(&mut self.pixels, &source.pixels, i64::from(x), i64::from(y));
        self.opaque = self.pixels.pixels().all(|pixel| pixel[3] == u8::MAX);
    }

    pub fn rotate90(&mut self, anticlockwise: bool) {
        self.pixels = if anticlockwise {
            imageops::rotate270(&self.pixels)
        } else {
            imageops::rotate90(&self.pixels)
        };
    }

    pub fn flip(&mut self, horizontal: bool) {
        if horizontal {
            imageops::flip_horizontal_in_place(&mut self.pixels);
        } else {
            imageops::flip_vertical_in_place(&mut self.pixels);
        }
    }
}
