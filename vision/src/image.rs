//! Image primitives.
//!
//! Screen captures and templates are held as a lightweight owned RGB image
//! (`OwnedImage`). Matching and OCR borrow a view (`Image<'a>`) so a single
//! capture can be cropped and inspected without copying pixels.

use std::path::Path;

use anyhow::{Context, Result};

/// Owned RGB image (no alpha).
#[derive(Clone, Debug)]
pub struct OwnedImage {
    width: u32,
    height: u32,
    data: Vec<Color>,
}

impl OwnedImage {
    /// Build an `OwnedImage` from RGBA bytes (alpha is discarded).
    ///
    /// The buffer is expected to be tightly packed: `width * height * 4` bytes.
    pub fn from_rgba(width: usize, bytes: &[u8]) -> Self {
        let height = bytes.len() / width.max(1) / 4;
        let data = bytes
            .chunks_exact(4)
            .take(width * height)
            .map(|v| Color::new(v[0], v[1], v[2]))
            .collect::<Vec<_>>();

        Self {
            width: width as u32,
            height: height as u32,
            data,
        }
    }

    /// Build an image by evaluating `f` for every pixel.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> Color) -> Self {
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Decode an image file (any format `image` understands).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let img = image::open(path)
            .with_context(|| format!("decode {}", path.display()))?
            .to_rgb8();
        let (width, height) = img.dimensions();
        let data = img
            .pixels()
            .map(|p| Color::new(p.0[0], p.0[1], p.0[2]))
            .collect();

        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Resize this image to exactly `width` x `height`.
    ///
    /// Uses `fast_image_resize` (SIMD-optimized) with a box filter, so an
    /// integer downscale averages whole pixel blocks.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let (width, height) = (width.max(1), height.max(1));
        if (self.width, self.height) == (width, height) || self.width == 0 || self.height == 0 {
            return Ok(());
        }

        // SAFETY: `Color` is `#[repr(C)]` with 3 x `u8`, so it is layout-compatible
        // with `fast_image_resize::pixels::U8x3` (alignment 1).
        let src_pixels = unsafe {
            std::slice::from_raw_parts(
                self.data.as_ptr() as *const fast_image_resize::pixels::U8x3,
                self.data.len(),
            )
        };

        let src = fast_image_resize::images::ImageRef::from_pixels(self.width, self.height, src_pixels)
            .context("wrap source pixels for resize")?;

        let mut dst = fast_image_resize::images::Image::new(width, height, fast_image_resize::PixelType::U8x3);

        let mut resizer = fast_image_resize::Resizer::new();
        let options = fast_image_resize::ResizeOptions::new().resize_alg(
            fast_image_resize::ResizeAlg::Convolution(fast_image_resize::FilterType::Box),
        );

        resizer
            .resize(&src, &mut dst, &Some(options))
            .context("resize image")?;

        let bytes: Vec<u8> = dst.into_vec();
        self.data = bytes
            .chunks_exact(3)
            .map(|px| Color::new(px[0], px[1], px[2]))
            .collect();
        self.width = width;
        self.height = height;
        Ok(())
    }

    #[inline]
    pub fn resized(mut self, width: u32, height: u32) -> Result<Self> {
        self.resize(width, height)?;
        Ok(self)
    }

    /// Shrink by an integer `factor` on both axes.
    ///
    /// Trailing rows and columns that do not fill a whole block are dropped,
    /// so every output pixel covers exactly `factor` x `factor` input pixels.
    pub fn downscaled(self, factor: u32) -> Result<Self> {
        let factor = factor.max(1);
        if factor == 1 {
            return Ok(self);
        }
        let (w, h) = (self.width / factor, self.height / factor);
        let cropped = if (w * factor, h * factor) == (self.width, self.height) {
            self
        } else {
            self.as_image().sub_image(0, 0, w * factor, h * factor).to_owned_image()
        };
        cropped.resized(w, h)
    }

    /// Create a borrowed view of this entire image.
    pub fn as_image(&self) -> Image<'_> {
        Image {
            x1: 0,
            y1: 0,
            x2: self.width,
            y2: self.height,
            true_width: self.width,
            data: &self.data,
        }
    }
}

// ----------

/// Borrowed image view into an `OwnedImage`.
#[derive(Clone, Copy)]
pub struct Image<'a> {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
    true_width: u32,
    data: &'a [Color],
}

impl<'a> Image<'a> {
    #[inline(always)]
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    #[inline(always)]
    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    #[inline(always)]
    fn pixel(&self, x: u32, y: u32) -> &Color {
        &self.data[(x + y * self.true_width) as usize]
    }

    pub fn to_owned_image(self) -> OwnedImage {
        let mut data = Vec::with_capacity((self.width() * self.height()) as usize);
        for y in self.y1..self.y2 {
            for x in self.x1..self.x2 {
                data.push(*self.pixel(x, y));
            }
        }

        OwnedImage {
            width: self.width(),
            height: self.height(),
            data,
        }
    }

    /// Tightly packed RGB bytes of this view.
    pub fn get_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity((self.width() * self.height() * 3) as usize);
        for y in self.y1..self.y2 {
            for x in self.x1..self.x2 {
                let clr = self.pixel(x, y);
                bytes.extend_from_slice(&[clr.r, clr.g, clr.b]);
            }
        }
        bytes
    }

    /// Convert to a grayscale `GrayImage` (luma).
    pub fn to_gray_image(&self) -> image::GrayImage {
        image::GrayImage::from_fn(self.width(), self.height(), |x, y| {
            image::Luma([self.pixel(self.x1 + x, self.y1 + y).luma()])
        })
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let img = image::RgbImage::from_raw(self.width(), self.height(), self.get_bytes())
            .context("RgbImage::from_raw failed")?;
        img.save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("save png {}", path.display()))?;
        Ok(())
    }

    /// Create an arbitrary subimage (relative coordinates).
    pub fn sub_image(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let x = x.min(self.width());
        let y = y.min(self.height());
        let width = width.min(self.width() - x);
        let height = height.min(self.height() - y);

        Self {
            x1: self.x1 + x,
            y1: self.y1 + y,
            x2: self.x1 + x + width,
            y2: self.y1 + y + height,
            true_width: self.true_width,
            data: self.data,
        }
    }
}

// ----------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0);

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    #[inline]
    pub const fn gray(v: u8) -> Self {
        Self::new(v, v, v)
    }

    /// Compute luma (grayscale intensity).
    pub fn luma(&self) -> u8 {
        let r = self.r as u32;
        let g = self.g as u32;
        let b = self.b as u32;
        ((299 * r + 587 * g + 114 * b) / 1000) as u8
    }
}
