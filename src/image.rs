//! Image/plane model (component G).
//!
//! Pixels are stored as `(v - 128) * 16`, a 16-bit signed fixed-point
//! representation (spec.md §3) chosen so that the decoder engine's
//! packed-add optimization (§4.H) and motion compensation's half-pixel
//! averaging never need saturation checks mid-computation — only the
//! final write-out clamps back into `[0, 255]`.

use std::rc::Rc;

use crate::error::{Error, Result};

/// Chroma subsampling scheme. Luma is always full resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaFormat {
    Yuv444,
    Yuv420,
}

/// One 16-bit signed sample plane (`(v-128)*16` representation).
#[derive(Debug, Clone)]
pub struct Plane {
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub samples: Vec<i16>,
}

impl Plane {
    pub fn alloc(width: usize, height: usize) -> Self {
        Plane {
            width,
            height,
            stride: width,
            samples: vec![0; width * height],
        }
    }

    pub fn same_type(&self, other: &Plane) -> bool {
        self.width == other.width && self.height == other.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> i16 {
        self.samples[y * self.stride + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: i16) {
        self.samples[y * self.stride + x] = v;
    }

    /// Returns a tightly-strided copy cropped to `(w, h)` from the
    /// top-left corner, used after the decoder engine's synthesis pass
    /// overshoots to the next even multiple of the requested size
    /// (spec.md §4.H step 6).
    pub fn crop_to(&self, w: usize, h: usize) -> Plane {
        debug_assert!(w <= self.width && h <= self.height);
        let mut out = Plane::alloc(w, h);
        for row in 0..h {
            let src = &self.samples[row * self.stride..row * self.stride + w];
            out.samples[row * w..row * w + w].copy_from_slice(src);
        }
        out
    }
}

/// An image: one gray plane, or Y/Cb/Cr with the chroma planes
/// quarter-resolution in 4:2:0 (spec.md §3). Reference-counted so a
/// B-frame promoted into the sequencer's `future` slot can be shared
/// without a deep copy (supplemented from `lib/image.h`'s
/// `reference_count` field).
#[derive(Debug, Clone)]
pub struct Image {
    pub width: usize,
    pub height: usize,
    pub color: bool,
    pub format: ChromaFormat,
    pub y: Plane,
    pub cb: Option<Plane>,
    pub cr: Option<Plane>,
}

impl Image {
    pub fn alloc_gray(width: usize, height: usize) -> Self {
        debug_assert!(width % 2 == 0 && height % 2 == 0);
        Image {
            width,
            height,
            color: false,
            format: ChromaFormat::Yuv444,
            y: Plane::alloc(width, height),
            cb: None,
            cr: None,
        }
    }

    pub fn alloc_color(width: usize, height: usize, format: ChromaFormat) -> Self {
        debug_assert!(width % 2 == 0 && height % 2 == 0);
        let (cw, ch) = match format {
            ChromaFormat::Yuv444 => (width, height),
            ChromaFormat::Yuv420 => (width / 2, height / 2),
        };
        Image {
            width,
            height,
            color: true,
            format,
            y: Plane::alloc(width, height),
            cb: Some(Plane::alloc(cw, ch)),
            cr: Some(Plane::alloc(cw, ch)),
        }
    }

    pub fn same_type(&self, other: &Image) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.color == other.color
            && self.format == other.format
    }

    pub fn deep_clone(&self) -> Image {
        self.clone()
    }

    /// Shares this image cheaply (pointer clone), mirroring
    /// `clone_image`'s reference-count bump in `lib/image.c`.
    pub fn share(self: &Rc<Image>) -> Rc<Image> {
        Rc::clone(self)
    }

    pub fn crop_to(&self, w: usize, h: usize) -> Image {
        Image {
            width: w,
            height: h,
            color: self.color,
            format: self.format,
            y: self.y.crop_to(w, h),
            cb: self.cb.as_ref().map(|p| match self.format {
                ChromaFormat::Yuv444 => p.crop_to(w, h),
                ChromaFormat::Yuv420 => p.crop_to(w / 2, h / 2),
            }),
            cr: self.cr.as_ref().map(|p| match self.format {
                ChromaFormat::Yuv444 => p.crop_to(w, h),
                ChromaFormat::Yuv420 => p.crop_to(w / 2, h / 2),
            }),
        }
    }

    /// Converts the stored `(v-128)*16` planes to interleaved 8-bit RGB
    /// (for PNM output only; spec.md §4.G: "for analysis only").
    pub fn to_rgb8(&self) -> Result<Vec<u8>> {
        if !self.color {
            let mut out = Vec::with_capacity(self.width * self.height * 3);
            for &y in &self.y.samples {
                let v = unscale(y);
                out.push(v);
                out.push(v);
                out.push(v);
            }
            return Ok(out);
        }
        let cb_plane = self
            .cb
            .as_ref()
            .ok_or_else(|| Error::malformed("image", "color image missing Cb plane"))?;
        let cr_plane = self
            .cr
            .as_ref()
            .ok_or_else(|| Error::malformed("image", "color image missing Cr plane"))?;

        let mut out = Vec::with_capacity(self.width * self.height * 3);
        for row in 0..self.height {
            for col in 0..self.width {
                let (cx, cy) = match self.format {
                    ChromaFormat::Yuv444 => (col, row),
                    ChromaFormat::Yuv420 => (col / 2, row / 2),
                };
                let y = unscale(self.y.get(col, row)) as f64;
                let cb = unscale(cb_plane.get(cx, cy)) as f64 - 128.0;
                let cr = unscale(cr_plane.get(cx, cy)) as f64 - 128.0;

                let r = y + 1.4022 * cr;
                let g = y - 0.3456 * cb - 0.7145 * cr;
                let b = y + 1.7710 * cb;

                out.push(clamp_u8(r));
                out.push(clamp_u8(g));
                out.push(clamp_u8(b));
            }
        }
        Ok(out)
    }

    /// Converts an interleaved 8-bit RGB buffer (from a PNM reader) into
    /// the decoder's native `(v-128)*16` plane representation, per
    /// spec.md §4.G's RGB->YCbCr matrix.
    pub fn from_rgb8(width: usize, height: usize, rgb: &[u8], format: ChromaFormat) -> Result<Image> {
        if rgb.len() != width * height * 3 {
            return Err(Error::malformed(
                "image",
                format!(
                    "rgb buffer length {} does not match {}x{}x3",
                    rgb.len(),
                    width,
                    height
                ),
            ));
        }
        let mut img = Image::alloc_color(width, height, format);
        for row in 0..height {
            for col in 0..width {
                let idx = (row * width + col) * 3;
                let r = rgb[idx] as f64;
                let g = rgb[idx + 1] as f64;
                let b = rgb[idx + 2] as f64;

                let yv = 0.2989 * r + 0.5866 * g + 0.1145 * b - 128.0;
                let cb = -0.1687 * r - 0.3312 * g + 0.5000 * b;
                let cr = 0.5000 * r - 0.4183 * g - 0.0816 * b;

                img.y.set(col, row, scale(yv));
                if matches!(format, ChromaFormat::Yuv444) {
                    img.cb.as_mut().unwrap().set(col, row, scale(cb));
                    img.cr.as_mut().unwrap().set(col, row, scale(cr));
                } else if col % 2 == 0 && row % 2 == 0 {
                    img.cb.as_mut().unwrap().set(col / 2, row / 2, scale(cb));
                    img.cr.as_mut().unwrap().set(col / 2, row / 2, scale(cr));
                }
            }
        }
        Ok(img)
    }
}

#[inline]
fn scale(v: f64) -> i16 {
    (v * 16.0).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

#[inline]
fn unscale(v: i16) -> u8 {
    let real = v as f64 / 16.0 + 128.0;
    clamp_u8(real)
}

#[inline]
fn clamp_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_round_trip_through_rgb_is_close() {
        let mut img = Image::alloc_gray(4, 4);
        img.y.set(0, 0, scale(64.0 - 128.0));
        let rgb = img.to_rgb8().unwrap();
        assert_eq!(rgb[0], 64);
    }

    #[test]
    fn color_round_trip_preserves_luma_plane_shape() {
        let rgb = vec![128u8; 4 * 4 * 3];
        let img = Image::from_rgb8(4, 4, &rgb, ChromaFormat::Yuv420).unwrap();
        assert_eq!(img.cb.as_ref().unwrap().width, 2);
        assert_eq!(img.cb.as_ref().unwrap().height, 2);
        let back = img.to_rgb8().unwrap();
        assert_eq!(back.len(), rgb.len());
    }

    #[test]
    fn crop_to_shrinks_without_touching_kept_pixels() {
        let mut img = Image::alloc_gray(8, 8);
        img.y.set(1, 1, 42);
        let cropped = img.crop_to(4, 4);
        assert_eq!(cropped.width, 4);
        assert_eq!(cropped.y.get(1, 1), 42);
    }
}
