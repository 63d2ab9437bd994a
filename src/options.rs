//! Decoder output options (smoothing, magnification, format).
//!
//! Mirrors `fiasco_d_options_t`'s setters in `codec/options.c`: every
//! setter validates its argument range immediately rather than deferring
//! to first use, the way the teacher's `ConfigRecord` validates fields up
//! front rather than at decode time.

use crate::error::{Error, Result};
use crate::image::ChromaFormat;

/// Smoothing factor range, inclusive. `-1` selects the stream's
/// recorded default (`WfaInfo`'s `smoothing` field); `0` disables
/// smoothing; `(0, 100]` blends partition-straddling rows/columns
/// (spec.md §4.J).
pub const SMOOTHING_RANGE: std::ops::RangeInclusive<i32> = -1..=100;

/// Legal magnification levels: negative values shrink by `2^-n`,
/// positive values enlarge by `2^n`.
pub const MAGNIFICATION_RANGE: std::ops::RangeInclusive<i32> = -2..=2;

const MIN_DIMENSION: u32 = 32;
const MAX_DIMENSION: u32 = 2048;

#[derive(Debug, Clone, Copy)]
pub struct DecoderOptions {
    smoothing: i32,
    magnification: i32,
    format: ChromaFormat,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        DecoderOptions {
            smoothing: -1,
            magnification: 0,
            format: ChromaFormat::Yuv444,
        }
    }
}

impl DecoderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_smoothing(&mut self, value: i32) -> Result<()> {
        if !SMOOTHING_RANGE.contains(&value) {
            return Err(Error::out_of_bounds(
                "smoothing",
                format!("{value} not in {SMOOTHING_RANGE:?}"),
            ));
        }
        self.smoothing = value;
        Ok(())
    }

    pub fn smoothing(&self) -> i32 {
        self.smoothing
    }

    pub fn set_magnification(&mut self, value: i32) -> Result<()> {
        if !MAGNIFICATION_RANGE.contains(&value) {
            return Err(Error::out_of_bounds(
                "magnification",
                format!("{value} not in {MAGNIFICATION_RANGE:?}"),
            ));
        }
        self.magnification = value;
        Ok(())
    }

    pub fn magnification(&self) -> i32 {
        self.magnification
    }

    pub fn set_format(&mut self, format: ChromaFormat) {
        self.format = format;
    }

    pub fn format(&self) -> ChromaFormat {
        self.format
    }

    /// Applies `magnification` to a base `(width, height)`, clamping the
    /// *effective* magnification level toward 0 until both dimensions fit
    /// `[32, 2048]` (spec.md §6: "clamped so that neither dimension falls
    /// below 32 or exceeds 2048"). A right-shifted dimension is rounded up
    /// to the next even value, matching spec.md §8 property 5's "rounded
    /// up to even".
    pub fn scaled_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let mut mag = self.magnification;
        loop {
            let (w, h) = Self::apply_magnification(width, height, mag);
            let fits = (MIN_DIMENSION..=MAX_DIMENSION).contains(&w) && (MIN_DIMENSION..=MAX_DIMENSION).contains(&h);
            if fits || mag == 0 {
                return (w.clamp(MIN_DIMENSION, MAX_DIMENSION), h.clamp(MIN_DIMENSION, MAX_DIMENSION));
            }
            mag -= mag.signum();
        }
    }

    fn apply_magnification(width: u32, height: u32, mag: i32) -> (u32, u32) {
        let scale = |d: u32| -> u32 {
            if mag >= 0 {
                d << mag
            } else {
                let shifted = d >> (-mag);
                shifted + (shifted % 2)
            }
        };
        (scale(width), scale(height))
    }

    /// Resolves an effective smoothing factor against the stream's
    /// recorded default when `-1` ("use stream default") was selected.
    pub fn effective_smoothing(&self, stream_default: i32) -> i32 {
        if self.smoothing == -1 {
            stream_default
        } else {
            self.smoothing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoothing_out_of_range_is_rejected() {
        let mut opts = DecoderOptions::new();
        assert!(opts.set_smoothing(101).is_err());
        assert!(opts.set_smoothing(-2).is_err());
        assert!(opts.set_smoothing(100).is_ok());
    }

    #[test]
    fn magnification_clamps_against_dimension_bounds() {
        let mut opts = DecoderOptions::new();
        opts.set_magnification(2).unwrap();
        // 1024 << 2 would be 4096, past MAX_DIMENSION; the effective
        // magnification is clamped down to 1 (1024 << 1 == 2048) instead
        // of erroring.
        assert_eq!(opts.scaled_dimensions(1024, 1024), (2048, 2048));
        assert_eq!(opts.scaled_dimensions(64, 64), (256, 256));
    }

    #[test]
    fn negative_magnification_rounds_shifted_dimension_up_to_even() {
        let mut opts = DecoderOptions::new();
        opts.set_magnification(-1).unwrap();
        // 65 >> 1 == 32 (already even); 67 >> 1 == 33, rounded up to 34.
        assert_eq!(opts.scaled_dimensions(65, 67), (32, 34));
    }

    #[test]
    fn magnification_clamps_toward_zero_until_minimum_dimension_fits() {
        let mut opts = DecoderOptions::new();
        opts.set_magnification(-2).unwrap();
        // 40 >> 2 == 10, below MIN_DIMENSION; clamps up to -1 (40 >> 1 ==
        // 20, still below 32), then to 0 (40, within range).
        assert_eq!(opts.scaled_dimensions(40, 40), (40, 40));
    }

    #[test]
    fn negative_smoothing_falls_back_to_stream_default() {
        let opts = DecoderOptions::new();
        assert_eq!(opts.effective_smoothing(42), 42);
    }
}
