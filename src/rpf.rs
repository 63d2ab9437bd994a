//! Reduced-precision float quantizer/dequantizer (component B).
//!
//! See spec.md §4.B. Four `Rpf` instances are frame-invariant and live on
//! `WfaInfo` (standard/DC weights, and their delta variants).

use crate::bitio::{BitReader, BitWriter};

/// Allowed magnitude intervals for an RPF, per `fiasco_rpf_range_e` in the
/// original `fiasco.h`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RpfRange {
    R0_75,
    R1_00,
    R1_50,
    R2_00,
}

impl RpfRange {
    pub fn value(self) -> f64 {
        match self {
            RpfRange::R0_75 => 0.75,
            RpfRange::R1_00 => 1.00,
            RpfRange::R1_50 => 1.50,
            RpfRange::R2_00 => 2.00,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => RpfRange::R0_75,
            1 => RpfRange::R1_00,
            2 => RpfRange::R1_50,
            3 => RpfRange::R2_00,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            RpfRange::R0_75 => 0,
            RpfRange::R1_00 => 1,
            RpfRange::R1_50 => 2,
            RpfRange::R2_00 => 3,
        }
    }
}

/// A parameterised reduced-precision float quantizer.
///
/// Quantizes a real in `[-range, range]` to a sign bit plus a
/// `mantissa_bits`-wide magnitude code, and dequantizes via midpoint
/// reconstruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rpf {
    pub mantissa_bits: u8,
    pub range: RpfRange,
}

impl Rpf {
    pub fn new(mantissa_bits: u8, range: RpfRange) -> Self {
        debug_assert!((2..=8).contains(&mantissa_bits));
        Rpf {
            mantissa_bits,
            range,
        }
    }

    fn levels(self) -> u32 {
        1u32 << (self.mantissa_bits as u32 + 1)
    }

    /// Number of distinct mantissa codes, as an arithmetic-coder
    /// alphabet size (used by the container reader's `weight_mantissa`
    /// model).
    pub fn levels_usize(self) -> usize {
        self.levels() as usize
    }

    /// Quantizes `x` to a `(sign, mantissa)` pair. `x` is clamped into
    /// `[-range, range]` before quantization.
    pub fn encode(self, x: f64) -> (bool, u32) {
        let range = self.range.value();
        let clamped = x.clamp(-range, range);
        let sign = clamped < 0.0;
        let magnitude = clamped.abs();
        let levels = self.levels();
        let step = range / levels as f64;
        let mut q = (magnitude / step) as u32;
        if q >= levels {
            q = levels - 1;
        }
        (sign, q)
    }

    /// Reconstructs the real value approximated by `(sign, q)`, using
    /// midpoint reconstruction: the decoded value is the centre of the
    /// quantization bucket `q` fell into.
    pub fn decode(self, sign: bool, q: u32) -> f64 {
        let range = self.range.value();
        let levels = self.levels();
        let step = range / levels as f64;
        let magnitude = (q as f64 + 0.5) * step;
        if sign {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Bits needed to store the mantissa code on the wire.
    pub fn mantissa_width(self) -> u32 {
        self.mantissa_bits as u32 + 1
    }

    pub fn read(self, r: &mut BitReader) -> crate::error::Result<f64> {
        let sign = r.get_bit()? != 0;
        let q = r.get_bits(self.mantissa_width())?;
        Ok(self.decode(sign, q))
    }

    pub fn write(self, w: &mut BitWriter, x: f64) {
        let (sign, q) = self.encode(x);
        w.put_bit(sign as u8);
        w.put_bits(q, self.mantissa_width());
    }

    /// `round(decode(encode(x)) * 512)`, the Q10 fixed-point integer
    /// weight stored alongside each edge (spec.md §4.B).
    pub fn int_weight(self, x: f64) -> i32 {
        let (sign, q) = self.encode(x);
        let dequantized = self.decode(sign, q);
        (dequantized * 512.0).round() as i32
    }
}
