//! `WfaInfo` stream header (component E).
//!
//! Field order and the magic/release framing are taken verbatim from
//! `codec/wfa.h`'s `wfa_info_t` and `codec/dfiasco.c`'s parse sequence:
//! magic, release byte, then the header fields in declaration order.

use crate::bitio::{BitReader, BitWriter};
use crate::error::{Error, Result};
use crate::image::ChromaFormat;
use crate::rpf::{Rpf, RpfRange};

const MAGIC: &[u8; 6] = b"FIASCO";

fn read_cstring(r: &mut BitReader) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let b = r.get_bits(8)? as u8;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    String::from_utf8(bytes).map_err(|_| Error::malformed("header", "non-UTF-8 string field"))
}

fn write_cstring(w: &mut BitWriter, s: &str) {
    for b in s.as_bytes() {
        w.put_bits(*b as u32, 8);
    }
    w.put_bits(0, 8);
}

fn read_rpf(r: &mut BitReader) -> Result<Rpf> {
    let mantissa_bits = r.get_bits(4)? as u8;
    if !(2..=8).contains(&mantissa_bits) {
        return Err(Error::malformed("header", "rpf mantissa_bits out of range"));
    }
    let range_code = r.get_bits(2)? as u8;
    let range = RpfRange::from_code(range_code)
        .ok_or_else(|| Error::malformed("header", "unknown rpf range code"))?;
    Ok(Rpf::new(mantissa_bits, range))
}

fn write_rpf(w: &mut BitWriter, rpf: Rpf) {
    w.put_bits(rpf.mantissa_bits as u32, 4);
    w.put_bits(rpf.range.code() as u32, 2);
}

/// Stream-wide, read-only-after-open header. Shared across every frame
/// (spec.md §3: "a `WfaInfo` record ... is owned by the stream and
/// shared (read-only) across frames").
#[derive(Debug, Clone)]
pub struct WfaInfo {
    pub release: u8,
    pub title: String,
    pub comment: String,
    pub width: u32,
    pub height: u32,
    pub color: bool,
    pub frames: u32,
    pub fps: f64,
    pub p_min_level: u8,
    pub p_max_level: u8,
    pub search_range: u16,
    pub half_pixel: bool,
    pub cross_b_search: bool,
    pub b_as_past_ref: bool,
    pub smoothing: i32,
    pub max_states: u32,
    pub chroma_max_states: u32,
    pub rpf: Rpf,
    pub dc_rpf: Rpf,
    pub d_rpf: Rpf,
    pub d_dc_rpf: Rpf,
}

impl WfaInfo {
    pub fn basis_name_and_info(r: &mut BitReader) -> Result<(WfaInfo, String)> {
        let info = WfaInfo::read(r)?;
        if info.release == 2 {
            r.input_byte_align();
        }
        let basis_name = read_cstring(r)?;
        Ok((info, basis_name))
    }

    pub fn read(r: &mut BitReader) -> Result<WfaInfo> {
        let mut magic = [0u8; 6];
        for slot in magic.iter_mut() {
            *slot = r.get_bits(8)? as u8;
        }
        if &magic != MAGIC {
            return Err(Error::malformed("header", "bad magic"));
        }
        let release = r.get_bits(8)? as u8;
        if release != 1 && release != 2 {
            return Err(Error::Unsupported(format!("unknown release {release}")));
        }

        let title = read_cstring(r)?;
        let comment = read_cstring(r)?;
        let width = r.get_bits(16)?;
        let height = r.get_bits(16)?;
        let color = r.get_bit()? != 0;
        let frames = r.get_bits(32)?;
        let fps_x1000 = r.get_bits(16)?;
        let p_min_level = r.get_bits(5)? as u8;
        let p_max_level = r.get_bits(5)? as u8;
        let search_range = r.get_bits(16)? as u16;
        let half_pixel = r.get_bit()? != 0;
        let cross_b_search = r.get_bit()? != 0;
        let b_as_past_ref = r.get_bit()? != 0;
        let smoothing = r.get_bits(8)? as i32;
        let max_states = r.get_bits(16)?;
        let chroma_max_states = r.get_bits(16)?;
        let rpf = read_rpf(r)?;
        let dc_rpf = read_rpf(r)?;
        let d_rpf = read_rpf(r)?;
        let d_dc_rpf = read_rpf(r)?;

        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(Error::malformed("header", "width/height must be positive even numbers"));
        }

        Ok(WfaInfo {
            release,
            title,
            comment,
            width,
            height,
            color,
            frames,
            fps: fps_x1000 as f64 / 1000.0,
            p_min_level,
            p_max_level,
            search_range,
            half_pixel,
            cross_b_search,
            b_as_past_ref,
            smoothing,
            max_states,
            chroma_max_states,
            rpf,
            dc_rpf,
            d_rpf,
            d_dc_rpf,
        })
    }

    pub fn write(&self, w: &mut BitWriter) {
        for &b in MAGIC {
            w.put_bits(b as u32, 8);
        }
        w.put_bits(self.release as u32, 8);
        write_cstring(w, &self.title);
        write_cstring(w, &self.comment);
        w.put_bits(self.width, 16);
        w.put_bits(self.height, 16);
        w.put_bit(self.color as u8);
        w.put_bits(self.frames, 32);
        w.put_bits((self.fps * 1000.0).round() as u32, 16);
        w.put_bits(self.p_min_level as u32, 5);
        w.put_bits(self.p_max_level as u32, 5);
        w.put_bits(self.search_range as u32, 16);
        w.put_bit(self.half_pixel as u8);
        w.put_bit(self.cross_b_search as u8);
        w.put_bit(self.b_as_past_ref as u8);
        w.put_bits(self.smoothing as u32, 8);
        w.put_bits(self.max_states, 16);
        w.put_bits(self.chroma_max_states, 16);
        write_rpf(w, self.rpf);
        write_rpf(w, self.dc_rpf);
        write_rpf(w, self.d_rpf);
        write_rpf(w, self.d_dc_rpf);
        if self.release == 2 {
            w.output_byte_align();
        }
    }

    pub fn format(&self) -> ChromaFormat {
        // Only 4:2:0 color streams exist in this codec; 4:4:4 is an
        // output-only option selected via DecoderOptions.
        if self.color {
            ChromaFormat::Yuv420
        } else {
            ChromaFormat::Yuv444
        }
    }

    /// Returns the first field name that differs between two headers
    /// from the set that must match for concatenation to be legal
    /// (spec.md §4.E); `None` if the streams are concatenation-compatible.
    /// `basis_name` is checked separately by the caller, since it lives on
    /// [`crate::container::ContainerReader`] rather than on `WfaInfo`.
    pub fn concat_mismatch(&self, other: &WfaInfo) -> Option<&'static str> {
        if self.rpf != other.rpf {
            return Some("rpf");
        }
        if self.dc_rpf != other.dc_rpf {
            return Some("dc_rpf");
        }
        if self.d_rpf != other.d_rpf {
            return Some("d_rpf");
        }
        if self.d_dc_rpf != other.d_dc_rpf {
            return Some("d_dc_rpf");
        }
        if self.smoothing != other.smoothing {
            return Some("smoothing");
        }
        if self.max_states != other.max_states {
            return Some("max_states");
        }
        if self.chroma_max_states != other.chroma_max_states {
            return Some("chroma_max_states");
        }
        if self.p_min_level != other.p_min_level {
            return Some("p_min_level");
        }
        if self.p_max_level != other.p_max_level {
            return Some("p_max_level");
        }
        if (self.fps - other.fps).abs() > 1e-9 {
            return Some("fps");
        }
        if self.half_pixel != other.half_pixel {
            return Some("half_pixel");
        }
        if self.b_as_past_ref != other.b_as_past_ref {
            return Some("b_as_past_ref");
        }
        if self.width != other.width {
            return Some("width");
        }
        if self.height != other.height {
            return Some("height");
        }
        if self.color != other.color {
            return Some("color");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WfaInfo {
        WfaInfo {
            release: 2,
            title: "t".into(),
            comment: "c".into(),
            width: 64,
            height: 64,
            color: true,
            frames: 10,
            fps: 25.0,
            p_min_level: 2,
            p_max_level: 10,
            search_range: 16,
            half_pixel: true,
            cross_b_search: false,
            b_as_past_ref: true,
            smoothing: 40,
            max_states: 500,
            chroma_max_states: 200,
            rpf: Rpf::new(6, RpfRange::R1_00),
            dc_rpf: Rpf::new(6, RpfRange::R1_50),
            d_rpf: Rpf::new(4, RpfRange::R0_75),
            d_dc_rpf: Rpf::new(4, RpfRange::R2_00),
        }
    }

    #[test]
    fn header_round_trips_with_basis_name() {
        let info = sample();
        let mut w = BitWriter::new();
        info.write(&mut w);
        w.output_byte_align();
        write_cstring(&mut w, "basis.fco");
        let bytes = w.into_bytes();

        let mut r = BitReader::new(&bytes);
        let (read_back, basis_name) = WfaInfo::basis_name_and_info(&mut r).unwrap();
        assert_eq!(read_back.width, 64);
        assert_eq!(read_back.smoothing, 40);
        assert_eq!(basis_name, "basis.fco");
    }

    #[test]
    fn bad_magic_is_malformed() {
        let mut w = BitWriter::new();
        for b in b"NOTFCO" {
            w.put_bits(*b as u32, 8);
        }
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        assert!(WfaInfo::read(&mut r).is_err());
    }

    #[test]
    fn concat_mismatch_detects_changed_smoothing() {
        let a = sample();
        let mut b = sample();
        b.smoothing = 10;
        assert_eq!(a.concat_mismatch(&b), Some("smoothing"));
        assert_eq!(a.concat_mismatch(&a.clone()), None);
    }

    #[test]
    fn concat_mismatch_detects_changed_rpf() {
        let a = sample();
        let mut b = sample();
        b.dc_rpf = Rpf::new(7, RpfRange::R2_00);
        assert_eq!(a.concat_mismatch(&b), Some("dc_rpf"));
    }
}
