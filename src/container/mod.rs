//! FIASCO container: stream header, basis file, per-frame parsing
//! (component E).

pub mod basis;
pub mod header;
pub mod reader;

use crate::arith::ArithDecoder;
use crate::bitio::BitReader;
use crate::error::{Error, Result};
use crate::wfa::Wfa;

pub use header::WfaInfo;
pub use reader::{FrameHeader, Models};

/// Owns the stream's `WfaInfo`, the loaded basis automaton, and the
/// Rice/arithmetic cursor positioned at the next frame block.
///
/// Grounded in `codec/dfiasco.c`'s construction order: `alloc_wfa ->
/// open_wfa -> read_basis -> alloc_dfiasco`. Unlike the teacher's
/// `Decoder`, which borrows the whole annex-B buffer it demuxes, this
/// reader owns its cursor outright, so [`crate::api::Decoder`] can hold
/// one without a self-referential struct.
pub struct ContainerReader {
    pub info: WfaInfo,
    pub basis_name: String,
    pub basis: Wfa,
    reader: BitReader,
    models: Models,
}

impl ContainerReader {
    pub fn open(stream: impl AsRef<[u8]>, basis_bytes: &[u8]) -> Result<Self> {
        let mut reader = BitReader::new(stream);
        let (info, basis_name) = WfaInfo::basis_name_and_info(&mut reader)?;
        let basis = basis::load_basis(basis_bytes)?;
        let models = Models::new(info.rpf);
        Ok(ContainerReader {
            info,
            basis_name,
            basis,
            reader,
            models,
        })
    }

    /// Parses the next frame block into `wfa` (which must already hold
    /// at least the basis states — typically `wfa` is reused between
    /// calls and truncated back to the basis here). Returns the frame's
    /// display number.
    pub fn parse_next_frame(&mut self, wfa: &mut Wfa) -> Result<u32> {
        if wfa.basis_states == 0 {
            wfa.copy_from(&self.basis);
        }
        let header = reader::read_frame_header(&mut self.reader)?;
        wfa.remove_states(wfa.basis_states);
        wfa.frame_type = header.frame_type;
        wfa.color = self.info.color;

        let payload = self.reader.remaining();
        let mut dec = ArithDecoder::new(payload)?;
        reader::read_tree_payload(
            &mut dec,
            wfa,
            &mut self.models,
            self.info.rpf,
            header.states_delta as usize,
            header.frame_type,
            true,
        )?;
        if wfa.states == 0 {
            return Err(Error::malformed("container", "frame declares zero states"));
        }
        wfa.root_state = (wfa.states - 1) as i32;

        log::trace!(
            "frame: display={} type={:?} states_delta={}",
            header.display_number,
            header.frame_type,
            header.states_delta
        );

        let consumed = dec.bytes_consumed();
        self.reader.skip_bytes(consumed);
        Ok(header.display_number)
    }

    /// Attempts to move onto a concatenated stream segment once the
    /// current segment's declared frame count has been fully consumed
    /// (spec.md §4.E, §8 property/scenario S3: "concatenating two ...
    /// videos with identical geometry, RPFs, and basis yields a stream
    /// whose `next_frame()` sequence is the first video's then the
    /// second video's frames in order").
    ///
    /// Returns `Ok(false)` at true end-of-stream (no bytes remain).
    /// Returns `Err` if trailing bytes exist but do not form a
    /// concatenation-compatible segment: a release-1 stream (§6:
    /// "Release-1 streams ... cannot be concatenated"), a mismatched
    /// basis filename, a mismatched field from [`WfaInfo::concat_mismatch`],
    /// or a malformed header.
    ///
    /// On success, `self.info`/`self.models` are replaced with the new
    /// segment's — the adaptive arithmetic models reset because each
    /// segment was encoded independently before the two byte streams
    /// were concatenated (property 1's round-trip test concatenates
    /// *encoded* streams, not live decoder state).
    pub fn try_advance_segment(&mut self) -> Result<bool> {
        if self.reader.remaining().is_empty() {
            return Ok(false);
        }
        if self.info.release == 1 {
            return Err(Error::Unsupported(
                "release-1 streams cannot be concatenated".into(),
            ));
        }
        let (new_info, new_basis_name) = WfaInfo::basis_name_and_info(&mut self.reader)?;
        if new_basis_name != self.basis_name {
            return Err(Error::Unsupported(format!(
                "concatenated segment basis `{new_basis_name}` differs from `{}`",
                self.basis_name
            )));
        }
        if let Some(field) = self.info.concat_mismatch(&new_info) {
            return Err(Error::Unsupported(format!(
                "concatenated segment's `{field}` differs from the preceding segment"
            )));
        }
        log::debug!("container: advancing to concatenated segment ({} frames)", new_info.frames);
        self.models = Models::new(new_info.rpf);
        self.info = new_info;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arith::ArithEncoder;
    use crate::bitio::BitWriter;
    use crate::constants::DomainType;
    use crate::rpf::{Rpf, RpfRange};

    fn sample_info(frames: u32) -> WfaInfo {
        WfaInfo {
            release: 2,
            title: String::new(),
            comment: String::new(),
            width: 4,
            height: 4,
            color: false,
            frames,
            fps: 25.0,
            p_min_level: 0,
            p_max_level: 10,
            search_range: 0,
            half_pixel: false,
            cross_b_search: false,
            b_as_past_ref: false,
            smoothing: 0,
            max_states: 10,
            chroma_max_states: 10,
            rpf: Rpf::new(6, RpfRange::R1_00),
            dc_rpf: Rpf::new(6, RpfRange::R1_00),
            d_rpf: Rpf::new(6, RpfRange::R1_00),
            d_dc_rpf: Rpf::new(6, RpfRange::R1_00),
        }
    }

    fn one_state_basis_bytes(rpf: Rpf) -> Vec<u8> {
        let mut w = BitWriter::new();
        for &b in b"Fiasco" {
            w.put_bits(b as u32, 8);
        }
        w.put_bits(rpf.mantissa_bits as u32, 4);
        w.put_bits(rpf.range.code() as u32, 2);
        w.put_bits(1, 16); // basis_states
        w.put_bits(0, 5); // level
        w.put_bits(0, 2); // domain_type
        w.put_bits((128i32 * 256) as u32, 32); // final_distribution
        for _ in 0..2 {
            w.put_bit(1); // range
            w.put_bits(0, 3); // 0 edges
        }
        w.into_bytes()
    }

    /// Builds one `FIASCO`-stream segment: header, basis filename, then
    /// `frames` single-state I-frames each covering the whole 4x4 image
    /// (spec.md §4.E round-trip fixture for concatenation, S3).
    fn segment_bytes(info: &WfaInfo, basis_name: &str) -> Vec<u8> {
        let mut w = BitWriter::new();
        info.write(&mut w);
        for b in basis_name.as_bytes() {
            w.put_bits(*b as u32, 8);
        }
        w.put_bits(0, 8);

        let mut models = Models::new(info.rpf);
        for display in 0..info.frames {
            let mut wfa = Wfa::empty();
            let s0 = wfa.new_state(0, DomainType::NONE).unwrap();
            wfa.final_distribution[s0] = 128.0;
            wfa.freeze_basis();
            let root = wfa.new_state(4, DomainType::NONE).unwrap();
            for label in 0..2 {
                wfa.append_edge(root, label, s0 as i32, 1.0, 1 << 10).unwrap();
            }
            wfa.root_state = root as i32;

            reader::write_frame_header(
                &mut w,
                FrameHeader {
                    states_delta: 1,
                    frame_type: FrameType::I,
                    display_number: display,
                },
            );
            let mut enc = ArithEncoder::new();
            reader::write_tree_payload(&mut enc, &wfa, &mut models, info.rpf, 1, 2, FrameType::I, false);
            let bytes = enc.finish();
            for b in &bytes {
                w.put_bits(*b as u32, 8);
            }
        }
        w.into_bytes()
    }

    #[test]
    fn concatenated_segments_decode_in_sequence() {
        let info_a = sample_info(2);
        let info_b = sample_info(3);
        let basis_bytes = one_state_basis_bytes(info_a.rpf);

        let mut stream = segment_bytes(&info_a, "basis.fco");
        stream.extend(segment_bytes(&info_b, "basis.fco"));

        let mut container = ContainerReader::open(&stream, &basis_bytes).unwrap();
        assert_eq!(container.info.frames, 2);

        let mut wfa = Wfa::empty();
        wfa.copy_from(&container.basis);
        let mut seen = Vec::new();
        for _ in 0..info_a.frames {
            seen.push(container.parse_next_frame(&mut wfa).unwrap());
        }
        assert!(container.try_advance_segment().unwrap());
        assert_eq!(container.info.frames, 3);
        for _ in 0..info_b.frames {
            seen.push(container.parse_next_frame(&mut wfa).unwrap());
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 2]);
        assert!(!container.try_advance_segment().unwrap());
    }

    #[test]
    fn mismatched_rpf_segment_is_rejected() {
        let info_a = sample_info(1);
        let mut info_b = sample_info(1);
        info_b.dc_rpf = Rpf::new(7, RpfRange::R2_00);
        let basis_bytes = one_state_basis_bytes(info_a.rpf);

        let mut stream = segment_bytes(&info_a, "basis.fco");
        stream.extend(segment_bytes(&info_b, "basis.fco"));

        let mut container = ContainerReader::open(&stream, &basis_bytes).unwrap();
        let mut wfa = Wfa::empty();
        wfa.copy_from(&container.basis);
        container.parse_next_frame(&mut wfa).unwrap();
        assert!(container.try_advance_segment().is_err());
    }
}
