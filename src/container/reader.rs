//! Per-frame parsing (component E): Rice-coded header tuple, then an
//! arithmetic-coded tree/edge/weight/motion payload.
//!
//! Grounded in `codec/dfiasco.c`'s frame loop and `codec/wfa.h`'s field
//! order. The Rice code (k=8, spec.md §6) carries only the three header
//! fields; everything else — tree shape, edge lists, RPF-quantized
//! weights, motion vectors, DC predictions — is arithmetic-coded, one
//! adaptive frequency model per field kind, persisted across frames on
//! the `ContainerReader` so each model keeps learning for the life of
//! the stream (the teacher's `RangeCoder` instead keeps a fixed
//! state-transition table; see `arith.rs`'s module doc for why FIASCO's
//! model is adaptive-by-count instead).

use crate::arith::{ArithDecoder, ArithEncoder, Model};
use crate::bitio::{BitReader, BitWriter};
use crate::constants::{DomainType, MAXEDGES, MAXLEVEL, RANGE};
use crate::error::{Error, Result};
use crate::ricecode;
use crate::rpf::Rpf;
use crate::wfa::mv::{MotionVector, MvType};
use crate::wfa::{FrameType, Wfa};

/// Rice parameter for the frame header tuple (spec.md §6).
const HEADER_RICE_K: u32 = 8;

pub fn frame_type_from_code(code: u32) -> Result<FrameType> {
    match code {
        0 => Ok(FrameType::I),
        1 => Ok(FrameType::P),
        2 => Ok(FrameType::B),
        _ => Err(Error::malformed("reader", "unknown frame type code")),
    }
}

pub fn frame_type_code(ft: FrameType) -> u32 {
    match ft {
        FrameType::I => 0,
        FrameType::P => 1,
        FrameType::B => 2,
    }
}

/// The Rice-coded tuple at the start of every frame block.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub states_delta: u32,
    pub frame_type: FrameType,
    pub display_number: u32,
}

pub fn read_frame_header(r: &mut BitReader) -> Result<FrameHeader> {
    let states_delta = ricecode::read(r, HEADER_RICE_K)?;
    let frame_type = frame_type_from_code(ricecode::read(r, HEADER_RICE_K)?)?;
    let display_number = ricecode::read(r, HEADER_RICE_K)?;
    r.input_byte_align();
    Ok(FrameHeader {
        states_delta,
        frame_type,
        display_number,
    })
}

pub fn write_frame_header(w: &mut BitWriter, header: FrameHeader) {
    ricecode::write(w, header.states_delta, HEADER_RICE_K);
    ricecode::write(w, frame_type_code(header.frame_type), HEADER_RICE_K);
    ricecode::write(w, header.display_number, HEADER_RICE_K);
    w.output_byte_align();
}

/// Persistent adaptive models for the tree/edge/weight/motion payload,
/// one instance per open stream (§4.D: "models are per-context frequency
/// tables updated by count").
pub struct Models {
    level: Model,
    is_auxiliary: Model,
    use_domain: Model,
    final_hi: Model,
    final_lo: Model,
    is_range: Model,
    child_hi: Model,
    child_lo: Model,
    has_prediction: Model,
    prediction_hi: Model,
    prediction_lo: Model,
    edge_count: Model,
    domain_hi: Model,
    domain_lo: Model,
    weight_sign: Model,
    weight_mantissa: Model,
    mv_present: Model,
    mv_type: Model,
    mv_component: Model,
    prediction: Model,
}

impl Models {
    pub fn new(rpf: Rpf) -> Self {
        Models {
            level: Model::new(MAXLEVEL + 1),
            is_auxiliary: Model::new_binary(),
            use_domain: Model::new_binary(),
            final_hi: Model::new(256),
            final_lo: Model::new(256),
            is_range: Model::new_binary(),
            child_hi: Model::new(256),
            child_lo: Model::new(256),
            has_prediction: Model::new_binary(),
            prediction_hi: Model::new(256),
            prediction_lo: Model::new(256),
            edge_count: Model::new(MAXEDGES + 1),
            domain_hi: Model::new(256),
            domain_lo: Model::new(256),
            weight_sign: Model::new_binary(),
            weight_mantissa: Model::new(rpf.levels_usize()),
            mv_present: Model::new_binary(),
            mv_type: Model::new(3),
            mv_component: Model::new(256),
            prediction: Model::new(256),
        }
    }
}

fn encode_u16(enc: &mut ArithEncoder, hi: &mut Model, lo: &mut Model, v: u16) {
    enc.encode_symbol(hi, (v >> 8) as usize);
    enc.encode_symbol(lo, (v & 0xFF) as usize);
}

fn decode_u16(dec: &mut ArithDecoder, hi: &mut Model, lo: &mut Model) -> u16 {
    let h = dec.decode_symbol(hi) as u16;
    let l = dec.decode_symbol(lo) as u16;
    (h << 8) | l
}

/// `models.mv_type`'s alphabet is exactly `{Forward, Backward,
/// Interpolated}`; `None` is handled separately by `mv_present`.
fn mv_type_code(t: MvType) -> usize {
    match t {
        MvType::Forward => 0,
        MvType::Backward => 1,
        MvType::Interpolated => 2,
        MvType::None => unreachable!("None is gated by mv_present, never encoded here"),
    }
}

fn mv_type_from_code(c: usize) -> MvType {
    match c {
        0 => MvType::Forward,
        1 => MvType::Backward,
        _ => MvType::Interpolated,
    }
}

fn encode_mv_component(enc: &mut ArithEncoder, m: &mut Model, v: i32) {
    let clamped = v.clamp(-128, 127);
    enc.encode_symbol(m, (clamped as i8 as u8) as usize);
}

fn decode_mv_component(dec: &mut ArithDecoder, m: &mut Model) -> i32 {
    dec.decode_symbol(m) as u8 as i8 as i32
}

/// Decodes `new_states` freshly-allocated states (ids
/// `[wfa.basis_states_at_frame_start, wfa.basis_states_at_frame_start +
/// new_states)`) from `dec` into `wfa`, using and updating `models`.
#[allow(clippy::too_many_arguments)]
pub fn read_tree_payload(
    dec: &mut ArithDecoder,
    wfa: &mut Wfa,
    models: &mut Models,
    rpf: Rpf,
    new_states: usize,
    frame_type: FrameType,
    has_motion: bool,
) -> Result<()> {
    for _ in 0..new_states {
        let level = dec.decode_symbol(&mut models.level) as u8;
        let aux = dec.decode_bit(&mut models.is_auxiliary);
        let use_domain = dec.decode_bit(&mut models.use_domain);
        let mut bits = 0u8;
        if aux {
            bits |= DomainType::AUXILIARY.bits();
        }
        if use_domain {
            bits |= DomainType::USE_DOMAIN.bits();
        }
        let id = wfa.new_state(level, DomainType::from_bits(bits))?;

        let final_q = decode_u16(dec, &mut models.final_hi, &mut models.final_lo) as i16;
        wfa.final_distribution[id] = final_q as f64 / 8.0;

        for label in 0..2 {
            let is_range = dec.decode_bit(&mut models.is_range);
            if !is_range {
                let child = decode_u16(dec, &mut models.child_hi, &mut models.child_lo);
                if child as usize >= wfa.states {
                    return Err(Error::malformed("reader", "child id not yet allocated"));
                }
                wfa.tree[id][label] = child as i32;
                continue;
            }
            wfa.tree[id][label] = RANGE;
            let edge_count = dec.decode_symbol(&mut models.edge_count);
            for _ in 0..edge_count {
                let domain = decode_u16(dec, &mut models.domain_hi, &mut models.domain_lo);
                let sign = dec.decode_bit(&mut models.weight_sign);
                let mantissa = dec.decode_symbol(&mut models.weight_mantissa) as u32;
                let weight = rpf.decode(sign, mantissa);
                let int_weight = rpf.int_weight(weight);
                wfa.append_edge(id, label, domain as i32, weight, int_weight)?;
            }

            if dec.decode_bit(&mut models.has_prediction) {
                let child = decode_u16(dec, &mut models.prediction_hi, &mut models.prediction_lo);
                if child as usize >= wfa.states {
                    return Err(Error::malformed("reader", "ND prediction child id not yet allocated"));
                }
                wfa.set_child_prediction(id, label, child as i32)?;
            }

            if has_motion && matches!(frame_type, FrameType::P | FrameType::B) {
                let present = dec.decode_bit(&mut models.mv_present);
                if present {
                    let kind = mv_type_from_code(dec.decode_symbol(&mut models.mv_type));
                    let mv = match kind {
                        MvType::Forward => {
                            let fx = decode_mv_component(dec, &mut models.mv_component);
                            let fy = decode_mv_component(dec, &mut models.mv_component);
                            MotionVector::forward(fx, fy)
                        }
                        MvType::Backward => {
                            let bx = decode_mv_component(dec, &mut models.mv_component);
                            let by = decode_mv_component(dec, &mut models.mv_component);
                            MotionVector::backward(bx, by)
                        }
                        MvType::Interpolated => {
                            let fx = decode_mv_component(dec, &mut models.mv_component);
                            let fy = decode_mv_component(dec, &mut models.mv_component);
                            let bx = decode_mv_component(dec, &mut models.mv_component);
                            let by = decode_mv_component(dec, &mut models.mv_component);
                            MotionVector::interpolated(fx, fy, bx, by)
                        }
                        MvType::None => MotionVector::NONE,
                    };
                    wfa.mv_tree[id][label] = mv;
                }
            }

            if matches!(frame_type, FrameType::I) {
                let pred = dec.decode_symbol(&mut models.prediction) as u8;
                wfa.prediction[id][label] = pred;
            }
        }
    }
    Ok(())
}

/// The encode-side dual of [`read_tree_payload`], used by unit tests to
/// build round-trippable fixtures (spec.md §8 property 2).
#[allow(clippy::too_many_arguments)]
pub fn write_tree_payload(
    enc: &mut ArithEncoder,
    wfa: &Wfa,
    models: &mut Models,
    rpf: Rpf,
    from: usize,
    to: usize,
    frame_type: FrameType,
    has_motion: bool,
) {
    for id in from..to {
        enc.encode_symbol(&mut models.level, wfa.level_of_state[id] as usize);
        enc.encode_bit(&mut models.is_auxiliary, wfa.domain_type[id].is_auxiliary());
        enc.encode_bit(&mut models.use_domain, wfa.domain_type[id].use_domain());

        let final_q = (wfa.final_distribution[id] * 8.0).round() as i32;
        let final_q = final_q.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        encode_u16(enc, &mut models.final_hi, &mut models.final_lo, final_q as u16);

        for label in 0..2 {
            let tree_entry = wfa.tree[id][label];
            if crate::constants::ischild(tree_entry) {
                enc.encode_bit(&mut models.is_range, false);
                encode_u16(enc, &mut models.child_hi, &mut models.child_lo, tree_entry as u16);
                continue;
            }
            enc.encode_bit(&mut models.is_range, true);
            let edges = &wfa.into[id][label];
            let edge_count = edges.iter().take_while(|&&e| crate::constants::isedge(e)).count();
            enc.encode_symbol(&mut models.edge_count, edge_count);
            for e in 0..edge_count {
                encode_u16(enc, &mut models.domain_hi, &mut models.domain_lo, edges[e] as u16);
                let (sign, mantissa) = rpf.encode(wfa.weight[id][label][e]);
                enc.encode_bit(&mut models.weight_sign, sign);
                enc.encode_symbol(&mut models.weight_mantissa, mantissa as usize);
            }

            let prediction = wfa.child_prediction[id][label];
            let has_prediction = crate::constants::isedge(prediction);
            enc.encode_bit(&mut models.has_prediction, has_prediction);
            if has_prediction {
                encode_u16(enc, &mut models.prediction_hi, &mut models.prediction_lo, prediction as u16);
            }

            if has_motion && matches!(frame_type, FrameType::P | FrameType::B) {
                let mv = wfa.mv_tree[id][label];
                let present = !mv.is_none();
                enc.encode_bit(&mut models.mv_present, present);
                if present {
                    enc.encode_symbol(&mut models.mv_type, mv_type_code(mv.kind));
                    match mv.kind {
                        MvType::Forward => {
                            encode_mv_component(enc, &mut models.mv_component, mv.fx);
                            encode_mv_component(enc, &mut models.mv_component, mv.fy);
                        }
                        MvType::Backward => {
                            encode_mv_component(enc, &mut models.mv_component, mv.bx);
                            encode_mv_component(enc, &mut models.mv_component, mv.by);
                        }
                        MvType::Interpolated => {
                            encode_mv_component(enc, &mut models.mv_component, mv.fx);
                            encode_mv_component(enc, &mut models.mv_component, mv.fy);
                            encode_mv_component(enc, &mut models.mv_component, mv.bx);
                            encode_mv_component(enc, &mut models.mv_component, mv.by);
                        }
                        MvType::None => {}
                    }
                }
            }

            if matches!(frame_type, FrameType::I) {
                enc.encode_symbol(&mut models.prediction, wfa.prediction[id][label] as usize);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DomainType;
    use crate::rpf::RpfRange;

    #[test]
    fn frame_header_round_trips() {
        let header = FrameHeader {
            states_delta: 12,
            frame_type: FrameType::P,
            display_number: 7,
        };
        let mut w = BitWriter::new();
        write_frame_header(&mut w, header);
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        let back = read_frame_header(&mut r).unwrap();
        assert_eq!(back.states_delta, 12);
        assert_eq!(back.display_number, 7);
        assert!(matches!(back.frame_type, FrameType::P));
    }

    #[test]
    fn tree_payload_round_trips_for_an_i_frame() {
        let rpf = Rpf::new(5, RpfRange::R1_00);
        let mut wfa = Wfa::empty();
        let s0 = wfa.new_state(0, DomainType::NONE).unwrap();
        wfa.final_distribution[s0] = 128.0;
        wfa.freeze_basis();

        let s1 = wfa.new_state(2, DomainType::NONE).unwrap();
        wfa.append_edge(s1, 0, s0 as i32, 0.4, rpf.int_weight(0.4)).unwrap();
        wfa.tree[s1][1] = s0 as i32;
        wfa.prediction[s1][0] = 5;

        let mut enc_models = Models::new(rpf);
        let mut enc = ArithEncoder::new();
        write_tree_payload(&mut enc, &wfa, &mut enc_models, rpf, wfa.basis_states, wfa.states, FrameType::I, false);
        let bytes = enc.finish();

        let mut dec_wfa = Wfa::empty();
        let s0b = dec_wfa.new_state(0, DomainType::NONE).unwrap();
        dec_wfa.final_distribution[s0b] = 128.0;
        dec_wfa.freeze_basis();

        let mut dec_models = Models::new(rpf);
        let mut dec = ArithDecoder::new(&bytes).unwrap();
        read_tree_payload(&mut dec, &mut dec_wfa, &mut dec_models, rpf, 1, FrameType::I, false).unwrap();

        assert_eq!(dec_wfa.into[s1][0][0], s0 as i32);
        assert_eq!(dec_wfa.tree[s1][1], s0 as i32);
        assert_eq!(dec_wfa.prediction[s1][0], 5);
        assert!((dec_wfa.weight[s1][0][0] - 0.4).abs() < 0.1);
    }

    #[test]
    fn nd_prediction_round_trips_through_the_bitstream() {
        let rpf = Rpf::new(5, RpfRange::R1_00);
        let mut wfa = Wfa::empty();
        let s0 = wfa.new_state(0, DomainType::NONE).unwrap();
        wfa.final_distribution[s0] = 128.0;
        wfa.freeze_basis();

        let s1 = wfa.new_state(2, DomainType::NONE).unwrap();
        wfa.append_edge(s1, 0, s0 as i32, 0.2, rpf.int_weight(0.2)).unwrap();
        wfa.set_child_prediction(s1, 0, s0 as i32).unwrap();

        let mut enc_models = Models::new(rpf);
        let mut enc = ArithEncoder::new();
        write_tree_payload(&mut enc, &wfa, &mut enc_models, rpf, wfa.basis_states, wfa.states, FrameType::I, false);
        let bytes = enc.finish();

        let mut dec_wfa = Wfa::empty();
        let s0b = dec_wfa.new_state(0, DomainType::NONE).unwrap();
        dec_wfa.final_distribution[s0b] = 128.0;
        dec_wfa.freeze_basis();

        let mut dec_models = Models::new(rpf);
        let mut dec = ArithDecoder::new(&bytes).unwrap();
        read_tree_payload(&mut dec, &mut dec_wfa, &mut dec_models, rpf, 1, FrameType::I, false).unwrap();

        assert_eq!(dec_wfa.child_prediction[s1][0], s0 as i32);
        assert_eq!(dec_wfa.child_prediction[s1][1], crate::constants::NO_EDGE);
    }
}
