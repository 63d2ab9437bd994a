//! Recursive multi-resolution synthesis (component H, the hardest part).
//!
//! Direct translation of `codec/decoder.c`'s `alloc_state_images` /
//! `compute_state_images` / `decode_image` pipeline, restructured around
//! owned `Rc<[i16]>` per-state blocks (memoized by state ID) instead of
//! the original's raw pointer/offset bookkeeping — the state images this
//! decoder needs are exactly the set reachable from the root by
//! recursion, so a memoizing post-order walk produces the same
//! allocate-then-synthesize result as the original's explicit two-pass
//! (top-down allocate, bottom-up synthesize) scheme without needing a
//! separate allocation pass.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::constants::{block_dims, child_offset, ischild};
use crate::error::{Error, Result};
use crate::image::{ChromaFormat, Image};
use crate::wfa::Wfa;

fn copy_block_into(dst: &mut [i16], dst_w: usize, src: &[i16], src_w: usize, src_h: usize, ox: usize, oy: usize) {
    for row in 0..src_h {
        let d_start = (oy + row) * dst_w + ox;
        let s_start = row * src_w;
        dst[d_start..d_start + src_w].copy_from_slice(&src[s_start..s_start + src_w]);
    }
}

/// Applies a Q10 fixed-point edge weight to one pixel: `(int_weight *
/// pixel) >> 10 << 1`. The trailing `<< 1` always clears bit 0 of the
/// result (spec.md §8 property 4).
#[inline]
fn apply_weight(int_weight: i32, pixel: i16) -> i16 {
    let v = ((int_weight as i64 * pixel as i64) >> 10) as i32;
    (v << 1).clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Accumulates `term` into `dst` (`dst[i] += term[i]` elementwise, or
/// `dst[i] = term[i]` if `first`). For blocks of width >= 2 at level
/// >= 1, two adjacent `i16` samples are packed into one 64-bit word and
/// added in a single operation, each lane given a full 32-bit half
/// (rather than 16) so a carry out of the low lane's sum can never reach
/// the high lane — the packed path must produce results bit-identical to
/// the scalar per-lane `wrapping_add` tail below on every input,
/// including lanes that individually overflow 16 bits (spec.md §4.H /
/// §9's "both a scalar and a packed implementation must produce
/// identical outputs", exercised by §8 property 4).
/// Level-0 (one-pixel) blocks are never packed (spec.md §4.H edge-case
/// policy) and fall through the scalar tail below regardless.
fn accumulate(dst: &mut [i16], term: &[i16], first: bool) {
    debug_assert_eq!(dst.len(), term.len());
    if first {
        dst.copy_from_slice(term);
        return;
    }
    let len = dst.len();
    let mut i = 0;
    while i + 2 <= len {
        let packed_dst = (dst[i] as u16 as u64) | ((dst[i + 1] as u16 as u64) << 32);
        let packed_term = (term[i] as u16 as u64) | ((term[i + 1] as u16 as u64) << 32);
        let sum = packed_dst.wrapping_add(packed_term);
        dst[i] = (sum & 0xFFFF) as u16 as i16;
        dst[i + 1] = ((sum >> 32) & 0xFFFF) as u16 as i16;
        i += 2;
    }
    if i < len {
        dst[i] = dst[i].wrapping_add(term[i]);
    }
}

/// The "constant 1" state's pixel value, in the `(v-128)*16`
/// representation, derived from `final_distribution[0]` (a real gray
/// level, spec.md §3: "state 0 has value ~= 128").
fn state0_value(wfa: &Wfa) -> i16 {
    let v = ((wfa.final_distribution[0] - 128.0) * 16.0).round();
    (v as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

struct Synth<'a> {
    wfa: &'a Wfa,
    cache: HashMap<usize, Rc<[i16]>>,
    visiting: HashSet<usize>,
}

impl<'a> Synth<'a> {
    fn new(wfa: &'a Wfa) -> Self {
        Synth {
            wfa,
            cache: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    fn state(&mut self, state: usize) -> Result<Rc<[i16]>> {
        if let Some(block) = self.cache.get(&state) {
            return Ok(Rc::clone(block));
        }
        if state >= self.wfa.states {
            return Err(Error::malformed("decoder", format!("state id {state} out of range")));
        }
        if !self.visiting.insert(state) {
            return Err(Error::malformed("decoder", format!("cyclic domain reference through state {state}")));
        }

        let level = self.wfa.level_of_state[state];
        let block: Rc<[i16]> = if state == 0 {
            Rc::from(vec![state0_value(self.wfa)])
        } else if level == 0 {
            let v = ((self.wfa.final_distribution[state] * 8.0).round() as i32 * 2)
                .clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            Rc::from(vec![v])
        } else {
            let (w, h) = block_dims(level);
            let mut combined = vec![0i16; w * h];
            for label in 0..2 {
                let (ox, oy) = child_offset(level, label);
                let entry = self.wfa.tree[state][label];
                if ischild(entry) {
                    let child = self.state(entry as usize)?;
                    let (cw, ch) = block_dims(self.wfa.level_of_state[entry as usize]);
                    if child.len() != cw * ch {
                        return Err(Error::malformed("decoder", "child block size mismatch"));
                    }
                    copy_block_into(&mut combined, w, &child, cw, ch, ox, oy);
                } else {
                    let leaf = self.leaf_range(state, label, level)?;
                    let (lw, lh) = block_dims(level - 1);
                    copy_block_into(&mut combined, w, &leaf, lw, lh, ox, oy);
                }
            }
            Rc::from(combined)
        };

        self.visiting.remove(&state);
        self.cache.insert(state, Rc::clone(&block));
        Ok(block)
    }

    /// Evaluates `(state, label)`'s linear combination of domains, one
    /// level lower than `level` (spec.md §4.H steps 5 and its edge-case
    /// policies for `dst == 0`). If an ND prediction is present, the range
    /// starts as a copy of the predicted child's block instead of zero,
    /// and every domain edge accumulates on top of it (spec.md glossary
    /// "ND prediction").
    fn leaf_range(&mut self, state: usize, label: usize, level: u8) -> Result<Vec<i16>> {
        let (w, h) = block_dims(level - 1);
        let count = w * h;
        let edges = self.wfa.into[state][label];
        let int_weights = self.wfa.int_weight[state][label];
        let prediction = self.wfa.child_prediction[state][label];

        let mut result = vec![0i16; count];
        let mut first = true;
        if ischild(prediction) {
            let child = self.state(prediction as usize)?;
            if child.len() != count {
                return Err(Error::malformed(
                    "decoder",
                    format!("ND prediction state {prediction} size {} does not match expected {count}", child.len()),
                ));
            }
            result.copy_from_slice(&child);
            first = false;
        }
        for (e, &dst) in edges.iter().enumerate() {
            if !crate::constants::isedge(dst) {
                break;
            }
            let int_weight = int_weights[e];
            if dst == 0 {
                let dc = state0_value(self.wfa);
                let term = vec![apply_weight(int_weight, dc); count];
                accumulate(&mut result, &term, first);
            } else {
                let domain = self.state(dst as usize)?;
                if domain.len() != count {
                    return Err(Error::malformed(
                        "decoder",
                        format!("domain state {dst} size {} does not match expected {count}", domain.len()),
                    ));
                }
                let term: Vec<i16> = domain.iter().map(|&p| apply_weight(int_weight, p)).collect();
                accumulate(&mut result, &term, first);
            }
            first = false;
        }
        Ok(result)
    }
}

/// Synthesizes the full image a `Wfa` encodes, then crops it down to
/// `(requested_width, requested_height)` if the covering bintree
/// extends past the requested frame size (spec.md §4.H step 6, S4).
pub fn decode_image(wfa: &Wfa, requested_width: usize, requested_height: usize, format: ChromaFormat) -> Result<Image> {
    if wfa.root_state < 0 {
        return Err(Error::malformed("decoder", "wfa has no root state"));
    }
    let mut synth = Synth::new(wfa);

    if !wfa.is_color() {
        let root = wfa.root_state as usize;
        let block = synth.state(root)?;
        let (w, h) = block_dims(wfa.level_of_state[root]);
        let mut img = Image::alloc_gray(w, h);
        img.y.samples.copy_from_slice(&block);
        return Ok(img.crop_to(requested_width, requested_height));
    }

    let root = wfa.root_state as usize;
    let y_root = wfa.tree[root][0];
    let chroma_root = wfa.tree[root][1];
    if !ischild(y_root) || !ischild(chroma_root) {
        return Err(Error::malformed("decoder", "color root must have Y and joint-chroma children"));
    }
    let chroma_root = chroma_root as usize;
    let cb_root = wfa.tree[chroma_root][0];
    let cr_root = wfa.tree[chroma_root][1];
    if !ischild(cb_root) || !ischild(cr_root) {
        return Err(Error::malformed("decoder", "joint-chroma node must have Cb and Cr children"));
    }

    let y_block = synth.state(y_root as usize)?;
    let cb_block = synth.state(cb_root as usize)?;
    let cr_block = synth.state(cr_root as usize)?;

    let (yw, yh) = block_dims(wfa.level_of_state[y_root as usize]);
    let (cbw, cbh) = block_dims(wfa.level_of_state[cb_root as usize]);

    let mut img = Image::alloc_color(yw, yh, format);
    img.y.samples.copy_from_slice(&y_block);
    let expected_chroma = match format {
        ChromaFormat::Yuv444 => (yw, yh),
        ChromaFormat::Yuv420 => (yw / 2, yh / 2),
    };
    if (cbw, cbh) != expected_chroma {
        return Err(Error::malformed("decoder", "chroma plane size does not match declared format"));
    }
    img.cb.as_mut().unwrap().samples.copy_from_slice(&cb_block);
    img.cr.as_mut().unwrap().samples.copy_from_slice(&cr_block);

    Ok(img.crop_to(requested_width, requested_height))
}
