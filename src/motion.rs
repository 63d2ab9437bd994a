//! Motion compensation (component I).
//!
//! Grounded in `codec/motion.c`'s `restore_mc`/`extract_mc_block`: for
//! every leaf carrying a motion vector, a reference block is extracted
//! from `past`/`future` (half-pixel bilinear if needed) and added to the
//! already-decoded residual in place.

use crate::decoder::block_dims;
use crate::error::{Error, Result};
use crate::image::{Image, Plane};
use crate::wfa::mv::{MotionVector, MvType};
use crate::wfa::Wfa;

/// Precomputed chroma clipping table, indexed by `sample + 256 + 128`
/// (so the full representable `i16` range used mid-computation maps
/// into `[0, 768)`), clamping the final result into `[-128, 127] * 16`
/// after motion compensation (`codec/motion.c`'s `clipping[768]`, kept
/// as a `Decoder`-instance field per spec.md §5 rather than a process
/// global).
pub struct ChromaClip {
    table: [i16; 768],
}

impl ChromaClip {
    pub fn new() -> Self {
        let mut table = [0i16; 768];
        for (i, slot) in table.iter_mut().enumerate() {
            let real = i as i32 - 256 - 128;
            *slot = real.clamp(-128, 127) as i16 * 16;
        }
        ChromaClip { table }
    }

    #[inline]
    pub fn clip(&self, sample: i16) -> i16 {
        let idx = (sample as i32 + 256 + 128).clamp(0, 767) as usize;
        self.table[idx]
    }
}

impl Default for ChromaClip {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts a `w x h` reference block at `(x, y)` in half-pixel units
/// from `plane`, per spec.md §4.I's half-pixel extraction rules:
/// integer/integer copies, one half-pixel axis averages two neighbors,
/// both half-pixel averages a 2x2 neighborhood.
fn extract_block(plane: &Plane, hx: i32, hy: i32, w: usize, h: usize) -> Result<Vec<i16>> {
    let ix = hx.div_euclid(2);
    let iy = hy.div_euclid(2);
    let half_x = hx.rem_euclid(2) == 1;
    let half_y = hy.rem_euclid(2) == 1;

    let in_bounds = |x: i32, y: i32, extra_w: i32, extra_h: i32| {
        x >= 0 && y >= 0 && (x + w as i32 + extra_w) <= plane.width as i32 && (y + h as i32 + extra_h) <= plane.height as i32
    };
    if !in_bounds(ix, iy, if half_x { 1 } else { 0 }, if half_y { 1 } else { 0 }) {
        return Err(Error::malformed("motion", "reference block out of plane bounds"));
    }

    let mut out = vec![0i16; w * h];
    for row in 0..h {
        for col in 0..w {
            let x = ix + col as i32;
            let y = iy + row as i32;
            let value = match (half_x, half_y) {
                (false, false) => plane.get(x as usize, y as usize) as i32,
                (true, false) => {
                    (plane.get(x as usize, y as usize) as i32 + plane.get(x as usize + 1, y as usize) as i32 + 1) / 2
                }
                (false, true) => {
                    (plane.get(x as usize, y as usize) as i32 + plane.get(x as usize, y as usize + 1) as i32 + 1) / 2
                }
                (true, true) => {
                    let a = plane.get(x as usize, y as usize) as i32;
                    let b = plane.get(x as usize + 1, y as usize) as i32;
                    let c = plane.get(x as usize, y as usize + 1) as i32;
                    let d = plane.get(x as usize + 1, y as usize + 1) as i32;
                    (a + b + c + d + 2) / 4
                }
            };
            out[row * w + col] = value as i16;
        }
    }
    Ok(out)
}

fn reference_block(
    mv: &MotionVector,
    past: Option<&Plane>,
    future: Option<&Plane>,
    x: i32,
    y: i32,
    w: usize,
    h: usize,
) -> Result<Vec<i16>> {
    match mv.kind {
        MvType::None => unreachable!("callers only invoke this for a present motion vector"),
        MvType::Forward => {
            let plane = past.ok_or_else(|| Error::malformed("motion", "forward mv with no past frame"))?;
            extract_block(plane, x * 2 + mv.fx, y * 2 + mv.fy, w, h)
        }
        MvType::Backward => {
            let plane = future.ok_or_else(|| Error::malformed("motion", "backward mv with no future frame"))?;
            extract_block(plane, x * 2 + mv.bx, y * 2 + mv.by, w, h)
        }
        MvType::Interpolated => {
            let p = past.ok_or_else(|| Error::malformed("motion", "interpolated mv with no past frame"))?;
            let f = future.ok_or_else(|| Error::malformed("motion", "interpolated mv with no future frame"))?;
            let fwd = extract_block(p, x * 2 + mv.fx, y * 2 + mv.fy, w, h)?;
            let bwd = extract_block(f, x * 2 + mv.bx, y * 2 + mv.by, w, h)?;
            Ok(fwd
                .iter()
                .zip(bwd.iter())
                .map(|(&a, &b)| (((a as i32 + b as i32 + 1) / 2) as i16))
                .collect())
        }
    }
}

fn restore_state(
    plane: &mut Plane,
    wfa: &Wfa,
    state: usize,
    past: Option<&Plane>,
    future: Option<&Plane>,
    chroma: bool,
    clip: Option<&ChromaClip>,
) -> Result<()> {
    let level = wfa.level_of_state[state];
    if level == 0 {
        return Ok(());
    }
    for label in 0..2 {
        let entry = wfa.tree[state][label];
        if crate::constants::ischild(entry) {
            restore_state(plane, wfa, entry as usize, past, future, chroma, clip)?;
            continue;
        }
        let mv = wfa.mv_tree[state][label];
        if mv.is_none() {
            continue;
        }
        let mv = if chroma { mv.halved_for_chroma() } else { mv };
        let (w, h) = block_dims(level - 1);
        let x = wfa.x[state][label] as i32;
        let y = wfa.y[state][label] as i32;
        let reference = reference_block(&mv, past, future, x, y, w, h)?;
        for row in 0..h {
            for col in 0..w {
                let px = x as usize + col;
                let py = y as usize + row;
                let mut sum = plane.get(px, py) as i32 + reference[row * w + col] as i32;
                if let Some(clip) = clip {
                    sum = clip.clip(sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16) as i32;
                }
                plane.set(px, py, sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
            }
        }
    }
    Ok(())
}

/// Adds motion-compensated reference blocks to every motion-bearing
/// leaf's already-decoded residual in `frame`, for a P/B frame. `frame`
/// must already carry the coordinates assigned by
/// [`crate::wfa::Wfa::assign_coordinates`].
pub fn restore_mc(
    frame: &mut Image,
    wfa: &Wfa,
    past: Option<&Image>,
    future: Option<&Image>,
    clip: &ChromaClip,
) -> Result<()> {
    if wfa.root_state < 0 {
        return Ok(());
    }
    let root = wfa.root_state as usize;

    if !wfa.is_color() {
        restore_state(&mut frame.y, wfa, root, past.map(|p| &p.y), future.map(|p| &p.y), false, None)?;
        return Ok(());
    }

    let y_root = wfa.tree[root][0] as usize;
    let chroma_root = wfa.tree[root][1] as usize;
    let cb_root = wfa.tree[chroma_root][0] as usize;
    let cr_root = wfa.tree[chroma_root][1] as usize;

    restore_state(&mut frame.y, wfa, y_root, past.map(|p| &p.y), future.map(|p| &p.y), false, None)?;

    let past_cb = past.and_then(|p| p.cb.as_ref());
    let future_cb = future.and_then(|p| p.cb.as_ref());
    let past_cr = past.and_then(|p| p.cr.as_ref());
    let future_cr = future.and_then(|p| p.cr.as_ref());

    if let Some(cb) = frame.cb.as_mut() {
        restore_state(cb, wfa, cb_root, past_cb, future_cb, true, Some(clip))?;
    }
    if let Some(cr) = frame.cr.as_mut() {
        restore_state(cr, wfa, cr_root, past_cr, future_cr, true, Some(clip))?;
    }
    Ok(())
}
