//! Edge smoothing along bintree partition boundaries (component J).
//!
//! Grounded in `codec/decoder.c`'s `smooth_image`: the `s < 0.5 || s >=
//! 1` early-return there is the origin of spec.md §7's "silent no-op"
//! contract for an out-of-range smoothing factor.

use crate::constants::block_dims;
use crate::error::Result;
use crate::image::{Image, Plane};
use crate::wfa::Wfa;

/// `alpha = 1 - smoothing/200`, only meaningful for `smoothing in
/// (0, 100]`; any other value (including the sentinel `-1` "use stream
/// default", already resolved by the caller, and `0`) disables
/// smoothing entirely.
fn effective_alpha(smoothing: i32) -> Option<f64> {
    if smoothing > 0 && smoothing <= 100 {
        Some(1.0 - smoothing as f64 / 200.0)
    } else {
        None
    }
}

fn blend(a: i16, b: i16, alpha: f64) -> (i16, i16) {
    let a = a as f64;
    let b = b as f64;
    let new_a = alpha * a + (1.0 - alpha) * b;
    let new_b = (1.0 - alpha) * a + alpha * b;
    (new_a.round() as i16, new_b.round() as i16)
}

fn smooth_state(plane: &mut Plane, wfa: &Wfa, state: usize, alpha: f64) {
    let level = wfa.level_of_state[state];
    if level == 0 {
        return;
    }
    let (w, h) = block_dims(level);
    let x0 = wfa.x[state][0] as usize;
    let y0 = wfa.y[state][0] as usize;

    if level % 2 == 1 {
        // Odd level: the long axis is height, so the split (and the
        // seam smoothing straddles) is horizontal.
        let seam = y0 + h / 2;
        if seam == 0 || seam >= plane.height {
            return;
        }
        for col in x0..(x0 + w).min(plane.width) {
            let (new_top, new_bot) = blend(plane.get(col, seam - 1), plane.get(col, seam), alpha);
            plane.set(col, seam - 1, new_top);
            plane.set(col, seam, new_bot);
        }
    } else {
        let seam = x0 + w / 2;
        if seam == 0 || seam >= plane.width {
            return;
        }
        for row in y0..(y0 + h).min(plane.height) {
            let (new_left, new_right) = blend(plane.get(seam - 1, row), plane.get(seam, row), alpha);
            plane.set(seam - 1, row, new_left);
            plane.set(seam, row, new_right);
        }
    }
}

/// Blends every non-basis luma state's partition seam, in place. Chroma
/// planes are left untouched, as in the original (`joint_chroma_root`
/// bounds the luma-only state range, spec.md §4.J).
pub fn smooth_image(image: &mut Image, wfa: &Wfa, joint_chroma_root: usize, smoothing: i32) -> Result<()> {
    let alpha = match effective_alpha(smoothing) {
        Some(a) => a,
        None => return Ok(()),
    };
    let bound = joint_chroma_root.min(wfa.states);
    for state in wfa.basis_states..bound {
        smooth_state(&mut image.y, wfa, state, alpha);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DomainType;

    fn wfa_with_one_vertical_seam() -> (Wfa, usize) {
        let mut wfa = Wfa::empty();
        let s0 = wfa.new_state(0, DomainType::NONE).unwrap();
        wfa.final_distribution[s0] = 128.0;
        wfa.freeze_basis();
        let root = wfa.new_state(2, DomainType::NONE).unwrap(); // even level -> vertical seam
        wfa.assign_coordinates(root);
        wfa.root_state = root as i32;
        (wfa, root)
    }

    #[test]
    fn alpha_one_half_is_its_own_inverse_and_equalizes_the_seam() {
        let (wfa, root) = wfa_with_one_vertical_seam();
        let mut image = Image::alloc_gray(4, 4);
        let seam = wfa.x[root][1] as usize;
        image.y.set(seam - 1, 0, 0);
        image.y.set(seam, 0, 100);

        smooth_image(&mut image, &wfa, wfa.states, 100).unwrap(); // alpha = 0.5
        assert_eq!(image.y.get(seam - 1, 0), image.y.get(seam, 0));
    }

    #[test]
    fn alpha_one_is_the_identity() {
        let (wfa, root) = wfa_with_one_vertical_seam();
        let mut image = Image::alloc_gray(4, 4);
        let seam = wfa.x[root][1] as usize;
        image.y.set(seam - 1, 0, 10);
        image.y.set(seam, 0, 90);

        smooth_image(&mut image, &wfa, wfa.states, 1).unwrap(); // alpha = 1 - 1/200 != 1, pick 1/200 boundary instead
        // smoothing=1 gives alpha=0.995, not exactly identity; verify the
        // true identity case directly instead.
        let (left, right) = blend(10, 90, 1.0);
        assert_eq!(left, 10);
        assert_eq!(right, 90);
    }

    #[test]
    fn out_of_range_smoothing_is_a_silent_no_op() {
        let (wfa, root) = wfa_with_one_vertical_seam();
        let mut image = Image::alloc_gray(4, 4);
        let seam = wfa.x[root][1] as usize;
        image.y.set(seam - 1, 0, 10);
        image.y.set(seam, 0, 90);

        smooth_image(&mut image, &wfa, wfa.states, 0).unwrap();
        assert_eq!(image.y.get(seam - 1, 0), 10);
        assert_eq!(image.y.get(seam, 0), 90);

        smooth_image(&mut image, &wfa, wfa.states, 150).unwrap();
        assert_eq!(image.y.get(seam - 1, 0), 10);
        assert_eq!(image.y.get(seam, 0), 90);
    }
}
