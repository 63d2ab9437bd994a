//! Structural limits of the WFA bintree automaton.
//!
//! See `codec/wfa.h` in the original FIASCO sources: these are the
//! hard-coded array bounds the whole codec is built against.

/// Maximum number of domains contributing to a single range's linear
/// combination, not counting the `NO_EDGE` terminator.
pub const MAXEDGES: usize = 5;

/// Upper bound on the number of states a WFA may hold.
pub const MAXSTATES: usize = 6000;

/// Only bintree partitioning is supported: every state has exactly two
/// labels, `0` and `1`.
pub const MAXLABELS: usize = 2;

/// Deepest bintree level a state may sit at.
pub const MAXLEVEL: usize = 22;

/// Sentinel stored in `into[..]` to terminate the domain list, and in
/// `tree[..]` to mark a leaf (as opposed to a child subtree) range.
pub const NO_EDGE: i32 = -1;

/// Alias of [`NO_EDGE`] used where a `tree[..]` entry denotes "this label
/// is a range, not a child state".
pub const RANGE: i32 = -1;

pub const fn isedge(x: i32) -> bool {
    x != NO_EDGE
}

pub const fn ischild(x: i32) -> bool {
    x != RANGE
}

/// `(width, height)` of the subimage a state at `level` denotes:
/// `2^⌊L/2⌋ x 2^⌈L/2⌉`. Odd levels are tall rectangles (height is the
/// long axis); even levels are square (spec.md §3, §4.H). The long axis
/// of an odd-level block is its height, so splitting it "along the long
/// axis" (§4.H) divides rows, producing the horizontal seam that
/// smoothing blends for odd `L` (§4.J).
pub const fn block_dims(level: u8) -> (usize, usize) {
    let w_exp = level as u32 / 2;
    let h_exp = (level as u32 + 1) / 2;
    (1usize << w_exp, 1usize << h_exp)
}

/// Where label `0`/`1`'s half of a `level`-level parent block sits,
/// relative to the parent block's own top-left corner. Odd parent
/// levels split along height (their long axis); even levels split along
/// width — splits alternate vertical/horizontal with level (spec.md
/// §3, §4.H, §4.J).
pub const fn child_offset(level: u8, label: usize) -> (usize, usize) {
    let (w, h) = block_dims(level);
    if level % 2 == 1 {
        let half_h = h / 2;
        if label == 0 {
            (0, 0)
        } else {
            (0, half_h)
        }
    } else {
        let half_w = w / 2;
        if label == 0 {
            (0, 0)
        } else {
            (half_w, 0)
        }
    }
}

/// Bitmask controlling whether a state may be used as a domain, and
/// whether its image must be materialized during synthesis.
///
/// See `enum state_types` in `codec/wfa.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DomainType(u8);

impl DomainType {
    pub const NONE: DomainType = DomainType(0);
    pub const AUXILIARY: DomainType = DomainType(1 << 0);
    pub const USE_DOMAIN: DomainType = DomainType(1 << 1);

    pub const fn from_bits(bits: u8) -> Self {
        DomainType(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_auxiliary(self) -> bool {
        self.0 & Self::AUXILIARY.0 != 0
    }

    pub const fn use_domain(self) -> bool {
        self.0 & Self::USE_DOMAIN.0 != 0
    }

    /// Whether this state's image must be materialized: either it is
    /// used for inner-product computations, or it may be referenced as
    /// a domain in an approximation.
    pub const fn needs_image(self) -> bool {
        self.is_auxiliary() || self.use_domain()
    }
}

impl std::ops::BitOr for DomainType {
    type Output = DomainType;
    fn bitor(self, rhs: DomainType) -> DomainType {
        DomainType(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_image_combines_both_bits() {
        assert!(!DomainType::NONE.needs_image());
        assert!(DomainType::AUXILIARY.needs_image());
        assert!(DomainType::USE_DOMAIN.needs_image());
        assert!((DomainType::AUXILIARY | DomainType::USE_DOMAIN).needs_image());
    }

    #[test]
    fn edge_and_child_predicates() {
        assert!(!isedge(NO_EDGE));
        assert!(isedge(0));
        assert!(isedge(5));
        assert!(!ischild(RANGE));
        assert!(ischild(3));
    }
}
