//! Flat, array-of-structures WFA state model (component F).
//!
//! Mirrors `wfa_t` in `codec/wfa.h`: every per-state field is a parallel
//! `Vec` indexed by state ID rather than a graph of boxed nodes, matching
//! the teacher's preference for flat, index-addressed tables (its
//! `Slice`/`SlicePlane` arrays) over pointer structures.

use crate::constants::{isedge, ischild, DomainType, MAXEDGES, MAXLABELS, MAXSTATES, NO_EDGE, RANGE};
use crate::error::{Error, Result};
use crate::wfa::mv::MotionVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    I,
    P,
    B,
}

/// A complete weighted finite automaton over one frame's bintree.
///
/// `basis_states` is frame-invariant (loaded once from the basis file);
/// states `[basis_states, states)` are rebuilt from scratch on every I
/// or P frame via [`Wfa::remove_states`] followed by fresh
/// [`Wfa::new_state`]/[`Wfa::append_edge`] calls made by the container
/// reader while parsing the frame payload.
#[derive(Debug, Clone)]
pub struct Wfa {
    pub basis_states: usize,
    pub states: usize,
    pub root_state: i32,
    pub frame_type: FrameType,
    /// Whether this stream is color (`WfaInfo.color`, spec.md §3). Set by
    /// the container reader from the stream header; never inferred from
    /// tree shape, since a non-trivial gray root also splits into two
    /// child subtrees (`codec/decoder.c:446`'s `if (wfa->wfainfo->color)`
    /// keys on the header flag for the same reason).
    pub color: bool,

    pub tree: Vec<[i32; MAXLABELS]>,
    pub x: Vec<[u32; MAXLABELS]>,
    pub y: Vec<[u32; MAXLABELS]>,
    /// ND prediction: a child subtree inherited *in addition to* a linear
    /// combination at the same label (spec.md glossary "ND prediction",
    /// §4.H step 5). `NO_EDGE` when the label has no such prediction.
    /// Only meaningful when `tree[s][l] == RANGE`; mutually exclusive with
    /// `tree[s][l]` denoting a plain child subtree.
    pub child_prediction: Vec<[i32; MAXLABELS]>,
    pub into: Vec<[[i32; MAXEDGES]; MAXLABELS]>,
    pub weight: Vec<[[f64; MAXEDGES]; MAXLABELS]>,
    pub int_weight: Vec<[[i32; MAXEDGES]; MAXLABELS]>,
    pub mv_tree: Vec<[MotionVector; MAXLABELS]>,
    pub prediction: Vec<[u8; MAXLABELS]>,
    pub level_of_state: Vec<u8>,
    pub domain_type: Vec<DomainType>,
    pub final_distribution: Vec<f64>,
}

impl Wfa {
    /// An empty WFA with no states at all; callers append the basis
    /// states via [`Wfa::new_state`] immediately after construction.
    pub fn empty() -> Self {
        Wfa {
            basis_states: 0,
            states: 0,
            root_state: NO_EDGE,
            frame_type: FrameType::I,
            color: false,
            tree: Vec::new(),
            x: Vec::new(),
            y: Vec::new(),
            child_prediction: Vec::new(),
            into: Vec::new(),
            weight: Vec::new(),
            int_weight: Vec::new(),
            mv_tree: Vec::new(),
            prediction: Vec::new(),
            level_of_state: Vec::new(),
            domain_type: Vec::new(),
            final_distribution: Vec::new(),
        }
    }

    /// Marks the states present right now as the basis: they survive
    /// every future [`Wfa::remove_states`] call.
    pub fn freeze_basis(&mut self) {
        self.basis_states = self.states;
    }

    /// Appends a fresh state at `level`, returning its ID. Both labels
    /// start as leaf ranges (`tree[..] == RANGE`) with no edges and no
    /// motion.
    pub fn new_state(&mut self, level: u8, domain_type: DomainType) -> Result<usize> {
        if self.states >= MAXSTATES {
            return Err(Error::out_of_bounds(
                "states",
                format!("would exceed MAXSTATES ({MAXSTATES})"),
            ));
        }
        let id = self.states;
        self.tree.push([RANGE, RANGE]);
        self.x.push([0, 0]);
        self.y.push([0, 0]);
        self.child_prediction.push([NO_EDGE, NO_EDGE]);
        self.into.push([[NO_EDGE; MAXEDGES]; MAXLABELS]);
        self.weight.push([[0.0; MAXEDGES]; MAXLABELS]);
        self.int_weight.push([[0; MAXEDGES]; MAXLABELS]);
        self.mv_tree.push([MotionVector::NONE; MAXLABELS]);
        self.prediction.push([0, 0]);
        self.level_of_state.push(level);
        self.domain_type.push(domain_type);
        self.final_distribution.push(0.0);
        self.states += 1;
        Ok(id)
    }

    /// Records an ND prediction: `(state, label)`'s range is seeded with a
    /// copy of `child`'s block before its domain edges accumulate on top,
    /// instead of starting from zero (spec.md §4.H step 5). `child` must
    /// already be a valid state ID one level below `state`'s.
    pub fn set_child_prediction(&mut self, state: usize, label: usize, child: i32) -> Result<()> {
        if child < 0 || child as usize >= self.states {
            return Err(Error::malformed(
                "wfa::set_child_prediction",
                format!("child id {child} out of range (states={})", self.states),
            ));
        }
        self.child_prediction[state][label] = child;
        Ok(())
    }

    /// Appends a domain edge `dst -[weight]-> src` to `(state, label)`'s
    /// linear combination: i.e. `state`'s range at `label` gains a term
    /// `weight * g_dst`. Fails if the edge list at `(state, label)` is
    /// already full (`MAXEDGES`), or `dst` is not a valid state ID.
    pub fn append_edge(
        &mut self,
        state: usize,
        label: usize,
        dst: i32,
        weight: f64,
        int_weight: i32,
    ) -> Result<()> {
        if dst < 0 || dst as usize >= self.states {
            return Err(Error::malformed(
                "wfa::append_edge",
                format!("domain id {dst} out of range (states={})", self.states),
            ));
        }
        let slots = &mut self.into[state][label];
        let slot = slots
            .iter()
            .position(|&e| !isedge(e))
            .ok_or_else(|| Error::out_of_bounds("edges", format!("MAXEDGES ({MAXEDGES}) exceeded")))?;
        slots[slot] = dst;
        self.weight[state][label][slot] = weight;
        self.int_weight[state][label][slot] = int_weight;
        Ok(())
    }

    /// Truncates the WFA back to its first `from` states, undoing every
    /// `new_state`/`append_edge` call made since. Used at the start of
    /// every I/P frame to discard the previous frame's non-basis suffix
    /// (spec.md §3: "the non-basis suffix is truncated on each new I/P
    /// frame").
    pub fn remove_states(&mut self, from: usize) {
        debug_assert!(from >= self.basis_states);
        self.tree.truncate(from);
        self.x.truncate(from);
        self.y.truncate(from);
        self.child_prediction.truncate(from);
        self.into.truncate(from);
        self.weight.truncate(from);
        self.int_weight.truncate(from);
        self.mv_tree.truncate(from);
        self.prediction.truncate(from);
        self.level_of_state.truncate(from);
        self.domain_type.truncate(from);
        self.final_distribution.truncate(from);
        self.states = from;
    }

    /// Overwrites `self` with a full copy of `src`. Used by the
    /// sequencer/decoder to give each frame its own mutable automaton
    /// starting from the shared basis.
    pub fn copy_from(&mut self, src: &Wfa) {
        self.clone_from(src);
    }

    /// Computes `x[s][l]`/`y[s][l]` for every structural state reachable
    /// from `root`, top-down from `(0, 0)`. These coordinates are never
    /// carried on the wire (spec.md §4.E's payload has no room for
    /// them) — they are fully determined by the bintree split geometry
    /// once the tree shape is known, so one pass after parsing derives
    /// them exactly as `codec/decoder.c`'s allocation pass would.
    pub fn assign_coordinates(&mut self, root: usize) {
        self.assign(root, self.level_of_state[root], 0, 0);
    }

    fn assign(&mut self, state: usize, level: u8, base_x: u32, base_y: u32) {
        for label in 0..2 {
            let (ox, oy) = crate::constants::child_offset(level, label);
            self.x[state][label] = base_x + ox as u32;
            self.y[state][label] = base_y + oy as u32;
            let entry = self.tree[state][label];
            if ischild(entry) && level > 0 {
                self.assign(entry as usize, level - 1, self.x[state][label], self.y[state][label]);
            }
        }
    }

    pub fn is_color(&self) -> bool {
        self.color
    }

    /// Upper bound (exclusive) of the luma-only state ID range, used by
    /// smoothing (spec.md §4.J: "for every non-basis state s with 0 <= s
    /// < joint_chroma_root"). The canonical traversal order assigns every
    /// Y-subtree state a lower ID than the joint-chroma node, so the
    /// joint-chroma root's own ID is exactly that bound. Gray WFAs have
    /// no such split, so every non-basis state is eligible.
    pub fn joint_chroma_root(&self) -> usize {
        if self.root_state < 0 || !self.color {
            return self.states;
        }
        self.tree[self.root_state as usize][1] as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DomainType;

    #[test]
    fn new_state_then_append_edge_round_trips() {
        let mut wfa = Wfa::empty();
        let s0 = wfa.new_state(0, DomainType::NONE).unwrap();
        wfa.final_distribution[s0] = 128.0;
        wfa.freeze_basis();

        let s1 = wfa.new_state(2, DomainType::NONE).unwrap();
        wfa.append_edge(s1, 0, s0 as i32, 0.5, 256).unwrap();
        assert_eq!(wfa.into[s1][0][0], s0 as i32);
        assert!((wfa.weight[s1][0][0] - 0.5).abs() < 1e-9);
        assert_eq!(wfa.into[s1][0][1], NO_EDGE);
    }

    #[test]
    fn append_edge_rejects_unknown_domain() {
        let mut wfa = Wfa::empty();
        let s0 = wfa.new_state(0, DomainType::NONE).unwrap();
        assert!(wfa.append_edge(s0, 0, 7, 1.0, 512).is_err());
    }

    #[test]
    fn remove_states_preserves_basis_only() {
        let mut wfa = Wfa::empty();
        wfa.new_state(0, DomainType::NONE).unwrap();
        wfa.freeze_basis();
        wfa.new_state(2, DomainType::NONE).unwrap();
        wfa.new_state(2, DomainType::NONE).unwrap();
        assert_eq!(wfa.states, 3);
        wfa.remove_states(wfa.basis_states);
        assert_eq!(wfa.states, 1);
    }

    #[test]
    fn append_edge_full_list_is_out_of_bounds() {
        let mut wfa = Wfa::empty();
        let s0 = wfa.new_state(0, DomainType::NONE).unwrap();
        let s1 = wfa.new_state(2, DomainType::NONE).unwrap();
        for _ in 0..MAXEDGES {
            wfa.append_edge(s1, 0, s0 as i32, 0.1, 10).unwrap();
        }
        assert!(wfa.append_edge(s1, 0, s0 as i32, 0.1, 10).is_err());
    }
}
