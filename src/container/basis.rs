//! Initial basis file loader (component E).
//!
//! Layout per spec.md §6: magic `Fiasco`, a `WfaInfo`-like preamble
//! (just the RPF used for its own edge weights), then the basis WFA
//! states themselves, loaded once per stream and shared read-only by
//! every frame's working `Wfa` (`codec/dfiasco.c`'s `read_basis`).

use crate::bitio::BitReader;
use crate::constants::{DomainType, MAXEDGES, RANGE};
use crate::error::{Error, Result};
use crate::rpf::{Rpf, RpfRange};
use crate::wfa::{FrameType, Wfa};

const BASIS_MAGIC: &[u8; 6] = b"Fiasco";

fn read_rpf(r: &mut BitReader) -> Result<Rpf> {
    let mantissa_bits = r.get_bits(4)? as u8;
    if !(2..=8).contains(&mantissa_bits) {
        return Err(Error::malformed("basis", "rpf mantissa_bits out of range"));
    }
    let range_code = r.get_bits(2)? as u8;
    let range = RpfRange::from_code(range_code)
        .ok_or_else(|| Error::malformed("basis", "unknown rpf range code"))?;
    Ok(Rpf::new(mantissa_bits, range))
}

/// Parses a basis file's bytes into a frozen-basis `Wfa`. State 0 is
/// always the "constant 1" function (spec.md §3: "`basis_states`:
/// ... includes state 0, the 'constant 1' function").
pub fn load_basis(bytes: &[u8]) -> Result<Wfa> {
    let mut r = BitReader::new(bytes);
    let mut magic = [0u8; 6];
    for slot in magic.iter_mut() {
        *slot = r.get_bits(8)? as u8;
    }
    if &magic != BASIS_MAGIC {
        return Err(Error::malformed("basis", "bad basis magic"));
    }

    let rpf = read_rpf(&mut r)?;
    let basis_states = r.get_bits(16)? as usize;
    if basis_states == 0 {
        return Err(Error::malformed("basis", "basis file declares zero states"));
    }

    let mut wfa = Wfa::empty();
    wfa.frame_type = FrameType::I;

    for _ in 0..basis_states {
        let level = r.get_bits(5)? as u8;
        let domain_bits = r.get_bits(2)? as u8;
        let domain_type = DomainType::from_bits(domain_bits);
        let id = wfa.new_state(level, domain_type)?;

        let mut final_q10 = 0i32;
        for shift in (0..32).step_by(8) {
            final_q10 |= (r.get_bits(8)? as i32) << shift;
        }
        wfa.final_distribution[id] = final_q10 as f64 / 256.0;

        for label in 0..2 {
            let is_range = r.get_bit()? != 0;
            if is_range {
                wfa.tree[id][label] = RANGE;
                let edge_count = r.get_bits(3)? as usize;
                if edge_count > MAXEDGES {
                    return Err(Error::malformed("basis", "edge count exceeds MAXEDGES"));
                }
                for _ in 0..edge_count {
                    let domain = r.get_bits(16)? as i32;
                    let weight = rpf.read(&mut r)?;
                    let int_weight = rpf.int_weight(weight);
                    wfa.append_edge(id, label, domain, weight, int_weight)?;
                }
            } else {
                let child = r.get_bits(16)? as i32;
                if child < 0 || child as usize >= basis_states {
                    return Err(Error::malformed("basis", "child id out of range"));
                }
                wfa.tree[id][label] = child;
            }
        }
    }

    wfa.root_state = (basis_states - 1) as i32;
    wfa.freeze_basis();
    Ok(wfa)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitio::BitWriter;

    fn write_rpf(w: &mut BitWriter, rpf: Rpf) {
        w.put_bits(rpf.mantissa_bits as u32, 4);
        w.put_bits(rpf.range.code() as u32, 2);
    }

    #[test]
    fn loads_a_two_state_basis() {
        let mut w = BitWriter::new();
        for &b in BASIS_MAGIC {
            w.put_bits(b as u32, 8);
        }
        let rpf = Rpf::new(6, RpfRange::R1_00);
        write_rpf(&mut w, rpf);
        w.put_bits(2, 16); // basis_states

        // state 0: constant 1, both labels are empty ranges.
        w.put_bits(0, 5); // level
        w.put_bits(0, 2); // domain_type
        w.put_bits((128i32 * 256) as u32, 32); // final_distribution
        for _ in 0..2 {
            w.put_bit(1); // range
            w.put_bits(0, 3); // 0 edges
        }

        // state 1: leaf range at label 0 referencing state 0, child at label 1 pointing back to state 0.
        w.put_bits(2, 5); // level
        w.put_bits(0, 2);
        w.put_bits(0, 32);
        w.put_bit(1); // label 0: range
        w.put_bits(1, 3); // 1 edge
        w.put_bits(0, 16); // domain 0
        rpf.write(&mut w, 0.5);
        w.put_bit(0); // label 1: child
        w.put_bits(0, 16); // child state 0

        let bytes = w.into_bytes();
        let wfa = load_basis(&bytes).unwrap();
        assert_eq!(wfa.states, 2);
        assert_eq!(wfa.basis_states, 2);
        assert_eq!(wfa.into[1][0][0], 0);
        assert_eq!(wfa.tree[1][1], 0);
    }

    #[test]
    fn rejects_wrong_magic() {
        let bytes = b"NotFiasco000000";
        assert!(load_basis(bytes).is_err());
    }
}
