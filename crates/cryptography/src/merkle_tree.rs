//! Merkle root computation over transaction hashes.

use crate::hash;

/// Computes the Merkle root of the given 32-byte hashes.
///
/// Levels are built by pairwise hash256 of concatenated nodes; an odd node is
/// paired with itself. An empty input yields the all-zero hash, a single
/// input yields itself.
pub fn compute_root(hashes: &[[u8; 32]]) -> [u8; 32] {
    match hashes.len() {
        0 => [0u8; 32],
        1 => hashes[0],
        _ => {
            let mut level: Vec<[u8; 32]> = hashes.to_vec();
            while level.len() > 1 {
                let mut next = Vec::with_capacity((level.len() + 1) / 2);
                for pair in level.chunks(2) {
                    let right = if pair.len() == 2 { &pair[1] } else { &pair[0] };
                    let mut combined = [0u8; 64];
                    combined[..32].copy_from_slice(&pair[0]);
                    combined[32..].copy_from_slice(right);
                    next.push(hash::hash256(&combined));
                }
                level = next;
            }
            level[0]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn empty_is_all_zero() {
        assert_eq!(compute_root(&[]), [0u8; 32]);
    }

    #[test]
    fn single_element_is_itself() {
        assert_eq!(compute_root(&[filled(0xab)]), filled(0xab));
    }

    #[test]
    fn three_elements_duplicate_the_odd_node() {
        let h1 = filled(0x11);
        let h2 = filled(0x22);
        let h3 = filled(0x33);

        let pair = |a: &[u8; 32], b: &[u8; 32]| {
            let mut c = [0u8; 64];
            c[..32].copy_from_slice(a);
            c[32..].copy_from_slice(b);
            hash::hash256(&c)
        };

        let left = pair(&h1, &h2);
        let right = pair(&h3, &h3);
        assert_eq!(compute_root(&[h1, h2, h3]), pair(&left, &right));
    }

    #[test]
    fn order_matters() {
        let a = filled(1);
        let b = filled(2);
        assert_ne!(compute_root(&[a, b]), compute_root(&[b, a]));
    }
}
