//! MurmurHash3 (x86, 32-bit), exposed to contracts through StdLib.

/// Computes the Murmur32 hash of `data` with the given seed.
pub fn murmur32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut hash = seed;
    let mut chunks = data.chunks_exact(4);

    for block in &mut chunks {
        let mut k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        hash ^= k;
        hash = hash.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, &byte) in tail.iter().enumerate() {
            k ^= (byte as u32) << (8 * i);
        }
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        hash ^= k;
    }

    hash ^= data.len() as u32;
    hash ^= hash >> 16;
    hash = hash.wrapping_mul(0x85eb_ca6b);
    hash ^= hash >> 13;
    hash = hash.wrapping_mul(0xc2b2_ae35);
    hash ^= hash >> 16;
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_vectors() {
        // Standard MurmurHash3 x86_32 vectors.
        assert_eq!(murmur32(b"", 0), 0);
        assert_eq!(murmur32(b"", 1), 0x514e_28b7);
        assert_eq!(murmur32(b"hello", 0), 0x248b_fa47);
        assert_eq!(murmur32(b"hello, world", 0), 0x149b_bb7f);
    }

    #[test]
    fn seed_changes_output() {
        assert_ne!(murmur32(b"neo", 0), murmur32(b"neo", 1));
    }
}
