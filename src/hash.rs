const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

/// Divisor used to map a 32-bit hash onto `[0, 1]`.
pub const BUCKET_SCALE: f64 = 4_294_967_295.0;

/// Computes the 32-bit MurmurHash3 (x86 variant) of `data`.
///
/// This is a non-cryptographic hash. It is stable across platforms and runs, which is what makes
/// percentage rollouts sticky, but it must never be used to gate anything security sensitive.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut h = seed;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        h ^= mix_k(k);
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let k = tail
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, b)| acc | (u32::from(*b) << (8 * i)));
        h ^= mix_k(k);
    }

    // the length is folded in modulo 2^32, as the reference implementation does
    h ^= data.len() as u32;
    fmix(h)
}

fn mix_k(k: u32) -> u32 {
    k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

fn fmix(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Returns the position of `user_id` within the rollout of `flag_name`, a value in `[0, 1]`.
///
/// The hashed seed is `"<flag_name>-<user_id>"`, so a user lands in an independent bucket for
/// every flag while the same pair always lands in the same one.
pub fn bucket(flag_name: &str, user_id: &str) -> f64 {
    let seed = format!("{}-{}", flag_name, user_id);
    f64::from(murmur3_32(seed.as_bytes(), 0)) / BUCKET_SCALE
}
