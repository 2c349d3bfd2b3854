// Stateless onset hashing.
//
// The mixing function is the SplitMix64 finalizer (Steele, Lea & Flood,
// 2014), a 64-bit avalanche mixer with a published reference:
//
//   x ^= x >> 30;  x *= 0xbf58_476d_1ce4_e5b9;
//   x ^= x >> 27;  x *= 0x94d0_49bb_1331_11eb;
//   x ^= x >> 31;
//
// Salt strings are folded with 64-bit FNV-1a over their UTF-8 bytes. An
// onset hash absorbs its inputs in a fixed order, mixing after each one:
//
//   h = mix64(seed + GOLDEN_GAMMA)
//   h = mix64(h ^ bar_number)
//   h = mix64(h ^ beat_units)      (two's complement of the i64)
//   h = mix64(h ^ fnv1a64(salt))
//
// All arithmetic wraps. Any port that follows these four lines reproduces
// every velocity and timing hint bit-for-bit.

/// Weyl increment used by SplitMix64 (2^64 / phi, odd).
pub const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// SplitMix64 finalizer.
pub const fn mix64(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// 64-bit FNV-1a over the UTF-8 bytes of `s`.
pub const fn fnv1a64(s: &str) -> u64 {
    let bytes = s.as_bytes();
    let mut h = FNV_OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        h ^= bytes[i] as u64;
        h = h.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    h
}

/// Hash of one onset position. See the module header for the formula.
pub fn onset_hash(bar_number: u32, beat_units: i64, seed: u64, salt: &str) -> u64 {
    OnsetHasher::new(seed)
        .absorb(bar_number as u64)
        .absorb(beat_units as u64)
        .absorb(fnv1a64(salt))
        .finish()
}

/// Incremental form of `onset_hash`, for callers that fold in extra
/// discriminators (a role index, a repeat counter) after the standard ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OnsetHasher {
    state: u64,
}

impl OnsetHasher {
    pub const fn new(seed: u64) -> Self {
        Self {
            state: mix64(seed.wrapping_add(GOLDEN_GAMMA)),
        }
    }

    #[must_use]
    pub const fn absorb(self, value: u64) -> Self {
        Self {
            state: mix64(self.state ^ value),
        }
    }

    pub const fn finish(self) -> u64 {
        self.state
    }
}

/// Map a hash into `[min, max]` (inclusive). Swapped bounds are reordered.
pub fn hash_to_range(h: u64, min: u64, max: u64) -> u64 {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    let span = hi - lo;
    if span == u64::MAX {
        return h;
    }
    lo + h % (span + 1)
}

/// Signed variant of `hash_to_range`, used for timing offsets around zero.
pub fn hash_to_signed_range(h: u64, min: i64, max: i64) -> i64 {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    let span = hi.wrapping_sub(lo) as u64;
    lo.wrapping_add(hash_to_range(h, 0, span) as i64)
}

/// Map a hash into [0, 1) using the upper 53 bits.
pub fn hash_unit(h: u64) -> f64 {
    (h >> 11) as f64 / (1u64 << 53) as f64
}
