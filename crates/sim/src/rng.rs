//! Small explicit-state PRNG for the hot SPH loops.
//!
//! `StdRng` is used everywhere else; this one exists because the coincident
//! pair perturbation has to be reproducible per pair on every worker.

/// Marsaglia xorshift32. State must never be zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 0x9E37_79B9 } else { seed },
        }
    }

    /// Seed that depends only on the unordered pair, so particle `i` and
    /// particle `j` draw the same numbers no matter who asks.
    pub fn for_pair(i: usize, j: usize) -> Self {
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        let mixed = (lo as u32)
            .wrapping_mul(0x85EB_CA6B)
            ^ (hi as u32).wrapping_mul(0xC2B2_AE35).rotate_left(13);
        Self::new(mixed)
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform in [0, 1).
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Uniform in [-1, 1).
    #[inline]
    pub fn next_signed(&mut self) -> f32 {
        self.next_f32() * 2.0 - 1.0
    }
}
