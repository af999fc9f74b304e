//! Sample-accurate segment sizing over arbitrary sample-rate vs. frame-length
//! ratios (§4.9).

/// Greatest common divisor, Euclidean algorithm.
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while a != 0 {
        let tmp = a;
        a = b % a;
        b = tmp;
    }
    b
}

/// Least common multiple.
pub fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}

/// `(duration/src)*dst + (duration%src*dst)/src`, truncating division at
/// every step (not rounding). The chunker's exactness (§8 P4) depends on
/// this truncating convention, not round-to-nearest.
pub fn rescale_duration(duration: u64, src: u64, dst: u64) -> u64 {
    (duration / src) * dst + (duration % src * dst) / src
}

/// Produces the sequence of per-segment sample counts that, summed over one
/// fundamental period, exactly realise `segment_samples` samples per segment
/// on average even when `segment_samples` isn't a multiple of `frame_len`.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    i: u64,
    /// Period length; `0` means the degenerate (exact-multiple) case where
    /// every segment is `segment_samples` and `i` never advances.
    max: u64,
    segment_samples: u64,
    frame_len: u64,
}

impl Chunker {
    pub fn new(src_rate: u64, segment_samples: u64, frame_len: u64) -> Self {
        let mut max = 0;
        if frame_len != 0 && segment_samples % frame_len != 0 {
            let l = lcm(src_rate, frame_len);
            let m = lcm(segment_samples, l);
            max = m / gcd(src_rate, segment_samples);
        }
        Self { i: 0, max, segment_samples, frame_len }
    }

    /// Sample count for the next segment in the sequence.
    pub fn next_samples(&mut self) -> u64 {
        if self.frame_len == 0 || self.segment_samples % self.frame_len == 0 {
            return self.segment_samples;
        }

        let hi = rescale_duration(self.i + 1, self.frame_len, self.segment_samples);
        let lo = rescale_duration(self.i, self.frame_len, self.segment_samples);
        let ret = (hi - lo) * self.frame_len;

        self.i += 1;
        if self.i == self.max {
            self.i = 0;
        }
        ret
    }

    /// Period length in segments (the count after which `next_samples`
    /// starts repeating). `1` for the degenerate exact-multiple case.
    pub fn period(&self) -> u64 {
        if self.max == 0 {
            1
        } else {
            self.max
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_multiple_is_constant() {
        let mut c = Chunker::new(48000, 2048, 1024);
        for _ in 0..5 {
            assert_eq!(c.next_samples(), 2048);
        }
    }

    #[test]
    fn period_sum_equals_period_times_segment_samples() {
        // P4: sum of nextSamples(i) over i in [0,M) equals M*seg exactly.
        let src_rate = 44100u64;
        let segment_samples = 2_u64 * 44100 + 500; // 2.0113... seconds worth
        let frame_len = 1152u64; // mp3-style frame length
        let mut c = Chunker::new(src_rate, segment_samples, frame_len);
        let period = c.period();
        let sum: u64 = (0..period).map(|_| c.next_samples()).sum();
        assert_eq!(sum, period * segment_samples);
    }

    #[test]
    fn period_sum_exact_for_small_ratio() {
        let mut c = Chunker::new(48000, 1000, 1024);
        let period = c.period();
        let sum: u64 = (0..period).map(|_| c.next_samples()).sum();
        assert_eq!(sum, period * 1000);
    }

    #[test]
    fn gcd_lcm_basic() {
        assert_eq!(gcd(48, 18), 6);
        assert_eq!(lcm(4, 6), 12);
        assert_eq!(gcd(0, 5), 5);
    }

    #[test]
    fn rescale_duration_truncates() {
        // 3 * 10 / 7 = 4 (truncated), not 4.28..
        assert_eq!(rescale_duration(3, 7, 10), 4);
    }
}
