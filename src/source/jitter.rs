// Timestamp jitter correction

/// Largest forward gap tolerated between consecutive messages before the
/// correction substitutes the default frame delta, in milliseconds
const MAX_JITTER_MS: i64 = 1000;

/// Delta applied when the incoming timestamps jump or go backwards
const DEFAULT_FRAME_TIME_MS: i64 = 10;

/// Timestamp correction algorithm applied to a subscriber's stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JitterAlgorithm {
    /// Pass timestamps through unchanged
    Off,

    /// Shift the stream so it starts at timestamp zero
    Zero,

    /// Enforce a monotonically non-decreasing sequence with a bounded gap
    Full,
}

impl JitterAlgorithm {
    /// Maps the numeric config value to an algorithm
    pub fn from_config(value: u32) -> JitterAlgorithm {
        match value {
            1 => JitterAlgorithm::Zero,
            2 => JitterAlgorithm::Full,
            _ => JitterAlgorithm::Off,
        }
    }
}

/// Per-subscriber timestamp corrector
pub struct TimestampJitter {
    algorithm: JitterAlgorithm,

    /// Last timestamp seen from the publisher
    last_pkt_time: i64,

    /// Last timestamp handed to the subscriber
    last_pkt_correct_time: i64,

    /// First timestamp seen, for the zero algorithm
    base_time: Option<i64>,
}

impl TimestampJitter {
    /// Creates a corrector for the given algorithm
    pub fn new(algorithm: JitterAlgorithm) -> TimestampJitter {
        TimestampJitter {
            algorithm,
            last_pkt_time: 0,
            last_pkt_correct_time: -1,
            base_time: None,
        }
    }

    /// Corrects one timestamp
    pub fn correct(&mut self, timestamp: i64) -> i64 {
        match self.algorithm {
            JitterAlgorithm::Off => timestamp,
            JitterAlgorithm::Zero => {
                let base = *self.base_time.get_or_insert(timestamp);
                (timestamp - base).max(0)
            }
            JitterAlgorithm::Full => {
                let mut delta = timestamp - self.last_pkt_time;

                if !(0..=MAX_JITTER_MS).contains(&delta) {
                    delta = DEFAULT_FRAME_TIME_MS;
                }

                self.last_pkt_correct_time = (self.last_pkt_correct_time + delta).max(0);
                self.last_pkt_time = timestamp;

                self.last_pkt_correct_time
            }
        }
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_off_passes_through() {
        let mut jitter = TimestampJitter::new(JitterAlgorithm::Off);

        assert_eq!(jitter.correct(5000), 5000);
        assert_eq!(jitter.correct(100), 100);
    }

    #[test]
    fn test_zero_rebases() {
        let mut jitter = TimestampJitter::new(JitterAlgorithm::Zero);

        assert_eq!(jitter.correct(5000), 0);
        assert_eq!(jitter.correct(5040), 40);
        assert_eq!(jitter.correct(5080), 80);
    }

    #[test]
    fn test_full_keeps_normal_deltas() {
        let mut jitter = TimestampJitter::new(JitterAlgorithm::Full);

        let t0 = jitter.correct(1000);
        let t1 = jitter.correct(1040);
        let t2 = jitter.correct(1080);

        assert_eq!(t1 - t0, 40);
        assert_eq!(t2 - t1, 40);
    }

    #[test]
    fn test_full_clamps_backward_jump() {
        let mut jitter = TimestampJitter::new(JitterAlgorithm::Full);

        let t0 = jitter.correct(5000);
        // The publisher timestamp jumps backwards
        let t1 = jitter.correct(100);
        let t2 = jitter.correct(140);

        assert!(t1 >= t0);
        assert_eq!(t1 - t0, DEFAULT_FRAME_TIME_MS);
        // Stream continues normally from the corrected point
        assert_eq!(t2 - t1, 40);
    }

    #[test]
    fn test_full_clamps_large_gap() {
        let mut jitter = TimestampJitter::new(JitterAlgorithm::Full);

        let t0 = jitter.correct(0);
        let t1 = jitter.correct(60_000);

        assert_eq!(t1 - t0, DEFAULT_FRAME_TIME_MS);
    }
}
