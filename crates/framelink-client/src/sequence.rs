/// Detects gaps in the sequence numbers of unsolicited frames.
///
/// Sequence numbers are 16-bit and wrap. The first observed frame only
/// primes the tracker; after that, any frame whose sequence is not the
/// wrapping successor of the previous one counts as exactly one miss,
/// regardless of how many numbers were skipped.
#[derive(Debug, Default, Clone)]
pub struct SequenceTracker {
    last: Option<u16>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sequence number. Returns true when it does not follow the previous one.
    pub fn observe(&mut self, seq: u16) -> bool {
        let miss = matches!(self.last, Some(last) if seq != last.wrapping_add(1));
        self.last = Some(seq);
        miss
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn misses(seqs: &[u16]) -> usize {
        let mut tracker = SequenceTracker::new();
        seqs.iter().filter(|&&seq| tracker.observe(seq)).count()
    }

    #[test]
    fn first_frame_primes() {
        assert_eq!(misses(&[500]), 0);
    }

    #[test]
    fn contiguous_sequence_has_no_misses() {
        assert_eq!(misses(&[1, 2, 3, 4, 5]), 0);
    }

    #[test]
    fn gap_counts_once() {
        assert_eq!(misses(&[1, 2, 4]), 1);
        assert_eq!(misses(&[1, 2, 100]), 1);
    }

    #[test]
    fn wraparound_is_contiguous() {
        assert_eq!(misses(&[u16::MAX - 1, u16::MAX, 0, 1]), 0);
    }

    #[test]
    fn duplicate_and_backwards_count() {
        assert_eq!(misses(&[5, 5]), 1);
        assert_eq!(misses(&[5, 4]), 1);
    }

    #[test]
    fn gap_then_contiguous_counts_once() {
        assert_eq!(misses(&[1, 9, 10, 11]), 1);
    }
}
