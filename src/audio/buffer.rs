use std::collections::VecDeque;

/// Ring buffer for mono audio samples
///
/// Decouples the capture cadence from the processing cadence. Pushing past
/// capacity overwrites the oldest unconsumed samples; popping never waits.
///
/// The buffer also keeps the absolute stream position of its oldest sample,
/// so consumers can timestamp samples correctly across overwrites and flushes.
pub struct SampleRing {
    buffer: VecDeque<f32>,
    capacity: usize,
    total_pushed: u64,
    overwritten: u64,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            total_pushed: 0,
            overwritten: 0,
        }
    }

    /// Append samples, overwriting the oldest data once capacity is exceeded
    pub fn push(&mut self, samples: &[f32]) {
        self.total_pushed += samples.len() as u64;

        // Only the newest `capacity` samples of an oversized push can survive
        let keep = &samples[samples.len().saturating_sub(self.capacity)..];
        let skipped = samples.len() - keep.len();

        let excess = (self.buffer.len() + keep.len()).saturating_sub(self.capacity);
        if excess > 0 {
            self.buffer.drain(..excess);
        }
        self.buffer.extend(keep.iter().copied());

        let lost = (excess + skipped) as u64;
        if lost > 0 {
            self.overwritten += lost;
            log::warn!("Ring buffer overrun: {} samples overwritten", lost);
        }
    }

    /// Remove and return the oldest `n` unconsumed samples, or fewer if
    /// fewer are available. Returns an empty vector rather than waiting.
    pub fn pop_block(&mut self, n: usize) -> Vec<f32> {
        let take = n.min(self.buffer.len());
        self.buffer.drain(..take).collect()
    }

    /// Absolute stream index of the oldest unconsumed sample
    pub fn next_sample_index(&self) -> u64 {
        self.total_pushed - self.buffer.len() as u64
    }

    /// Discard all unconsumed samples
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of samples lost to overwrites since creation
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_order() {
        let mut ring = SampleRing::new(8);
        ring.push(&[1.0, 2.0, 3.0]);
        assert_eq!(ring.pop_block(2), vec![1.0, 2.0]);
        assert_eq!(ring.pop_block(5), vec![3.0]);
        assert!(ring.pop_block(5).is_empty());
    }

    #[test]
    fn test_overwrites_oldest() {
        let mut ring = SampleRing::new(4);
        ring.push(&[1.0, 2.0, 3.0]);
        ring.push(&[4.0, 5.0, 6.0]);

        assert_eq!(ring.len(), 4);
        assert_eq!(ring.overwritten(), 2);
        assert_eq!(ring.next_sample_index(), 2);
        assert_eq!(ring.pop_block(4), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_oversized_push_keeps_newest() {
        let mut ring = SampleRing::new(3);
        ring.push(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ring.next_sample_index(), 2);
        assert_eq!(ring.pop_block(10), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_next_sample_index_tracks_consumption() {
        let mut ring = SampleRing::new(16);
        ring.push(&[0.0; 10]);
        ring.pop_block(4);
        assert_eq!(ring.next_sample_index(), 4);
        ring.clear();
        assert_eq!(ring.next_sample_index(), 10);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_empty_pop_never_blocks() {
        let mut ring = SampleRing::new(16);
        assert!(ring.pop_block(100).is_empty());
        assert_eq!(ring.next_sample_index(), 0);
    }
}
