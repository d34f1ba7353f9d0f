use std::collections::VecDeque;

/// Bounded trailing window of a derived signal, addressed by absolute
/// stream sample index
///
/// Appending a block that does not continue the stored stream (a flush or
/// an overwrite upstream) discards the old contents.
pub struct TrailingBuffer {
    samples: VecDeque<f32>,
    start_index: u64,
    capacity: usize,
}

impl TrailingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            start_index: 0,
            capacity,
        }
    }

    /// Append `block`, whose first sample has absolute index `start_index`
    ///
    /// Returns `false` if the block was discontinuous and history was reset.
    pub fn extend(&mut self, start_index: u64, block: &[f32]) -> bool {
        let contiguous = self.samples.is_empty() || start_index == self.end_index();
        if !contiguous || self.samples.is_empty() {
            self.samples.clear();
            self.start_index = start_index;
        }

        self.samples.extend(block.iter().copied());

        let excess = self.samples.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.samples.drain(..excess);
            self.start_index += excess as u64;
        }

        contiguous
    }

    /// Absolute index of the oldest stored sample
    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    /// One past the absolute index of the newest stored sample
    pub fn end_index(&self) -> u64 {
        self.start_index + self.samples.len() as u64
    }

    pub fn get(&self, index: u64) -> Option<f32> {
        if index < self.start_index {
            return None;
        }
        self.samples.get((index - self.start_index) as usize).copied()
    }

    /// Samples in `[from, to)`, or `None` unless the whole range is stored
    pub fn range(&self, from: u64, to: u64) -> Option<impl Iterator<Item = f32> + '_> {
        if from < self.start_index || to > self.end_index() || from > to {
            return None;
        }
        let lo = (from - self.start_index) as usize;
        let hi = (to - self.start_index) as usize;
        Some(self.samples.range(lo..hi).copied())
    }

    /// The newest `n` samples (or all of them if fewer are stored)
    pub fn tail(&self, n: usize) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().skip(self.samples.len().saturating_sub(n)).copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_addressing() {
        let mut history = TrailingBuffer::new(8);
        assert!(history.extend(100, &[1.0, 2.0, 3.0]));
        assert!(history.extend(103, &[4.0]));

        assert_eq!(history.start_index(), 100);
        assert_eq!(history.end_index(), 104);
        assert_eq!(history.get(102), Some(3.0));
        assert_eq!(history.get(99), None);
        assert_eq!(history.get(104), None);
    }

    #[test]
    fn test_trims_to_capacity() {
        let mut history = TrailingBuffer::new(3);
        history.extend(0, &[1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(history.start_index(), 2);
        assert_eq!(history.tail(10).collect::<Vec<_>>(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_gap_resets_history() {
        let mut history = TrailingBuffer::new(8);
        history.extend(0, &[1.0, 2.0]);
        assert!(!history.extend(10, &[7.0]));

        assert_eq!(history.start_index(), 10);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_range_requires_stored_samples() {
        let mut history = TrailingBuffer::new(8);
        history.extend(5, &[1.0, 2.0, 3.0, 4.0]);

        let values: Vec<f32> = history.range(6, 8).unwrap().collect();
        assert_eq!(values, vec![2.0, 3.0]);
        assert!(history.range(4, 6).is_none());
        assert!(history.range(8, 10).is_none());
    }
}
