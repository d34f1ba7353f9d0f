use crate::constants::INTERPOLATION_EPSILON;

/// Moving average over a fixed-length trailing window
///
/// Keeps a running sum so each update is O(1). Until the window has filled,
/// the average is taken over the samples seen so far.
pub struct MovingAverage {
    buffer: Vec<f32>,
    index: usize,
    filled: bool,
    sum: f64,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        Self {
            buffer: vec![0.0; window_size.max(1)],
            index: 0,
            filled: false,
            sum: 0.0,
        }
    }

    pub fn add(&mut self, value: f32) -> f32 {
        self.sum += value as f64 - self.buffer[self.index] as f64;
        self.buffer[self.index] = value;
        self.index = (self.index + 1) % self.buffer.len();

        if self.index == 0 {
            self.filled = true;
        }

        self.average()
    }

    pub fn average(&self) -> f32 {
        let count = if self.filled {
            self.buffer.len()
        } else {
            self.index.max(1)
        };
        (self.sum / count as f64) as f32
    }

    pub fn window_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
        self.filled = false;
        self.sum = 0.0;
    }
}

/// Sub-sample offset of a peak from three samples around a local maximum
///
/// Fits a parabola through `(−1, y0)`, `(0, y1)`, `(1, y2)` and returns the
/// abscissa of its vertex, limited to ±0.5 samples. Flat tops return 0.
pub fn parabolic_peak_offset(y0: f32, y1: f32, y2: f32) -> f32 {
    let denom = y0 - 2.0 * y1 + y2;
    if denom.abs() < INTERPOLATION_EPSILON {
        return 0.0;
    }
    (0.5 * (y0 - y2) / denom).clamp(-0.5, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_average() {
        let mut ma = MovingAverage::new(3);

        assert!((ma.add(1.0) - 1.0).abs() < 0.01);
        assert!((ma.add(2.0) - 1.5).abs() < 0.01);
        assert!((ma.add(3.0) - 2.0).abs() < 0.01);
        assert!((ma.add(4.0) - 3.0).abs() < 0.01); // (2+3+4)/3
        assert!((ma.add(5.0) - 4.0).abs() < 0.01); // (3+4+5)/3
    }

    #[test]
    fn test_moving_average_reset() {
        let mut ma = MovingAverage::new(4);
        for v in [5.0, 6.0, 7.0, 8.0, 9.0] {
            ma.add(v);
        }
        ma.reset();
        assert!((ma.add(2.0) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_parabolic_offset_symmetric() {
        assert_eq!(parabolic_peak_offset(1.0, 2.0, 1.0), 0.0);
    }

    #[test]
    fn test_parabolic_offset_recovers_vertex() {
        // y = -(x - 0.3)^2 sampled at -1, 0, 1
        let f = |x: f32| -(x - 0.3) * (x - 0.3);
        let offset = parabolic_peak_offset(f(-1.0), f(0.0), f(1.0));
        assert!((offset - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_parabolic_offset_flat() {
        assert_eq!(parabolic_peak_offset(1.0, 1.0, 1.0), 0.0);
    }
}
