use std::collections::VecDeque;

use serde::Serialize;

use crate::signal_processing::TrailingBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Tick,
    Tock,
}

impl std::fmt::Display for Polarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarity::Tick => write!(f, "tick"),
            Polarity::Tock => write!(f, "tock"),
        }
    }
}

impl Polarity {
    pub fn opposite(self) -> Self {
        match self {
            Polarity::Tick => Polarity::Tock,
            Polarity::Tock => Polarity::Tick,
        }
    }
}

/// One detected beat of the escapement
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TickEvent {
    /// Stream time of the acoustic onset, in seconds
    pub timestamp: f64,
    pub polarity: Polarity,
    pub sample_index: u64,
    pub height: f32,
    /// Envelope burst width (FWHM) in seconds, the lift-time proxy
    pub lift_time: Option<f64>,
}

/// Balance between the energy after and before `center`
///
/// Sums squared samples over the `window` samples on each side and returns
/// `(post - pre) / (post + pre)`, in `[-1, 1]`. Positive means the trailing
/// lobe is heavier. Zero when both sides are silent.
///
/// # Returns
/// `None` when either window is outside the retained history
pub fn energy_balance(signal: &TrailingBuffer, center: u64, window: usize) -> Option<f64> {
    let w = window as u64;
    let energy = |from: u64, to: u64| -> Option<f64> {
        Some(
            signal
                .range(from, to)?
                .map(|x| (x as f64) * (x as f64))
                .sum(),
        )
    };

    let pre = energy(center.checked_sub(w)?, center)?;
    let post = energy(center, center + w)?;
    let total = pre + post;

    Some(if total > 0.0 { (post - pre) / total } else { 0.0 })
}

/// Recent balances averaged to find the midpoint between ticks and tocks
const RECENT_BALANCES: usize = 16;

/// Below this many balances the midpoint is taken as zero
const MIN_BALANCES: usize = 4;

/// Balances closer than this to the midpoint do not decide the label
pub const AMBIGUOUS_BALANCE: f64 = 0.1;

/// Labels beats as tick or tock
///
/// A beat whose energy balance sits clearly above the running midpoint of
/// recent balances is a tick, clearly below is a tock. When the balance does
/// not separate the two (identical clicks, heavy noise) the label follows
/// from the previous beat: consecutive beats alternate, so the label flips
/// once per elapsed beat interval. A misclassified beat only costs the
/// cycle it falls in.
#[derive(Debug, Clone)]
pub struct PolarityClassifier {
    window: usize,
    balances: VecDeque<f64>,
    last: Option<(f64, Polarity)>,
}

impl PolarityClassifier {
    /// Create a classifier with no beat history
    ///
    /// # Arguments
    /// * `window` - Length in samples of the energy windows on each side of the onset
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            balances: VecDeque::with_capacity(RECENT_BALANCES),
            last: None,
        }
    }

    /// Label the beat with onset at `center`
    ///
    /// # Arguments
    /// * `signal` - Preprocessed signal history
    /// * `center` - Absolute sample index of the onset
    /// * `timestamp` - Onset time in seconds
    /// * `beat_interval` - Nominal beat interval in seconds
    ///
    /// # Returns
    /// `None` when the signal around the onset is no longer (or not yet)
    /// available; the classifier state is then unchanged.
    pub fn classify(
        &mut self,
        signal: &TrailingBuffer,
        center: u64,
        timestamp: f64,
        beat_interval: f64,
    ) -> Option<Polarity> {
        let balance = energy_balance(signal, center, self.window)?;

        if self.balances.len() == RECENT_BALANCES {
            self.balances.pop_front();
        }
        self.balances.push_back(balance);

        let midpoint = if self.balances.len() >= MIN_BALANCES {
            self.balances.iter().sum::<f64>() / self.balances.len() as f64
        } else {
            0.0
        };
        let deviation = balance - midpoint;

        let polarity = if deviation >= AMBIGUOUS_BALANCE {
            Polarity::Tick
        } else if deviation <= -AMBIGUOUS_BALANCE {
            Polarity::Tock
        } else {
            self.by_alternation(timestamp, beat_interval)
        };

        self.last = Some((timestamp, polarity));
        Some(polarity)
    }

    fn by_alternation(&self, timestamp: f64, beat_interval: f64) -> Polarity {
        let Some((previous_time, previous)) = self.last else {
            return Polarity::Tick;
        };
        let beats = ((timestamp - previous_time) / beat_interval).round() as i64;
        if beats % 2 == 0 {
            previous
        } else {
            previous.opposite()
        }
    }

    pub fn reset(&mut self) {
        self.balances.clear();
        self.last = None;
    }
}
