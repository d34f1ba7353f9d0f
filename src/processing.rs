use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;

use crate::audio::SampleRing;
use crate::config::{TimegrapherConfig, validate_beats_per_hour, validate_lift_angle};
use crate::error::{Result, TimegrapherError};
use crate::signal_processing::{AdaptivePeakPicker, Preprocessor, TrailingBuffer, TransientDetector};
use crate::timing::{
    AmplitudeCalibration, CycleReconstructor, CycleRecord, Estimate, MetricsEngine,
    PolarityClassifier, PostureAggregator, PostureReading, QualityMonitor, ResidualPoint,
    TickEvent, residual_series,
};

/// The externally published result of one processing cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Stream time at the end of the processed data, seconds
    pub timestamp: f64,
    pub rate_seconds_per_day: Option<f64>,
    pub beat_error_ms: Option<f64>,
    pub amplitude_deg: Option<f64>,
    pub observed_beats_per_hour: Option<f64>,
    pub lift_time_ms: Option<f64>,
    pub expected_beats_per_hour: f64,
    pub lift_angle: f64,
    pub stability_ok: bool,
    pub rate_std_dev: Option<f64>,
    pub dropouts: usize,
    pub dropouts_ok: bool,
    pub snr_db: Option<f64>,
    pub snr_ok: bool,
    pub beats: usize,
    pub cycles: usize,
    pub posture: usize,
    pub posture_label: String,
    pub posture_reading: Option<PostureReading>,
    /// Settled and backed by a fresh estimate
    pub valid: bool,
    pub settling: bool,
    /// No cycles could be reconstructed; metric fields hold the last estimate
    pub insufficient_data: bool,
    pub residuals: Vec<ResidualPoint>,
}

/// One measurement session: ring buffer, pipeline state and rolling history
///
/// Time is stream time (samples consumed / sample rate) throughout, so
/// results are reproducible for recorded input. Mid-session changes of
/// posture, lift angle or beat rate flush all rolling state and restart the
/// settle delay; they take effect between processing cycles.
pub struct TimegrapherProcessor {
    config: TimegrapherConfig,
    sample_rate: f64,
    block_size: usize,
    classifier: PolarityClassifier,
    ring: SampleRing,
    preprocessor: Preprocessor,
    transient: TransientDetector,
    picker: AdaptivePeakPicker,
    signal: TrailingBuffer,
    events: VecDeque<TickEvent>,
    max_events: usize,
    reconstructor: CycleReconstructor,
    engine: MetricsEngine,
    posture: PostureAggregator,
    quality: QualityMonitor,
    session_start: f64,
    stream_time: f64,
    last_estimate: Option<Estimate>,
    last_cycle_end: Option<f64>,
    last_snapshot: Option<MetricsSnapshot>,
}

impl TimegrapherProcessor {
    pub fn new(config: &TimegrapherConfig) -> Result<Self> {
        config.validate()?;

        let rate = config.audio.sample_rate as f32;
        let picker = AdaptivePeakPicker::new(&config.detector, rate);
        let polarity_window =
            ((config.detector.polarity_window_ms * rate / 1000.0).round() as usize).max(1);
        let block_size = config.audio.block_size();
        let beat_interval = config.movement.beat_rate().beat_interval();

        Ok(Self {
            sample_rate: rate as f64,
            block_size,
            classifier: PolarityClassifier::new(polarity_window),
            ring: SampleRing::new(config.audio.ring_capacity()),
            preprocessor: Preprocessor::new(&config.filter, &config.agc, rate)?,
            transient: TransientDetector::new(config.detector.smoothing_ms, rate),
            signal: TrailingBuffer::new(
                block_size + config.audio.sample_rate as usize + 2 * picker.lookahead(),
            ),
            picker,
            events: VecDeque::new(),
            max_events: 2 * (config.metrics.analysis_window_size + 2),
            reconstructor: CycleReconstructor::new(beat_interval),
            engine: MetricsEngine::new(&config.movement, &config.metrics),
            posture: PostureAggregator::new(&config.posture, 0.0)?,
            quality: QualityMonitor::new(&config.quality),
            session_start: 0.0,
            stream_time: 0.0,
            last_estimate: None,
            last_cycle_end: None,
            last_snapshot: None,
            config: config.clone(),
        })
    }

    /// Use a calibration mapping for amplitude instead of the raw proxy
    pub fn with_calibration(mut self, calibration: Arc<dyn AmplitudeCalibration>) -> Self {
        self.engine.set_calibration(Some(calibration));
        self
    }

    /// Append captured samples to the ring buffer
    pub fn push_samples(&mut self, samples: &[f32]) {
        self.ring.push(samples);
    }

    /// Run one processing cycle over the next analysis block
    ///
    /// Returns `None` without touching any state when no samples are
    /// waiting.
    pub fn process_cycle(&mut self) -> Option<MetricsSnapshot> {
        let start = self.ring.next_sample_index();
        let mut block = self.ring.pop_block(self.block_size);
        if block.is_empty() {
            return None;
        }

        self.detect_beats(start, &mut block);
        let snapshot = self.publish();
        self.last_snapshot = Some(snapshot.clone());
        Some(snapshot)
    }

    /// Push and process a whole recording, one block at a time
    pub fn process_signal(&mut self, samples: &[f32]) -> Vec<MetricsSnapshot> {
        let mut snapshots = Vec::new();
        for chunk in samples.chunks(self.block_size) {
            self.push_samples(chunk);
            while let Some(snapshot) = self.process_cycle() {
                snapshots.push(snapshot);
            }
        }
        snapshots
    }

    fn detect_beats(&mut self, start: u64, block: &mut [f32]) {
        self.preprocessor.process(block);

        if !self.signal.extend(start, block) {
            log::warn!("Input discontinuity at sample {}, samples were lost", start);
            self.transient.reset();
        }

        let envelope = self.transient.process(block);
        let peaks = self.picker.process(start, &envelope);
        let delay = self.transient.delay_samples() as f64;
        let beat_interval = self.beat_interval();

        for peak in peaks {
            let onset = peak.position - delay;
            if onset < 0.0 {
                continue;
            }
            let timestamp = onset / self.sample_rate;

            let Some(polarity) = self.classifier.classify(
                &self.signal,
                onset.round() as u64,
                timestamp,
                beat_interval,
            ) else {
                log::debug!("No signal around sample {}, beat skipped", peak.sample_index);
                continue;
            };

            self.push_event(TickEvent {
                timestamp,
                polarity,
                sample_index: peak.sample_index,
                height: peak.height,
                lift_time: peak.width_samples.map(|w| w as f64 / self.sample_rate),
            });
        }

        self.stream_time = (start + block.len() as u64) as f64 / self.sample_rate;
    }

    fn push_event(&mut self, event: TickEvent) {
        if let Some(last) = self.events.back()
            && event.timestamp <= last.timestamp
        {
            return;
        }
        log::trace!("{} at {:.6} s", event.polarity, event.timestamp);

        self.events.push_back(event);
        while self.events.len() > self.max_events {
            self.events.pop_front();
        }
    }

    fn publish(&mut self) -> MetricsSnapshot {
        let now = self.stream_time;
        let beat_interval = self.beat_interval();
        let events = self.events.make_contiguous();

        let cycles = self.reconstructor.reconstruct(events);
        let lift_times = window_lift_times(events, self.engine.window_of(&cycles));

        let estimate = self.engine.compute(&cycles, &lift_times);

        if let (Some(est), Some(last)) = (&estimate, cycles.last())
            && self.last_cycle_end != Some(last.next_tick_time)
        {
            self.last_cycle_end = Some(last.next_tick_time);
            self.quality.record_rate(est.rate_seconds_per_day);
            log::debug!(
                "Cycle {:.4} s, rate {:+.1} s/d, beat error {:.2} ms over {} cycles",
                last.period,
                est.rate_seconds_per_day,
                est.beat_error_ms,
                est.cycles_used
            );
        }

        let settled = self.posture.is_settled(now);
        if let Some(est) = &estimate {
            self.posture.update(now, est);
            self.last_estimate = Some(*est);
        }

        let report = self.quality.assess(
            events,
            now,
            self.session_start,
            beat_interval,
            self.picker.noise_floor(),
        );

        let held = self.last_estimate.as_ref();
        MetricsSnapshot {
            timestamp: now,
            rate_seconds_per_day: held.map(|e| e.rate_seconds_per_day),
            beat_error_ms: held.map(|e| e.beat_error_ms),
            amplitude_deg: held.and_then(|e| e.amplitude_deg),
            observed_beats_per_hour: held.map(|e| e.observed_beats_per_hour),
            lift_time_ms: held.and_then(|e| e.lift_time_ms),
            expected_beats_per_hour: self.engine.expected_bph(),
            lift_angle: self.engine.lift_angle(),
            stability_ok: report.stability_ok,
            rate_std_dev: report.rate_std_dev,
            dropouts: report.dropouts,
            dropouts_ok: report.dropouts_ok,
            snr_db: report.snr_db,
            snr_ok: report.snr_ok,
            beats: events.len(),
            cycles: cycles.len(),
            posture: self.posture.current(),
            posture_label: self.posture.current_label().to_string(),
            posture_reading: self.posture.current_reading().copied(),
            valid: settled && estimate.is_some(),
            settling: !settled,
            insufficient_data: estimate.is_none(),
            residuals: residual_series(events, beat_interval),
        }
    }

    /// Flush every rolling buffer and restart the settle delay
    pub fn resynchronize(&mut self) {
        self.ring.clear();
        self.signal.clear();
        self.transient.reset();
        self.picker.reset();
        self.classifier.reset();
        self.events.clear();
        self.quality.reset();
        self.last_estimate = None;
        self.last_cycle_end = None;

        let now = self.ring.next_sample_index() as f64 / self.sample_rate;
        self.stream_time = now;
        self.session_start = now;
        self.posture.begin_settle(now);
        log::info!("Resynchronized at {:.2} s", now);
    }

    /// Switch posture; invalid indices are rejected and nothing changes
    pub fn set_posture(&mut self, index: usize) -> Result<()> {
        self.posture.set_posture(index, self.stream_time)?;
        self.resynchronize();
        Ok(())
    }

    pub fn set_lift_angle(&mut self, degrees: f64) -> Result<()> {
        validate_lift_angle(degrees)?;
        self.engine.set_lift_angle(degrees);
        self.config.movement.lift_angle = degrees;
        log::info!("Lift angle set to {}°", degrees);
        self.resynchronize();
        Ok(())
    }

    pub fn set_expected_bph(&mut self, bph: f64) -> Result<()> {
        validate_beats_per_hour(bph)?;
        let beat_ms = 3_600_000.0 / bph;
        if self.config.detector.min_tick_separation_ms as f64 >= beat_ms {
            return Err(TimegrapherError::Config(format!(
                "beat interval {:.1} ms is shorter than the minimum tick separation",
                beat_ms
            )));
        }

        self.engine.set_expected_bph(bph);
        self.reconstructor.set_beat_interval(3600.0 / bph);
        self.config.movement.expected_beats_per_hour = bph;
        log::info!("Expected rate set to {} bph", bph);
        self.resynchronize();
        Ok(())
    }

    /// Estimate over the current trailing window, or why there is none
    pub fn estimate(&self) -> Result<Estimate> {
        let events: Vec<TickEvent> = self.events.iter().copied().collect();
        let cycles = self.reconstructor.reconstruct(&events);
        let window = self.engine.window_of(&cycles);
        let available = window.len();
        let lift_times = window_lift_times(&events, window);

        self.engine
            .compute(&cycles, &lift_times)
            .ok_or(TimegrapherError::InsufficientData {
                needed: self.config.metrics.min_cycles,
                available,
            })
    }

    pub fn cycles(&self) -> Vec<CycleRecord> {
        let events: Vec<TickEvent> = self.events.iter().copied().collect();
        self.reconstructor.reconstruct(&events)
    }

    pub fn events(&self) -> impl Iterator<Item = &TickEvent> {
        self.events.iter()
    }

    pub fn last_snapshot(&self) -> Option<&MetricsSnapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn posture(&self) -> &PostureAggregator {
        &self.posture
    }

    pub fn config(&self) -> &TimegrapherConfig {
        &self.config
    }

    /// Stream time at the end of the processed data, seconds
    pub fn stream_time(&self) -> f64 {
        self.stream_time
    }

    pub fn beat_interval(&self) -> f64 {
        3600.0 / self.engine.expected_bph()
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.audio.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn gain(&self) -> f32 {
        self.preprocessor.gain()
    }

    /// Samples waiting in the ring buffer
    pub fn pending(&self) -> usize {
        self.ring.len()
    }
}

/// Lift times of the beats inside the analysis window
fn window_lift_times(events: &[TickEvent], window: &[CycleRecord]) -> Vec<f64> {
    let (Some(first), Some(last)) = (window.first(), window.last()) else {
        return Vec::new();
    };
    events
        .iter()
        .filter(|e| e.timestamp >= first.tick_time && e.timestamp <= last.next_tick_time)
        .filter_map(|e| e.lift_time)
        .collect()
}
