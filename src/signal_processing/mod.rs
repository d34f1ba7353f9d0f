pub mod agc;
pub mod envelope;
pub mod filters;
pub mod history;
pub mod math;
pub mod peak_detector;
pub mod preprocess;
pub mod robust;

pub use agc::AutomaticGainControl;
pub use envelope::{TransientDetector, half_max_width};
pub use filters::{HighpassFilter, LowpassFilter};
pub use history::TrailingBuffer;
pub use math::{MovingAverage, parabolic_peak_offset};
pub use peak_detector::{AdaptivePeakPicker, PeakCandidate};
pub use preprocess::Preprocessor;
pub use robust::{RobustThreshold, median, median_absolute_deviation, trimmed_mean};
