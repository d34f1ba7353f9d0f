pub mod audio;
pub mod config;
pub mod constants;
pub mod error;
pub mod output;
pub mod processing;
pub mod session;
pub mod signal_processing;
pub mod timing;
pub mod wav;

#[cfg(feature = "simulation")]
pub mod simulation;

pub use config::{BeatRate, TimegrapherConfig};
pub use error::{Result, TimegrapherError};
pub use processing::{MetricsSnapshot, TimegrapherProcessor};
pub use session::{SessionCommand, SessionEnd, SessionOptions, run_session};
pub use wav::save_wav;
