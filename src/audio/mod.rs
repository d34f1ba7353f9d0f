pub mod buffer;
pub mod capture;
pub mod source;

pub use buffer::SampleRing;
pub use capture::{AudioCapture, downmix};
pub use source::{DeviceSource, SampleSource, WavFileSource};
