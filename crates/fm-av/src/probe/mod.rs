//! Media probing: structural metadata extraction memoized by fingerprint.

pub mod cache;
pub mod ffprobe;
pub mod types;

pub use cache::{fingerprint, ProbeCache};
pub use ffprobe::Prober;
pub use types::{AudioStreamInfo, MediaAnalysis, StreamInfo, VideoStreamInfo};
