//! Structural metadata extracted from a media file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Probed metadata for one media file.
///
/// Identity is the content fingerprint (path + size + mtime, hashed); the
/// cached entry for a file is implicitly invalidated when its fingerprint
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAnalysis {
    /// Path the file was probed at.
    pub file_path: PathBuf,
    /// Container format name as reported by the probing tool
    /// (e.g. "mov,mp4,m4a,3gp,3g2,mj2").
    pub format_name: String,
    /// Total duration in seconds; 0 when unknown.
    pub duration: f64,
    /// Overall bit rate, if reported.
    pub bit_rate: Option<u64>,
    /// File size in bytes.
    pub size: u64,
    /// Video streams in container order.
    pub video_streams: Vec<VideoStreamInfo>,
    /// Audio streams in container order.
    pub audio_streams: Vec<AudioStreamInfo>,
    /// Streams that are neither video nor audio (subtitles, data, ...).
    pub other_streams: Vec<StreamInfo>,
}

impl MediaAnalysis {
    /// First video stream, if any.
    pub fn primary_video(&self) -> Option<&VideoStreamInfo> {
        self.video_streams.first()
    }

    /// First audio stream, if any.
    pub fn primary_audio(&self) -> Option<&AudioStreamInfo> {
        self.audio_streams.first()
    }

    /// Human-readable one-line summary (used in translator prompts and CLI
    /// output).
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if self.duration > 0.0 {
            let mins = (self.duration / 60.0) as u64;
            let secs = self.duration % 60.0;
            parts.push(format!("Duration: {mins}:{secs:05.2}"));
        }

        for (i, v) in self.video_streams.iter().enumerate() {
            let mut info = format!("Video{i}: {}x{}", v.width, v.height);
            if v.frame_rate > 0.0 {
                info.push_str(&format!(" @ {:.2}fps", v.frame_rate));
            }
            if !v.pixel_format.is_empty() {
                info.push_str(&format!(" ({})", v.pixel_format));
            }
            if !v.codec.is_empty() {
                info.push_str(&format!(" [{}]", v.codec));
            }
            parts.push(info);
        }

        for (i, a) in self.audio_streams.iter().enumerate() {
            let mut info = format!("Audio{i}: {}Hz", a.sample_rate);
            if a.channels > 0 {
                info.push_str(&format!(" {}ch", a.channels));
            }
            if !a.codec.is_empty() {
                info.push_str(&format!(" [{}]", a.codec));
            }
            parts.push(info);
        }

        if parts.is_empty() {
            "No stream information available".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// A single video stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    /// Pixel format name (e.g. "yuv420p").
    pub pixel_format: String,
    /// Frames per second; 0 when unknown or malformed.
    pub frame_rate: f64,
    /// Codec name (e.g. "h264").
    pub codec: String,
    pub bit_rate: Option<u64>,
}

/// A single audio stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub sample_rate: u32,
    pub channels: u32,
    /// Channel layout name (e.g. "stereo").
    pub channel_layout: String,
    /// Codec name (e.g. "aac").
    pub codec: String,
    pub bit_rate: Option<u64>,
}

/// A stream that is neither video nor audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: u32,
    pub codec_type: String,
    pub codec: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_analysis() -> MediaAnalysis {
        MediaAnalysis {
            file_path: PathBuf::from("/videos/clip.mp4"),
            format_name: "mov,mp4,m4a,3gp,3g2,mj2".into(),
            duration: 75.5,
            bit_rate: Some(2_000_000),
            size: 18_875_000,
            video_streams: vec![VideoStreamInfo {
                width: 1920,
                height: 1080,
                pixel_format: "yuv420p".into(),
                frame_rate: 29.97,
                codec: "h264".into(),
                bit_rate: Some(1_800_000),
            }],
            audio_streams: vec![AudioStreamInfo {
                sample_rate: 48_000,
                channels: 2,
                channel_layout: "stereo".into(),
                codec: "aac".into(),
                bit_rate: Some(192_000),
            }],
            other_streams: vec![],
        }
    }

    #[test]
    fn summary_includes_streams() {
        let s = sample_analysis().summary();
        assert!(s.contains("1920x1080"), "got: {s}");
        assert!(s.contains("29.97fps"), "got: {s}");
        assert!(s.contains("48000Hz"), "got: {s}");
        assert!(s.contains("[h264]"), "got: {s}");
    }

    #[test]
    fn summary_of_empty_analysis() {
        let a = MediaAnalysis {
            file_path: PathBuf::from("x"),
            format_name: String::new(),
            duration: 0.0,
            bit_rate: None,
            size: 0,
            video_streams: vec![],
            audio_streams: vec![],
            other_streams: vec![],
        };
        assert_eq!(a.summary(), "No stream information available");
    }

    #[test]
    fn roundtrips_through_json() {
        let a = sample_analysis();
        let json = serde_json::to_string(&a).unwrap();
        let back: MediaAnalysis = serde_json::from_str(&json).unwrap();
        assert_eq!(back.video_streams[0].width, 1920);
        assert_eq!(back.audio_streams[0].channel_layout, "stereo");
    }
}
