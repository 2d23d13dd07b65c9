//! ffprobe-backed prober with fingerprint memoization.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format
//! -show_streams` and maps the JSON output into [`MediaAnalysis`]. Results
//! are cached in the injected [`ProbeCache`] keyed by content fingerprint;
//! an unchanged file is never probed twice.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::cache::{fingerprint, ProbeCache};
use super::types::{AudioStreamInfo, MediaAnalysis, StreamInfo, VideoStreamInfo};
use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Probing timeout. ffprobe only reads headers, so ten seconds is generous.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug)]
pub struct Prober {
    ffprobe_path: PathBuf,
    cache: Arc<ProbeCache>,
}

impl Prober {
    /// Create a prober using the registry's ffprobe and the given cache.
    ///
    /// # Errors
    ///
    /// Returns [`fm_core::Error::ToolNotFound`] if ffprobe was not
    /// discovered.
    pub fn new(tools: &ToolRegistry, cache: Arc<ProbeCache>) -> fm_core::Result<Self> {
        let config = tools.require("ffprobe")?;
        Ok(Self {
            ffprobe_path: config.path.clone(),
            cache,
        })
    }

    /// Probe a media file, serving from the cache when the fingerprint is
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Every failure mode -- missing file, tool failure, timeout, malformed
    /// output -- collapses to [`fm_core::Error::Probe`] with a reason;
    /// nothing escapes this boundary.
    pub async fn probe(&self, path: &Path) -> fm_core::Result<MediaAnalysis> {
        if !path.exists() {
            return Err(fm_core::Error::probe(format!(
                "file not found: {}",
                path.display()
            )));
        }

        let key = fingerprint(path);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!("probe cache hit for {}", path.display());
            return Ok(cached);
        }

        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(path.to_string_lossy());
        cmd.timeout(PROBE_TIMEOUT);

        let result = cmd
            .execute()
            .await
            .map_err(|e| fm_core::Error::probe(format!("ffprobe failed: {e}")))?;

        if !result.success() {
            return Err(fm_core::Error::probe(format!(
                "ffprobe {}: {}",
                result.failure_summary(),
                path.display()
            )));
        }

        let parsed: FfprobeOutput = serde_json::from_str(&result.stdout)
            .map_err(|e| fm_core::Error::probe(format!("ffprobe JSON parse error: {e}")))?;

        let analysis = map_output(path, parsed);
        self.cache.insert(key, analysis.clone());

        tracing::debug!(
            "analyzed {}: {}v/{}a streams",
            path.display(),
            analysis.video_streams.len(),
            analysis.audio_streams.len()
        );

        Ok(analysis)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    channel_layout: Option<String>,
    bit_rate: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn map_output(path: &Path, output: FfprobeOutput) -> MediaAnalysis {
    let duration = output
        .format
        .duration
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);
    let size = output
        .format
        .size
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    let bit_rate = output.format.bit_rate.and_then(|s| s.parse::<u64>().ok());

    let mut video_streams = Vec::new();
    let mut audio_streams = Vec::new();
    let mut other_streams = Vec::new();

    for stream in output.streams {
        match stream.codec_type.as_deref() {
            Some("video") => video_streams.push(VideoStreamInfo {
                width: stream.width.unwrap_or(0),
                height: stream.height.unwrap_or(0),
                pixel_format: stream.pix_fmt.unwrap_or_default(),
                frame_rate: parse_frame_rate(stream.r_frame_rate.as_deref().unwrap_or("0/1")),
                codec: stream.codec_name.unwrap_or_default(),
                bit_rate: stream.bit_rate.and_then(|s| s.parse().ok()),
            }),
            Some("audio") => audio_streams.push(AudioStreamInfo {
                sample_rate: stream
                    .sample_rate
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                channels: stream.channels.unwrap_or(0),
                channel_layout: stream.channel_layout.unwrap_or_default(),
                codec: stream.codec_name.unwrap_or_default(),
                bit_rate: stream.bit_rate.and_then(|s| s.parse().ok()),
            }),
            other => other_streams.push(StreamInfo {
                index: stream.index,
                codec_type: other.unwrap_or("").to_string(),
                codec: stream.codec_name.unwrap_or_default(),
            }),
        }
    }

    MediaAnalysis {
        file_path: path.to_path_buf(),
        format_name: output.format.format_name.unwrap_or_default(),
        duration,
        bit_rate,
        size,
        video_streams,
        audio_streams,
        other_streams,
    }
}

/// Parse a rational frame-rate string like "30000/1001" to a float.
/// Fails safe to 0 on malformed input.
pub(crate) fn parse_frame_rate(rate_str: &str) -> f64 {
    if let Some((num, den)) = rate_str.split_once('/') {
        match (num.parse::<f64>(), den.parse::<f64>()) {
            (Ok(n), Ok(d)) if d != 0.0 => return n / d,
            _ => return 0.0,
        }
    }
    rate_str.parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_JSON: &str = r#"{
        "format": {
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "12.480000",
            "size": "1048576",
            "bit_rate": "672000"
        },
        "streams": [
            {
                "index": 0,
                "codec_type": "video",
                "codec_name": "h264",
                "width": 1280,
                "height": 720,
                "pix_fmt": "yuv420p",
                "r_frame_rate": "30000/1001",
                "bit_rate": "600000"
            },
            {
                "index": 1,
                "codec_type": "audio",
                "codec_name": "aac",
                "sample_rate": "44100",
                "channels": 2,
                "channel_layout": "stereo"
            },
            {
                "index": 2,
                "codec_type": "subtitle",
                "codec_name": "mov_text"
            }
        ]
    }"#;

    #[test]
    fn frame_rate_fraction() {
        assert!((parse_frame_rate("30000/1001") - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25/1"), 25.0);
        assert_eq!(parse_frame_rate("30"), 30.0);
    }

    #[test]
    fn frame_rate_fails_safe_to_zero() {
        assert_eq!(parse_frame_rate("invalid"), 0.0);
        assert_eq!(parse_frame_rate("30/0"), 0.0);
        assert_eq!(parse_frame_rate("a/b"), 0.0);
        assert_eq!(parse_frame_rate(""), 0.0);
    }

    #[test]
    fn maps_full_output() {
        let parsed: FfprobeOutput = serde_json::from_str(SAMPLE_JSON).unwrap();
        let analysis = map_output(Path::new("/videos/clip.mp4"), parsed);

        assert_eq!(analysis.format_name, "mov,mp4,m4a,3gp,3g2,mj2");
        assert!((analysis.duration - 12.48).abs() < 1e-9);
        assert_eq!(analysis.size, 1_048_576);
        assert_eq!(analysis.bit_rate, Some(672_000));

        assert_eq!(analysis.video_streams.len(), 1);
        let v = &analysis.video_streams[0];
        assert_eq!((v.width, v.height), (1280, 720));
        assert_eq!(v.pixel_format, "yuv420p");
        assert_eq!(v.codec, "h264");
        assert!((v.frame_rate - 29.97).abs() < 0.01);

        assert_eq!(analysis.audio_streams.len(), 1);
        let a = &analysis.audio_streams[0];
        assert_eq!(a.sample_rate, 44_100);
        assert_eq!(a.channels, 2);
        assert_eq!(a.channel_layout, "stereo");

        assert_eq!(analysis.other_streams.len(), 1);
        assert_eq!(analysis.other_streams[0].codec_type, "subtitle");
    }

    #[test]
    fn maps_minimal_output() {
        let parsed: FfprobeOutput = serde_json::from_str("{}").unwrap();
        let analysis = map_output(Path::new("x"), parsed);
        assert_eq!(analysis.duration, 0.0);
        assert!(analysis.video_streams.is_empty());
    }

    #[cfg(unix)]
    mod with_fake_tool {
        use super::*;
        use crate::tools::ToolRegistry;
        use std::os::unix::fs::PermissionsExt;

        /// Install a fake ffprobe that emits fixed JSON and counts its
        /// invocations in a sidecar file.
        fn fake_ffprobe(dir: &Path) -> (ToolRegistry, PathBuf) {
            let count_file = dir.join("invocations");
            let script = dir.join("ffprobe");
            std::fs::write(
                &script,
                format!(
                    "#!/bin/sh\necho x >> {}\ncat <<'EOF'\n{}\nEOF\n",
                    count_file.display(),
                    SAMPLE_JSON
                ),
            )
            .unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

            let cfg = fm_core::config::ToolsConfig {
                ffmpeg_path: None,
                ffprobe_path: Some(script),
            };
            (ToolRegistry::discover(&cfg), count_file)
        }

        fn invocations(count_file: &Path) -> usize {
            std::fs::read_to_string(count_file)
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }

        #[tokio::test]
        async fn unchanged_file_is_served_from_cache() {
            let dir = tempfile::tempdir().unwrap();
            let (tools, count_file) = fake_ffprobe(dir.path());

            let media = dir.path().join("clip.mp4");
            std::fs::write(&media, b"media bytes").unwrap();

            let cache = Arc::new(ProbeCache::open(dir.path().join("cache.json")));
            let prober = Prober::new(&tools, cache).unwrap();

            let first = prober.probe(&media).await.unwrap();
            let second = prober.probe(&media).await.unwrap();

            assert_eq!(invocations(&count_file), 1);
            assert_eq!(first.video_streams.len(), second.video_streams.len());
        }

        #[tokio::test]
        async fn changed_file_is_reprobed() {
            let dir = tempfile::tempdir().unwrap();
            let (tools, count_file) = fake_ffprobe(dir.path());

            let media = dir.path().join("clip.mp4");
            std::fs::write(&media, b"media bytes").unwrap();

            let cache = Arc::new(ProbeCache::open(dir.path().join("cache.json")));
            let prober = Prober::new(&tools, cache).unwrap();

            prober.probe(&media).await.unwrap();
            std::fs::write(&media, b"different, longer media bytes").unwrap();
            prober.probe(&media).await.unwrap();

            assert_eq!(invocations(&count_file), 2);
        }

        #[tokio::test]
        async fn missing_file_is_a_probe_error() {
            let dir = tempfile::tempdir().unwrap();
            let (tools, _) = fake_ffprobe(dir.path());
            let cache = Arc::new(ProbeCache::open(dir.path().join("cache.json")));
            let prober = Prober::new(&tools, cache).unwrap();

            let err = prober.probe(Path::new("/nonexistent.mp4")).await.unwrap_err();
            assert!(matches!(err, fm_core::Error::Probe(_)));
        }
    }
}
