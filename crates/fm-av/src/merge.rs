//! Compatibility planning and merging of multiple media files.
//!
//! The engine probes every input, compares stream parameters against the
//! first input, and picks one of two strategies: a lossless concat with
//! stream copy when everything matches, or a normalizing re-encode that
//! scales, pads, retimes, and resamples each input to common parameters
//! before an N-way concatenation. The full incompatibility list is always
//! collected before the decision so the caller can explain *why* a
//! re-encode was necessary.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::command::ToolCommand;
use crate::probe::{MediaAnalysis, Prober};
use crate::progress::ProgressSender;
use crate::tools::ToolRegistry;

/// Duration assumed for an input whose duration is unknown, when
/// synthesizing a replacement stream.
const DEFAULT_SYNTH_DURATION: f64 = 10.0;

/// Frame rates closer than this are considered equal.
const FRAME_RATE_TOLERANCE: f64 = 0.1;

/// How the merge was (or would be) performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Single input: plain byte copy to the output path.
    Copy,
    /// Compatible inputs: concat demuxer with stream copy, no re-encode.
    Lossless,
    /// Incompatible inputs: filter-graph normalization and re-encode.
    Normalize,
}

/// Result of the compatibility scan across all inputs.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityReport {
    /// Human-readable reasons the inputs cannot be losslessly joined.
    /// Empty means the lossless path applies.
    pub incompatibilities: Vec<String>,
}

impl CompatibilityReport {
    /// Whether all inputs share compatible stream parameters.
    pub fn is_compatible(&self) -> bool {
        self.incompatibilities.is_empty()
    }
}

/// Outcome of a successful merge.
#[derive(Debug, Clone)]
pub struct MergeReport {
    /// Strategy that produced the output.
    pub strategy: MergeStrategy,
    /// Incompatibility reasons collected during planning (empty for
    /// [`MergeStrategy::Copy`] and [`MergeStrategy::Lossless`]).
    pub incompatibilities: Vec<String>,
    /// The produced output file.
    pub output: PathBuf,
}

/// Compare every input against the first and collect all mismatches.
///
/// The scan never short-circuits: every incompatibility across every input
/// is recorded before the strategy decision.
pub fn check_compatibility(analyses: &[MediaAnalysis]) -> CompatibilityReport {
    let mut report = CompatibilityReport::default();
    let Some(first) = analyses.first() else {
        return report;
    };

    let base_video = first.primary_video();
    let base_audio = first.primary_audio();

    for (i, analysis) in analyses.iter().enumerate().skip(1) {
        let n = i + 1;
        let video = analysis.primary_video();
        let audio = analysis.primary_audio();

        match (base_video, video) {
            (None, Some(_)) => report
                .incompatibilities
                .push(format!("Input {n} has a video stream but the first does not")),
            (Some(_), None) => report
                .incompatibilities
                .push(format!("Input {n} has no video stream but the first does")),
            (Some(b), Some(v)) => {
                if b.width != v.width || b.height != v.height {
                    report.incompatibilities.push(format!(
                        "Input {n} has different resolution: {}x{}",
                        v.width, v.height
                    ));
                }
                if (b.frame_rate - v.frame_rate).abs() > FRAME_RATE_TOLERANCE {
                    report.incompatibilities.push(format!(
                        "Input {n} has different frame rate: {:.2}",
                        v.frame_rate
                    ));
                }
                if b.pixel_format != v.pixel_format {
                    report.incompatibilities.push(format!(
                        "Input {n} has different pixel format: {}",
                        v.pixel_format
                    ));
                }
                if b.codec != v.codec {
                    report.incompatibilities.push(format!(
                        "Input {n} has different video codec: {}",
                        v.codec
                    ));
                }
            }
            (None, None) => {}
        }

        match (base_audio, audio) {
            (None, Some(_)) => report
                .incompatibilities
                .push(format!("Input {n} has an audio stream but the first does not")),
            (Some(_), None) => report
                .incompatibilities
                .push(format!("Input {n} has no audio stream but the first does")),
            (Some(b), Some(a)) => {
                if b.sample_rate != a.sample_rate {
                    report.incompatibilities.push(format!(
                        "Input {n} has different audio sample rate: {}",
                        a.sample_rate
                    ));
                }
                if b.channels != a.channels {
                    report.incompatibilities.push(format!(
                        "Input {n} has different audio channels: {}",
                        a.channels
                    ));
                }
                if b.codec != a.codec {
                    report.incompatibilities.push(format!(
                        "Input {n} has different audio codec: {}",
                        a.codec
                    ));
                }
            }
            (None, None) => {}
        }
    }

    report
}

/// Merge engine driving ffmpeg through the [`ToolRegistry`].
#[derive(Debug)]
pub struct MergeEngine {
    tools: ToolRegistry,
    settings: fm_core::config::MergeConfig,
    cancellation: CancellationToken,
}

impl MergeEngine {
    /// Create an engine over the given registry and encode settings.
    pub fn new(tools: ToolRegistry, settings: fm_core::config::MergeConfig) -> Self {
        Self {
            tools,
            settings,
            cancellation: CancellationToken::new(),
        }
    }

    /// Kill a running merge when this token fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Merge the inputs, in order, into `output`.
    ///
    /// Progress is reported at fixed milestones so the caller can render an
    /// indicator without polling the child process. Temporary files (the
    /// concat manifest) are removed on every exit path.
    ///
    /// # Errors
    ///
    /// - [`fm_core::Error::Validation`] when no inputs are given.
    /// - [`fm_core::Error::Probe`] naming the offending file when any input
    ///   cannot be analyzed.
    /// - [`fm_core::Error::Execution`] when the underlying command fails.
    /// - [`fm_core::Error::Consistency`] when ffmpeg reports success but
    ///   the output file does not exist.
    pub async fn merge(
        &self,
        prober: &Prober,
        inputs: &[PathBuf],
        output: &Path,
        progress: &ProgressSender,
    ) -> fm_core::Result<MergeReport> {
        match inputs {
            [] => Err(fm_core::Error::Validation(
                "no input files to merge".into(),
            )),
            [single] => {
                tracing::info!("single input, copying {} to {}", single.display(), output.display());
                std::fs::copy(single, output)?;
                progress.send(100.0, "Merge completed");
                Ok(MergeReport {
                    strategy: MergeStrategy::Copy,
                    incompatibilities: Vec::new(),
                    output: output.to_path_buf(),
                })
            }
            _ => self.merge_many(prober, inputs, output, progress).await,
        }
    }

    async fn merge_many(
        &self,
        prober: &Prober,
        inputs: &[PathBuf],
        output: &Path,
        progress: &ProgressSender,
    ) -> fm_core::Result<MergeReport> {
        progress.send(5.0, "Checking input compatibility...");

        let mut analyses = Vec::with_capacity(inputs.len());
        for path in inputs {
            let analysis = prober.probe(path).await.map_err(|e| {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                fm_core::Error::probe(format!("could not analyze {name}: {e}"))
            })?;
            analyses.push(analysis);
        }

        let report = check_compatibility(&analyses);

        if report.is_compatible() {
            progress.send(8.0, "Inputs are compatible, using lossless merge...");
            tracing::info!("merging {} inputs losslessly", inputs.len());
            self.merge_lossless(inputs, output, progress).await?;
            Ok(MergeReport {
                strategy: MergeStrategy::Lossless,
                incompatibilities: Vec::new(),
                output: output.to_path_buf(),
            })
        } else {
            progress.send(
                10.0,
                &format!(
                    "Inputs are incompatible ({} differences), normalizing...",
                    report.incompatibilities.len()
                ),
            );
            tracing::info!(
                "normalizing {} inputs ({} incompatibilities)",
                inputs.len(),
                report.incompatibilities.len()
            );
            self.merge_normalize(&analyses, inputs, output, progress)
                .await?;
            Ok(MergeReport {
                strategy: MergeStrategy::Normalize,
                incompatibilities: report.incompatibilities,
                output: output.to_path_buf(),
            })
        }
    }

    /// Concat-demuxer merge with stream copy. No re-encode parameters are
    /// emitted on this path.
    async fn merge_lossless(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        progress: &ProgressSender,
    ) -> fm_core::Result<()> {
        let ffmpeg = self.tools.require("ffmpeg")?;

        // The manifest lives in a NamedTempFile so it is removed when this
        // scope exits, success or failure.
        let mut manifest = tempfile::NamedTempFile::new()?;
        std::io::Write::write_all(&mut manifest, build_concat_manifest(inputs).as_bytes())?;

        let mut cmd = ToolCommand::new(ffmpeg.path.clone());
        cmd.args(["-y", "-f", "concat", "-safe", "0", "-i"]);
        cmd.arg(manifest.path().to_string_lossy());
        cmd.args(["-c", "copy"]);
        cmd.arg(output.to_string_lossy());
        cmd.cancellation(self.cancellation.clone());

        progress.send(90.0, "Concatenating streams...");
        let result = cmd.execute().await?;
        if !result.success() {
            return Err(fm_core::Error::execution(format!(
                "lossless merge failed: {}",
                result.failure_summary()
            )));
        }
        if !output.exists() {
            return Err(fm_core::Error::Consistency(format!(
                "merge reported success but {} was not produced",
                output.display()
            )));
        }

        progress.send(100.0, "Merge completed");
        Ok(())
    }

    /// Filter-graph merge: every input is normalized to the target
    /// parameters and the results are concatenated and re-encoded.
    async fn merge_normalize(
        &self,
        analyses: &[MediaAnalysis],
        inputs: &[PathBuf],
        output: &Path,
        progress: &ProgressSender,
    ) -> fm_core::Result<()> {
        let ffmpeg = self.tools.require("ffmpeg")?;

        let args = build_normalize_args(analyses, inputs, output, &self.settings);
        let mut cmd = ToolCommand::new(ffmpeg.path.clone());
        cmd.args(args);
        cmd.cancellation(self.cancellation.clone());

        progress.send(90.0, "Re-encoding and concatenating...");
        let result = cmd.execute().await?;
        if !result.success() {
            return Err(fm_core::Error::execution(format!(
                "normalizing merge failed: {}",
                result.failure_summary()
            )));
        }
        if !output.exists() {
            return Err(fm_core::Error::Consistency(format!(
                "merge reported success but {} was not produced",
                output.display()
            )));
        }

        progress.send(100.0, "Merge completed");
        Ok(())
    }
}

/// Render the concat-demuxer manifest. Paths are single-quoted with
/// embedded quotes escaped the way the demuxer expects (`'\''`).
pub fn build_concat_manifest(inputs: &[PathBuf]) -> String {
    let mut manifest = String::new();
    for path in inputs {
        let escaped = path.display().to_string().replace('\'', r"'\''");
        let _ = writeln!(manifest, "file '{escaped}'");
    }
    manifest
}

/// Target video parameters for the normalize path, taken from the first
/// input that has a video stream.
fn normalize_target(analyses: &[MediaAnalysis]) -> (u32, u32, f64) {
    analyses
        .iter()
        .find_map(|a| a.primary_video())
        .map(|v| {
            let fps = if v.frame_rate > 0.0 { v.frame_rate } else { 30.0 };
            (v.width, v.height, fps)
        })
        .unwrap_or((1920, 1080, 30.0))
}

/// Format a frame rate for filter text: integral rates without decimals.
fn format_fps(fps: f64) -> String {
    if (fps - fps.round()).abs() < 1e-9 {
        format!("{}", fps.round() as u64)
    } else {
        format!("{fps:.2}")
    }
}

/// Build the complete ffmpeg argument list for the normalize path.
pub fn build_normalize_args(
    analyses: &[MediaAnalysis],
    inputs: &[PathBuf],
    output: &Path,
    settings: &fm_core::config::MergeConfig,
) -> Vec<String> {
    let (width, height, target_fps) = normalize_target(analyses);
    let fps = format_fps(target_fps);
    let rate = settings.audio_sample_rate;

    let mut filters = Vec::new();
    let mut video_labels = String::new();
    let mut audio_labels = String::new();

    for (i, analysis) in analyses.iter().enumerate() {
        let duration = if analysis.duration > 0.0 {
            analysis.duration
        } else {
            DEFAULT_SYNTH_DURATION
        };

        if analysis.primary_video().is_some() {
            filters.push(format!(
                "[{i}:v]scale={width}:{height}:force_original_aspect_ratio=decrease,\
                 pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps}[v{i}]"
            ));
        } else {
            filters.push(format!(
                "color=c=black:s={width}x{height}:r={fps}:d={duration}[v{i}]"
            ));
        }
        let _ = write!(video_labels, "[v{i}]");

        if analysis.primary_audio().is_some() {
            filters.push(format!("[{i}:a]aresample={rate}[a{i}]"));
        } else {
            filters.push(format!("anullsrc=r={rate}:cl=stereo:d={duration}[a{i}]"));
        }
        let _ = write!(audio_labels, "[a{i}]");
    }

    let n = analyses.len();
    filters.push(format!("{video_labels}concat=n={n}:v=1:a=0[v]"));
    filters.push(format!("{audio_labels}concat=n={n}:v=0:a=1[a]"));

    let mut args = vec!["-y".to_string()];
    for input in inputs {
        args.push("-i".into());
        args.push(input.display().to_string());
    }
    args.push("-filter_complex".into());
    args.push(filters.join(";"));
    args.extend(["-map".into(), "[v]".into(), "-map".into(), "[a]".into()]);
    args.extend([
        "-c:v".into(),
        "libx264".into(),
        "-crf".into(),
        settings.video_crf.to_string(),
        "-preset".into(),
        settings.video_preset.clone(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        settings.audio_bitrate.clone(),
    ]);
    args.push(output.display().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{AudioStreamInfo, VideoStreamInfo};

    fn analysis(width: u32, height: u32, fps: f64) -> MediaAnalysis {
        MediaAnalysis {
            file_path: PathBuf::from("clip.mp4"),
            format_name: "mp4".into(),
            duration: 20.0,
            bit_rate: None,
            size: 1000,
            video_streams: vec![VideoStreamInfo {
                width,
                height,
                pixel_format: "yuv420p".into(),
                frame_rate: fps,
                codec: "h264".into(),
                bit_rate: None,
            }],
            audio_streams: vec![AudioStreamInfo {
                sample_rate: 48_000,
                channels: 2,
                channel_layout: "stereo".into(),
                codec: "aac".into(),
                bit_rate: None,
            }],
            other_streams: vec![],
        }
    }

    #[test]
    fn identical_inputs_are_compatible() {
        let a = analysis(1920, 1080, 30.0);
        let b = analysis(1920, 1080, 30.0);
        let report = check_compatibility(&[a, b]);
        assert!(report.is_compatible(), "{:?}", report.incompatibilities);
    }

    #[test]
    fn frame_rate_within_tolerance_is_compatible() {
        let a = analysis(1920, 1080, 29.97);
        let b = analysis(1920, 1080, 30.0);
        let report = check_compatibility(&[a, b]);
        assert!(report.is_compatible());
    }

    #[test]
    fn differing_resolution_names_resolution() {
        let a = analysis(1920, 1080, 30.0);
        let b = analysis(1280, 720, 30.0);
        let report = check_compatibility(&[a, b]);
        assert_eq!(report.incompatibilities.len(), 1);
        assert!(report.incompatibilities[0].contains("resolution"));
        assert!(report.incompatibilities[0].contains("1280x720"));
    }

    #[test]
    fn scan_collects_all_mismatches_without_short_circuit() {
        let a = analysis(1920, 1080, 30.0);
        let mut b = analysis(1280, 720, 25.0);
        b.video_streams[0].codec = "hevc".into();
        b.audio_streams[0].sample_rate = 44_100;
        let mut c = analysis(1920, 1080, 30.0);
        c.audio_streams.clear();

        let report = check_compatibility(&[a, b, c]);
        // resolution + frame rate + video codec + sample rate from input 2,
        // missing audio from input 3.
        assert_eq!(report.incompatibilities.len(), 5);
        assert!(report
            .incompatibilities
            .iter()
            .any(|r| r.contains("Input 3") && r.contains("no audio stream")));
    }

    #[test]
    fn missing_vs_present_video_is_incompatible() {
        let a = analysis(1920, 1080, 30.0);
        let mut b = analysis(1920, 1080, 30.0);
        b.video_streams.clear();
        let report = check_compatibility(&[a, b]);
        assert!(!report.is_compatible());
        assert!(report.incompatibilities[0].contains("no video stream"));
    }

    #[test]
    fn manifest_quotes_and_escapes_paths() {
        let manifest = build_concat_manifest(&[
            PathBuf::from("/videos/one.mp4"),
            PathBuf::from("/videos/it's here.mp4"),
        ]);
        assert!(manifest.contains("file '/videos/one.mp4'\n"));
        assert!(manifest.contains(r"file '/videos/it'\''s here.mp4'"));
    }

    #[test]
    fn normalize_args_scale_and_encode() {
        let analyses = vec![analysis(1920, 1080, 30.0), analysis(1280, 720, 25.0)];
        let inputs = vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")];
        let settings = fm_core::config::MergeConfig::default();
        let args = build_normalize_args(&analyses, &inputs, Path::new("out.mp4"), &settings);

        let joined = args.join(" ");
        assert!(joined.contains("scale=1920:1080:force_original_aspect_ratio=decrease"));
        assert!(joined.contains("fps=30"));
        assert!(joined.contains("concat=n=2:v=1:a=0[v]"));
        assert!(joined.contains("aresample=44100"));
        assert!(joined.contains("libx264"));
        assert!(joined.contains("-crf 18"));
        assert!(joined.contains("-preset veryfast"));
        assert!(joined.contains("-b:a 192k"));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn normalize_synthesizes_missing_streams() {
        let mut silent = analysis(1920, 1080, 30.0);
        silent.audio_streams.clear();
        let mut audio_only = analysis(0, 0, 0.0);
        audio_only.video_streams.clear();
        audio_only.duration = 7.5;

        let analyses = vec![analysis(1920, 1080, 30.0), silent, audio_only];
        let inputs = vec![
            PathBuf::from("a.mp4"),
            PathBuf::from("b.mp4"),
            PathBuf::from("c.m4a"),
        ];
        let settings = fm_core::config::MergeConfig::default();
        let args = build_normalize_args(&analyses, &inputs, Path::new("out.mp4"), &settings);
        let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];

        assert!(graph.contains("anullsrc=r=44100:cl=stereo:d=20[a1]"));
        assert!(graph.contains("color=c=black:s=1920x1080:r=30:d=7.5[v2]"));
        assert!(graph.contains("concat=n=3:v=1:a=0[v]"));
    }

    #[test]
    fn lossless_strategy_emits_no_reencode_parameters() {
        // The lossless command line is fixed; assert the property the
        // planner guarantees: no encoder settings appear on that path.
        let inputs = vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")];
        let manifest = build_concat_manifest(&inputs);
        assert!(!manifest.contains("libx264"));
        assert!(!manifest.contains("crf"));
    }

    #[cfg(unix)]
    mod with_fake_tools {
        use super::*;
        use crate::probe::ProbeCache;
        use crate::tools::ToolRegistry;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::Arc;

        const PROBE_JSON: &str = r#"{"format":{"duration":"5.0","size":"100"},
            "streams":[
                {"index":0,"codec_type":"video","codec_name":"h264","width":640,
                 "height":480,"pix_fmt":"yuv420p","r_frame_rate":"30/1"},
                {"index":1,"codec_type":"audio","codec_name":"aac",
                 "sample_rate":"44100","channels":2,"channel_layout":"stereo"}
            ]}"#;

        fn write_script(path: &Path, body: &str) {
            std::fs::write(path, body).unwrap();
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        fn setup(dir: &Path, ffmpeg_body: &str) -> (MergeEngine, Prober) {
            let ffprobe = dir.join("ffprobe");
            write_script(&ffprobe, &format!("#!/bin/sh\ncat <<'EOF'\n{PROBE_JSON}\nEOF\n"));
            let ffmpeg = dir.join("ffmpeg");
            write_script(&ffmpeg, ffmpeg_body);

            let cfg = fm_core::config::ToolsConfig {
                ffmpeg_path: Some(ffmpeg),
                ffprobe_path: Some(ffprobe),
            };
            let tools = ToolRegistry::discover(&cfg);
            let cache = Arc::new(ProbeCache::open(dir.join("cache.json")));
            let prober = Prober::new(&tools, cache).unwrap();
            let engine = MergeEngine::new(tools, fm_core::config::MergeConfig::default());
            (engine, prober)
        }

        #[tokio::test]
        async fn zero_inputs_is_an_error() {
            let dir = tempfile::tempdir().unwrap();
            let (engine, prober) = setup(dir.path(), "#!/bin/sh\nexit 0\n");
            let err = engine
                .merge(&prober, &[], &dir.path().join("out.mp4"), &ProgressSender::noop())
                .await
                .unwrap_err();
            assert!(matches!(err, fm_core::Error::Validation(_)));
        }

        #[tokio::test]
        async fn single_input_is_a_byte_copy() {
            let dir = tempfile::tempdir().unwrap();
            let (engine, prober) = setup(dir.path(), "#!/bin/sh\nexit 0\n");

            let src = dir.path().join("only.mp4");
            std::fs::write(&src, b"original bytes").unwrap();
            let out = dir.path().join("out.mp4");

            let report = engine
                .merge(&prober, &[src.clone()], &out, &ProgressSender::noop())
                .await
                .unwrap();
            assert_eq!(report.strategy, MergeStrategy::Copy);
            assert_eq!(std::fs::read(&out).unwrap(), std::fs::read(&src).unwrap());
        }

        #[tokio::test]
        async fn compatible_inputs_take_the_lossless_path() {
            let dir = tempfile::tempdir().unwrap();
            // Fake ffmpeg: write the last argument (the output path).
            let (engine, prober) = setup(
                dir.path(),
                "#!/bin/sh\nfor last; do :; done\necho merged > \"$last\"\n",
            );

            let a = dir.path().join("a.mp4");
            let b = dir.path().join("b.mp4");
            std::fs::write(&a, b"aaa").unwrap();
            std::fs::write(&b, b"bbb").unwrap();
            let out = dir.path().join("out.mp4");

            let report = engine
                .merge(&prober, &[a, b], &out, &ProgressSender::noop())
                .await
                .unwrap();
            assert_eq!(report.strategy, MergeStrategy::Lossless);
            assert!(report.incompatibilities.is_empty());
            assert!(out.exists());
        }

        #[tokio::test]
        async fn failing_tool_aborts_the_merge() {
            let dir = tempfile::tempdir().unwrap();
            let (engine, prober) = setup(dir.path(), "#!/bin/sh\necho broken >&2\nexit 1\n");

            let a = dir.path().join("a.mp4");
            let b = dir.path().join("b.mp4");
            std::fs::write(&a, b"aaa").unwrap();
            std::fs::write(&b, b"bbb").unwrap();

            let err = engine
                .merge(&prober, &[a, b], &dir.path().join("out.mp4"), &ProgressSender::noop())
                .await
                .unwrap_err();
            assert!(matches!(err, fm_core::Error::Execution(_)));
            assert!(err.to_string().contains("broken"));
        }

        #[tokio::test]
        async fn silent_success_without_output_is_a_consistency_error() {
            let dir = tempfile::tempdir().unwrap();
            let (engine, prober) = setup(dir.path(), "#!/bin/sh\nexit 0\n");

            let a = dir.path().join("a.mp4");
            let b = dir.path().join("b.mp4");
            std::fs::write(&a, b"aaa").unwrap();
            std::fs::write(&b, b"bbb").unwrap();

            let err = engine
                .merge(&prober, &[a, b], &dir.path().join("out.mp4"), &ProgressSender::noop())
                .await
                .unwrap_err();
            assert!(matches!(err, fm_core::Error::Consistency(_)));
        }

        #[tokio::test]
        async fn progress_reaches_completion() {
            let dir = tempfile::tempdir().unwrap();
            let (engine, prober) = setup(
                dir.path(),
                "#!/bin/sh\nfor last; do :; done\necho merged > \"$last\"\n",
            );

            let a = dir.path().join("a.mp4");
            let b = dir.path().join("b.mp4");
            std::fs::write(&a, b"aaa").unwrap();
            std::fs::write(&b, b"bbb").unwrap();

            let seen = Arc::new(parking_lot::Mutex::new(Vec::<f32>::new()));
            let sink = seen.clone();
            let progress = ProgressSender::new(move |pct, _| sink.lock().push(pct));

            engine
                .merge(&prober, &[a, b], &dir.path().join("out.mp4"), &progress)
                .await
                .unwrap();

            let milestones = seen.lock();
            assert_eq!(milestones.first().copied(), Some(5.0));
            assert_eq!(milestones.last().copied(), Some(100.0));
        }
    }
}
