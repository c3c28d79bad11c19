//! Codec engine abstraction
//!
//! The codec itself is an external program. `FfmpegEngine` runs one ffmpeg
//! process per job and turns its output into lifecycle events.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use super::profile::TranscodeProfile;
use super::progress::{
    parse_duration_line, parse_out_time, percent_of, ProgressReporter, TranscodeEvent,
};
use crate::error::TranscodeFault;

/// Number of trailing stderr lines kept for failure messages
const STDERR_TAIL: usize = 16;

/// Converts one input file into one output file
#[async_trait]
pub trait CodecEngine: Send + Sync {
    /// Engine name for logs
    fn name(&self) -> &str;

    /// Resolve once the conversion reached a terminal state.
    ///
    /// Implementations report `Started` and `Progress` events; terminal
    /// events are emitted by the caller.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        profile: &TranscodeProfile,
        reporter: &ProgressReporter,
    ) -> Result<(), TranscodeFault>;
}

/// Runs the ffmpeg command-line tool
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg_path: PathBuf,
}

impl FfmpegEngine {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Build ffmpeg arguments for one conversion
    pub fn build_args(input: &Path, output: &Path, profile: &TranscodeProfile) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-progress".to_string(),
            "pipe:1".to_string(),
        ];

        args.extend(["-i".to_string(), input.to_string_lossy().to_string()]);

        // Drop cover art and any video track
        args.push("-vn".to_string());

        args.extend(["-c:a".to_string(), profile.codec.to_string()]);
        args.extend(["-b:a".to_string(), profile.bitrate_arg()]);
        args.extend(["-ac".to_string(), profile.channels.to_string()]);
        args.extend(["-ar".to_string(), profile.sample_rate.to_string()]);
        args.extend(["-f".to_string(), profile.format.to_string()]);

        args.push(output.to_string_lossy().to_string());
        args
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl CodecEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        profile: &TranscodeProfile,
        reporter: &ProgressReporter,
    ) -> Result<(), TranscodeFault> {
        let args = Self::build_args(input, output, profile);
        debug!("FFmpeg args: {:?}", args);

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TranscodeFault::Spawn(format!("{}: {}", self.ffmpeg_path.display(), e))
            })?;

        reporter.report(TranscodeEvent::Started {
            command_line: format!("{} {}", self.ffmpeg_path.display(), args.join(" ")),
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TranscodeFault::Spawn("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TranscodeFault::Spawn("stderr not captured".to_string()))?;

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut duration: Option<f64> = None;
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);

        while !(stdout_done && stderr_done) {
            tokio::select! {
                line = stdout_lines.next_line(), if !stdout_done => match line {
                    Ok(Some(line)) => {
                        // out_time_ms and out_time_us carry the same value
                        if line.starts_with("out_time_us=") {
                            if let Some(percent) = duration
                                .zip(parse_out_time(&line))
                                .and_then(|(total, pos)| percent_of(pos, total))
                            {
                                reporter.progress(percent);
                            }
                        }
                    }
                    _ => stdout_done = true,
                },
                line = stderr_lines.next_line(), if !stderr_done => match line {
                    Ok(Some(line)) => {
                        if duration.is_none() {
                            duration = parse_duration_line(&line);
                        }
                        let line = line.trim();
                        if !line.is_empty() {
                            if tail.len() == STDERR_TAIL {
                                tail.pop_front();
                            }
                            tail.push_back(line.to_string());
                        }
                    }
                    _ => stderr_done = true,
                },
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| TranscodeFault::Engine(format!("failed to wait for ffmpeg: {}", e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(TranscodeFault::Engine(failure_message(&tail, status)))
        }
    }
}

/// Pick the most useful lines from ffmpeg's stderr
fn failure_message(tail: &VecDeque<String>, status: std::process::ExitStatus) -> String {
    const MARKERS: [&str; 6] = [
        "error",
        "invalid",
        "no such file",
        "not found",
        "permission denied",
        "unsupported",
    ];

    let mut errors: Vec<&str> = tail
        .iter()
        .filter(|l| {
            let lower = l.to_lowercase();
            MARKERS.iter().any(|m| lower.contains(m))
        })
        .map(String::as_str)
        .collect();
    if errors.len() > 2 {
        errors.drain(..errors.len() - 2);
    }

    if !errors.is_empty() {
        errors.join("; ")
    } else if let Some(last) = tail.back() {
        last.clone()
    } else {
        format!("codec engine exited with {}", status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args() {
        let args = FfmpegEngine::build_args(
            Path::new("/in/track1.wav"),
            Path::new("/out/track1.mp3"),
            &TranscodeProfile::mp3_320(),
        );
        let joined = args.join(" ");
        assert!(joined.starts_with("-y -hide_banner -nostats -progress pipe:1"));
        assert!(joined.contains("-i /in/track1.wav"));
        assert!(joined.contains("-c:a libmp3lame"));
        assert!(joined.contains("-b:a 320k"));
        assert!(joined.contains("-ac 2"));
        assert!(joined.contains("-ar 44100"));
        assert!(joined.contains("-f mp3"));
        assert_eq!(args.last().unwrap(), "/out/track1.mp3");
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_fault() {
        let engine = FfmpegEngine::new("/nonexistent/bin/ffmpeg-missing");
        let result = engine
            .transcode(
                Path::new("in.wav"),
                Path::new("out.mp3"),
                &TranscodeProfile::mp3_320(),
                &ProgressReporter::noop("t"),
            )
            .await;
        assert!(matches!(result, Err(TranscodeFault::Spawn(_))));
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;
        use tokio::sync::mpsc;

        /// Write an executable shell script standing in for ffmpeg
        fn fake_ffmpeg(dir: &TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("fake-ffmpeg");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_success_reports_progress() {
            let dir = TempDir::new().unwrap();
            // The output path is the last argument
            let script = fake_ffmpeg(
                &dir,
                r#"for last; do :; done
echo "  Duration: 00:00:10.00, start: 0.000000, bitrate: 1411 kb/s" >&2
echo "out_time_us=5000000"
echo "progress=continue"
echo "out_time_us=10000000"
echo "progress=end"
printf 'ID3' > "$last""#,
            );
            let engine = FfmpegEngine::new(&script);
            let output = dir.path().join("out.mp3");
            let (tx, mut rx) = mpsc::channel(16);

            engine
                .transcode(
                    Path::new("in.wav"),
                    &output,
                    &TranscodeProfile::mp3_320(),
                    &ProgressReporter::new("in.wav", tx),
                )
                .await
                .unwrap();

            assert_eq!(std::fs::read(&output).unwrap(), b"ID3");

            let mut events = Vec::new();
            while let Ok(e) = rx.try_recv() {
                events.push(e.event);
            }
            assert!(matches!(events[0], TranscodeEvent::Started { .. }));
            assert!(events.contains(&TranscodeEvent::Progress { percent: 50.0 }));
            assert!(events.contains(&TranscodeEvent::Progress { percent: 100.0 }));
        }

        #[tokio::test]
        async fn test_failure_uses_stderr() {
            let dir = TempDir::new().unwrap();
            let script = fake_ffmpeg(
                &dir,
                r#"echo "Input #0, wav, from 'in.wav':" >&2
echo "in.wav: Invalid data found when processing input" >&2
exit 1"#,
            );
            let engine = FfmpegEngine::new(&script);

            let result = engine
                .transcode(
                    Path::new("in.wav"),
                    &dir.path().join("out.mp3"),
                    &TranscodeProfile::mp3_320(),
                    &ProgressReporter::noop("in.wav"),
                )
                .await;

            assert_eq!(
                result,
                Err(TranscodeFault::Engine(
                    "in.wav: Invalid data found when processing input".to_string()
                ))
            );
        }

        #[tokio::test]
        async fn test_silent_failure_reports_status() {
            let dir = TempDir::new().unwrap();
            let script = fake_ffmpeg(&dir, "exit 3");
            let engine = FfmpegEngine::new(&script);

            let result = engine
                .transcode(
                    Path::new("in.wav"),
                    &dir.path().join("out.mp3"),
                    &TranscodeProfile::mp3_320(),
                    &ProgressReporter::noop("in.wav"),
                )
                .await;

            match result {
                Err(TranscodeFault::Engine(msg)) => assert!(msg.contains("exited with")),
                other => panic!("unexpected result: {:?}", other),
            }
        }
    }
}
