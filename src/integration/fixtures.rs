//! Test fixtures for integration tests
//!
//! Provides a scripted codec engine so conversion flows can be tested
//! without a real encoder.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::batch::InputFile;
use crate::error::TranscodeFault;
use crate::transcode::{CodecEngine, ProgressReporter, TranscodeEvent, TranscodeProfile};
use crate::validation::AudioFormat;

/// Engine that "converts" by copying the input behind an ID3 marker.
///
/// Inputs whose file name contains `corrupt` fail like undecodable audio,
/// inputs containing `panic` make the job panic.
#[derive(Debug, Default)]
pub struct FakeEngine {
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeEngine {
    /// Delay the conversion of one specific file
    pub fn with_delay(mut self, filename: &str, delay: Duration) -> Self {
        self.delays.insert(filename.to_string(), delay);
        self
    }

    /// Delay every conversion
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }
}

#[async_trait]
impl CodecEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        _profile: &TranscodeProfile,
        reporter: &ProgressReporter,
    ) -> Result<(), TranscodeFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now_running, Ordering::SeqCst);

        reporter.report(TranscodeEvent::Started {
            command_line: format!("fake {}", input.display()),
        });

        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let delay = self.delays.get(&name).copied().unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = if name.contains("panic") {
            self.running.fetch_sub(1, Ordering::SeqCst);
            panic!("engine crashed on {}", name);
        } else if name.contains("corrupt") {
            Err(TranscodeFault::Engine(format!(
                "{}: Invalid data found when processing input",
                input.display()
            )))
        } else {
            reporter.progress(50.0);
            match tokio::fs::read(input).await {
                Ok(bytes) => {
                    let mut converted = b"ID3".to_vec();
                    converted.extend(bytes);
                    tokio::fs::write(output, converted)
                        .await
                        .map_err(|e| TranscodeFault::Io(e.to_string()))
                }
                Err(e) => Err(TranscodeFault::Engine(format!(
                    "{}: {}",
                    input.display(),
                    e
                ))),
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Write placeholder inputs under `dir/in` and describe them as InputFiles
pub fn input_files(dir: &Path, names: &[&str]) -> Vec<InputFile> {
    let inbound = dir.join("in");
    std::fs::create_dir_all(&inbound).unwrap();

    names
        .iter()
        .map(|name| {
            let path = inbound.join(name);
            let content = format!("RIFF{}", name);
            std::fs::write(&path, &content).unwrap();
            InputFile {
                original_name: name.to_string(),
                size: content.len() as u64,
                format: Path::new(name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(AudioFormat::from_extension)
                    .unwrap_or(AudioFormat::Wav),
                path,
            }
        })
        .collect()
}

/// Build a multipart/form-data body from (field, filename, content-type, bytes) parts
pub fn multipart_body(
    boundary: &str,
    fields: &[(&str, &str)],
    files: &[(&str, &str, &str, &[u8])],
) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                boundary, name, value
            )
            .as_bytes(),
        );
    }
    for (field, filename, content_type, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                boundary, field, filename, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}
