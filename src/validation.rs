//! Upload validation
//!
//! Checks applied at the boundary before any conversion starts: file count,
//! per-file size, audio type allow-list and filename sanitizing.

use serde::Serialize;
use std::path::Path;

use crate::config::LimitsConfig;
use crate::error::{ConverterError, Result};

/// Accepted source formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
    Flac,
    Aac,
    Ogg,
    M4a,
    Mp4,
    Webm,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 8] = [
        AudioFormat::Wav,
        AudioFormat::Mp3,
        AudioFormat::Flac,
        AudioFormat::Aac,
        AudioFormat::Ogg,
        AudioFormat::M4a,
        AudioFormat::Mp4,
        AudioFormat::Webm,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
            AudioFormat::Aac => "aac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::M4a => "m4a",
            AudioFormat::Mp4 => "mp4",
            AudioFormat::Webm => "webm",
        }
    }

    /// Upper-case label used in the capability listing
    pub fn label(&self) -> String {
        self.extension().to_uppercase()
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let format = match mime.as_str() {
            "audio/wav" | "audio/wave" | "audio/x-wav" => AudioFormat::Wav,
            "audio/mpeg" | "audio/mp3" => AudioFormat::Mp3,
            "audio/flac" | "audio/x-flac" => AudioFormat::Flac,
            "audio/aac" | "audio/x-aac" => AudioFormat::Aac,
            "audio/ogg" | "audio/vorbis" => AudioFormat::Ogg,
            "audio/webm" => AudioFormat::Webm,
            "audio/x-m4a" => AudioFormat::M4a,
            "audio/mp4" | "audio/x-mp4" => AudioFormat::Mp4,
            _ => return None,
        };
        Some(format)
    }
}

/// Limits enforced on every conversion request
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_files: usize,
    pub max_file_size: usize,
}

impl UploadPolicy {
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self {
            max_files: limits.max_files,
            max_file_size: limits.max_file_size_bytes(),
        }
    }

    /// Check that one more file still fits in the request
    pub fn check_count(&self, already_accepted: usize) -> Result<()> {
        if already_accepted >= self.max_files {
            return Err(ConverterError::Validation(format!(
                "too many files: at most {} per request",
                self.max_files
            )));
        }
        Ok(())
    }

    pub fn check_size(&self, filename: &str, size: usize) -> Result<()> {
        if size > self.max_file_size {
            return Err(ConverterError::Validation(format!(
                "file too large: {} (limit {}MB)",
                filename,
                self.max_file_size / (1024 * 1024)
            )));
        }
        Ok(())
    }

    /// Classify a file by extension, falling back to its declared MIME type
    pub fn classify(&self, filename: &str, mime: Option<&str>) -> Result<AudioFormat> {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(AudioFormat::from_extension)
            .or_else(|| mime.and_then(AudioFormat::from_mime))
            .ok_or_else(|| {
                ConverterError::Validation(format!(
                    "unsupported file format: {}. Use WAV, MP3, FLAC, AAC, OGG, M4A, MP4 or WEBM",
                    filename
                ))
            })
    }
}

/// Reduce an untrusted filename to a single safe path component
pub fn sanitize_filename(raw: &str) -> Result<String> {
    let last = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if last.is_empty() || last == "." || last == ".." || last.contains('\0') {
        return Err(ConverterError::Validation(format!(
            "invalid filename: {:?}",
            raw
        )));
    }
    Ok(last.to_string())
}
