//! Fixed output encoding profile

use serde::Serialize;

/// Target encoding parameters applied to every job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscodeProfile {
    /// Container/format name as understood by the codec engine
    pub format: &'static str,
    /// Encoder name
    pub codec: &'static str,
    /// Audio bitrate in kbit/s
    pub bitrate_kbps: u32,
    /// Output channel count
    pub channels: u8,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Extension given to converted files
    pub extension: &'static str,
}

impl TranscodeProfile {
    /// 320 kbit/s stereo 44.1 kHz MP3
    pub const fn mp3_320() -> Self {
        Self {
            format: "mp3",
            codec: "libmp3lame",
            bitrate_kbps: 320,
            channels: 2,
            sample_rate: 44100,
            extension: "mp3",
        }
    }

    /// Bitrate in the form ffmpeg expects (e.g. "320k")
    pub fn bitrate_arg(&self) -> String {
        format!("{}k", self.bitrate_kbps)
    }
}

impl Default for TranscodeProfile {
    fn default() -> Self {
        Self::mp3_320()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mp3_profile() {
        let profile = TranscodeProfile::default();
        assert_eq!(profile.format, "mp3");
        assert_eq!(profile.bitrate_arg(), "320k");
        assert_eq!(profile.channels, 2);
        assert_eq!(profile.sample_rate, 44100);
    }
}
