//! ZIP packaging of converted files

use serde::Serialize;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{ConverterError, Result};
use crate::storage::SessionId;
use crate::transcode::TranscodeSuccess;

/// Archive file extension
pub const ARCHIVE_EXT: &str = "zip";

/// Where a finished archive can be found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveLocator {
    pub session_id: SessionId,
    #[serde(skip)]
    pub path: PathBuf,
    /// Number of files packed into the archive
    pub entries: usize,
}

/// Archive file name for a session: `converted_<session>.zip`
pub fn archive_name(session: &SessionId) -> String {
    format!("converted_{}.{}", session, ARCHIVE_EXT)
}

/// Builds one archive per session inside its outbound directory
#[derive(Debug, Clone)]
pub struct Archiver {
    compression_level: i64,
}

impl Default for Archiver {
    fn default() -> Self {
        Self {
            compression_level: 9,
        }
    }
}

impl Archiver {
    /// Expected archive location for `session`
    pub fn archive_path(session: &SessionId, outbound_dir: &Path) -> PathBuf {
        outbound_dir.join(archive_name(session))
    }

    /// Pack every converted file that still exists into the session archive.
    ///
    /// Missing files are skipped. The archive is written under a temporary
    /// name and renamed into place once complete.
    pub async fn build_archive(
        &self,
        session: &SessionId,
        successes: &[TranscodeSuccess],
        outbound_dir: &Path,
    ) -> Result<ArchiveLocator> {
        let path = Self::archive_path(session, outbound_dir);
        let names: Vec<String> = successes.iter().map(|s| s.converted_name.clone()).collect();
        let dir = outbound_dir.to_path_buf();
        let target = path.clone();
        let level = self.compression_level;

        let entries = tokio::task::spawn_blocking(move || write_zip(&dir, &names, &target, level))
            .await
            .map_err(|e| {
                ConverterError::storage(
                    "archive task failed for",
                    &path,
                    std::io::Error::new(ErrorKind::Other, e.to_string()),
                )
            })??;

        info!("Archived {} file(s) for session {}", entries, session);

        Ok(ArchiveLocator {
            session_id: session.clone(),
            path,
            entries,
        })
    }

    /// Remove a previously built archive, if any
    pub async fn discard(&self, session: &SessionId, outbound_dir: &Path) -> Result<()> {
        let path = Self::archive_path(session, outbound_dir);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Discarded stale archive for session {}", session);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConverterError::storage("remove", &path, e)),
        }
    }
}

fn write_zip(dir: &Path, names: &[String], target: &Path, level: i64) -> Result<usize> {
    let partial = target.with_extension(format!("{}.part", ARCHIVE_EXT));

    let file = File::create(&partial).map_err(|e| ConverterError::storage("create", &partial, e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(level));

    let zip_err = |e: zip::result::ZipError| {
        ConverterError::storage("write", &partial, std::io::Error::new(ErrorKind::Other, e))
    };

    let mut entries = 0;
    for name in names {
        let source = dir.join(name);
        let mut input = match File::open(&source) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Skipping {}: no longer on disk", name);
                continue;
            }
            Err(e) => return Err(ConverterError::storage("open", &source, e)),
        };

        zip.start_file(name.as_str(), options).map_err(zip_err)?;
        std::io::copy(&mut input, &mut zip)
            .map_err(|e| ConverterError::storage("write", &partial, e))?;
        entries += 1;
    }

    zip.finish().map_err(zip_err)?;
    std::fs::rename(&partial, target).map_err(|e| ConverterError::storage("rename", target, e))?;

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn success(name: &str) -> TranscodeSuccess {
        TranscodeSuccess {
            original_name: format!("{}.wav", name.trim_end_matches(".mp3")),
            converted_name: name.to_string(),
        }
    }

    fn entry_names(path: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_archive_name() {
        let session = SessionId::parse("abc123").unwrap();
        assert_eq!(archive_name(&session), "converted_abc123.zip");
    }

    #[tokio::test]
    async fn test_build_archive() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("track1.mp3"), b"ID3one").unwrap();
        std::fs::write(dir.path().join("track2.mp3"), b"ID3two").unwrap();
        let session = SessionId::parse("abc123").unwrap();

        let locator = Archiver::default()
            .build_archive(
                &session,
                &[success("track1.mp3"), success("track2.mp3")],
                dir.path(),
            )
            .await
            .unwrap();

        assert_eq!(locator.entries, 2);
        assert_eq!(locator.path, dir.path().join("converted_abc123.zip"));
        assert_eq!(entry_names(&locator.path), vec!["track1.mp3", "track2.mp3"]);
        assert!(!dir.path().join("converted_abc123.zip.part").exists());

        let mut archive = zip::ZipArchive::new(File::open(&locator.path).unwrap()).unwrap();
        let mut content = String::new();
        std::io::Read::read_to_string(&mut archive.by_name("track2.mp3").unwrap(), &mut content)
            .unwrap();
        assert_eq!(content, "ID3two");
    }

    #[tokio::test]
    async fn test_missing_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("kept.mp3"), b"ID3").unwrap();
        let session = SessionId::parse("s1").unwrap();

        let locator = Archiver::default()
            .build_archive(&session, &[success("gone.mp3"), success("kept.mp3")], dir.path())
            .await
            .unwrap();

        assert_eq!(locator.entries, 1);
        assert_eq!(entry_names(&locator.path), vec!["kept.mp3"]);
    }

    #[tokio::test]
    async fn test_unwritable_target_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let session = SessionId::parse("s1").unwrap();
        let missing_dir = dir.path().join("does-not-exist");

        let result = Archiver::default()
            .build_archive(&session, &[success("a.mp3")], &missing_dir)
            .await;

        assert!(matches!(result, Err(ConverterError::Storage { .. })));
    }

    #[tokio::test]
    async fn test_discard() {
        let dir = TempDir::new().unwrap();
        let session = SessionId::parse("s1").unwrap();
        let path = Archiver::archive_path(&session, dir.path());
        std::fs::write(&path, b"old").unwrap();

        let archiver = Archiver::default();
        archiver.discard(&session, dir.path()).await.unwrap();
        assert!(!path.exists());
        archiver.discard(&session, dir.path()).await.unwrap();
    }
}
