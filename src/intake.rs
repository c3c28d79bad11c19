//! Upload intake
//!
//! Stages the files of one conversion request in the session's inbound
//! directory, enforcing the upload policy on every file.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::batch::naming::{claim_unique, split_name};
use crate::batch::InputFile;
use crate::error::{ConverterError, Result};
use crate::storage::{SessionId, StorageArea, StorageKind};
use crate::validation::{sanitize_filename, AudioFormat, UploadPolicy};

/// Accepts uploaded files for one session
pub struct Intake {
    storage: Arc<StorageArea>,
    policy: UploadPolicy,
    session: SessionId,
    /// Names already used in the inbound directory
    stored_names: HashSet<String>,
    accepted: Vec<InputFile>,
}

/// A file being written to the inbound directory, chunk by chunk
pub struct StagedUpload {
    original_name: String,
    format: AudioFormat,
    path: PathBuf,
    file: tokio::fs::File,
    written: usize,
}

impl Intake {
    pub fn new(storage: Arc<StorageArea>, policy: UploadPolicy, session: SessionId) -> Self {
        Self {
            storage,
            policy,
            session,
            stored_names: HashSet::new(),
            accepted: Vec::new(),
        }
    }

    /// Number of files accepted so far
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    /// Validate the name and type of an incoming file and open its
    /// destination.
    ///
    /// `raw_name` is the untrusted client filename. Two uploads with the same
    /// name are stored as `name.ext` and `name_2.ext`, but both keep the
    /// client name as their original name.
    pub async fn begin(&mut self, raw_name: &str, mime: Option<&str>) -> Result<StagedUpload> {
        self.policy.check_count(self.accepted.len())?;
        let original_name = sanitize_filename(raw_name)?;
        let format = self.policy.classify(&original_name, mime)?;

        let (stem, ext) = split_name(&original_name);
        let stored_name = claim_unique(&mut self.stored_names, stem, ext);
        let (path, file) = self
            .storage
            .create_file(&self.session, StorageKind::Inbound, &stored_name)
            .await?;

        Ok(StagedUpload {
            original_name,
            format,
            path,
            file,
            written: 0,
        })
    }

    /// Append one chunk, failing before the write if the file would exceed
    /// the size limit
    pub async fn write_chunk(&self, upload: &mut StagedUpload, chunk: &[u8]) -> Result<()> {
        self.policy
            .check_size(&upload.original_name, upload.written + chunk.len())?;
        upload
            .file
            .write_all(chunk)
            .await
            .map_err(|e| ConverterError::storage("write", &upload.path, e))?;
        upload.written += chunk.len();
        Ok(())
    }

    /// Close a fully received file and add it to the batch
    pub async fn commit(&mut self, mut upload: StagedUpload) -> Result<&InputFile> {
        upload
            .file
            .flush()
            .await
            .map_err(|e| ConverterError::storage("flush", &upload.path, e))?;

        debug!(
            "Session {}: accepted {} ({} bytes, {})",
            self.session,
            upload.original_name,
            upload.written,
            upload.format.extension()
        );

        self.accepted.push(InputFile {
            original_name: upload.original_name,
            size: upload.written as u64,
            path: upload.path,
            format: upload.format,
        });
        Ok(&self.accepted[self.accepted.len() - 1])
    }

    /// Discard everything staged so far
    pub async fn abort(self) {
        if let Err(e) = self
            .storage
            .remove_session(&self.session, StorageKind::Inbound)
            .await
        {
            warn!(
                "Session {}: could not remove rejected uploads: {}",
                self.session, e
            );
        }
    }

    /// Finish intake. Fails if no file was submitted.
    pub fn finish(self) -> Result<(SessionId, Vec<InputFile>)> {
        if self.accepted.is_empty() {
            return Err(ConverterError::Validation(
                "no files were submitted".to_string(),
            ));
        }
        Ok((self.session, self.accepted))
    }
}
