use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::{error, info};
use regex::Regex;
use uuid::Uuid;

use crate::telemetry::{AllocationLedger, CategoryCounter, TrackedObject};

lazy_static! {
    static ref UNSAFE_NAME_CHARS: Regex =
        Regex::new(r"[^A-Za-z0-9._-]+").expect("filename pattern");
}

const MAX_NAME_LEN: usize = 120;

/// One stored upload, kept in the in-memory manifest. The record itself is
/// a ledger-tracked live object, so sustained intake shows up in the
/// sampler's category rankings.
pub struct StoredUpload {
    pub stored_name: String,
    pub size_bytes: u64,
    pub stored_at: DateTime<Utc>,
    _live: TrackedObject,
}

/// Upload store: owns the upload directory and the manifest of everything
/// written this process lifetime.
pub struct UploadStore {
    dir: PathBuf,
    records: CategoryCounter,
    manifest: Mutex<Vec<StoredUpload>>,
}

impl UploadStore {
    /// Creates the upload directory if missing and binds the store's
    /// manifest category to the ledger.
    pub async fn open(dir: &Path, ledger: &AllocationLedger) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        Ok(UploadStore {
            dir: dir.to_path_buf(),
            records: ledger.register("UploadRecord"),
            manifest: Mutex::new(Vec::new()),
        })
    }

    /// Writes the payload under a fresh UUID-prefixed, sanitized name and
    /// returns the stored filename.
    pub async fn store(
        &self,
        original_name: Option<&str>,
        payload: &[u8],
    ) -> std::io::Result<String> {
        let stored_name = format!(
            "{}_{}",
            Uuid::new_v4(),
            sanitize_name(original_name.unwrap_or("upload.bin"))
        );
        tokio::fs::write(self.dir.join(&stored_name), payload).await?;

        let record = StoredUpload {
            stored_name: stored_name.clone(),
            size_bytes: payload.len() as u64,
            stored_at: Utc::now(),
            _live: self.records.track(),
        };
        self.manifest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);

        info!("stored {} ({})", stored_name, ByteSize::b(payload.len() as u64));
        Ok(stored_name)
    }

    /// Counts files currently in the upload directory. A read failure logs
    /// and reports 0, matching the dashboard's tolerant behavior.
    pub async fn uploaded_file_count(&self) -> u64 {
        match self.count_dir_entries().await {
            Ok(count) => count,
            Err(err) => {
                error!("Error counting uploaded files: {}", err);
                0
            }
        }
    }

    async fn count_dir_entries(&self) -> std::io::Result<u64> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut count = 0u64;
        while entries.next_entry().await?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    pub fn manifest_len(&self) -> usize {
        self.manifest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Strips any path components and replaces characters outside
/// `[A-Za-z0-9._-]` so the stored name is safe on every filesystem.
fn sanitize_name(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original);
    let mut safe = UNSAFE_NAME_CHARS.replace_all(base, "_").into_owned();
    safe.truncate(MAX_NAME_LEN);
    if safe.trim_matches(['.', '_']).is_empty() {
        safe = "upload.bin".to_string();
    }
    safe
}
