use std::path::{Path, PathBuf};

use crate::types::ArchiveHandle;

/// Archives are grouped into remote directories of this many files.
pub const ARCHIVES_PER_BUCKET: u32 = 1000;

/// Maps an archive index to its remote URL and staging path.
///
/// Index `1234` resolves to `{base}zipfiles/1000-1999/1234.zip` and
/// `{staging}/1234.zip`.
#[derive(Debug, Clone)]
pub struct ArchiveLocator {
    base_url: String,
    staging_dir: PathBuf,
}

impl ArchiveLocator {
    pub fn new(base_url: impl Into<String>, staging_dir: impl Into<PathBuf>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            staging_dir: staging_dir.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn locate(&self, index: u32) -> ArchiveHandle {
        let file_name = format!("{index:04}.zip");
        let bucket_start = (index / ARCHIVES_PER_BUCKET) * ARCHIVES_PER_BUCKET;
        let bucket_end = bucket_start + (ARCHIVES_PER_BUCKET - 1);

        ArchiveHandle {
            index,
            remote_url: format!(
                "{}zipfiles/{bucket_start:04}-{bucket_end:04}/{file_name}",
                self.base_url
            ),
            local_path: self.staging_dir.join(file_name),
        }
    }
}
