use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::types::DocumentCandidate;

/// Read access to the document entries of one ZIP archive.
pub struct ArchiveReader<R> {
    archive: ZipArchive<R>,
    path: PathBuf,
    suffix: String,
}

impl ArchiveReader<File> {
    /// Open the archive at `path`. Only entries whose names end with `suffix`
    /// (ignoring ASCII case) are yielded; an empty suffix yields every file.
    pub fn open(path: &Path, suffix: &str) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file, path, suffix)
    }
}

impl<R: Read + Seek> ArchiveReader<R> {
    pub fn from_reader(reader: R, path: &Path, suffix: &str) -> Result<Self> {
        let archive = ZipArchive::new(reader).map_err(|source| Error::Archive {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            archive,
            path: path.to_path_buf(),
            suffix: suffix.to_ascii_lowercase(),
        })
    }

    /// Number of entries in the central directory, of any kind.
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Lazily read matching entries, one at a time.
    pub fn entries(&mut self) -> Entries<'_, R> {
        Entries {
            archive: &mut self.archive,
            path: &self.path,
            suffix: &self.suffix,
            next: 0,
            unreadable: 0,
        }
    }
}

/// Iterator over the document entries of an [`ArchiveReader`].
///
/// Entries that cannot be read are logged, counted and skipped.
pub struct Entries<'a, R> {
    archive: &'a mut ZipArchive<R>,
    path: &'a Path,
    suffix: &'a str,
    next: usize,
    unreadable: usize,
}

impl<R> Entries<'_, R> {
    pub fn unreadable(&self) -> usize {
        self.unreadable
    }
}

impl<R: Read + Seek> Iterator for Entries<'_, R> {
    type Item = DocumentCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.archive.len() {
            let index = self.next;
            self.next += 1;

            match read_entry(self.archive, index, self.suffix) {
                Ok(Some(candidate)) => return Some(candidate),
                Ok(None) => {}
                Err(_err) => {
                    self.unreadable += 1;
                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::WARN,
                        event = "pdfharvest.document.skipped",
                        archive = %self.path.display(),
                        entry = index,
                        reason = "unreadable",
                        error = %_err,
                        "pdfharvest.document.skipped"
                    );
                }
            }
        }
        None
    }
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
    suffix: &str,
) -> std::result::Result<Option<DocumentCandidate>, Box<dyn std::error::Error + Send + Sync>> {
    let mut entry = archive.by_index(index)?;
    if entry.is_dir() || !entry.name().to_ascii_lowercase().ends_with(suffix) {
        return Ok(None);
    }

    let identifier = entry.name().to_string();
    let capacity = usize::try_from(entry.size()).unwrap_or(0).min(64 * 1024 * 1024);
    let mut raw = Vec::with_capacity(capacity);
    entry.read_to_end(&mut raw)?;

    Ok(Some(DocumentCandidate {
        identifier,
        raw_bytes: Bytes::from(raw),
    }))
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;

    fn build(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(body).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn yields_matching_files_only() {
        let bytes = build(&[
            ("docs/", b""),
            ("docs/a.pdf", b"alpha"),
            ("docs/B.PDF", b"beta"),
            ("notes.txt", b"skip me"),
        ]);
        let mut reader =
            ArchiveReader::from_reader(Cursor::new(bytes), Path::new("mem.zip"), ".pdf").unwrap();

        let names: Vec<String> = reader.entries().map(|c| c.identifier).collect();
        assert_eq!(names, vec!["docs/a.pdf".to_string(), "docs/B.PDF".to_string()]);
    }

    #[test]
    fn garbage_is_an_archive_error() {
        let err = ArchiveReader::from_reader(
            Cursor::new(b"definitely not a zip".to_vec()),
            Path::new("bad.zip"),
            ".pdf",
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Archive { .. }));
    }
}
