use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::ProcessedDocument;

/// What [`Ledger::offer`] did with a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    Accepted,
    /// The identifier is already recorded.
    Duplicate,
    /// The target count has been reached.
    Saturated,
}

impl Acceptance {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Deduplicated record of accepted documents.
///
/// `identifiers` and `documents` always have the same length. Documents keep
/// acceptance order in memory; [`Ledger::flush`] writes them sorted by
/// identifier so the file only depends on the set of accepted documents.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    identifiers: HashSet<String>,
    documents: Vec<ProcessedDocument>,
    target: usize,
}

impl Ledger {
    pub fn new(target: usize) -> Self {
        Self {
            identifiers: HashSet::new(),
            documents: Vec::new(),
            target,
        }
    }

    /// Build a ledger from previously accepted documents.
    ///
    /// Later duplicates of an identifier are dropped. The target is not
    /// applied to existing documents: a ledger loaded with more documents
    /// than `target` is simply saturated.
    pub fn from_documents(documents: impl IntoIterator<Item = ProcessedDocument>, target: usize) -> Self {
        let mut ledger = Self::new(target);
        for doc in documents {
            if ledger.identifiers.insert(doc.filename.clone()) {
                ledger.documents.push(doc);
            }
        }
        ledger
    }

    /// Load the ledger persisted at `path`. A missing or blank file yields an
    /// empty ledger; anything else that is not a document array is an error.
    pub fn load(path: &Path, target: usize) -> Result<Self> {
        let documents = read_documents(path)?;
        Ok(Self::from_documents(documents, target))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.identifiers.contains(identifier)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn remaining(&self) -> usize {
        self.target.saturating_sub(self.len())
    }

    pub fn is_saturated(&self) -> bool {
        self.len() >= self.target
    }

    pub fn documents(&self) -> &[ProcessedDocument] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<ProcessedDocument> {
        self.documents
    }

    /// Record `doc` unless its identifier is known or the target is reached.
    pub fn offer(&mut self, doc: ProcessedDocument) -> Acceptance {
        if self.is_saturated() {
            return Acceptance::Saturated;
        }
        if self.identifiers.contains(&doc.filename) {
            return Acceptance::Duplicate;
        }
        self.identifiers.insert(doc.filename.clone());
        self.documents.push(doc);
        Acceptance::Accepted
    }

    /// `true` if `doc` was recorded; the ledger is unchanged otherwise.
    pub fn accept(&mut self, doc: ProcessedDocument) -> bool {
        self.offer(doc).is_accepted()
    }

    /// Documents ordered by identifier.
    pub fn sorted(&self) -> Vec<&ProcessedDocument> {
        let mut sorted: Vec<&ProcessedDocument> = self.documents.iter().collect();
        sorted.sort_by(|a, b| a.filename.cmp(&b.filename));
        sorted
    }

    /// Atomically replace the file at `path` with the sorted ledger.
    ///
    /// The ledger itself is untouched on failure, so the write can be retried.
    pub fn flush(&self, path: &Path) -> Result<()> {
        write_documents(path, &self.sorted()).map_err(|source| Error::LedgerWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub(crate) fn read_documents(path: &Path) -> Result<Vec<ProcessedDocument>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(|source| Error::LedgerFormat {
        path: path.to_path_buf(),
        source,
    })
}

/// Write to a sibling temp file, sync it, then rename it over `path`.
pub(crate) fn write_documents(path: &Path, documents: &[&ProcessedDocument]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp_path = temp_path_for(path);
    let written = (|| {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, documents)?;
        writer.write_all(b"\n")?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    written
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "ledger.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Union of two document sets keyed by identifier, `primary` winning
/// conflicts, sorted by identifier.
pub fn merge_documents(
    primary: Vec<ProcessedDocument>,
    secondary: Vec<ProcessedDocument>,
) -> Vec<ProcessedDocument> {
    let mut merged: BTreeMap<String, ProcessedDocument> = BTreeMap::new();
    for doc in secondary {
        merged.insert(doc.filename.clone(), doc);
    }
    for doc in primary {
        merged.insert(doc.filename.clone(), doc);
    }
    merged.into_values().collect()
}

/// Merge the ledger files at `primary` and `secondary` into `output`.
///
/// Returns the number of documents written.
pub fn merge_files(primary: &Path, secondary: &Path, output: &Path) -> Result<usize> {
    let merged = merge_documents(read_documents(primary)?, read_documents(secondary)?);
    let refs: Vec<&ProcessedDocument> = merged.iter().collect();
    write_documents(output, &refs)?;
    Ok(merged.len())
}
