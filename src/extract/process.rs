use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::config::HarvestConfig;
use crate::error::Result;
use crate::extract::archive::ArchiveReader;
use crate::pipeline::cancel::CancelToken;
use crate::text::decode::{decoder_for, panic_message, TextDecoder};
use crate::text::language::LanguageClassifier;
use crate::text::tokens::{counter_for, TokenCounter, TokenWindow};
use crate::types::{ArchiveState, DocumentCandidate, DocumentOutcome, ProcessedDocument, StagedArchive};

/// Decodes, measures and classifies single documents.
#[derive(Clone)]
pub struct DocumentProcessor {
    decoder: Arc<dyn TextDecoder>,
    counter: Arc<dyn TokenCounter>,
    window: TokenWindow,
    classifier: LanguageClassifier,
}

impl DocumentProcessor {
    pub fn new(
        decoder: Arc<dyn TextDecoder>,
        counter: Arc<dyn TokenCounter>,
        window: TokenWindow,
        classifier: LanguageClassifier,
    ) -> Self {
        Self {
            decoder,
            counter,
            window,
            classifier,
        }
    }

    /// Build the decoder and token counter named in `config`.
    ///
    /// Loading a tokenizer file can fail, which is why this is fallible.
    pub fn from_config(config: &HarvestConfig) -> Result<Self> {
        Ok(Self::new(
            decoder_for(config.text.format),
            counter_for(&config.text.tokenizer)?,
            TokenWindow::new(config.limits.min_tokens, config.limits.max_tokens),
            LanguageClassifier::new(config.limits.min_language_chars),
        ))
    }

    pub fn window(&self) -> TokenWindow {
        self.window
    }

    pub fn token_scheme(&self) -> String {
        self.counter.scheme()
    }

    pub fn process(&self, candidate: DocumentCandidate) -> DocumentOutcome {
        let DocumentCandidate {
            identifier,
            raw_bytes,
        } = candidate;

        let text = match self.decoder.decode(&raw_bytes) {
            Ok(text) => text,
            Err(err) => {
                return DocumentOutcome::Unprocessable {
                    identifier,
                    reason: err.to_string(),
                }
            }
        };

        let token_count = match self.counter.count(&text) {
            Ok(count) => count,
            Err(err) => {
                return DocumentOutcome::Unprocessable {
                    identifier,
                    reason: err.to_string(),
                }
            }
        };

        if !self.window.contains(token_count) {
            return DocumentOutcome::OutOfRange {
                identifier,
                token_count,
            };
        }

        let language = self.classifier.classify(&text);
        DocumentOutcome::Kept(ProcessedDocument {
            filename: identifier,
            text,
            token_count,
            language,
        })
    }
}

/// What happened to the entries of one archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub index: u32,
    /// Matching entries read from the archive, including unreadable ones.
    pub seen: usize,
    pub kept: usize,
    pub out_of_range: usize,
    pub unprocessable: usize,
    pub known: usize,
    /// Processing ended before the last entry: the harvest was stopping or
    /// downstream stopped accepting documents.
    pub stopped_early: bool,
}

/// Process every document entry of `archive`. Runs on a blocking thread.
///
/// `is_known` lets callers skip entries already recorded. `emit` receives each
/// kept document and returns `false` once nothing downstream will take more.
/// Between entries the loop stops as soon as `cancel` is draining.
///
/// Only archive-level failures are errors; per-document failures, panics
/// included, are counted in the summary.
pub fn process_archive<K, E>(
    archive: &StagedArchive,
    suffix: &str,
    processor: &DocumentProcessor,
    cancel: &CancelToken,
    is_known: K,
    mut emit: E,
) -> Result<ArchiveSummary>
where
    K: Fn(&str) -> bool,
    E: FnMut(ProcessedDocument) -> bool,
{
    let index = archive.index();
    log_state(index, ArchiveState::Extracting);
    let mut reader = ArchiveReader::open(archive.path(), suffix)?;
    log_state(index, ArchiveState::Processing);

    let mut summary = ArchiveSummary {
        index,
        ..ArchiveSummary::default()
    };
    let mut entries = reader.entries();

    loop {
        if cancel.is_draining() {
            summary.stopped_early = true;
            break;
        }
        let Some(candidate) = entries.next() else { break; };
        summary.seen += 1;

        let outcome = if is_known(&candidate.identifier) {
            DocumentOutcome::Known {
                identifier: candidate.identifier,
            }
        } else {
            let identifier = candidate.identifier.clone();
            catch_unwind(AssertUnwindSafe(|| processor.process(candidate))).unwrap_or_else(|panic| {
                DocumentOutcome::Unprocessable {
                    identifier,
                    reason: format!("processing panicked: {}", panic_message(panic.as_ref())),
                }
            })
        };

        match outcome {
            DocumentOutcome::Kept(doc) => {
                summary.kept += 1;
                if !emit(doc) {
                    summary.stopped_early = true;
                    break;
                }
            }
            DocumentOutcome::OutOfRange {
                identifier: _identifier,
                token_count: _token_count,
            } => {
                summary.out_of_range += 1;
                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::DEBUG,
                    event = "pdfharvest.document.skipped",
                    archive = index,
                    identifier = %_identifier,
                    reason = "out_of_range",
                    token_count = _token_count,
                    "pdfharvest.document.skipped"
                );
            }
            DocumentOutcome::Unprocessable {
                identifier: _identifier,
                reason: _reason,
            } => {
                summary.unprocessable += 1;
                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::WARN,
                    event = "pdfharvest.document.skipped",
                    archive = index,
                    identifier = %_identifier,
                    reason = "unprocessable",
                    error = %_reason,
                    "pdfharvest.document.skipped"
                );
            }
            DocumentOutcome::Known { .. } => summary.known += 1,
        }
    }

    summary.seen += entries.unreadable();
    summary.unprocessable += entries.unreadable();
    log_state(index, ArchiveState::Done);
    Ok(summary)
}

fn log_state(_index: u32, _state: ArchiveState) {
    #[cfg(feature = "tracing")]
    tracing::event!(
        tracing::Level::DEBUG,
        event = "pdfharvest.archive.state",
        index = _index,
        state = %_state,
        "pdfharvest.archive.state"
    );
}
