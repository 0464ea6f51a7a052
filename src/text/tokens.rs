use std::path::{Path, PathBuf};
use std::sync::Arc;

use tiktoken_rs::CoreBPE;
use tokenizers::tokenizer::Tokenizer;

use crate::config::{BpeEncoding, TokenizerConfig};
use crate::error::{Error, Result};

/// Counts tokens with a scheme that stays fixed for the whole corpus.
///
/// Token windows are only comparable between documents counted by the same
/// scheme, so a run builds exactly one counter and shares it.
pub trait TokenCounter: Send + Sync {
    /// Identifies the scheme, e.g. `tiktoken:cl100k_base` or `whitespace`.
    fn scheme(&self) -> String;

    fn count(&self, text: &str) -> Result<usize>;
}

pub fn counter_for(config: &TokenizerConfig) -> Result<Arc<dyn TokenCounter>> {
    Ok(match config {
        TokenizerConfig::Tiktoken { encoding } => Arc::new(TiktokenCounter::new(*encoding)?),
        TokenizerConfig::Whitespace => Arc::new(WhitespaceTokenCounter),
        TokenizerConfig::HuggingFace { path } => Arc::new(HuggingFaceTokenCounter::new(path)?),
    })
}

/// One token per whitespace-separated word.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenCounter;

impl TokenCounter for WhitespaceTokenCounter {
    fn scheme(&self) -> String {
        "whitespace".to_string()
    }

    fn count(&self, text: &str) -> Result<usize> {
        Ok(text.split_whitespace().count())
    }
}

/// tiktoken byte-pair encoding. The vocabulary ships inside the crate, so the
/// scheme name pins the exact counts.
pub struct TiktokenCounter {
    bpe: CoreBPE,
    encoding: BpeEncoding,
}

impl TiktokenCounter {
    pub fn new(encoding: BpeEncoding) -> Result<Self> {
        let bpe = match encoding {
            BpeEncoding::Cl100kBase => tiktoken_rs::cl100k_base(),
            BpeEncoding::P50kBase => tiktoken_rs::p50k_base(),
        }
        .map_err(|e| Error::Tokenizer(format!("failed to load {} encoding: {e}", encoding.name())))?;
        Ok(Self { bpe, encoding })
    }
}

impl TokenCounter for TiktokenCounter {
    fn scheme(&self) -> String {
        format!("tiktoken:{}", self.encoding.name())
    }

    fn count(&self, text: &str) -> Result<usize> {
        Ok(self.bpe.encode_with_special_tokens(text).len())
    }
}

/// A `tokenizer.json` loaded with the Hugging Face tokenizers crate.
pub struct HuggingFaceTokenCounter {
    tokenizer: Tokenizer,
    path: PathBuf,
}

impl HuggingFaceTokenCounter {
    pub fn new<P: AsRef<Path>>(tokenizer_path: P) -> Result<Self> {
        let path = tokenizer_path.as_ref().to_path_buf();
        let mut tokenizer = Tokenizer::from_file(&path).map_err(|e| {
            Error::Tokenizer(format!("failed to load tokenizer from {}: {e}", path.display()))
        })?;
        // Counting must see the whole document.
        tokenizer
            .with_truncation(None)
            .map_err(|e| Error::Tokenizer(format!("failed to disable truncation: {e}")))?;
        tokenizer.with_padding(None);
        Ok(Self { tokenizer, path })
    }
}

impl TokenCounter for HuggingFaceTokenCounter {
    fn scheme(&self) -> String {
        format!("huggingface:{}", self.path.display())
    }

    fn count(&self, text: &str) -> Result<usize> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| Error::Tokenizer(format!("failed to encode text: {e}")))?;
        Ok(encoding.len())
    }
}

/// Inclusive token-count bounds for accepted documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenWindow {
    pub min: usize,
    pub max: usize,
}

impl TokenWindow {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, token_count: usize) -> bool {
        self.min <= token_count && token_count <= self.max
    }
}
