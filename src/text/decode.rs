use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::config::DocumentFormat;
use crate::error::{Error, Result};

/// Converts raw document bytes into plain text.
pub trait TextDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    fn decode(&self, bytes: &[u8]) -> Result<String>;
}

pub fn decoder_for(format: DocumentFormat) -> Arc<dyn TextDecoder> {
    match format {
        DocumentFormat::Pdf => Arc::new(PdfDecoder),
        DocumentFormat::Text => Arc::new(PlainTextDecoder),
    }
}

/// PDF text extraction via pdf-extract.
///
/// The parser panics on some malformed inputs; those panics are reported as
/// decode errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfDecoder;

impl TextDecoder for PdfDecoder {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        match catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes))) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(err)) => Err(Error::Decode(format!("pdf extraction failed: {err}"))),
            Err(panic) => Err(Error::Decode(format!(
                "pdf parser panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }
}

/// UTF-8 text entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextDecoder;

impl TextDecoder for PlainTextDecoder {
    fn name(&self) -> &'static str {
        "text"
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::Decode(format!("entry is not valid UTF-8: {e}")))?;
        Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string())
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
