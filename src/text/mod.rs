//! Turning entry bytes into measured, language-tagged text.

pub mod decode;
pub mod language;
pub mod tokens;

pub use decode::{PdfDecoder, PlainTextDecoder, TextDecoder};
pub use language::{LanguageClassifier, TOO_SHORT, UNKNOWN};
pub use tokens::{
    HuggingFaceTokenCounter, TiktokenCounter, TokenCounter, TokenWindow, WhitespaceTokenCounter,
};
