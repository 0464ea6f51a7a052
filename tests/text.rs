use pdfharvest::config::{BpeEncoding, DocumentFormat, TokenizerConfig};
use pdfharvest::error::Error;
use pdfharvest::text::decode::decoder_for;
use pdfharvest::text::tokens::counter_for;
use pdfharvest::text::{
    LanguageClassifier, PdfDecoder, PlainTextDecoder, TextDecoder, TiktokenCounter, TokenCounter,
    TokenWindow, WhitespaceTokenCounter, TOO_SHORT, UNKNOWN,
};

const ENGLISH: &str = "The quick brown fox jumps over the lazy dog while the farmer \
    watches from the porch and wonders whether the weather will hold until the harvest \
    is finally brought in from the fields.";

#[test]
fn short_text_is_not_classified() {
    let classifier = LanguageClassifier::new(50);
    assert_eq!(classifier.classify("hello"), TOO_SHORT);
    assert_eq!(classifier.classify(&"x".repeat(50)), TOO_SHORT);
}

#[test]
fn english_prose_is_detected() {
    assert_eq!(LanguageClassifier::default().classify(ENGLISH), "en");
}

#[test]
fn noise_is_unknown_not_an_error() {
    let noise = "1234 5678 9012 3456 7890 ".repeat(10);
    assert_eq!(LanguageClassifier::default().classify(&noise), UNKNOWN);
}

#[test]
fn plain_text_decoder_strips_bom() {
    let text = PlainTextDecoder.decode("\u{feff}hello".as_bytes()).unwrap();
    assert_eq!(text, "hello");
    assert!(matches!(PlainTextDecoder.decode(&[0xc3, 0x28]), Err(Error::Decode(_))));
}

#[test]
fn pdf_decoder_rejects_garbage_without_panicking() {
    let err = PdfDecoder.decode(b"%PDF-1.4 this is not really a pdf").unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}

#[test]
fn decoder_follows_configured_format() {
    assert_eq!(decoder_for(DocumentFormat::Pdf).name(), "pdf");
    assert_eq!(decoder_for(DocumentFormat::Text).name(), "text");
}

#[test]
fn whitespace_counter_ignores_layout() {
    let counter = WhitespaceTokenCounter;
    assert_eq!(counter.count("").unwrap(), 0);
    assert_eq!(counter.count("  \n\t ").unwrap(), 0);
    assert_eq!(counter.count("one\ttwo\n\nthree  four").unwrap(), 4);
    assert_eq!(counter.scheme(), "whitespace");
}

#[test]
fn tiktoken_counts_bpe_tokens() {
    let counter = TiktokenCounter::new(BpeEncoding::Cl100kBase).unwrap();
    assert_eq!(counter.scheme(), "tiktoken:cl100k_base");
    assert_eq!(counter.count("").unwrap(), 0);
    assert_eq!(counter.count("hello world").unwrap(), 2);
    // Subword splitting yields more tokens than words.
    let words = ENGLISH.split_whitespace().count();
    assert!(counter.count(ENGLISH).unwrap() >= words);
}

#[test]
fn default_counter_is_cl100k_base() {
    let counter = counter_for(&TokenizerConfig::Tiktoken {
        encoding: BpeEncoding::default(),
    })
    .unwrap();
    assert_eq!(counter.scheme(), "tiktoken:cl100k_base");
}

#[test]
fn token_window_is_inclusive() {
    let window = TokenWindow::new(1_500, 50_000);
    assert!(!window.contains(1_499));
    assert!(window.contains(1_500));
    assert!(window.contains(50_000));
    assert!(!window.contains(50_001));
}
