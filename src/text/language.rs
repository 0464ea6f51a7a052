use std::panic::{catch_unwind, AssertUnwindSafe};

/// Returned for texts too short to classify.
pub const TOO_SHORT: &str = "too_short_for_detection";
/// Returned when detection fails or is inconclusive.
pub const UNKNOWN: &str = "unknown";

/// Best-effort language identification. Never fails: every failure path
/// yields one of the sentinel values.
#[derive(Debug, Clone, Copy)]
pub struct LanguageClassifier {
    min_chars: usize,
}

impl LanguageClassifier {
    /// Texts with at most `min_chars` characters are not run through the detector.
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    pub fn classify(&self, text: &str) -> String {
        if text.chars().take(self.min_chars.saturating_add(1)).count() <= self.min_chars {
            return TOO_SHORT.to_string();
        }

        let detected = catch_unwind(AssertUnwindSafe(|| whatlang::detect(text)));
        match detected {
            Ok(Some(info)) if info.is_reliable() => iso_639_1(info.lang().code()).to_string(),
            _ => UNKNOWN.to_string(),
        }
    }
}

impl Default for LanguageClassifier {
    fn default() -> Self {
        Self::new(50)
    }
}

/// Two-letter code for the detector's three-letter code, where one exists.
///
/// Generated from whatlang's `Lang` list. Mandarin (`cmn`) maps to the
/// macrolanguage code `zh`.
fn iso_639_1(code: &'static str) -> &'static str {
    match code {
        "afr" => "af",
        "aka" => "ak",
        "amh" => "am",
        "ara" => "ar",
        "aze" => "az",
        "bel" => "be",
        "ben" => "bn",
        "bul" => "bg",
        "cat" => "ca",
        "ces" => "cs",
        "cmn" => "zh",
        "dan" => "da",
        "deu" => "de",
        "ell" => "el",
        "eng" => "en",
        "epo" => "eo",
        "est" => "et",
        "fin" => "fi",
        "fra" => "fr",
        "guj" => "gu",
        "heb" => "he",
        "hin" => "hi",
        "hrv" => "hr",
        "hun" => "hu",
        "hye" => "hy",
        "ind" => "id",
        "ita" => "it",
        "jav" => "jv",
        "jpn" => "ja",
        "kan" => "kn",
        "kat" => "ka",
        "khm" => "km",
        "kor" => "ko",
        "lat" => "la",
        "lav" => "lv",
        "lit" => "lt",
        "mal" => "ml",
        "mar" => "mr",
        "mkd" => "mk",
        "mya" => "my",
        "nep" => "ne",
        "nld" => "nl",
        "nob" => "nb",
        "ori" => "or",
        "pan" => "pa",
        "pes" => "fa",
        "pol" => "pl",
        "por" => "pt",
        "ron" => "ro",
        "rus" => "ru",
        "sin" => "si",
        "slk" => "sk",
        "slv" => "sl",
        "sna" => "sn",
        "spa" => "es",
        "srp" => "sr",
        "swe" => "sv",
        "tam" => "ta",
        "tel" => "te",
        "tgl" => "tl",
        "tha" => "th",
        "tuk" => "tk",
        "tur" => "tr",
        "ukr" => "uk",
        "urd" => "ur",
        "uzb" => "uz",
        "vie" => "vi",
        "yid" => "yi",
        "zul" => "zu",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_detector_language_has_a_two_letter_code() {
        for lang in whatlang::Lang::all() {
            let code = iso_639_1(lang.code());
            assert_eq!(code.len(), 2, "{} has no two-letter code", lang.code());
        }
    }
}
