use crate::error::{IndexError, IndexResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer,
};

/// Name under which every index registers its language analyzer.
pub const ANALYZER_NAME: &str = "relations";

const MAX_TOKEN_LEN: usize = 40;

static LANGUAGE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-z]{2,3}$").expect("language code pattern is valid"));

/// An ISO-639 analyzer language. Codes with a snowball stemmer get stemming;
/// any other well-formed code falls back to lowercased plain tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalyzerLanguage {
    code: String,
}

impl AnalyzerLanguage {
    pub fn parse(code: &str) -> IndexResult<Self> {
        let normalized = code.trim().to_ascii_lowercase();
        if !LANGUAGE_CODE.is_match(&normalized) {
            return Err(IndexError::InvalidLanguage(code.to_string()));
        }
        Ok(Self { code: normalized })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn stemmer(&self) -> Option<Language> {
        let language = match self.code.as_str() {
            "ar" | "ara" => Language::Arabic,
            "da" | "dan" => Language::Danish,
            "de" | "deu" | "ger" => Language::German,
            "el" | "ell" | "gre" => Language::Greek,
            "en" | "eng" => Language::English,
            "es" | "spa" => Language::Spanish,
            "fi" | "fin" => Language::Finnish,
            "fr" | "fra" | "fre" => Language::French,
            "hu" | "hun" => Language::Hungarian,
            "it" | "ita" => Language::Italian,
            "nl" | "nld" | "dut" => Language::Dutch,
            "no" | "nb" | "nor" => Language::Norwegian,
            "pt" | "por" => Language::Portuguese,
            "ro" | "ron" | "rum" => Language::Romanian,
            "ru" | "rus" => Language::Russian,
            "sv" | "swe" => Language::Swedish,
            "ta" | "tam" => Language::Tamil,
            "tr" | "tur" => Language::Turkish,
            _ => return None,
        };
        Some(language)
    }

    pub fn analyzer(&self) -> TextAnalyzer {
        match self.stemmer() {
            Some(language) => TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
                .filter(LowerCaser)
                .filter(Stemmer::new(language))
                .build(),
            None => TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
                .filter(LowerCaser)
                .build(),
        }
    }
}

impl fmt::Display for AnalyzerLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// Parses and de-duplicates configured codes, keeping their order.
pub fn parse_languages<S: AsRef<str>>(codes: &[S]) -> IndexResult<Vec<AnalyzerLanguage>> {
    let mut languages: Vec<AnalyzerLanguage> = Vec::with_capacity(codes.len());
    for code in codes {
        let language = AnalyzerLanguage::parse(code.as_ref())?;
        if !languages.contains(&language) {
            languages.push(language);
        }
    }
    Ok(languages)
}

#[cfg(test)]
mod tests {
    use super::{parse_languages, AnalyzerLanguage};
    use tantivy::tokenizer::{Language, TokenStream};

    fn tokens(language: &AnalyzerLanguage, text: &str) -> Vec<String> {
        let mut analyzer = language.analyzer();
        let mut stream = analyzer.token_stream(text);
        let mut out = Vec::new();
        while stream.advance() {
            out.push(stream.token().text.clone());
        }
        out
    }

    #[test]
    fn normalizes_and_validates_codes() {
        assert_eq!(AnalyzerLanguage::parse(" EN ").unwrap().code(), "en");
        assert!(AnalyzerLanguage::parse("english").is_err());
        assert!(AnalyzerLanguage::parse("e1").is_err());
        assert!(AnalyzerLanguage::parse("").is_err());
    }

    #[test]
    fn maps_known_codes_to_stemmers() {
        let de = AnalyzerLanguage::parse("de").unwrap();
        assert_eq!(de.stemmer(), Some(Language::German));
        let ja = AnalyzerLanguage::parse("ja").unwrap();
        assert_eq!(ja.stemmer(), None);
    }

    #[test]
    fn english_analyzer_stems_and_lowercases() {
        let en = AnalyzerLanguage::parse("en").unwrap();
        assert_eq!(tokens(&en, "Running FAST"), vec!["run", "fast"]);
    }

    #[test]
    fn unknown_language_keeps_plain_tokens() {
        let ja = AnalyzerLanguage::parse("ja").unwrap();
        assert_eq!(tokens(&ja, "Running FAST"), vec!["running", "fast"]);
    }

    #[test]
    fn parse_languages_dedups_in_order() {
        let parsed = parse_languages(&["de", "en", "DE"]).unwrap();
        let codes: Vec<&str> = parsed.iter().map(|l| l.code()).collect();
        assert_eq!(codes, vec!["de", "en"]);
    }
}
