//! File naming
//!
//! Turns a classification into an ASCII, lowercase, hyphenated base name:
//! `<topic>-<date>-<owner>`, empty parts dropped.

use crate::classifier::ClassificationResult;
use crate::error::NamingError;
use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

static DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9-]").expect("disallowed pattern is valid"));

/// Known non-ASCII letters and their ASCII stand-ins (applied after lowercasing)
const TRANSLITERATIONS: &[(char, &str)] = &[
    ('ç', "c"),
    ('ı', "i"),
    ('ü', "u"),
    ('ğ', "g"),
    ('ş', "s"),
    ('ö', "o"),
    ('â', "a"),
    ('î', "i"),
    ('û', "u"),
    ('à', "a"),
    ('á', "a"),
    ('ä', "a"),
    ('è', "e"),
    ('é', "e"),
    ('ê', "e"),
    ('ì', "i"),
    ('í', "i"),
    ('ò', "o"),
    ('ó', "o"),
    ('ù', "u"),
    ('ú', "u"),
    ('ñ', "n"),
    ('ß', "ss"),
];

/// Normalize free text into a filename fragment.
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let lowered = text.trim().to_lowercase();

    let mut ascii = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        match TRANSLITERATIONS.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => ascii.push_str(to),
            None => ascii.push(c),
        }
    }

    let hyphenated = WHITESPACE_RUNS.replace_all(&ascii, "-");
    let cleaned = DISALLOWED.replace_all(&hyphenated, "");
    cleaned.trim_matches('-').to_string()
}

/// Build the base file name (no extension) for a classification.
pub fn file_stem(result: &ClassificationResult) -> Result<String, NamingError> {
    let parts: Vec<String> = [&result.topic, &result.date, &result.owner]
        .into_iter()
        .map(|part| normalize(part))
        .filter(|part| !part.is_empty())
        .collect();

    if parts.is_empty() {
        return Err(NamingError::Empty);
    }

    Ok(parts.join("-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(topic: &str, date: &str, owner: &str) -> ClassificationResult {
        ClassificationResult {
            doc_type: "invoice".to_string(),
            date: date.to_string(),
            topic: topic.to_string(),
            owner: owner.to_string(),
            folder: "car".to_string(),
            keywords: vec![],
        }
    }

    #[test]
    fn test_car_insurance_example() {
        let name = file_stem(&result("car insurance", "2016-01-01", "John")).unwrap();
        assert_eq!(name, "car-insurance-2016-01-01-john");
    }

    #[test]
    fn test_turkish_letters_are_transliterated() {
        assert_eq!(normalize("Çağrı Şükrü Gül"), "cagri-sukru-gul");
    }

    #[test]
    fn test_whitespace_runs_collapse() {
        assert_eq!(normalize("tax   return\t2020"), "tax-return-2020");
    }

    #[test]
    fn test_disallowed_characters_are_stripped() {
        assert_eq!(normalize("Invoice #123: Test?"), "invoice-123-test");
        assert_eq!(normalize("über/größe"), "ubergrosse");
    }

    #[test]
    fn test_empty_fields_are_dropped() {
        let name = file_stem(&result("passport", "", "Ayşe")).unwrap();
        assert_eq!(name, "passport-ayse");
    }

    #[test]
    fn test_unusable_name_is_error() {
        assert_eq!(file_stem(&result("", " ", "???")), Err(NamingError::Empty));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "car insurance",
            "  Çok Önemli  Belge ",
            "--already-normal--",
            "MiXeD 2024/03/15 report",
            "日本語 text",
            "İstanbul",
            "",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_file_stem_is_idempotent() {
        let first = file_stem(&result("Car Insurance", "2016-01-01", "John")).unwrap();
        let again = file_stem(&result(&first, "", "")).unwrap();
        assert_eq!(first, again);
    }
}
