//! Record - 外部レコードストアの行と検索語の検証
//!
//! レコードストア自体のスキーマは範囲外ですが、検索語の検証と
//! レスポンス用のビュー（電話番号のマスク）はここで扱います。

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::errors::CertError;
use super::ids::Identifier;

const MAX_TERM_LEN: usize = 150;

/// A person known to the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: Identifier,
    pub full_name: String,
    #[serde(default)]
    pub national_id: String,
    #[serde(default)]
    pub phone_no: String,
    /// Newline separated audit remarks, oldest first.
    #[serde(default)]
    pub remark: String,
}

/// What callers get back from a search or verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordView {
    pub id: Identifier,
    pub full_name: String,
    pub national_id: String,
    pub phone_no: String,
    pub certificate_link: String,
}

impl RecordView {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            full_name: record.full_name.clone(),
            national_id: record.national_id.clone(),
            phone_no: mask_phone(&record.phone_no),
            certificate_link: format!("/api/generate-certificate/{}", record.id),
        }
    }
}

/// Keep only the last four digits visible.
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() <= 4 {
        return phone.to_string();
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

struct TermPatterns {
    disallowed: Regex,
    identifier: Regex,
    name: Regex,
    national_id: Regex,
}

fn patterns() -> &'static TermPatterns {
    static PATTERNS: OnceLock<TermPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| TermPatterns {
        disallowed: Regex::new(r"[^A-Za-z0-9 .-]").expect("static pattern"),
        identifier: Regex::new(r"^[A-Z0-9]{1,10}$").expect("static pattern"),
        name: Regex::new(r##"^[^;'\\"#]{1,150}$"##).expect("static pattern"),
        national_id: Regex::new(r##"^[^;'\\"#]{5,30}$"##).expect("static pattern"),
    })
}

/// Validate a free-text search term before it reaches the record store.
pub fn validate_search_term(term: &str) -> Result<(), CertError> {
    if term.is_empty() || term.len() > MAX_TERM_LEN {
        return Err(CertError::InvalidSearchTerm(
            "empty or oversized search term".into(),
        ));
    }

    let p = patterns();
    if p.disallowed.replace_all(term, "").is_empty() {
        return Err(CertError::InvalidSearchTerm(
            "search term is blank after cleanup".into(),
        ));
    }

    if p.identifier.is_match(term) || p.name.is_match(term) || p.national_id.is_match(term) {
        Ok(())
    } else {
        Err(CertError::InvalidSearchTerm(format!(
            "invalid search term pattern: {term}"
        )))
    }
}

/// Lower-case and strip everything but ASCII letters and digits.
pub fn normalize_alnum(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

impl Record {
    /// Lookup rule: exact id, or name / national id compared loosely.
    pub fn matches_term(&self, term: &str) -> bool {
        if self.id.as_str() == term {
            return true;
        }
        let normalized = normalize_alnum(term);
        if !normalized.is_empty()
            && (normalize_alnum(&self.full_name) == normalized
                || normalize_alnum(&self.national_id) == normalized)
        {
            return true;
        }
        let nid_digits = digits_only(&self.national_id);
        !nid_digits.is_empty() && nid_digits == digits_only(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn jane() -> Record {
        Record {
            id: Identifier::parse("ST001").unwrap(),
            full_name: "Jane Doe".into(),
            national_id: "199012-3456V".into(),
            phone_no: "0771234567".into(),
            remark: String::new(),
        }
    }

    #[rstest]
    #[case("0771234567", "******4567")]
    #[case("1234", "1234")]
    #[case("", "")]
    fn phone_is_masked(#[case] phone: &str, #[case] expected: &str) {
        assert_eq!(mask_phone(phone), expected);
    }

    #[rstest]
    #[case::identifier("ST001")]
    #[case::name("Jane Doe")]
    #[case::nid("199012-3456V")]
    fn accepts_reasonable_terms(#[case] term: &str) {
        assert!(validate_search_term(term).is_ok());
    }

    #[rstest]
    #[case::empty("")]
    #[case::only_symbols("@@@")]
    #[case::quote("Jane'; DROP")]
    #[case::hash("Jane #1")]
    #[case::double_quote("Jane \"Doe\"")]
    fn rejects_bad_terms(#[case] term: &str) {
        assert!(matches!(
            validate_search_term(term),
            Err(CertError::InvalidSearchTerm(_))
        ));
    }

    #[test]
    fn rejects_oversized_terms() {
        assert!(validate_search_term(&"a".repeat(151)).is_err());
    }

    #[rstest]
    #[case("ST001", true)]
    #[case("jane  doe", true)]
    #[case("JANE-DOE", true)]
    #[case("1990123456", true)]
    #[case("199012 3456 v", true)]
    #[case("John Doe", false)]
    #[case("ST002", false)]
    fn record_matching(#[case] term: &str, #[case] expected: bool) {
        assert_eq!(jane().matches_term(term), expected);
    }

    #[test]
    fn view_masks_phone_and_links_certificate() {
        let view = RecordView::from_record(&jane());
        assert_eq!(view.phone_no, "******4567");
        assert_eq!(view.certificate_link, "/api/generate-certificate/ST001");
    }
}
