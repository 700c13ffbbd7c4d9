//! PDF text extraction port and agency-record-number extraction logic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, thiserror::Error)]
#[error("failed to extract text from PDF: {0}")]
pub struct PdfTextExtractionError(pub String);

/// Extracts textual content from PDF bytes. Decoding itself is an external
/// collaborator (a `pypdf`-equivalent crate such as `lopdf`/`pdf-extract`);
/// this crate only depends on the trait.
#[async_trait]
pub trait PdfTextExtractor: Send + Sync {
    async fn extract_text(&self, pdf_bytes: &[u8]) -> Result<String, PdfTextExtractionError>;
}

/// `pdf-extract`-backed decoder. Extraction is synchronous and CPU-bound, so
/// it runs on the blocking pool rather than the async worker task.
pub struct PdfExtractTextExtractor;

#[async_trait]
impl PdfTextExtractor for PdfExtractTextExtractor {
    async fn extract_text(&self, pdf_bytes: &[u8]) -> Result<String, PdfTextExtractionError> {
        let bytes = pdf_bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| PdfTextExtractionError(e.to_string()))
        })
        .await
        .map_err(|e| PdfTextExtractionError(e.to_string()))?
    }
}

fn record_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b[0-9]{5}\b").unwrap())
}

/// Result of scanning extracted text for the agency record number.
pub struct AgencyRecordExtraction {
    pub agency_record_number: String,
    pub cleaned_text: String,
}

/// Find the first 5-digit token in `text`, strip every occurrence of that
/// exact token, and collapse the resulting whitespace gaps. Falls back to a
/// synthesized epoch-millis string (always ≥13 digits) when no token
/// matches, leaving the text untouched.
pub fn extract_agency_record_number(text: &str, now: DateTime<Utc>) -> AgencyRecordExtraction {
    let pattern = record_number_pattern();
    let Some(m) = pattern.find(text) else {
        return AgencyRecordExtraction {
            agency_record_number: now.timestamp_millis().to_string(),
            cleaned_text: text.to_string(),
        };
    };
    let token = m.as_str().to_string();

    let cleaned: Vec<&str> = text
        .split_whitespace()
        .filter(|word| *word != token)
        .collect();

    AgencyRecordExtraction { agency_record_number: token, cleaned_text: cleaned.join(" ") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn strips_all_occurrences_of_the_matched_token() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let result = extract_agency_record_number(
            "RELATORIO DE OCORRENCIAS 12345 patient data 12345 details 99999 12345",
            now,
        );
        assert_eq!(result.agency_record_number, "12345");
        assert_eq!(result.cleaned_text, "RELATORIO DE OCORRENCIAS patient data details 99999");
    }

    #[test]
    fn falls_back_to_epoch_millis_when_absent() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let result = extract_agency_record_number("no token here", now);
        assert!(result.agency_record_number.len() >= 13);
        assert!(result.agency_record_number.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(result.cleaned_text, "no token here");
    }
}
