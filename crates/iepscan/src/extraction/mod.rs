//! Text and field extraction from uploaded documents.
//!
//! Two stages, each behind a trait so the worker can run against a hosted
//! model or a test double:
//!
//! 1. [`TextExtractor`]: document bytes to raw text.
//! 2. [`FieldExtractor`]: raw text to structured [`IepFields`] (optional).

mod gemini;
mod prompts;

pub use gemini::GeminiClient;

use async_trait::async_trait;

use crate::error::ExtractionError;
use crate::iep::IepFields;
use crate::scan::NO_TEXT_SENTINEL;

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Returns the text the model produced, untrimmed. Use
    /// [`accept_text`] to apply the no-text rules.
    async fn extract_text(&self, document: &[u8], mime_type: &str)
        -> Result<String, ExtractionError>;
}

#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract_fields(&self, raw_text: &str) -> Result<IepFields, ExtractionError>;
}

/// Trims model output and rejects empty or sentinel responses.
pub fn accept_text(output: &str) -> Result<String, ExtractionError> {
    let text = output.trim();
    if text.is_empty() || text == NO_TEXT_SENTINEL {
        return Err(ExtractionError::NoText);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_text_trims() {
        assert_eq!(accept_text("  Student: Jordan\n").unwrap(), "Student: Jordan");
    }

    #[test]
    fn test_accept_text_rejects_sentinel_and_empty() {
        assert!(matches!(accept_text("NO_TEXT_FOUND"), Err(ExtractionError::NoText)));
        assert!(matches!(accept_text("\n NO_TEXT_FOUND \n"), Err(ExtractionError::NoText)));
        assert!(matches!(accept_text("   "), Err(ExtractionError::NoText)));
    }

    #[test]
    fn test_no_text_message() {
        assert_eq!(
            ExtractionError::NoText.to_string(),
            "No readable text could be extracted from this PDF document"
        );
    }

    #[test]
    fn test_sentinel_inside_text_is_kept() {
        let text = accept_text("Notes: NO_TEXT_FOUND appears here").unwrap();
        assert!(text.contains("NO_TEXT_FOUND"));
    }
}
