//! Test doubles for the extraction stages.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use iepscan::error::ExtractionError;
use iepscan::extraction::{FieldExtractor, TextExtractor};
use iepscan::iep::IepFields;

/// A scripted reply from a fake extractor.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    ApiError { status: u16, body: String },
}

impl Reply {
    pub fn text(s: &str) -> Self {
        Reply::Text(s.to_string())
    }

    fn into_result(self) -> Result<String, ExtractionError> {
        match self {
            Reply::Text(text) => Ok(text),
            Reply::ApiError { status, body } => Err(ExtractionError::Api { status, body }),
        }
    }
}

/// Returns queued replies in order, then the fallback.
pub struct FakeTextExtractor {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: AtomicUsize,
    last_mime_type: Mutex<Option<String>>,
}

impl FakeTextExtractor {
    pub fn always(reply: Reply) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: reply,
            calls: AtomicUsize::new(0),
            last_mime_type: Mutex::new(None),
        }
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_mime_type(&self) -> Option<String> {
        self.last_mime_type.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextExtractor for FakeTextExtractor {
    async fn extract_text(
        &self,
        _document: &[u8],
        mime_type: &str,
    ) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_mime_type.lock().unwrap() = Some(mime_type.to_string());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        reply.into_result()
    }
}

/// Returns fixed fields, or fails every call.
pub struct FakeFieldExtractor {
    fields: Option<IepFields>,
    calls: AtomicUsize,
}

impl FakeFieldExtractor {
    pub fn returning(fields: IepFields) -> Self {
        Self {
            fields: Some(fields),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fields: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FieldExtractor for FakeFieldExtractor {
    async fn extract_fields(&self, _raw_text: &str) -> Result<IepFields, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fields
            .clone()
            .ok_or_else(|| ExtractionError::MalformedResponse("not json".to_string()))
    }
}
