use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A photo held locally between capture and reset. Cloning shares the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedImage {
    id: Uuid,
    bytes: Arc<[u8]>,
    width: u32,
    height: u32,
    source: Option<PathBuf>,
    captured_at: DateTime<Utc>,
}

impl CapturedImage {
    pub fn new(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            bytes: bytes.into(),
            width,
            height,
            source: None,
            captured_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: PathBuf) -> Self {
        self.source = Some(source);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn source(&self) -> Option<&PathBuf> {
        self.source.as_ref()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

// Image bytes are never worth printing.
impl fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedImage")
            .field("id", &self.id)
            .field("len", &self.bytes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("source", &self.source)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicationRecord {
    pub name: String,
    pub description: String,
    pub manufacturer: Option<String>,
    /// National code, used as the subject reference for follow-up questions.
    pub code: Option<String>,
    /// Link or path to the patient leaflet.
    pub leaflet: Option<String>,
}

impl MedicationRecord {
    pub fn subject_ref(&self) -> &str {
        self.code.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicationSuggestion {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentificationOutcome {
    Identified { subject: MedicationRecord },
    Ambiguous { suggestions: Vec<MedicationSuggestion> },
    NotFound { message: String },
    ServiceError { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowupAnswer {
    pub question: String,
    pub text: String,
}
