use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier wrapper for backend-assigned application records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Interaction mode for a draft session.
///
/// `Create` walks the ordered sections for the first time, `Edit` resumes a
/// previously saved application, and `View` browses a submitted one without
/// accepting writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Create,
    Edit,
    View,
}

impl Mode {
    pub const fn label(self) -> &'static str {
        match self {
            Mode::Create => "create",
            Mode::Edit => "edit",
            Mode::View => "view",
        }
    }

    /// Edit and view sessions browse previously saved sections in any order.
    pub const fn relaxes_step_order(self) -> bool {
        matches!(self, Mode::Edit | Mode::View)
    }

    pub const fn is_read_only(self) -> bool {
        matches!(self, Mode::View)
    }
}

/// Opaque per-section data bag. Shapes are owned by each section's form; the
/// engine only reads emptiness and writes whole records.
pub type SectionRecord = BTreeMap<String, Value>;

/// Number of ordered sections in the application form.
pub const SECTION_COUNT: usize = 14;

/// Static description of one ordered step of the application form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionDescriptor {
    pub index: usize,
    pub key: &'static str,
    pub title: &'static str,
    /// Document kind accepted for extraction on this section, if any.
    pub document: Option<DocumentKind>,
}

pub static SECTIONS: [SectionDescriptor; SECTION_COUNT] = [
    SectionDescriptor {
        index: 0,
        key: "personal_details",
        title: "Personal Details",
        document: Some(DocumentKind::Passport),
    },
    SectionDescriptor {
        index: 1,
        key: "contact_details",
        title: "Contact Details",
        document: None,
    },
    SectionDescriptor {
        index: 2,
        key: "emergency_contact",
        title: "Emergency Contact",
        document: None,
    },
    SectionDescriptor {
        index: 3,
        key: "education_history",
        title: "Education History",
        document: None,
    },
    SectionDescriptor {
        index: 4,
        key: "english_proficiency",
        title: "English Proficiency",
        document: Some(DocumentKind::EnglishTestCertificate),
    },
    SectionDescriptor {
        index: 5,
        key: "employment_history",
        title: "Employment History",
        document: None,
    },
    SectionDescriptor {
        index: 6,
        key: "course_preference",
        title: "Course Preference",
        document: None,
    },
    SectionDescriptor {
        index: 7,
        key: "financial_declaration",
        title: "Financial Declaration",
        document: None,
    },
    SectionDescriptor {
        index: 8,
        key: "health_cover",
        title: "Health Cover",
        document: None,
    },
    SectionDescriptor {
        index: 9,
        key: "visa_history",
        title: "Visa History",
        document: None,
    },
    SectionDescriptor {
        index: 10,
        key: "supporting_documents",
        title: "Supporting Documents",
        document: None,
    },
    SectionDescriptor {
        index: 11,
        key: "referees",
        title: "Referees",
        document: None,
    },
    SectionDescriptor {
        index: 12,
        key: "declarations",
        title: "Declarations",
        document: None,
    },
    SectionDescriptor {
        index: 13,
        key: "review_submit",
        title: "Review & Submit",
        document: None,
    },
];

pub fn section_descriptor(index: usize) -> Option<&'static SectionDescriptor> {
    SECTIONS.get(index)
}

pub fn section_by_key(key: &str) -> Option<&'static SectionDescriptor> {
    SECTIONS.iter().find(|descriptor| descriptor.key == key)
}

/// Identity/qualification documents the recognition service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Passport,
    EnglishTestCertificate,
}

impl DocumentKind {
    /// Document-type identifier the upload endpoint expects.
    pub const fn document_type_id(self) -> u32 {
        match self {
            DocumentKind::Passport => 11,
            DocumentKind::EnglishTestCertificate => 46,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            DocumentKind::Passport => "passport",
            DocumentKind::EnglishTestCertificate => "english_test_certificate",
        }
    }
}

/// File selected by the applicant for upload and recognition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_name: String,
    pub mime_type: String,
    #[serde(default)]
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

/// Remote handle naming a recognition job on the document service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionJobHandle(pub String);

/// Lifecycle of one recognition job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionJobStatus {
    Pending,
    Succeeded,
    TimedOut,
    Failed,
}

impl ExtractionJobStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ExtractionJobStatus::Pending => "pending",
            ExtractionJobStatus::Succeeded => "succeeded",
            ExtractionJobStatus::TimedOut => "timed_out",
            ExtractionJobStatus::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, ExtractionJobStatus::Pending)
    }
}

/// Snapshot of the recognition job tracked for one (application, section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionJob {
    pub application_id: ApplicationId,
    pub section: usize,
    pub document: DocumentKind,
    pub handle: Option<ExtractionJobHandle>,
    pub status: ExtractionJobStatus,
    pub attempts: u32,
}

/// True when a field value carries no applicant input.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// True when a section record contains at least one non-empty field.
pub fn record_has_content(record: &SectionRecord) -> bool {
    record.values().any(|value| !is_empty_value(value))
}
