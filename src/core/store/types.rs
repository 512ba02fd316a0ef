use serde::{Deserialize, Serialize};

/// Lifecycle of a document from upload through embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(DocumentStatus::Processing),
            "completed" => Some(DocumentStatus::Completed),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

/// Lifecycle of a single embedding job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub owner_id: String,
    pub title: String,
    pub status: DocumentStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentPage {
    pub id: i64,
    pub document_id: i64,
    pub page_number: i64,
    pub content: String,
}

/// A job claimed for processing. Carries everything the worker needs so it
/// never re-reads the source row.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: i64,
    pub target_table: String,
    pub target_id: i64,
    pub owner_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: i64,
    pub target_table: String,
    pub target_id: i64,
    pub status: JobStatus,
    pub error_message: Option<String>,
}

/// One page returned by keyword or semantic search, ready for the model.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document_id: i64,
    pub document_title: String,
    pub page_number: i64,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDocument {
    pub id: i64,
    pub owner_id: String,
    pub title: String,
    pub file_path: String,
    pub source_ids: Vec<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiTokenRecord {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub created_at: String,
}
