use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm_client::ErrorKind;
use crate::models::persona::Persona;
use crate::models::provider::Provider;

// ────────────────────────────────────────────────────────────────────────────
// Input snapshot
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyInfo {
    #[serde(default)]
    pub company_url: String,
    #[serde(default)]
    pub job_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Resume,
    Portfolio,
}

/// An uploaded document whose text has already been extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeFile {
    pub name: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverLetterItem {
    pub id: String,
    pub question: String,
    pub max_length: u32,
}

/// Everything one orchestration run analyses. Treated as an immutable snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisInput {
    #[serde(default)]
    pub company_info: CompanyInfo,
    #[serde(default)]
    pub resume_files: Vec<ResumeFile>,
    #[serde(default)]
    pub cover_letter_items: Vec<CoverLetterItem>,
    #[serde(default)]
    pub personas: Vec<Persona>,
}

// ────────────────────────────────────────────────────────────────────────────
// Per-persona result
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Pending,
    Streaming,
    Done,
    Error,
}

impl ResultStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ResultStatus::Done | ResultStatus::Error)
    }
}

/// A classified failure attached to a persona's result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRevision {
    pub original: String,
    pub revised: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverLetterSection {
    pub sub_title: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverLetterAnswer {
    pub question_id: String,
    pub question: String,
    pub sections: Vec<CoverLetterSection>,
}

/// One persona's feedback. Mutated only by the orchestrator that owns the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewerResult {
    pub persona_id: String,
    pub persona_name: String,
    pub provider: Provider,
    pub model: String,
    pub status: ResultStatus,
    #[serde(default)]
    pub stream_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResultError>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub fit_reasons: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub resume_revisions: Vec<ResumeRevision>,
    #[serde(default)]
    pub cover_letter_answers: Vec<CoverLetterAnswer>,
}

impl InterviewerResult {
    /// A fresh `pending` entry for `persona`.
    pub fn pending(persona: &Persona) -> Self {
        Self {
            persona_id: persona.id.clone(),
            persona_name: persona.display_name().to_string(),
            provider: persona.provider,
            model: persona.model.clone(),
            status: ResultStatus::Pending,
            stream_text: String::new(),
            error: None,
            summary: String::new(),
            fit_reasons: Vec::new(),
            weaknesses: Vec::new(),
            resume_revisions: Vec::new(),
            cover_letter_answers: Vec::new(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Assembled record
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub company_name: String,
    pub job_title: String,
    pub company_url: String,
    pub job_url: String,
    pub interviewer_results: Vec<InterviewerResult>,
    pub input: AnalysisInput,
}

impl AnalysisResult {
    /// Results eligible for export: only personas that finished successfully.
    pub fn exportable_results(&self) -> impl Iterator<Item = &InterviewerResult> {
        self.interviewer_results
            .iter()
            .filter(|r| r.status == ResultStatus::Done)
    }
}
