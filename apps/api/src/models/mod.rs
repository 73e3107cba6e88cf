pub mod analysis;
pub mod history;
pub mod persona;
pub mod provider;

pub use analysis::{
    AnalysisInput, AnalysisResult, CompanyInfo, CoverLetterAnswer, CoverLetterItem,
    CoverLetterSection, DocumentKind, InterviewerResult, ResultError, ResultStatus, ResumeFile,
    ResumeRevision,
};
pub use history::HistoryItem;
pub use persona::Persona;
pub use provider::{Credential, Provider};
