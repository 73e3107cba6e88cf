//! Result Assembler: builds the immutable [`AnalysisResult`] record.
//!
//! Pure apart from the fresh id and timestamp, so it is safe to call on every
//! progress update for previews and once more at settlement.

use chrono::Utc;
use url::Url;
use uuid::Uuid;

use crate::models::{AnalysisInput, AnalysisResult, InterviewerResult};

pub const UNKNOWN_COMPANY: &str = "Unknown company";
pub const UNKNOWN_POSITION: &str = "Unknown position";
pub const DEFAULT_JOB_TITLE: &str = "Analysis result";

pub fn assemble(input: &AnalysisInput, results: &[InterviewerResult]) -> AnalysisResult {
    let info = &input.company_info;
    AnalysisResult {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        company_name: extract_company_name(&info.company_url),
        job_title: extract_job_title(&info.job_url),
        company_url: info.company_url.clone(),
        job_url: info.job_url.clone(),
        interviewer_results: results.to_vec(),
        input: input.clone(),
    }
}

/// `https://www.acme.co.kr/about` → `acme`. Empty or unparsable URLs yield
/// [`UNKNOWN_COMPANY`].
pub fn extract_company_name(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return UNKNOWN_COMPANY.to_string();
    }

    let Ok(parsed) = Url::parse(url) else {
        return UNKNOWN_COMPANY.to_string();
    };
    let Some(host) = parsed.host_str() else {
        return UNKNOWN_COMPANY.to_string();
    };

    let host = host.strip_prefix("www.").unwrap_or(host);
    match host.split('.').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => UNKNOWN_COMPANY.to_string(),
    }
}

/// Job postings carry no reliable title in their URL, so any posting URL
/// yields the generic [`DEFAULT_JOB_TITLE`].
pub fn extract_job_title(url: &str) -> String {
    if url.trim().is_empty() {
        UNKNOWN_POSITION.to_string()
    } else {
        DEFAULT_JOB_TITLE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CompanyInfo;

    #[test]
    fn test_company_name_from_country_domain() {
        assert_eq!(extract_company_name("https://acme.co.kr/about"), "acme");
    }

    #[test]
    fn test_company_name_strips_www() {
        assert_eq!(extract_company_name("https://www.toss.im/career"), "toss");
        assert_eq!(extract_company_name("http://careers.acme.com"), "careers");
    }

    #[test]
    fn test_company_name_placeholders() {
        assert_eq!(extract_company_name(""), UNKNOWN_COMPANY);
        assert_eq!(extract_company_name("   "), UNKNOWN_COMPANY);
        assert_eq!(extract_company_name("acme.com"), UNKNOWN_COMPANY);
        assert_eq!(extract_company_name("not a url"), UNKNOWN_COMPANY);
    }

    #[test]
    fn test_job_title() {
        assert_eq!(extract_job_title(""), UNKNOWN_POSITION);
        assert_eq!(extract_job_title("https://acme.io/jobs/42"), DEFAULT_JOB_TITLE);
    }

    #[test]
    fn test_assemble_is_deterministic_apart_from_identity() {
        let input = AnalysisInput {
            company_info: CompanyInfo {
                company_url: "https://acme.co.kr/about".to_string(),
                job_url: "https://acme.co.kr/jobs/1".to_string(),
                ..CompanyInfo::default()
            },
            ..AnalysisInput::default()
        };

        let a = assemble(&input, &[]);
        let b = assemble(&input, &[]);

        assert_ne!(a.id, b.id);
        assert_eq!(a.company_name, b.company_name);
        assert_eq!(a.job_title, b.job_title);
        assert_eq!(a.company_name, "acme");
        assert_eq!(a.job_url, "https://acme.co.kr/jobs/1");
        assert_eq!(a.input, input);
    }
}
