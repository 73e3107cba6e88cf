use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::analysis::AnalysisResult;
use crate::models::provider::Provider;

/// A saved analysis as kept by the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub company_name: String,
    pub job_title: String,
    pub company_url: String,
    pub providers: Vec<Provider>,
    pub result: AnalysisResult,
}

impl HistoryItem {
    /// Builds the history entry for `result`. Providers keep first-seen order.
    pub fn from_result(result: AnalysisResult) -> Self {
        let mut providers = Vec::new();
        for r in &result.interviewer_results {
            if !providers.contains(&r.provider) {
                providers.push(r.provider);
            }
        }

        Self {
            id: result.id,
            created_at: result.created_at,
            company_name: result.company_name.clone(),
            job_title: result.job_title.clone(),
            company_url: result.company_url.clone(),
            providers,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisInput, InterviewerResult, Persona};

    #[test]
    fn test_from_result_dedups_providers_in_order() {
        let persona = |id: &str, provider| Persona {
            id: id.to_string(),
            name: id.to_string(),
            role: String::new(),
            description: String::new(),
            provider,
            model: provider_model(provider),
        };
        fn provider_model(p: Provider) -> String {
            p.default_model().to_string()
        }

        let results = vec![
            InterviewerResult::pending(&persona("a", Provider::Google)),
            InterviewerResult::pending(&persona("b", Provider::OpenAi)),
            InterviewerResult::pending(&persona("c", Provider::Google)),
        ];
        let result = AnalysisResult {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            company_name: "acme".to_string(),
            job_title: "Analysis result".to_string(),
            company_url: "https://acme.io".to_string(),
            job_url: String::new(),
            interviewer_results: results,
            input: AnalysisInput::default(),
        };

        let item = HistoryItem::from_result(result.clone());
        assert_eq!(item.id, result.id);
        assert_eq!(item.providers, vec![Provider::Google, Provider::OpenAi]);
        assert_eq!(item.company_name, "acme");
    }
}
