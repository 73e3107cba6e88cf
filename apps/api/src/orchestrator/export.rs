//! Markdown rendering of an assembled analysis. Only `done` results are
//! exported; failed or unfinished personas are left out.

use std::fmt::Write;

use crate::models::{AnalysisResult, InterviewerResult};

pub fn render_markdown(result: &AnalysisResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {} · {}", result.company_name, result.job_title);
    let _ = writeln!(out);
    if !result.company_url.is_empty() {
        let _ = writeln!(out, "- Company: {}", result.company_url);
    }
    if !result.job_url.is_empty() {
        let _ = writeln!(out, "- Job posting: {}", result.job_url);
    }
    let _ = writeln!(out, "- Created: {}", result.created_at.format("%Y-%m-%d %H:%M UTC"));

    let mut exported = 0;
    for r in result.exportable_results() {
        render_interviewer(&mut out, r);
        exported += 1;
    }
    if exported == 0 {
        let _ = writeln!(out);
        let _ = writeln!(out, "_No completed interviewer feedback._");
    }
    out
}

fn render_interviewer(out: &mut String, r: &InterviewerResult) {
    let _ = writeln!(out);
    let _ = writeln!(out, "## {} ({} · {})", r.persona_name, r.provider.spec().label, r.model);

    if is_unstructured(r) {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", r.stream_text.trim());
        return;
    }

    if !r.summary.is_empty() {
        let _ = writeln!(out, "\n### Overall assessment\n\n{}", r.summary);
    }
    bullets(out, "Why you fit", &r.fit_reasons);
    bullets(out, "Gaps to address", &r.weaknesses);

    if !r.resume_revisions.is_empty() {
        let _ = writeln!(out, "\n### Résumé revisions");
        for rev in &r.resume_revisions {
            let _ = writeln!(out, "\n- **Original:** {}", rev.original);
            let _ = writeln!(out, "- **Revised:** {}", rev.revised);
            if !rev.reason.is_empty() {
                let _ = writeln!(out, "- **Reason:** {}", rev.reason);
            }
        }
    }

    if !r.cover_letter_answers.is_empty() {
        let _ = writeln!(out, "\n### Cover letter drafts");
        for answer in &r.cover_letter_answers {
            let _ = writeln!(out, "\n#### {}", answer.question);
            for section in &answer.sections {
                if !section.sub_title.is_empty() {
                    let _ = writeln!(out, "\n**{}**", section.sub_title);
                }
                let _ = writeln!(out, "\n{}", section.content);
            }
        }
    }
}

fn bullets(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n### {heading}\n");
    for item in items {
        let _ = writeln!(out, "- {item}");
    }
}

/// The model ignored the requested headings; fall back to its raw text.
fn is_unstructured(r: &InterviewerResult) -> bool {
    r.summary.is_empty()
        && r.fit_reasons.is_empty()
        && r.weaknesses.is_empty()
        && r.resume_revisions.is_empty()
        && r.cover_letter_answers.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisInput, CompanyInfo, Persona, Provider, ResultStatus};
    use crate::orchestrator::assembler::assemble;

    fn result_for(persona_id: &str, status: ResultStatus) -> InterviewerResult {
        let persona = Persona {
            id: persona_id.to_string(),
            name: format!("Persona {persona_id}"),
            role: String::new(),
            description: String::new(),
            provider: Provider::Anthropic,
            model: "claude-opus-4-6".to_string(),
        };
        let mut r = InterviewerResult::pending(&persona);
        r.status = status;
        r
    }

    fn input() -> AnalysisInput {
        AnalysisInput {
            company_info: CompanyInfo {
                company_url: "https://www.acme.io".to_string(),
                job_url: "https://acme.io/jobs/1".to_string(),
                ..CompanyInfo::default()
            },
            ..AnalysisInput::default()
        }
    }

    #[test]
    fn test_only_done_results_are_exported() {
        let mut done = result_for("a", ResultStatus::Done);
        done.summary = "Strong backend profile.".to_string();
        done.fit_reasons = vec!["Rust in production".to_string()];
        let mut failed = result_for("b", ResultStatus::Error);
        failed.stream_text = "partial".to_string();

        let md = render_markdown(&assemble(&input(), &[done, failed]));

        assert!(md.starts_with("# acme · Analysis result"));
        assert!(md.contains("## Persona a (Anthropic (Claude) · claude-opus-4-6)"));
        assert!(md.contains("### Why you fit\n\n- Rust in production"));
        assert!(!md.contains("Persona b"));
        assert!(!md.contains("partial"));
    }

    #[test]
    fn test_unstructured_text_falls_back_to_raw() {
        let mut done = result_for("a", ResultStatus::Done);
        done.stream_text = "Free-form answer.\n".to_string();

        let md = render_markdown(&assemble(&input(), &[done]));
        assert!(md.contains("\nFree-form answer.\n"));
    }

    #[test]
    fn test_nothing_to_export() {
        let md = render_markdown(&assemble(&AnalysisInput::default(), &[]));
        assert!(md.starts_with("# Unknown company · Unknown position"));
        assert!(md.contains("_No completed interviewer feedback._"));
    }
}
