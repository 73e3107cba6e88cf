// Prompt rendering for persona analysis requests.
// Headings below are parsed back by `orchestrator::parser`; keep them in sync.

use serde::{Deserialize, Serialize};

use crate::models::{AnalysisInput, DocumentKind, Persona};

pub const HEADING_SUMMARY: &str = "## 1. Overall assessment";
pub const HEADING_FIT: &str = "## 2. Why you fit";
pub const HEADING_GAPS: &str = "## 3. Gaps to address";
pub const HEADING_REVISIONS: &str = "## 4. Résumé revisions";
pub const HEADING_COVER_LETTER: &str = "## 5. Cover letter drafts";

const NOT_PROVIDED: &str = "(not provided)";

/// Which portion of the feedback to request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Sections 1–4 only.
    Analysis,
    /// Section 5 only.
    CoverLetter,
    /// Sections 1–4, plus 5 when the input has cover-letter items.
    #[default]
    Full,
}

const ANALYSIS_RULES: &str = "\
Rules:
1. Never invent or exaggerate facts, experience or skills that are not in the applicant's documents, \
and do not force a fit with the posting. Unconditionally positive feedback is not acceptable.
2. If the applicant's experience does not match the posting or falls short of its requirements, \
say plainly that the applicant is not a good fit for this position.
3. Do not use bold emphasis, exaggerated wording or exclamations.";

pub fn render_prompt(input: &AnalysisInput, persona: &Persona, phase: Phase) -> String {
    let mut out = String::new();
    out.push_str(&format!("You are {}.\n\n", persona_voice(persona)));

    match phase {
        Phase::CoverLetter => out.push_str(
            "Using the company information and the applicant's documents below, \
             draft the applicant's cover letter answers.\n\n",
        ),
        Phase::Analysis | Phase::Full => out.push_str(
            "Using the company information and the applicant's documents below, \
             analyse strictly and objectively why this applicant should or should not be hired.\n\n",
        ),
    }

    out.push_str(ANALYSIS_RULES);
    out.push_str("\n\n---\n\n");
    out.push_str(&render_context(input));
    out.push_str("\n---\n\nWrite your answer in exactly this structure.\n\n");

    if phase != Phase::CoverLetter {
        out.push_str(&analysis_sections());
    }

    let wants_cover_letter = match phase {
        Phase::Analysis => false,
        Phase::CoverLetter => true,
        Phase::Full => !input.cover_letter_items.is_empty(),
    };
    if wants_cover_letter {
        out.push_str(&cover_letter_section(input));
    }

    out
}

fn persona_voice(persona: &Persona) -> String {
    let description = persona.description.trim();
    if !description.is_empty() {
        return description.to_string();
    }
    let role = persona.role.trim();
    if !role.is_empty() {
        return format!("an interviewer working as {role}");
    }
    "an experienced interviewer for this position".to_string()
}

fn render_context(input: &AnalysisInput) -> String {
    let info = &input.company_info;
    let documents = input
        .resume_files
        .iter()
        .map(|f| {
            let label = match f.kind {
                DocumentKind::Resume => "Résumé",
                DocumentKind::Portfolio => "Supporting document",
            };
            format!("[{label} - {}]\n{}", f.name, f.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "[Company]\n{}\n\n[Job posting]\n{}\n\n[Applicant documents]\n{}\n",
        non_blank(info.company_content.as_deref()),
        non_blank(info.job_content.as_deref()),
        if documents.is_empty() { NOT_PROVIDED } else { documents.as_str() },
    )
}

fn non_blank(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => NOT_PROVIDED,
    }
}

fn analysis_sections() -> String {
    format!(
        "{HEADING_SUMMARY}\n(One or two sentences with your overall impression of the applicant.)\n\n\
         {HEADING_FIT}\n- (one reason per bullet)\n\n\
         {HEADING_GAPS}\n- (one gap per bullet)\n\n\
         {HEADING_REVISIONS}\nFor every passage that should change:\n\
         **Original:** (original text)\n**Revised:** (improved text)\n**Reason:** (why it should change)\n\n"
    )
}

fn cover_letter_section(input: &AnalysisInput) -> String {
    let mut out = format!(
        "{HEADING_COVER_LETTER}\n\
         Answer each question below under its own `### Q<n>.` heading. Split every answer into \
         several paragraphs, each introduced by a `####` sub-title that would catch an \
         interviewer's interest. Respect each character limit.\n\n"
    );
    for (idx, item) in input.cover_letter_items.iter().enumerate() {
        out.push_str(&format!(
            "### Q{}. {} (max {} characters)\n",
            idx + 1,
            item.question,
            item.max_length
        ));
    }
    out
}
