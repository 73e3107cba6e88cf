//! Turns a finished markdown response into the structured feedback fields.
//!
//! Tolerant by construction: unknown sections are ignored and anything that
//! cannot be recognised simply leaves its field empty. The raw text is
//! always kept on the result, so nothing is lost.

use crate::models::{CoverLetterAnswer, CoverLetterItem, CoverLetterSection, ResumeRevision};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeedback {
    pub summary: String,
    pub fit_reasons: Vec<String>,
    pub weaknesses: Vec<String>,
    pub resume_revisions: Vec<ResumeRevision>,
    pub cover_letter_answers: Vec<CoverLetterAnswer>,
}

pub fn parse_feedback(text: &str, items: &[CoverLetterItem]) -> ParsedFeedback {
    let mut feedback = ParsedFeedback::default();

    for (number, body) in split_sections(text) {
        match number {
            1 => feedback.summary = join_paragraph(&body),
            2 => feedback.fit_reasons = bullets(&body),
            3 => feedback.weaknesses = bullets(&body),
            4 => feedback.resume_revisions = revisions(&body),
            5 => feedback.cover_letter_answers = cover_letter_answers(&body, items),
            _ => {}
        }
    }

    feedback
}

/// Splits on `## <n>.` headings. Text before the first heading is dropped.
fn split_sections(text: &str) -> Vec<(u32, Vec<&str>)> {
    let mut sections: Vec<(u32, Vec<&str>)> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("## ") {
            if let Some(n) = leading_number(heading) {
                sections.push((n, Vec::new()));
                continue;
            }
        }
        if let Some((_, body)) = sections.last_mut() {
            body.push(line);
        }
    }

    sections
}

fn leading_number(s: &str) -> Option<u32> {
    let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn join_paragraph(lines: &[&str]) -> String {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_bullet(line: &str) -> Option<&str> {
    let line = line.trim_start();
    ["- ", "* ", "• "]
        .iter()
        .find_map(|marker| line.strip_prefix(marker))
        .map(str::trim)
}

/// Bullet items; an indented or plain follow-up line continues the previous
/// item. Without any bullet markers every non-empty line counts.
fn bullets(lines: &[&str]) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    let mut saw_marker = false;

    for line in lines {
        if let Some(item) = strip_bullet(line) {
            saw_marker = true;
            if !item.is_empty() {
                items.push(item.to_string());
            }
        } else if !line.trim().is_empty() {
            match items.last_mut() {
                Some(last) if saw_marker => {
                    last.push(' ');
                    last.push_str(line.trim());
                }
                _ => items.push(line.trim().to_string()),
            }
        }
    }

    items
}

#[derive(Clone, Copy)]
enum RevisionField {
    Original,
    Revised,
    Reason,
}

fn revision_label(line: &str) -> Option<(RevisionField, &str)> {
    let line = line.trim();
    let line = strip_bullet(line).unwrap_or(line);
    let labels = [
        ("Original:", RevisionField::Original),
        ("Revised:", RevisionField::Revised),
        ("Reason:", RevisionField::Reason),
    ];
    for (label, field) in labels {
        let bold = format!("**{label}**");
        if let Some(rest) = line.strip_prefix(bold.as_str()) {
            return Some((field, rest.trim()));
        }
        if let Some(rest) = line.strip_prefix(label) {
            return Some((field, rest.trim()));
        }
    }
    None
}

fn revisions(lines: &[&str]) -> Vec<ResumeRevision> {
    let mut out = Vec::new();
    let mut current: Option<ResumeRevision> = None;
    let mut field = RevisionField::Original;

    for line in lines {
        if let Some((next_field, rest)) = revision_label(line) {
            if matches!(next_field, RevisionField::Original) {
                if let Some(done) = current.take() {
                    out.push(done);
                }
            }
            let revision = current.get_or_insert_with(ResumeRevision::default);
            field = next_field;
            push_text(target(revision, field), rest);
        } else if let Some(revision) = current.as_mut() {
            push_text(target(revision, field), line.trim());
        }
    }

    out.extend(current);
    out.retain(|r| !r.original.is_empty() || !r.revised.is_empty());
    out
}

fn target(revision: &mut ResumeRevision, field: RevisionField) -> &mut String {
    match field {
        RevisionField::Original => &mut revision.original,
        RevisionField::Revised => &mut revision.revised,
        RevisionField::Reason => &mut revision.reason,
    }
}

fn push_text(buf: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !buf.is_empty() {
        buf.push(' ');
    }
    buf.push_str(text);
}

fn cover_letter_answers(lines: &[&str], items: &[CoverLetterItem]) -> Vec<CoverLetterAnswer> {
    let mut answers: Vec<CoverLetterAnswer> = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();

    for line in lines {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("#### ") {
            flush_paragraph(&mut answers, &mut paragraph);
            if let Some(answer) = answers.last_mut() {
                answer.sections.push(CoverLetterSection {
                    sub_title: heading.trim().to_string(),
                    content: String::new(),
                });
            }
        } else if let Some(heading) = trimmed.strip_prefix("### ") {
            flush_paragraph(&mut answers, &mut paragraph);
            let index = answers.len();
            let (number, question) = question_heading(heading);
            let item = match number {
                Some(n) => items.get(n.saturating_sub(1)),
                None => items.get(index),
            };
            answers.push(CoverLetterAnswer {
                question_id: item.map(|i| i.id.clone()).unwrap_or_default(),
                question: item.map(|i| i.question.clone()).unwrap_or(question),
                sections: Vec::new(),
            });
        } else if !answers.is_empty() {
            paragraph.push(trimmed);
        }
    }
    flush_paragraph(&mut answers, &mut paragraph);

    answers
}

/// Moves buffered paragraph lines into the current sub-section, creating an
/// untitled one when the answer has none yet.
fn flush_paragraph(answers: &mut [CoverLetterAnswer], paragraph: &mut Vec<&str>) {
    let content = paragraph.join("\n").trim().to_string();
    paragraph.clear();
    if content.is_empty() {
        return;
    }
    let Some(answer) = answers.last_mut() else {
        return;
    };
    match answer.sections.last_mut() {
        Some(section) if section.content.is_empty() => section.content = content,
        Some(section) => {
            section.content.push_str("\n\n");
            section.content.push_str(&content);
        }
        None => answer.sections.push(CoverLetterSection {
            sub_title: String::new(),
            content,
        }),
    }
}

/// `Q2. Why us? (max 700 characters)` → `(Some(2), "Why us?")`.
fn question_heading(heading: &str) -> (Option<usize>, String) {
    let heading = heading.trim();
    let after_q = heading
        .strip_prefix('Q')
        .or_else(|| heading.strip_prefix('q'))
        .unwrap_or("");
    let digits: String = after_q.chars().take_while(|c| c.is_ascii_digit()).collect();
    let (number, rest) = if digits.is_empty() {
        (None, heading)
    } else {
        let rest = after_q[digits.len()..]
            .trim_start_matches(['.', ')', ':'])
            .trim();
        (digits.parse().ok(), rest)
    };
    let question = match rest.rfind("(max ") {
        Some(pos) => rest[..pos].trim(),
        None => rest,
    };
    (number, question.to_string())
}
