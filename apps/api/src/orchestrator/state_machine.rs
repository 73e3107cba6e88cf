//! Per-persona lifecycle.
//!
//! ```text
//! Pending ──Begin──▶ Streaming ──Complete──▶ Done
//!    │                  │ ▲                    │
//!    │                  │ └─Fragment           │
//!    └──────Fail────────┴──────Fail──▶ Error   │
//!                                        │     │
//! Pending ◀───────────Reset──────────────┴─────┘
//! ```
//!
//! Every mutation of an [`InterviewerResult`] goes through this table, so an
//! illegal move (a fragment after `Done`, a retry while `Streaming`) is an
//! error instead of a silent overwrite.

use thiserror::Error;

use crate::llm_client::GatewayError;
use crate::models::{InterviewerResult, ResultError, ResultStatus};
use crate::orchestrator::parser::ParsedFeedback;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Begin,
    Fragment,
    Complete,
    Fail,
    Reset,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("illegal transition: {event:?} while {from:?}")]
pub struct IllegalTransition {
    pub from: ResultStatus,
    pub event: Event,
}

pub fn next_status(from: ResultStatus, event: Event) -> Result<ResultStatus, IllegalTransition> {
    use ResultStatus::*;

    match (from, event) {
        (Pending, Event::Begin) => Ok(Streaming),
        (Pending, Event::Fail) => Ok(Error),
        (Streaming, Event::Fragment) => Ok(Streaming),
        (Streaming, Event::Complete) => Ok(Done),
        (Streaming, Event::Fail) => Ok(Error),
        (Done | Error, Event::Reset) => Ok(Pending),
        _ => Err(IllegalTransition { from, event }),
    }
}

impl InterviewerResult {
    fn transition(&mut self, event: Event) -> Result<(), IllegalTransition> {
        self.status = next_status(self.status, event)?;
        Ok(())
    }

    pub fn begin(&mut self) -> Result<(), IllegalTransition> {
        self.transition(Event::Begin)
    }

    /// Appends one fragment. Text only ever grows while streaming.
    pub fn append(&mut self, fragment: &str) -> Result<(), IllegalTransition> {
        self.transition(Event::Fragment)?;
        self.stream_text.push_str(fragment);
        Ok(())
    }

    /// Freezes the text and fills the structured fields parsed from it.
    pub fn complete(&mut self, feedback: ParsedFeedback) -> Result<(), IllegalTransition> {
        self.transition(Event::Complete)?;
        self.summary = feedback.summary;
        self.fit_reasons = feedback.fit_reasons;
        self.weaknesses = feedback.weaknesses;
        self.resume_revisions = feedback.resume_revisions;
        self.cover_letter_answers = feedback.cover_letter_answers;
        Ok(())
    }

    /// Records a classified failure. Partial text is kept.
    pub fn fail(&mut self, error: &GatewayError) -> Result<(), IllegalTransition> {
        self.transition(Event::Fail)?;
        self.error = Some(ResultError {
            kind: error.kind,
            message: error.message.clone(),
        });
        Ok(())
    }

    /// Back to `Pending` with text, error and parsed fields cleared.
    pub fn reset(&mut self) -> Result<(), IllegalTransition> {
        self.transition(Event::Reset)?;
        self.stream_text.clear();
        self.error = None;
        self.summary.clear();
        self.fit_reasons.clear();
        self.weaknesses.clear();
        self.resume_revisions.clear();
        self.cover_letter_answers.clear();
        Ok(())
    }
}
