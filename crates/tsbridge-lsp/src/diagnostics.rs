//! Incremental diagnostics for open documents.
//!
//! Every edit, open or close restarts one background operation that walks
//! the open documents and publishes their syntactic and semantic
//! diagnostics, one document per step:
//!
//! ```text
//!   edit ──► change_seq += 1 ──► start_new ──► delay(initial)
//!                                                │
//!                  ┌─────────────────────────────┘
//!                  ▼
//!   check_one: stale? ──yes──► stop
//!                  │ no
//!                  ▼
//!       still in project? ──no──► skip
//!                  │ yes
//!                  ▼
//!       syntactic + semantic ──► publish
//!                  │
//!                  └── more? ──► delay(min(initial, 200ms)) ──► check_one
//! ```
//!
//! A batch remembers the change counter it started under and gives up as
//! soon as the counter moves; the newer edit has already started its own
//! batch.

use std::fmt;
use std::time::{Duration, Instant};

use tsbridge_lsp_core::model::{Diagnostic, ProjectId};
use tsbridge_lsp_core::{
    Engine, EngineResult, LanguageService, MultistepOperation, NextStep, NormalizedPath,
    ProjectService,
};

use crate::convert::diagnostic_to_lsp;
use crate::paths::path_to_uri;
use crate::session::{Outgoing, SessionState};

/// Initial delay after a client edit, open or close.
pub const FOREGROUND_CHECK_DELAY: Duration = Duration::from_millis(200);

/// Initial delay after the engine reports background project changes.
pub const BACKGROUND_CHECK_DELAY: Duration = Duration::from_millis(100);

/// Upper bound on the delay between two documents of one batch.
pub const MAX_FOLLOW_UP_DELAY: Duration = Duration::from_millis(200);

/// A document waiting to be checked in the project that queued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingErrorCheck {
    pub file: NormalizedPath,
    pub project: ProjectId,
}

/// Pair each file with its default project. Files without one are dropped.
pub fn create_check_list<'a>(
    engine: &dyn Engine,
    files: impl IntoIterator<Item = &'a NormalizedPath>,
) -> Vec<PendingErrorCheck> {
    files
        .into_iter()
        .filter_map(|file| {
            engine
                .default_project_for_file(file)
                .map(|project| PendingErrorCheck {
                    file: file.clone(),
                    project,
                })
        })
        .collect()
}

/// Restart diagnostics for every open document.
pub(crate) fn request_diagnostics(
    operation: &mut MultistepOperation<SessionState>,
    state: &mut SessionState,
    now: Instant,
) {
    let files: Vec<NormalizedPath> = state.open_files.iter().cloned().collect();
    operation.start_new(state, now, move |state, next| {
        let checks = create_check_list(&*state.engine, &files);
        ErrorCheckBatch::schedule(state, next, checks, FOREGROUND_CHECK_DELAY, true);
        Ok(())
    });
}

/// Restart diagnostics for `files` after a background project change.
pub(crate) fn recheck_in_background(
    operation: &mut MultistepOperation<SessionState>,
    state: &mut SessionState,
    files: Vec<NormalizedPath>,
    now: Instant,
) {
    operation.start_new(state, now, move |state, next| {
        let checks = create_check_list(&*state.engine, &files);
        ErrorCheckBatch::schedule(state, next, checks, BACKGROUND_CHECK_DELAY, true);
        Ok(())
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckPhase {
    Syntactic,
    Semantic,
}

impl fmt::Display for CheckPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntactic => f.write_str("syntactic check"),
            Self::Semantic => f.write_str("semantic check"),
        }
    }
}

/// One pass over a check list.
#[derive(Debug)]
pub(crate) struct ErrorCheckBatch {
    seq: u64,
    checks: Vec<PendingErrorCheck>,
    index: usize,
    follow_up: Duration,
    require_open: bool,
}

impl ErrorCheckBatch {
    /// Queue the first document of `checks` after `delay`.
    pub(crate) fn schedule(
        state: &SessionState,
        next: &mut NextStep<SessionState>,
        checks: Vec<PendingErrorCheck>,
        delay: Duration,
        require_open: bool,
    ) {
        if checks.is_empty() {
            return;
        }
        let batch = ErrorCheckBatch {
            seq: state.change_seq,
            checks,
            index: 0,
            follow_up: delay.min(MAX_FOLLOW_UP_DELAY),
            require_open,
        };
        next.delay(delay, move |state, next| batch.check_one(state, next));
    }

    fn check_one(
        mut self,
        state: &mut SessionState,
        next: &mut NextStep<SessionState>,
    ) -> EngineResult<()> {
        if state.change_seq != self.seq {
            tracing::debug!(
                started = self.seq,
                current = state.change_seq,
                "abandoning stale diagnostics batch"
            );
            return Ok(());
        }

        let Some(check) = self.checks.get(self.index).cloned() else {
            return Ok(());
        };
        self.index += 1;

        if state
            .engine
            .contains_file(check.project, &check.file, self.require_open)
        {
            combined_check(state, &check)?;
        } else {
            tracing::debug!(file = %check.file, "skipping file no longer in its project");
        }

        if self.index < self.checks.len() {
            let follow_up = self.follow_up;
            next.delay(follow_up, move |state, next| self.check_one(state, next));
        }
        Ok(())
    }
}

/// Publish syntactic followed by semantic diagnostics for one document.
///
/// Failures are logged and leave the document's published diagnostics as
/// they were. Cancellation propagates so the operation stops.
fn combined_check(state: &mut SessionState, check: &PendingErrorCheck) -> EngineResult<()> {
    let Some(mut diagnostics) = run_phase(state, check, CheckPhase::Syntactic)? else {
        return Ok(());
    };
    let Some(semantic) = run_phase(state, check, CheckPhase::Semantic)? else {
        return Ok(());
    };
    diagnostics.extend(semantic);

    let uri = match path_to_uri(&check.file) {
        Ok(uri) => uri,
        Err(error) => {
            tracing::warn!(file = %check.file, %error, "not publishing diagnostics");
            return Ok(());
        }
    };

    tracing::debug!(file = %check.file, count = diagnostics.len(), "publishing diagnostics");
    state.outbox.push(Outgoing::PublishDiagnostics {
        uri,
        diagnostics: diagnostics.iter().map(diagnostic_to_lsp).collect(),
    });
    Ok(())
}

fn run_phase(
    state: &mut SessionState,
    check: &PendingErrorCheck,
    phase: CheckPhase,
) -> EngineResult<Option<Vec<Diagnostic>>> {
    let result = match phase {
        CheckPhase::Syntactic => state.engine.syntactic_diagnostics(check.project, &check.file),
        CheckPhase::Semantic => state.engine.semantic_diagnostics(check.project, &check.file),
    };
    match result {
        Ok(diagnostics) => Ok(Some(diagnostics)),
        Err(error) if error.is_cancelled() => Err(error),
        Err(error) => {
            tracing::error!(file = %check.file, %phase, %error, "diagnostics check failed");
            Ok(None)
        }
    }
}
