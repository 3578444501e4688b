//! Arena-scoped state for one in-flight batch submission.
//!
//! Every `analyze_batch` call owns exactly one [`BatchSession`]; nothing
//! is shared across calls. The session is a pure reducer — it consumes
//! [`ProtocolEvent`]s and mutates item state, but performs no I/O — so
//! the whole reconciliation logic is unit-testable without a network.

use super::ResumeUpload;
use crate::item::{AnalysisReport, ItemStatus, ResumeItem};
use crate::stream::ProtocolEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lifecycle of one streaming submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Stream events are still being applied.
    Open,
    /// Stream ended normally (with or without a final results array).
    Completed,
    /// Deadline elapsed before the stream finished.
    TimedOut,
    /// Caller fired the cancellation token.
    Cancelled,
    /// Transport fault or server-reported batch failure.
    Faulted,
}

impl SessionState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Local-recovery counters. Never surfaced as errors; exposed so callers
/// and tests can observe how lossy the stream was.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Diagnostics {
    /// Frames that failed to decode and were skipped.
    pub malformed_frames: u64,
    /// Events whose filename matched no submitted resume.
    pub unknown_filenames: u64,
    /// Final-results entries with no matching submitted resume.
    pub orphan_results: u64,
    /// Events that arrived after the session left `Open`.
    pub discarded_after_close: u64,
}

/// Why a session was force-closed before the stream ended naturally.
#[derive(Debug, Clone)]
pub enum AbortReason {
    TimedOut(Duration),
    Cancelled,
    Transport(String),
    Server(String),
}

impl AbortReason {
    fn state(&self) -> SessionState {
        match self {
            Self::TimedOut(_) => SessionState::TimedOut,
            Self::Cancelled => SessionState::Cancelled,
            Self::Transport(_) | Self::Server(_) => SessionState::Faulted,
        }
    }

    /// Message written onto every still-pending item, so each synthesized
    /// failure names its cause and stays distinguishable downstream.
    fn pending_message(&self) -> String {
        match self {
            Self::TimedOut(after) => {
                format!("no result before the {}s batch timeout", after.as_secs())
            }
            Self::Cancelled => "batch cancelled before a result arrived".to_string(),
            Self::Transport(message) => format!("connection lost before a result arrived: {message}"),
            Self::Server(message) => format!("batch failed before a result arrived: {message}"),
        }
    }
}

/// Read-only view of the session, handed to the update callback.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSnapshot {
    pub state: SessionState,
    pub overall_percent: f64,
    pub started_at: DateTime<Utc>,
    pub items: Vec<ItemSnapshot>,
    pub diagnostics: Diagnostics,
}

/// Per-item line of a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ItemSnapshot {
    pub id: Uuid,
    pub filename: String,
    pub status: ItemStatus,
    /// Last known score, from the final report or the freshest partial.
    pub score: Option<f64>,
    pub error: Option<String>,
}

/// One entry of the settled result list: exactly one per submitted file.
#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub id: Uuid,
    pub filename: String,
    pub status: ItemStatus,
    pub report: Option<AnalysisReport>,
    pub error: Option<String>,
}

/// Exclusive owner of all item state for one submission.
#[derive(Debug)]
pub struct BatchSession {
    items: Vec<ResumeItem>,
    index: HashMap<String, usize>,
    state: SessionState,
    overall_percent: f64,
    started_at: DateTime<Utc>,
    fault: Option<String>,
    pub diagnostics: Diagnostics,
}

impl BatchSession {
    /// Fresh session with every item `Queued`, in submission order.
    pub fn new(uploads: &[ResumeUpload]) -> Self {
        let items: Vec<ResumeItem> = uploads
            .iter()
            .map(|upload| ResumeItem::new(upload.id, upload.filename.clone()))
            .collect();
        let index = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.filename.clone(), i))
            .collect();
        Self {
            items,
            index,
            state: SessionState::Open,
            overall_percent: 0.0,
            started_at: Utc::now(),
            fault: None,
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Server message behind a `Faulted` state, when the server itself
    /// reported the batch failure.
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    /// Record a frame that failed to decode.
    pub fn note_malformed_frame(&mut self) {
        self.diagnostics.malformed_frames += 1;
    }

    /// Apply one event; returns whether caller-visible state changed.
    ///
    /// Once the session has left `Open` this is a counted no-op — late
    /// bytes never mutate items.
    pub fn apply(&mut self, event: ProtocolEvent) -> bool {
        if !self.state.is_open() {
            self.diagnostics.discarded_after_close += 1;
            return false;
        }
        match event {
            ProtocolEvent::StageProgress {
                filename,
                stage,
                percent,
                report,
            } => {
                let mut changed = self.raise_percent(percent);
                if let Some(filename) = filename {
                    changed |= match self.item_mut(&filename) {
                        Some(item) => match stage {
                            Some(stage) => item.apply_stage(stage, report),
                            None => replace_partial(item, report),
                        },
                        None => false,
                    };
                }
                changed
            }
            ProtocolEvent::ItemSettled {
                filename,
                percent,
                report,
            } => {
                let mut changed = self.raise_percent(percent);
                // A keyless complete frame only carries aggregate progress.
                if let Some(filename) = filename {
                    changed |= match (self.item_mut(&filename), report) {
                        (Some(item), Some(report)) => item.settle(report),
                        // A complete status with no payload cannot
                        // settle the item; a later results array will.
                        (Some(item), None) => {
                            debug!(filename = item.filename.as_str(), "complete event without a result payload");
                            false
                        }
                        (None, _) => false,
                    };
                }
                changed
            }
            ProtocolEvent::ItemFailed { filename, message } => match filename {
                Some(filename) => self
                    .item_mut(&filename)
                    .map(|item| item.fail(message))
                    .unwrap_or(false),
                None => {
                    debug!(message = message.as_str(), "error event without a filename");
                    false
                }
            },
            ProtocolEvent::BatchSettled { reports } => {
                self.reconcile_final_results(reports);
                self.close(
                    SessionState::Completed,
                    "batch completed without a result for this file",
                );
                true
            }
            ProtocolEvent::BatchFailed { message } => {
                self.fault = Some(message.clone());
                self.close(
                    AbortReason::Server(message.clone()).state(),
                    &AbortReason::Server(message).pending_message(),
                );
                true
            }
            ProtocolEvent::Unrecognized => false,
        }
    }

    /// Normal end of stream with no final results array seen: the batch
    /// still resolves, and anything pending becomes a synthesized
    /// failure. This is the designed fallback, not an error path.
    pub fn finish_stream(&mut self) -> bool {
        if !self.state.is_open() {
            return false;
        }
        self.close(
            SessionState::Completed,
            "stream ended before a result arrived for this file",
        );
        true
    }

    /// Force-close for timeout, cancellation, or a transport fault.
    /// Idempotent: a second abort changes nothing.
    pub fn abort(&mut self, reason: AbortReason) -> bool {
        if !self.state.is_open() {
            return false;
        }
        self.close(reason.state(), &reason.pending_message());
        true
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot {
            state: self.state,
            overall_percent: self.overall_percent,
            started_at: self.started_at,
            items: self
                .items
                .iter()
                .map(|item| ItemSnapshot {
                    id: item.id,
                    filename: item.filename.clone(),
                    status: item.status,
                    score: item
                        .report
                        .as_ref()
                        .or(item.partial.as_ref())
                        .map(|r| r.score),
                    error: item.error.clone(),
                })
                .collect(),
            diagnostics: self.diagnostics,
        }
    }

    /// Consume the session into the settled result list: one entry per
    /// submitted file, in submission order. Call only after the session
    /// has closed (every item is terminal by then).
    pub fn into_outcomes(self) -> Vec<ItemOutcome> {
        self.items
            .into_iter()
            .map(|item| ItemOutcome {
                id: item.id,
                filename: item.filename,
                status: item.status,
                report: item.report,
                error: item.error,
            })
            .collect()
    }

    /// Reconcile the final results array by filename. A match settles the
    /// item even if no per-item `complete` event was ever seen; entries
    /// for files we never submitted are counted and ignored.
    fn reconcile_final_results(&mut self, reports: Vec<AnalysisReport>) {
        for report in reports {
            match self.index.get(report.filename.as_str()).copied() {
                Some(i) => {
                    // Server-reported per-entry errors fail the item
                    // instead of settling it with an empty report.
                    if let Some(error) = report
                        .extra
                        .get("error")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                    {
                        self.items[i].fail(error);
                    } else {
                        self.items[i].settle(report);
                    }
                }
                None => {
                    warn!(
                        filename = report.filename.as_str(),
                        "ignoring final result for a file not in this batch"
                    );
                    self.diagnostics.orphan_results += 1;
                }
            }
        }
    }

    fn close(&mut self, state: SessionState, pending_message: &str) {
        self.state = state;
        let mut synthesized = 0;
        for item in &mut self.items {
            if item.mark_failed_if_pending(pending_message) {
                synthesized += 1;
            }
        }
        if state == SessionState::Completed && synthesized == 0 {
            self.overall_percent = 100.0;
        }
        if synthesized > 0 {
            debug!(synthesized, state = ?state, "synthesized failures for pending items");
        }
    }

    /// Clamp-to-forward overall progress: out-of-order delivery must not
    /// make the aggregate bar move backwards.
    fn raise_percent(&mut self, percent: Option<f64>) -> bool {
        match percent {
            Some(p) => {
                let p = p.clamp(0.0, 100.0);
                if p > self.overall_percent {
                    self.overall_percent = p;
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    fn item_mut(&mut self, filename: &str) -> Option<&mut ResumeItem> {
        match self.index.get(filename).copied() {
            Some(i) => Some(&mut self.items[i]),
            None => {
                debug!(filename, "event for a file not in this batch");
                self.diagnostics.unknown_filenames += 1;
                None
            }
        }
    }
}

fn replace_partial(item: &mut ResumeItem, report: Option<AnalysisReport>) -> bool {
    match report {
        Some(report) if !item.status.is_terminal() => {
            item.partial = Some(report);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Stage;

    fn uploads(names: &[&str]) -> Vec<ResumeUpload> {
        names
            .iter()
            .map(|name| ResumeUpload::from_bytes(name.to_string(), Vec::new()))
            .collect()
    }

    fn report(filename: &str, score: f64) -> AnalysisReport {
        AnalysisReport {
            filename: filename.to_string(),
            score,
            missing_skills: vec![],
            remarks: String::new(),
            email: None,
            email_type: None,
            email_error: None,
            is_best_match: false,
            extra: serde_json::Map::new(),
        }
    }

    fn stage(filename: &str, stage: Stage) -> ProtocolEvent {
        ProtocolEvent::StageProgress {
            filename: Some(filename.to_string()),
            stage: Some(stage),
            percent: None,
            report: None,
        }
    }

    #[test]
    fn test_stage_progress_advances_item() {
        let mut session = BatchSession::new(&uploads(&["a.pdf", "b.pdf"]));
        assert!(session.apply(stage("a.pdf", Stage::Processing)));
        let snap = session.snapshot();
        assert_eq!(snap.items[0].status, ItemStatus::Processing);
        assert_eq!(snap.items[1].status, ItemStatus::Queued);
    }

    #[test]
    fn test_unknown_filename_is_counted_not_fatal() {
        let mut session = BatchSession::new(&uploads(&["a.pdf"]));
        assert!(!session.apply(stage("ghost.pdf", Stage::Processing)));
        assert_eq!(session.diagnostics.unknown_filenames, 1);
        assert!(session.state().is_open());
    }

    #[test]
    fn test_overall_percent_never_regresses() {
        let mut session = BatchSession::new(&uploads(&["a.pdf"]));
        let percent_only = |p: f64| ProtocolEvent::StageProgress {
            filename: None,
            stage: None,
            percent: Some(p),
            report: None,
        };
        assert!(session.apply(percent_only(40.0)));
        assert!(!session.apply(percent_only(25.0)));
        assert_eq!(session.snapshot().overall_percent, 40.0);
        assert!(session.apply(percent_only(140.0)));
        assert_eq!(session.snapshot().overall_percent, 100.0);
    }

    #[test]
    fn test_keyless_terminal_events_drive_percent_only() {
        let mut session = BatchSession::new(&uploads(&["a.pdf"]));
        assert!(session.apply(ProtocolEvent::ItemSettled {
            filename: None,
            percent: Some(90.0),
            report: None,
        }));
        assert!(!session.apply(ProtocolEvent::ItemFailed {
            filename: None,
            message: "stray error".to_string(),
        }));
        let snap = session.snapshot();
        assert_eq!(snap.overall_percent, 90.0);
        // The counter means "event named a file not in this batch";
        // events with no filename at all stay out of it.
        assert_eq!(session.diagnostics.unknown_filenames, 0);
        assert_eq!(snap.items[0].status, ItemStatus::Queued);
        assert!(session.state().is_open());
    }

    #[test]
    fn test_duplicate_terminal_event_changes_nothing() {
        let mut session = BatchSession::new(&uploads(&["a.pdf"]));
        let settle = || ProtocolEvent::ItemSettled {
            filename: Some("a.pdf".to_string()),
            percent: None,
            report: Some(report("a.pdf", 80.0)),
        };
        assert!(session.apply(settle()));
        assert!(!session.apply(settle()));
    }

    #[test]
    fn test_batch_settled_reconciles_by_filename() {
        let mut session = BatchSession::new(&uploads(&["a.pdf", "b.pdf"]));
        // b.pdf never saw a per-item complete event; the results array
        // alone must settle it.
        session.apply(ProtocolEvent::BatchSettled {
            reports: vec![report("a.pdf", 90.0), report("b.pdf", 75.0)],
        });
        let snap = session.snapshot();
        assert_eq!(snap.state, SessionState::Completed);
        assert_eq!(snap.items[0].status, ItemStatus::Settled);
        assert_eq!(snap.items[1].status, ItemStatus::Settled);
        assert_eq!(snap.overall_percent, 100.0);
    }

    #[test]
    fn test_batch_settled_orphan_results_ignored() {
        let mut session = BatchSession::new(&uploads(&["a.pdf"]));
        session.apply(ProtocolEvent::BatchSettled {
            reports: vec![report("a.pdf", 90.0), report("extra.pdf", 10.0)],
        });
        assert_eq!(session.diagnostics.orphan_results, 1);
        let outcomes = session.into_outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, ItemStatus::Settled);
    }

    #[test]
    fn test_batch_settled_synthesizes_failure_for_missing_item() {
        let mut session = BatchSession::new(&uploads(&["a.pdf", "b.pdf"]));
        session.apply(ProtocolEvent::BatchSettled {
            reports: vec![report("a.pdf", 90.0)],
        });
        let outcomes = session.into_outcomes();
        assert_eq!(outcomes[1].status, ItemStatus::Failed);
        assert!(
            outcomes[1]
                .error
                .as_deref()
                .unwrap()
                .contains("without a result")
        );
    }

    #[test]
    fn test_final_result_entry_with_error_fails_item() {
        let mut session = BatchSession::new(&uploads(&["a.pdf"]));
        let mut bad = report("a.pdf", 0.0);
        bad.extra.insert(
            "error".to_string(),
            serde_json::Value::String("could not extract text".to_string()),
        );
        session.apply(ProtocolEvent::BatchSettled { reports: vec![bad] });
        let outcomes = session.into_outcomes();
        assert_eq!(outcomes[0].status, ItemStatus::Failed);
        assert_eq!(outcomes[0].error.as_deref(), Some("could not extract text"));
    }

    #[test]
    fn test_events_after_close_are_discarded() {
        let mut session = BatchSession::new(&uploads(&["a.pdf"]));
        session.apply(ProtocolEvent::BatchSettled {
            reports: vec![report("a.pdf", 90.0)],
        });
        assert!(!session.apply(stage("a.pdf", Stage::Processing)));
        assert_eq!(session.diagnostics.discarded_after_close, 1);
    }

    #[test]
    fn test_finish_stream_without_completion_synthesizes_failures() {
        let mut session = BatchSession::new(&uploads(&["a.pdf", "b.pdf"]));
        session.apply(ProtocolEvent::ItemSettled {
            filename: Some("a.pdf".to_string()),
            percent: None,
            report: Some(report("a.pdf", 85.0)),
        });
        assert!(session.finish_stream());
        assert!(!session.finish_stream());
        let outcomes = session.into_outcomes();
        assert_eq!(outcomes[0].status, ItemStatus::Settled);
        assert_eq!(outcomes[1].status, ItemStatus::Failed);
        assert!(outcomes[1].error.as_deref().unwrap().contains("stream ended"));
    }

    #[test]
    fn test_abort_reasons_produce_distinct_messages_and_states() {
        let mut timed_out = BatchSession::new(&uploads(&["a.pdf"]));
        timed_out.abort(AbortReason::TimedOut(Duration::from_secs(300)));
        assert_eq!(timed_out.state(), SessionState::TimedOut);

        let mut cancelled = BatchSession::new(&uploads(&["a.pdf"]));
        cancelled.abort(AbortReason::Cancelled);
        assert_eq!(cancelled.state(), SessionState::Cancelled);

        let timeout_msg = timed_out.into_outcomes()[0].error.clone().unwrap();
        let cancel_msg = cancelled.into_outcomes()[0].error.clone().unwrap();
        assert!(timeout_msg.contains("timeout"));
        assert!(cancel_msg.contains("cancelled"));
        assert_ne!(timeout_msg, cancel_msg);
    }

    #[test]
    fn test_abort_is_idempotent() {
        let mut session = BatchSession::new(&uploads(&["a.pdf"]));
        assert!(session.abort(AbortReason::Cancelled));
        assert!(!session.abort(AbortReason::TimedOut(Duration::from_secs(1))));
        assert_eq!(session.state(), SessionState::Cancelled);
    }

    #[test]
    fn test_server_batch_failure_faults_session() {
        let mut session = BatchSession::new(&uploads(&["a.pdf"]));
        session.apply(ProtocolEvent::BatchFailed {
            message: "model unavailable".to_string(),
        });
        assert_eq!(session.state(), SessionState::Faulted);
        assert_eq!(session.fault(), Some("model unavailable"));
        let outcomes = session.into_outcomes();
        assert_eq!(outcomes[0].status, ItemStatus::Failed);
    }

    #[test]
    fn test_outcomes_cover_every_item_exactly_once() {
        let names = ["a.pdf", "b.pdf", "c.pdf"];
        let mut session = BatchSession::new(&uploads(&names));
        session.apply(ProtocolEvent::ItemSettled {
            filename: Some("b.pdf".to_string()),
            percent: None,
            report: Some(report("b.pdf", 60.0)),
        });
        session.finish_stream();
        let outcomes = session.into_outcomes();
        assert_eq!(outcomes.len(), names.len());
        let filenames: Vec<&str> = outcomes.iter().map(|o| o.filename.as_str()).collect();
        assert_eq!(filenames, names);
        assert!(outcomes.iter().all(|o| o.status.is_terminal()));
    }
}
