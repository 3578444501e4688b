//! Per-resume lifecycle tracking.
//!
//! One [`ResumeItem`] exists per submitted file. Its own events arrive
//! in logical order (the transport preserves stream order), so the
//! machine only has to enforce forward-only transitions and idempotent
//! terminals; it never needs to reorder.

use crate::stream::Stage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle status of one submitted resume.
///
/// Moves forward through `Queued → Processing → Analyzing → Generating
/// → Settled`; `Failed` is reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Queued,
    Processing,
    Analyzing,
    Generating,
    Settled,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Failed)
    }

    /// Position in the forward-only stage order. Terminals share the top
    /// rank; they are guarded by [`is_terminal`](Self::is_terminal), not
    /// by rank comparison.
    fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Processing => 1,
            Self::Analyzing => 2,
            Self::Generating => 3,
            Self::Settled | Self::Failed => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Analyzing => "analyzing",
            Self::Generating => "generating",
            Self::Settled => "settled",
            Self::Failed => "failed",
        }
    }
}

impl From<Stage> for ItemStatus {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Queued => ItemStatus::Queued,
            Stage::Processing => ItemStatus::Processing,
            Stage::Analyzing => ItemStatus::Analyzing,
            Stage::Generating => ItemStatus::Generating,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generated screening email category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailType {
    Acceptance,
    Rejection,
}

/// Analysis payload the server produces for one resume.
///
/// Unknown fields are kept in `extra` so newer server versions never
/// cost the caller data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub filename: String,
    pub score: f64,
    #[serde(default)]
    pub missing_skills: Vec<String>,
    #[serde(default)]
    pub remarks: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_type: Option<EmailType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_error: Option<String>,
    #[serde(default)]
    pub is_best_match: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// State machine for one resume in an in-flight batch.
#[derive(Debug, Clone)]
pub struct ResumeItem {
    pub id: Uuid,
    /// Correlation key: matches the `filename` field of inbound events.
    pub filename: String,
    pub status: ItemStatus,
    /// Last known non-final payload, replaced wholesale on each update
    /// (the server streams full snapshots, not diffs).
    pub partial: Option<AnalysisReport>,
    /// Final payload; set only when settled.
    pub report: Option<AnalysisReport>,
    /// Failure message; set only when failed. Mutually exclusive with
    /// `report`.
    pub error: Option<String>,
}

impl ResumeItem {
    pub fn new(id: Uuid, filename: impl Into<String>) -> Self {
        Self {
            id,
            filename: filename.into(),
            status: ItemStatus::Queued,
            partial: None,
            report: None,
            error: None,
        }
    }

    /// Advance to a non-terminal stage. Regressions are ignored; a fresh
    /// partial payload is taken even when the stage itself is stale or
    /// unchanged. Returns whether anything caller-visible changed.
    pub fn apply_stage(&mut self, stage: Stage, partial: Option<AnalysisReport>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let next = ItemStatus::from(stage);
        let mut changed = false;
        if next.rank() > self.status.rank() {
            self.status = next;
            changed = true;
        }
        if let Some(snapshot) = partial {
            self.partial = Some(snapshot);
            changed = true;
        }
        changed
    }

    /// Settle with a final report. A duplicate terminal delivery is a
    /// no-op so the caller sees exactly one terminal notification.
    pub fn settle(&mut self, report: AnalysisReport) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = ItemStatus::Settled;
        self.report = Some(report);
        self.partial = None;
        true
    }

    /// Fail with a server-reported message. Idempotent on terminals.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = ItemStatus::Failed;
        self.error = Some(message.into());
        true
    }

    /// Client-synthesized failure for an item the stream never settled.
    /// Applies only to non-terminal items.
    pub fn mark_failed_if_pending(&mut self, message: &str) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.fail(message)
    }
}
