//! Frame payload parsing into typed protocol events.

use crate::item::AnalysisReport;
use serde::Deserialize;
use tracing::debug;

/// Field marker for payload lines inside a frame. Lines without it
/// (`event:` fields, comments, keep-alives) carry no data.
const DATA_MARKER: &str = "data:";

/// Raw JSON payload shape emitted by the analysis stream.
///
/// `type` selects the variant; within `progress`, `status` selects the
/// stage. All other fields are optional so a sparse payload still
/// deserializes.
#[derive(Debug, Deserialize)]
struct WirePayload {
    #[serde(rename = "type")]
    kind: String,
    status: Option<String>,
    filename: Option<String>,
    percentage: Option<f64>,
    result: Option<AnalysisReport>,
    results: Option<Vec<AnalysisReport>>,
    error: Option<String>,
}

/// Non-terminal processing stages reported for one resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Queued,
    Processing,
    Analyzing,
    Generating,
}

impl Stage {
    fn from_wire(status: &str) -> Option<Self> {
        match status {
            "queued" => Some(Stage::Queued),
            "processing" => Some(Stage::Processing),
            "analyzing" => Some(Stage::Analyzing),
            "generating" => Some(Stage::Generating),
            _ => None,
        }
    }
}

/// One parsed unit of work for the session reducer.
///
/// Created from a single frame, consumed exactly once, then dropped.
#[derive(Debug)]
pub enum ProtocolEvent {
    /// A resume advanced to a non-terminal stage, possibly with a fresh
    /// partial report and/or an updated overall percentage. Without a
    /// filename only the percentage is meaningful.
    StageProgress {
        filename: Option<String>,
        stage: Option<Stage>,
        percent: Option<f64>,
        report: Option<AnalysisReport>,
    },
    /// The server finished one resume (`status: "complete"`).
    ItemSettled {
        filename: Option<String>,
        percent: Option<f64>,
        report: Option<AnalysisReport>,
    },
    /// The server failed one resume (`status: "error"`).
    ItemFailed {
        filename: Option<String>,
        message: String,
    },
    /// Final results array for the whole batch.
    BatchSettled { reports: Vec<AnalysisReport> },
    /// Fatal batch-level server error.
    BatchFailed { message: String },
    /// Valid JSON that matches no known `type`/`status` combination.
    /// Deliberately a no-op for the reducer, never a thrown error.
    Unrecognized,
}

/// Parse one complete frame into at most one event.
///
/// Returns `None` for frames with no data lines or undecodable JSON —
/// the caller counts those and moves on; one corrupt message must not
/// sacrifice the rest of the batch.
pub fn parse_frame(frame: &str) -> Option<ProtocolEvent> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix(DATA_MARKER))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();

    if data_lines.is_empty() {
        return None;
    }
    let raw = data_lines.join("\n");

    let payload: WirePayload = match serde_json::from_str(&raw) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(error = %e, payload = raw.as_str(), "skipping undecodable frame");
            return None;
        }
    };

    Some(classify(payload))
}

fn classify(payload: WirePayload) -> ProtocolEvent {
    match payload.kind.as_str() {
        "progress" => match payload.status.as_deref() {
            Some("complete") => ProtocolEvent::ItemSettled {
                filename: payload.filename,
                percent: payload.percentage,
                report: payload.result,
            },
            Some("error") => ProtocolEvent::ItemFailed {
                filename: payload.filename,
                message: payload
                    .error
                    .unwrap_or_else(|| "analysis failed".to_string()),
            },
            Some(status) => match Stage::from_wire(status) {
                Some(stage) => ProtocolEvent::StageProgress {
                    filename: payload.filename,
                    stage: Some(stage),
                    percent: payload.percentage,
                    report: payload.result,
                },
                None => ProtocolEvent::Unrecognized,
            },
            // Status-less progress still carries the overall percentage.
            None => ProtocolEvent::StageProgress {
                filename: payload.filename,
                stage: None,
                percent: payload.percentage,
                report: payload.result,
            },
        },
        "complete" => ProtocolEvent::BatchSettled {
            reports: payload.results.unwrap_or_default(),
        },
        "error" => ProtocolEvent::BatchFailed {
            message: payload
                .error
                .unwrap_or_else(|| "analysis stream failed".to_string()),
        },
        _ => ProtocolEvent::Unrecognized,
    }
}
