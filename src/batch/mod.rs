//! Batch coordination: the single public entry point for submitting a
//! batch of resumes and reconciling the server's progress stream.
//!
//! One `analyze_batch` call owns one [`session::BatchSession`], one
//! [`FrameDecoder`](crate::stream::FrameDecoder), and one transport
//! stream; nothing is shared across calls. All parsing and state
//! mutation happens synchronously between awaits, on the single logical
//! reader, so update callbacks fire strictly in event order.

pub mod session;

use crate::config::ClientConfig;
use crate::errors::BatchError;
use crate::stream::{parse_frame, FrameDecoder};
use crate::transport::{HttpTransport, ProgressTransport};
use futures_util::StreamExt;
use session::{AbortReason, BatchSession, BatchSnapshot, SessionState};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

pub use session::{Diagnostics, ItemOutcome, ItemSnapshot};

/// Default screening threshold: minimum acceptable score.
pub const DEFAULT_MINIMUM_SCORE: f64 = 70.0;
/// Default screening threshold: tolerated missing skills.
pub const DEFAULT_MAX_MISSING_SKILLS: u32 = 3;

/// One resume file in a batch.
#[derive(Debug, Clone)]
pub struct ResumeUpload {
    /// Client-assigned, stable for the lifetime of the batch.
    pub id: Uuid,
    /// Correlation key the server echoes back on every event.
    pub filename: String,
    pub content: Vec<u8>,
}

impl ResumeUpload {
    pub fn from_bytes(filename: String, content: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename,
            content,
        }
    }

    /// Read a resume from disk, using the file name as correlation key.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let content = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(filename, content))
    }
}

/// Everything the server needs to score one batch.
///
/// Precondition: filenames must be unique within one batch — they are
/// the correlation key, and duplicate keys make event correlation
/// ambiguous. The client does not detect duplicates.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub job_description: String,
    pub minimum_score: f64,
    pub max_missing_skills: u32,
    pub resumes: Vec<ResumeUpload>,
}

impl BatchRequest {
    pub fn new(job_description: impl Into<String>) -> Self {
        Self {
            job_description: job_description.into(),
            minimum_score: DEFAULT_MINIMUM_SCORE,
            max_missing_skills: DEFAULT_MAX_MISSING_SKILLS,
            resumes: Vec::new(),
        }
    }

    pub fn with_resume(mut self, resume: ResumeUpload) -> Self {
        self.resumes.push(resume);
        self
    }
}

/// Per-submission knobs.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Overrides the config default (300 s) when set.
    pub timeout: Option<Duration>,
    /// One token governs the whole read; firing it twice is the same as
    /// firing it once.
    pub cancel: CancellationToken,
}

impl SubmitOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Client for the streaming resume-analysis endpoint.
///
/// Cheap to clone; concurrent `analyze_batch` calls get fully
/// independent sessions.
#[derive(Clone)]
pub struct BatchClient {
    config: ClientConfig,
    transport: Arc<dyn ProgressTransport>,
}

impl BatchClient {
    pub fn new(config: ClientConfig) -> Result<Self, BatchError> {
        let transport = Arc::new(HttpTransport::new(config.clone())?);
        Ok(Self { config, transport })
    }

    /// Swap the wire for a scripted transport. Used by tests; callers
    /// embedding the client behind their own transport can use it too.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn ProgressTransport>) -> Self {
        Self { config, transport }
    }

    /// Submit a batch and drive it to a fully-terminal result.
    ///
    /// `on_update` fires synchronously, in event order: once right after
    /// submission (everything queued), once per state-changing event,
    /// and once when the session closes — the last snapshot always shows
    /// every item terminal, whatever the outcome.
    ///
    /// On success the list has exactly one entry per submitted file, in
    /// submission order; items the server never settled carry a
    /// synthesized failure. Timeout, cancellation, transport faults, and
    /// a server batch error return the matching [`BatchError`] instead,
    /// after forcing all pending items terminal.
    pub async fn analyze_batch<F>(
        &self,
        request: &BatchRequest,
        options: SubmitOptions,
        mut on_update: F,
    ) -> Result<Vec<ItemOutcome>, BatchError>
    where
        F: FnMut(&BatchSnapshot),
    {
        self.validate(request)?;

        let timeout = options.timeout.unwrap_or(self.config.default_timeout);
        let deadline = tokio::time::Instant::now() + timeout;
        let cancel = options.cancel;

        let mut session = BatchSession::new(&request.resumes);
        on_update(&session.snapshot());

        // The connection await is governed by the same deadline and
        // token as the read loop.
        let open = self.transport.open(request);
        tokio::pin!(open);
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(settle_abort(
                    &mut session,
                    AbortReason::Cancelled,
                    BatchError::Cancelled,
                    &mut on_update,
                ));
            }
            _ = tokio::time::sleep_until(deadline) => {
                return Err(settle_abort(
                    &mut session,
                    AbortReason::TimedOut(timeout),
                    BatchError::TimedOut { after: timeout },
                    &mut on_update,
                ));
            }
            opened = &mut open => match opened {
                Ok(stream) => stream,
                Err(err) => {
                    return Err(settle_abort(
                        &mut session,
                        AbortReason::Transport(err.to_string()),
                        err,
                        &mut on_update,
                    ));
                }
            },
        };

        let mut decoder = FrameDecoder::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(settle_abort(
                        &mut session,
                        AbortReason::Cancelled,
                        BatchError::Cancelled,
                        &mut on_update,
                    ));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(settle_abort(
                        &mut session,
                        AbortReason::TimedOut(timeout),
                        BatchError::TimedOut { after: timeout },
                        &mut on_update,
                    ));
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        for frame in decoder.push(&bytes) {
                            match parse_frame(&frame) {
                                Some(event) => {
                                    if session.apply(event) {
                                        on_update(&session.snapshot());
                                    }
                                }
                                None => session.note_malformed_frame(),
                            }
                        }
                        if !session.state().is_open() {
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        let reason = AbortReason::Transport(err.to_string());
                        return Err(settle_abort(&mut session, reason, err, &mut on_update));
                    }
                    None => {
                        decoder.finish();
                        if session.finish_stream() {
                            on_update(&session.snapshot());
                        }
                        break;
                    }
                },
            }
        }

        debug!(
            frames = decoder.frames_emitted(),
            malformed = session.diagnostics.malformed_frames,
            unknown = session.diagnostics.unknown_filenames,
            state = ?session.state(),
            "analysis stream settled"
        );

        if session.state() == SessionState::Faulted {
            let message = session
                .fault()
                .unwrap_or("analysis stream failed")
                .to_string();
            return Err(BatchError::Server { message });
        }
        Ok(session.into_outcomes())
    }

    fn validate(&self, request: &BatchRequest) -> Result<(), BatchError> {
        if request.resumes.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        if request.resumes.len() > self.config.max_batch_size {
            return Err(BatchError::BatchTooLarge {
                count: request.resumes.len(),
                limit: self.config.max_batch_size,
            });
        }
        Ok(())
    }
}

/// Force the session terminal, emit the closing snapshot, hand back the
/// batch error. Keeps the item-by-item view fully terminal on every
/// rejection path.
fn settle_abort<F>(
    session: &mut BatchSession,
    reason: AbortReason,
    err: BatchError,
    on_update: &mut F,
) -> BatchError
where
    F: FnMut(&BatchSnapshot),
{
    if session.abort(reason) {
        on_update(&session.snapshot());
    }
    err
}
