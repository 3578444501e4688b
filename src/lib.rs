//! Client library for a streaming resume-analysis service.
//!
//! Submit a batch of resume files plus a job description, then consume
//! the server's progress stream: blank-line-delimited frames whose
//! `data:` lines carry JSON events. The client reconciles those events
//! into per-file state machines and hands the caller ordered snapshots
//! while the batch runs, then one terminal outcome per file.
//!
//! Entry point is [`BatchClient::analyze_batch`]; everything else
//! supports it.

pub mod batch;
pub mod config;
pub mod errors;
pub mod item;
pub mod stream;
pub mod transport;
pub mod ui;

pub use batch::session::{BatchSnapshot, Diagnostics, ItemOutcome, ItemSnapshot, SessionState};
pub use batch::{BatchClient, BatchRequest, ResumeUpload, SubmitOptions};
pub use config::ClientConfig;
pub use errors::BatchError;
pub use item::{AnalysisReport, EmailType, ItemStatus};
