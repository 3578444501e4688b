//! Network resource lifecycle for one batch submission.
//!
//! [`ProgressTransport`] is the seam between the coordinator and the
//! wire: production code uses [`HttpTransport`] (reqwest, multipart
//! upload, streaming response), tests drive the coordinator with
//! scripted byte streams and never open a socket.

use crate::batch::BatchRequest;
use crate::config::ClientConfig;
use crate::errors::BatchError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use futures_util::TryStreamExt;
use std::pin::Pin;
use tracing::debug;

/// Chunked response body, exactly as it arrives off the wire.
///
/// Dropping the stream aborts the underlying transfer, which is how
/// timeout and cancellation both tear the connection down.
pub type EventByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BatchError>> + Send>>;

#[async_trait]
pub trait ProgressTransport: Send + Sync {
    /// Open the streaming request for one batch and hand back the
    /// response body. Fails fast on a non-success status.
    async fn open(&self, request: &BatchRequest) -> Result<EventByteStream, BatchError>;
}

/// Production transport: multipart POST to the analysis endpoint.
pub struct HttpTransport {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, BatchError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("screenflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(BatchError::from_transport)?;
        Ok(Self { http, config })
    }

    /// Lightweight reachability probe against the health endpoint.
    pub async fn ping(&self) -> Result<(), BatchError> {
        let response = self
            .http
            .get(self.config.health_url())
            .send()
            .await
            .map_err(BatchError::from_transport)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(BatchError::Http {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }

    fn build_form(request: &BatchRequest) -> Result<reqwest::multipart::Form, BatchError> {
        let mut form = reqwest::multipart::Form::new()
            .text("job_description", request.job_description.clone())
            .text("minimum_score", request.minimum_score.to_string())
            .text("max_missing_skills", request.max_missing_skills.to_string());
        for resume in &request.resumes {
            let mime = mime_guess::from_path(&resume.filename).first_or_octet_stream();
            let part = reqwest::multipart::Part::bytes(resume.content.clone())
                .file_name(resume.filename.clone())
                .mime_str(mime.as_ref())
                .map_err(BatchError::from_transport)?;
            form = form.part("resumes", part);
        }
        Ok(form)
    }
}

#[async_trait]
impl ProgressTransport for HttpTransport {
    async fn open(&self, request: &BatchRequest) -> Result<EventByteStream, BatchError> {
        let url = self.config.analyze_url();
        debug!(%url, resumes = request.resumes.len(), "opening analysis stream");

        let response = self
            .http
            .post(url)
            .multipart(Self::build_form(request)?)
            .send()
            .await
            .map_err(BatchError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BatchError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::pin(
            response.bytes_stream().map_err(BatchError::from_transport),
        ))
    }
}
