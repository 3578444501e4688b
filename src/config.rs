use crate::errors::BatchError;
use reqwest::Url;
use std::time::Duration;

/// Server limit on resumes per analysis request.
pub const MAX_BATCH_SIZE: usize = 10;

/// Default ceiling on one streaming submission, end to end.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Client configuration for one screening server.
///
/// Construction validates the base URL once so every later call can join
/// endpoint paths infallibly.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    /// Streaming analysis endpoint, joined onto `base_url`.
    pub analyze_path: String,
    /// Path pinged by `screenflow check`.
    pub health_path: String,
    pub default_timeout: Duration,
    pub max_batch_size: usize,
}

impl ClientConfig {
    /// Create a config for the given server base URL.
    pub fn new(base_url: &str) -> Result<Self, BatchError> {
        let base_url = Url::parse(base_url).map_err(|e| BatchError::InvalidServerUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(BatchError::InvalidServerUrl {
                url: base_url.to_string(),
                reason: "expected an http or https URL".to_string(),
            });
        }
        Ok(Self {
            base_url,
            analyze_path: "/api/resumes/analyze-stream".to_string(),
            health_path: "/".to_string(),
            default_timeout: DEFAULT_TIMEOUT,
            max_batch_size: MAX_BATCH_SIZE,
        })
    }

    /// Override the default submission timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Override the streaming endpoint path.
    pub fn with_analyze_path(mut self, path: impl Into<String>) -> Self {
        self.analyze_path = path.into();
        self
    }

    /// Full URL of the streaming analysis endpoint.
    pub fn analyze_url(&self) -> Url {
        self.join(&self.analyze_path)
    }

    /// Full URL of the health endpoint.
    pub fn health_url(&self) -> Url {
        self.join(&self.health_path)
    }

    fn join(&self, path: &str) -> Url {
        // base_url was validated in new(); joining a known path cannot fail
        self.base_url
            .join(path.trim_start_matches('/'))
            .unwrap_or_else(|_| self.base_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_accepts_http_url() {
        let config = ClientConfig::new("http://localhost:8000").unwrap();
        assert_eq!(config.max_batch_size, MAX_BATCH_SIZE);
        assert_eq!(config.default_timeout, DEFAULT_TIMEOUT);
        assert_eq!(
            config.analyze_url().as_str(),
            "http://localhost:8000/api/resumes/analyze-stream"
        );
    }

    #[test]
    fn test_config_rejects_non_http_scheme() {
        let result = ClientConfig::new("ftp://example.com");
        assert!(matches!(
            result,
            Err(BatchError::InvalidServerUrl { .. })
        ));
    }

    #[test]
    fn test_config_rejects_garbage() {
        assert!(ClientConfig::new("not a url").is_err());
    }

    #[test]
    fn test_config_with_overrides() {
        let config = ClientConfig::new("https://api.example.com")
            .unwrap()
            .with_timeout(Duration::from_secs(60))
            .with_analyze_path("/v2/stream");
        assert_eq!(config.default_timeout, Duration::from_secs(60));
        assert_eq!(
            config.analyze_url().as_str(),
            "https://api.example.com/v2/stream"
        );
    }
}
