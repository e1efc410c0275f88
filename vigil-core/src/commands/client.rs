//! HTTP client for the analysis engine command API

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Serialize;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::types::RunMode;

use super::ToolInfo;

/// Initial backoff between retries; doubles per attempt
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Request body for POST /api/run-analysis
#[derive(Debug, Serialize)]
struct RunAnalysisRequest<'a> {
    project_path: &'a str,
    mode: RunMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    selected_tools: Option<&'a [String]>,
    project_id: &'a str,
}

/// Request body for POST /api/stop-analysis and /api/stop-watch
#[derive(Debug, Serialize)]
struct StopRequest<'a> {
    project_path: &'a str,
    project_id: &'a str,
}

/// Outcome of a single attempt
enum Attempt<T> {
    Done(T),
    /// 5xx, timeout or connection failure
    Transient(Error),
    Fatal(Error),
}

/// HTTP client for the run command endpoints
#[derive(Debug, Clone)]
pub struct CommandClient {
    http_client: reqwest::Client,
    base_url: String,
    project_id: String,
    max_retries: usize,
    initial_backoff: Duration,
}

impl CommandClient {
    /// Create a client from the server configuration
    pub fn new(config: &ServerConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            max_retries: config.max_retries,
            initial_backoff: INITIAL_BACKOFF,
        })
    }

    /// Override the first retry delay
    pub fn with_backoff(mut self, initial: Duration) -> Self {
        self.initial_backoff = initial;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Ask the engine to start a run.
    pub async fn start_run(
        &self,
        project_path: &str,
        mode: RunMode,
        selected_tools: Option<&[String]>,
    ) -> Result<()> {
        let body = RunAnalysisRequest {
            project_path,
            mode,
            selected_tools,
            project_id: &self.project_id,
        };
        self.post_with_retry("/api/run-analysis", &body).await
    }

    /// Ask the engine to stop the active run.
    pub async fn stop_run(&self, project_path: &str) -> Result<()> {
        let body = StopRequest {
            project_path,
            project_id: &self.project_id,
        };
        self.post_with_retry("/api/stop-analysis", &body).await
    }

    /// Ask the engine to end the watch session.
    pub async fn stop_watch(&self, project_path: &str) -> Result<()> {
        let body = StopRequest {
            project_path,
            project_id: &self.project_id,
        };
        self.post_with_retry("/api/stop-watch", &body).await
    }

    /// Fetch the tool catalog.
    pub async fn fetch_tools(&self) -> Result<Vec<ToolInfo>> {
        let url = format!("{}/api/tools", self.base_url);
        self.with_retry("fetch_tools", || async {
            let response = match self.http_client.get(&url).send().await {
                Ok(response) => response,
                Err(e) => return request_failed(e),
            };
            let status = response.status();
            if !status.is_success() {
                return api_error(status, response).await;
            }
            match response.json::<Vec<ToolInfo>>().await {
                Ok(tools) => Attempt::Done(tools),
                Err(e) => Attempt::Fatal(Error::Command(format!("failed to parse tool catalog: {}", e))),
            }
        })
        .await
    }

    async fn post_with_retry<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        self.with_retry(path, || async {
            let response = match self.http_client.post(&url).json(body).send().await {
                Ok(response) => response,
                Err(e) => return request_failed(e),
            };
            let status = response.status();
            if status.is_success() {
                Attempt::Done(())
            } else {
                api_error(status, response).await
            }
        })
        .await
    }

    /// Run `attempt` until it succeeds, fails fatally, or retries run out.
    /// Transient failures back off exponentially.
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Attempt<T>>,
    {
        let mut last_error = None;
        let mut delay = self.initial_backoff;

        for n in 0..=self.max_retries {
            if n > 0 {
                tracing::debug!(
                    operation,
                    attempt = n + 1,
                    max_attempts = self.max_retries + 1,
                    ?delay,
                    "Retrying command"
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, MAX_BACKOFF);
            }

            match attempt().await {
                Attempt::Done(value) => return Ok(value),
                Attempt::Transient(e) => {
                    tracing::warn!(operation, error = %e, "Transient command failure");
                    last_error = Some(e);
                }
                Attempt::Fatal(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Command("max retries exceeded".to_string())))
    }
}

fn request_failed<T>(e: reqwest::Error) -> Attempt<T> {
    let error = Error::Command(format!("HTTP request failed: {}", e));
    if e.is_timeout() || e.is_connect() || e.is_request() {
        Attempt::Transient(error)
    } else {
        Attempt::Fatal(error)
    }
}

async fn api_error<T>(status: reqwest::StatusCode, response: reqwest::Response) -> Attempt<T> {
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown".to_string());
    let error = Error::Command(format!("API error ({}): {}", status, error_text));
    if status.is_server_error() {
        Attempt::Transient(error)
    } else {
        Attempt::Fatal(error)
    }
}
