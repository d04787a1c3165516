use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error};

use super::{ToolError, ToolOutput};

/// JSON-over-HTTP client for one prediction service
#[derive(Clone)]
pub struct ServiceClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl ServiceClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `body` and decode the service's envelope
    pub async fn post<B: Serialize + ?Sized>(&self, tool: &str, body: &B) -> Result<ToolOutput, ToolError> {
        debug!(tool = %tool, url = %self.url, "Calling prediction service");

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout {
                        tool: tool.to_string(),
                        secs: self.timeout.as_secs(),
                    }
                } else {
                    ToolError::Request {
                        tool: tool.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(tool = %tool, status = %status, "Prediction service returned an error");
            return Err(ToolError::Status {
                tool: tool.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await.map_err(|e| ToolError::Request {
            tool: tool.to_string(),
            message: e.to_string(),
        })?;

        serde_json::from_str::<ToolOutput>(&text).map_err(|e| ToolError::Output {
            tool: tool.to_string(),
            message: format!("{} (body: {})", e, truncate(&text, 200)),
        })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
