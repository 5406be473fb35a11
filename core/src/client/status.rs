//! Pull-side access to the monitoring source.

use std::fmt;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskError};
use crate::task::TaskId;

/// Basic-auth credentials for the monitoring source.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Decoded response from the status endpoint.
///
/// Only `state` is required; the monitoring service is free to attach more
/// fields and this decoder tolerates any it does not know about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Textual task state, case-insensitive on the wire.
    pub state: String,
    /// Literal-encoded result on success, error text on failure.
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub args: Option<String>,
    #[serde(default)]
    pub kwargs: Option<String>,
    #[serde(default)]
    pub traceback: Option<String>,
    #[serde(default)]
    pub runtime: Option<f64>,
}

/// Queryable per-task status view kept by the monitoring source.
///
/// Each call is stateless; session reuse inside an implementation is an
/// optimization, not a correctness requirement.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch the current status record for `task_id`.
    async fn task_info(&self, task_id: &TaskId) -> Result<TaskInfo>;

    /// Ask the backend to revoke `task_id`, optionally terminating a
    /// running worker process.
    async fn revoke(&self, task_id: &TaskId, terminate: bool) -> Result<()>;
}

/// `StatusSource` over the monitoring service's HTTP+JSON API.
///
/// The wire contract is `GET {base}/task/info/{id}` returning at least
/// `{"state": ..., "result": ...}`; any non-2xx response is a transport
/// fault carried back verbatim.
pub struct HttpStatusSource {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl HttpStatusSource {
    /// Create a source for the service at `base_url`. The base may carry a
    /// path prefix (for example `http://monitor:5555/api`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
        }
    }

    /// Attach basic-auth credentials to every request.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.http.request(method, url);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }
        request
    }

    async fn check(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TaskError::Transport {
                status: Some(status.as_u16()),
                message: body,
            });
        }
        Ok(body)
    }
}

impl fmt::Debug for HttpStatusSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpStatusSource")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .finish()
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn task_info(&self, task_id: &TaskId) -> Result<TaskInfo> {
        let response = self
            .request(Method::GET, &format!("task/info/{task_id}"))
            .send()
            .await?;
        let body = Self::check(response).await?;
        serde_json::from_str(&body)
            .map_err(|e| TaskError::Protocol(format!("malformed status response: {e}")))
    }

    async fn revoke(&self, task_id: &TaskId, terminate: bool) -> Result<()> {
        let response = self
            .request(Method::POST, &format!("task/revoke/{task_id}"))
            .json(&serde_json::json!({ "terminate": terminate }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_info_decodes_minimal_response() {
        let info: TaskInfo = serde_json::from_str(r#"{"state": "PENDING"}"#).unwrap();
        assert_eq!(info.state, "PENDING");
        assert!(info.result.is_none());
    }

    #[test]
    fn test_task_info_tolerates_extra_fields() {
        let body = r#"{
            "state": "SUCCESS",
            "result": "\"Finished\"",
            "name": "demo.short_task",
            "runtime": 5.2,
            "worker": "w1",
            "received": 1700000000.1
        }"#;
        let info: TaskInfo = serde_json::from_str(body).unwrap();
        assert_eq!(info.state, "SUCCESS");
        assert_eq!(info.result.as_deref(), Some("\"Finished\""));
        assert_eq!(info.runtime, Some(5.2));
    }

    #[test]
    fn test_base_url_trailing_slash_is_normalized() {
        let source = HttpStatusSource::new("http://monitor:5555/api/");
        assert_eq!(source.base_url, "http://monitor:5555/api");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials::new("monitor", "secret");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("monitor"));
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}
