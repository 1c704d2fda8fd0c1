//! HTTP probe: issue one request, classify the outcome, never raise

use newsteps_qa_common::types::Details;
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect, Method};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::HarnessResult;

/// Which statuses count as success for a probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expect {
    /// 200 or 201
    Functional,
    /// 302, 401 or 403; redirects are not followed
    AuthRequired,
    /// Anything below 500; validation answers are healthy
    NotServerError,
    /// An explicit status set
    Statuses(Vec<u16>),
}

impl Expect {
    pub fn accepts(&self, status: u16) -> bool {
        match self {
            Expect::Functional => matches!(status, 200 | 201),
            Expect::AuthRequired => matches!(status, 302 | 401 | 403),
            Expect::NotServerError => (100..500).contains(&status),
            Expect::Statuses(set) => set.contains(&status),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Expect::Functional => "200/201".to_string(),
            Expect::AuthRequired => "302/401/403".to_string(),
            Expect::NotServerError => "<500".to_string(),
            Expect::Statuses(set) => set
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join("/"),
        }
    }
}

/// A request to issue against the target
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub expect: Expect,
}

impl ProbeRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            expect: Expect::Functional,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get(path)
        }
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::PATCH,
            body: Some(body),
            ..Self::get(path)
        }
    }

    pub fn expect(mut self, expect: Expect) -> Self {
        self.expect = expect;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Outcome of one probe. `status` is 0 on transport failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeRecord {
    pub status: u16,
    pub success: bool,
    /// Parsed JSON when the response declares JSON and parses, raw text otherwise
    pub data: Value,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ProbeRecord {
    fn transport_failure(error: String, elapsed: Duration) -> Self {
        Self {
            status: 0,
            success: false,
            data: Value::Null,
            error: Some(error),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// Look up a top-level key of a JSON body
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.as_object().and_then(|o| o.get(key))
    }

    /// Details for a check record; bodies are not copied in
    pub fn details(&self) -> Details {
        let mut details = Details::new();
        details.insert("status".into(), Value::from(self.status));
        details.insert("elapsed_ms".into(), Value::from(self.elapsed_ms));
        if let Some(error) = &self.error {
            details.insert("error".into(), Value::String(error.clone()));
        } else if !self.success {
            details.insert(
                "error".into(),
                Value::String(format!("unexpected status {}", self.status)),
            );
        }
        details
    }
}

/// Decode a body: JSON when declared and well-formed, raw text otherwise
pub fn decode_body(content_type: Option<&str>, text: String) -> Value {
    let declares_json = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false);
    if declares_json {
        if let Ok(value) = serde_json::from_str::<Value>(&text) {
            return value;
        }
    }
    Value::String(text)
}

/// HTTP probe bound to one base URL. Each instance owns its cookie jar, so an
/// instance doubles as an API session once logged in.
#[derive(Clone)]
pub struct HttpProbe {
    base_url: String,
    /// Follows redirects, keeps cookies
    client: reqwest::Client,
    /// No redirects, no cookies; used for protection checks
    bare: reqwest::Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(base_url: &str, timeout: Duration) -> HarnessResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()?;
        let bare = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            bare,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str, expect: Expect) -> ProbeRecord {
        self.send(&ProbeRequest::get(path).expect(expect)).await
    }

    pub async fn post(&self, path: &str, body: Value, expect: Expect) -> ProbeRecord {
        self.send(&ProbeRequest::post(path, body).expect(expect)).await
    }

    pub async fn patch(&self, path: &str, body: Value, expect: Expect) -> ProbeRecord {
        self.send(&ProbeRequest::patch(path, body).expect(expect)).await
    }

    /// Issue the request and classify it. Never fails; transport errors become status 0.
    pub async fn send(&self, req: &ProbeRequest) -> ProbeRecord {
        let url = self.url(&req.path);
        let client = if req.expect == Expect::AuthRequired {
            &self.bare
        } else {
            &self.client
        };

        let mut builder = client.request(req.method.clone(), &url);
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let start = Instant::now();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let message = if e.is_timeout() {
                    format!("request timed out after {}s", self.timeout.as_secs())
                } else if e.is_connect() {
                    format!("connection failed: {}", e)
                } else {
                    e.to_string()
                };
                warn!("{} {} -> {}", req.method, url, message);
                return ProbeRecord::transport_failure(message, start.elapsed());
            }
        };

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!("{} {} -> body read failed: {}", req.method, url, e);
                return ProbeRecord::transport_failure(
                    format!("body read failed: {}", e),
                    start.elapsed(),
                );
            }
        };
        let elapsed = start.elapsed();

        let success = req.expect.accepts(status);
        debug!(
            "{} {} -> {} ({} ms, expected {})",
            req.method,
            url,
            status,
            elapsed.as_millis(),
            req.expect.describe()
        );

        ProbeRecord {
            status,
            success,
            data: decode_body(content_type.as_deref(), text),
            error: None,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// Fire `tasks` identical requests through a pool of `workers`; results are
    /// joined before returning.
    pub async fn fan_out(&self, req: ProbeRequest, tasks: usize, workers: usize) -> Vec<ProbeRecord> {
        let permits = Arc::new(Semaphore::new(workers.max(1)));
        let mut set = JoinSet::new();

        for _ in 0..tasks {
            let probe = self.clone();
            let req = req.clone();
            let permits = Arc::clone(&permits);
            set.spawn(async move {
                let _permit = permits.acquire_owned().await;
                probe.send(&req).await
            });
        }

        let mut records = Vec::with_capacity(tasks);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(record) => records.push(record),
                Err(e) => records.push(ProbeRecord::transport_failure(
                    format!("probe task failed: {}", e),
                    Duration::ZERO,
                )),
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(Expect::Functional, 200, true)]
    #[test_case(Expect::Functional, 201, true)]
    #[test_case(Expect::Functional, 204, false)]
    #[test_case(Expect::Functional, 302, false ; "redirect is not functional")]
    #[test_case(Expect::AuthRequired, 302, true ; "redirect to login")]
    #[test_case(Expect::AuthRequired, 401, true)]
    #[test_case(Expect::AuthRequired, 403, true)]
    #[test_case(Expect::AuthRequired, 200, false ; "open admin surface")]
    #[test_case(Expect::NotServerError, 422, true)]
    #[test_case(Expect::NotServerError, 500, false)]
    #[test_case(Expect::NotServerError, 0, false ; "transport failure")]
    #[test_case(Expect::Statuses(vec![200, 401, 405]), 405, true)]
    #[test_case(Expect::Statuses(vec![200, 401, 405]), 403, false)]
    fn test_expectations(expect: Expect, status: u16, accepted: bool) {
        assert_eq!(expect.accepts(status), accepted);
    }

    #[test]
    fn test_statuses_describe() {
        assert_eq!(Expect::Statuses(vec![200, 401, 405]).describe(), "200/401/405");
    }

    #[test]
    fn test_decode_json_body() {
        let value = decode_body(Some("application/json; charset=utf-8"), r#"{"shoes":[]}"#.into());
        assert_eq!(value, json!({"shoes": []}));
    }

    #[test]
    fn test_decode_mislabelled_json_is_raw_text() {
        let value = decode_body(Some("application/json"), "<html>oops</html>".into());
        assert_eq!(value, Value::String("<html>oops</html>".into()));

        let value = decode_body(Some("text/html"), r#"{"ok":true}"#.into());
        assert_eq!(value, Value::String(r#"{"ok":true}"#.into()));
    }

    #[test]
    fn test_failed_record_details_carry_error() {
        let record = ProbeRecord {
            status: 503,
            success: false,
            data: Value::Null,
            error: None,
            elapsed_ms: 12,
        };
        let details = record.details();
        assert_eq!(details["status"], 503);
        assert_eq!(details["error"], "unexpected status 503");

        let down = ProbeRecord::transport_failure("connection failed".into(), Duration::ZERO);
        assert_eq!(down.status, 0);
        assert!(!down.success);
        assert_eq!(down.details()["error"], "connection failed");
    }

    #[tokio::test]
    async fn test_unreachable_target_is_recorded_not_raised() {
        // Port 9 (discard) is closed on CI hosts; the probe must still return a record.
        let probe = HttpProbe::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let record = probe.get("/api/health", Expect::Functional).await;
        assert_eq!(record.status, 0);
        assert!(!record.success);
        assert!(record.error.is_some());
    }
}
