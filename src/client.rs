use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode, Url};
use serde_json::{Value, json};
use std::cell::Cell;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const API_PREFIX: &str = "api/v1";
pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Time-series resources whose upstream paging is broken: `meta.next` is
/// erroneous and `total_count` is a lie, so the pager has to walk until an
/// empty page instead of trusting the envelope.
const ABERRANT_PAGER_RESOURCES: &[&str] = &["router_alerts", "activity_logs"];

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    Unauthorized(String),
    #[error("the ECM terms of service must be accepted before using the API")]
    TosRequired,
    #[error("{0}")]
    Remote(String),
}

/// Parsed ECM response envelope.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub data: Value,
    pub meta: Value,
}

#[derive(Debug)]
pub struct ApiClient {
    base_url: Url,
    http: Client,
    username: String,
    password: String,
    logged_in: Cell<bool>,
}

impl ApiClient {
    pub fn new(site: &str, username: &str, password: &str) -> Result<Self> {
        let base_url = Url::parse(site).context("parsing site URL")?;
        let http = Client::builder()
            .cookie_store(true)
            .user_agent(HeaderValue::from_static("ecmctl/0.1"))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            base_url,
            http,
            username: username.to_string(),
            password: password.to_string(),
            logged_in: Cell::new(false),
        })
    }

    pub fn get(&self, path: &str, query: &[(String, String)]) -> Result<ApiResponse> {
        self.request(Method::GET, path, query, None)
    }

    pub fn post(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.request(Method::POST, path, &[], Some(body))
    }

    pub fn put(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.request(Method::PUT, path, &[], Some(body))
    }

    pub fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.request(Method::DELETE, path, &[], None)
    }

    /// Lazy iterator over every record of a collection resource.
    pub fn get_pager(&self, resource: &str, query: &[(String, String)]) -> Pager<'_> {
        Pager::new(self, resource, query.to_vec())
    }

    fn api_url(&self, path: &str) -> Result<Url> {
        let cleaned = path.trim_matches('/');
        self.base_url
            .join(&format!("{API_PREFIX}/{cleaned}/"))
            .with_context(|| format!("joining path `{}` to site URL", path))
    }

    fn ensure_login(&self) -> Result<()> {
        if self.logged_in.get() {
            return Ok(());
        }
        let url = self.api_url("login")?;
        debug!(%url, username = %self.username, "logging in");
        let creds = json!({
            "username": self.username,
            "password": self.password,
        });
        let response = self
            .http
            .post(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .json(&creds)
            .send()
            .context("sending login request")?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Unauthorized("invalid login".into()).into());
        }
        response.error_for_status().context("login request")?;
        // Session cookies now live in the store.
        self.logged_in.set(true);
        Ok(())
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        self.ensure_login()?;
        let url = self.api_url(path)?;
        debug!(%method, %url, "api request");

        let build = || {
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header(ACCEPT, HeaderValue::from_static("application/json"))
                .header(USER_AGENT, HeaderValue::from_static("ecmctl/0.1"));
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }
            request
        };

        let mut response = build().send().context("sending request")?;
        if response.status() == StatusCode::UNAUTHORIZED {
            // Session expired mid-run; relogin once and retry.
            debug!(%url, "session rejected, attempting relogin");
            self.logged_in.set(false);
            self.ensure_login()?;
            response = build().send().context("sending request")?;
        }

        let status = response.status();
        let text = response.text().context("reading response body")?;
        let payload: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        debug!(status = status.as_u16(), bytes = text.len(), "api response");

        if !status.is_success() {
            return Err(envelope_error(&payload, status));
        }

        let (data, meta) = match payload {
            Value::Object(mut map) if map.contains_key("data") => {
                let data = map.remove("data").unwrap_or(Value::Null);
                let meta = map.remove("meta").unwrap_or(Value::Null);
                (data, meta)
            }
            other => (other, Value::Null),
        };

        Ok(ApiResponse {
            status: status.as_u16(),
            data,
            meta,
        })
    }
}

fn envelope_error(payload: &Value, status: StatusCode) -> anyhow::Error {
    let exception = payload
        .get("exception")
        .and_then(Value::as_str)
        .or_else(|| payload.get("error_code").and_then(Value::as_str));
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim();
    match exception {
        Some("precondition_failed") if message == "must_accept_tos" => ApiError::TosRequired.into(),
        Some(err @ ("login_failure" | "unauthorized")) => {
            ApiError::Unauthorized(err.to_string()).into()
        }
        Some(err) if !message.is_empty() => ApiError::Remote(format!("{err}: {message}")).into(),
        Some(err) => ApiError::Remote(err.to_string()).into(),
        None => ApiError::Remote(format!("HTTP {status}")).into(),
    }
}

/// Sequential limit/offset pager. Well-behaved resources terminate on the
/// envelope's `meta.next`; aberrant ones keep fetching until an empty page,
/// growing both `offset` and `limit` by each page's actual size.
pub struct Pager<'a> {
    client: &'a ApiClient,
    path: String,
    query: Vec<(String, String)>,
    page: VecDeque<Value>,
    offset: u64,
    limit: u64,
    aberrant: bool,
    done: bool,
}

impl<'a> Pager<'a> {
    fn new(client: &'a ApiClient, resource: &str, query: Vec<(String, String)>) -> Self {
        let root = resource.split('/').next().unwrap_or(resource);
        Self {
            client,
            path: resource.to_string(),
            query,
            page: VecDeque::new(),
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
            aberrant: ABERRANT_PAGER_RESOURCES.contains(&root),
            done: false,
        }
    }

    pub fn page_size(mut self, limit: u64) -> Self {
        self.limit = limit.max(1);
        self
    }

    fn fetch_page(&mut self) -> Result<()> {
        let mut query = self.query.clone();
        query.push(("limit".into(), self.limit.to_string()));
        query.push(("offset".into(), self.offset.to_string()));
        let response = self.client.get(&self.path, &query)?;

        let rows = match response.data {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            single => vec![single],
        };
        let count = rows.len() as u64;
        self.offset += count;

        if self.aberrant {
            self.limit += count;
            if count == 0 {
                self.done = true;
            }
        } else {
            let has_next = response.meta.get("next").is_some_and(|v| !v.is_null());
            if count == 0 || !has_next {
                self.done = true;
            }
        }
        self.page.extend(rows);
        Ok(())
    }
}

impl Iterator for Pager<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.page.is_empty() {
            if self.done {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.done = true;
                return Some(Err(err));
            }
        }
        self.page.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(&server.base_url(), "u@example.com", "secret").unwrap()
    }

    fn mock_login(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(POST)
                .path("/api/v1/login/")
                .json_body(json!({"username": "u@example.com", "password": "secret"}));
            then.status(200).json_body(json!({"data": {"ok": true}}));
        })
    }

    #[test]
    fn logs_in_before_first_request_and_unwraps_envelope() {
        let server = MockServer::start();
        let login = mock_login(&server);
        let routers = server.mock(|when, then| {
            when.method(GET).path("/api/v1/routers/5/");
            then.status(200)
                .json_body(json!({"data": {"id": "5", "name": "lobby"}}));
        });

        let api = client(&server);
        let response = api.get("routers/5", &[]).unwrap();

        login.assert();
        routers.assert();
        assert_eq!(response.status, 200);
        assert_eq!(response.data["name"], "lobby");
    }

    #[test]
    fn rejected_login_is_an_auth_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/v1/login/");
            then.status(401).json_body(json!({"message": "bad creds"}));
        });

        let api = client(&server);
        let err = api.get("routers", &[]).unwrap_err();
        assert!(err.to_string().contains("authentication failed"));
    }

    #[test]
    fn expired_session_triggers_one_relogin_retry() {
        let server = MockServer::start();
        let login = mock_login(&server);
        let expired = server.mock(|when, then| {
            when.method(GET).path("/api/v1/accounts/");
            then.status(401)
                .json_body(json!({"exception": "unauthorized"}));
        });

        let api = client(&server);
        let err = api.get("accounts", &[]).unwrap_err();

        // Initial login, failed request, relogin, failed retry.
        login.assert_hits(2);
        expired.assert_hits(2);
        assert!(err.to_string().contains("unauthorized"));
    }

    #[test]
    fn error_envelopes_map_to_typed_errors() {
        let server = MockServer::start();
        mock_login(&server);
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/routers/");
            then.status(412).json_body(
                json!({"exception": "precondition_failed", "message": "must_accept_tos"}),
            );
        });

        let api = client(&server);
        let err = api.get("routers", &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::TosRequired)
        ));
    }

    #[test]
    fn pager_walks_pages_until_meta_next_is_exhausted() {
        let server = MockServer::start();
        mock_login(&server);
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/routers/")
                .query_param("offset", "0");
            then.status(200).json_body(json!({
                "data": [{"id": "1"}, {"id": "2"}],
                "meta": {"next": "/api/v1/routers/?offset=2", "total_count": 3}
            }));
        });
        let second = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/routers/")
                .query_param("offset", "2");
            then.status(200).json_body(json!({
                "data": [{"id": "3"}],
                "meta": {"next": null, "total_count": 3}
            }));
        });

        let api = client(&server);
        let ids: Vec<String> = api
            .get_pager("routers", &[])
            .page_size(2)
            .map(|row| row.unwrap()["id"].as_str().unwrap().to_string())
            .collect();

        first.assert();
        second.assert();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[test]
    fn aberrant_pager_ignores_meta_and_stops_on_empty_page() {
        let server = MockServer::start();
        mock_login(&server);
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/activity_logs/")
                .query_param("limit", "2")
                .query_param("offset", "0");
            then.status(200).json_body(json!({
                "data": [{"id": "a"}, {"id": "b"}],
                // Lying meta, typical for these resources.
                "meta": {"next": null, "total_count": 1}
            }));
        });
        let second = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/activity_logs/")
                .query_param("limit", "4")
                .query_param("offset", "2");
            then.status(200).json_body(json!({"data": [], "meta": {}}));
        });

        let api = client(&server);
        let ids: Vec<String> = api
            .get_pager("activity_logs", &[])
            .page_size(2)
            .map(|row| row.unwrap()["id"].as_str().unwrap().to_string())
            .collect();

        first.assert();
        second.assert();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn pager_forwards_filter_query() {
        let server = MockServer::start();
        mock_login(&server);
        let filtered = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/routers/")
                .query_param("name__startswith", "lab");
            then.status(200)
                .json_body(json!({"data": [{"id": "9"}], "meta": {"next": null}}));
        });

        let api = client(&server);
        let rows: Vec<Value> = api
            .get_pager(
                "routers",
                &[("name__startswith".to_string(), "lab".to_string())],
            )
            .collect::<Result<_>>()
            .unwrap();

        filtered.assert();
        assert_eq!(rows.len(), 1);
    }
}
