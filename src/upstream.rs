//! Client for the chat-platform API.
//!
//! Every call is a single attempt: failures are classified into
//! [`UpstreamError`] and handed back to the caller, which decides whether the
//! request can still produce a partial answer.

use std::time::Duration;

use reqwest::{Client, Method, header};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    config::AppConfig,
    parse::{parse_count, parse_users},
    time_window::DayWindow,
};

/// Upper bound on `/chats/list` pages fetched for one request.
pub const MAX_PAGES: u32 = 200;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("{0}")]
    Decode(String),
    #[error("{0}")]
    Shape(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChatStatus {
    Automatic = 0,
    Waiting = 1,
    Manual = 2,
    Finished = 3,
}

impl ChatStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountRequest {
    pub status: u8,
    pub type_chat: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_filters: Option<DateFilters>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateFilters {
    pub by_start_date: DayWindow,
}

impl CountRequest {
    /// Automatic chats are not sector-scoped upstream, so only they go out without `sectorId`.
    pub fn new(config: &AppConfig, status: ChatStatus, window: Option<DayWindow>) -> Self {
        Self {
            status: status.code(),
            type_chat: config.type_chat,
            sector_id: (status != ChatStatus::Automatic).then(|| config.sector.id.clone()),
            date_filters: window.map(|by_start_date| DateFilters { by_start_date }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRequest<'a> {
    page: u32,
    status: u8,
    type_chat: u8,
    sector_id: &'a str,
}

#[derive(Debug, Default)]
pub struct ChatPages {
    pub chats: Vec<Value>,
    pub pages: u32,
    /// Set when [`MAX_PAGES`] was reached while the upstream still reported more.
    pub truncated: bool,
}

pub struct UpstreamClient<'a> {
    http: Client,
    config: &'a AppConfig,
}

impl<'a> UpstreamClient<'a> {
    pub fn new(config: &'a AppConfig) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .user_agent(concat!("dashboard-156/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| UpstreamError::Connection(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { http, config })
    }

    pub async fn call<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        timeout: Duration,
    ) -> Result<String, UpstreamError>
    where
        B: Serialize + ?Sized,
    {
        let url = self
            .config
            .endpoint_url(path)
            .map_err(|err| UpstreamError::Connection(format!("{err:#}")))?;

        let mut request = self
            .http
            .request(method.clone(), url)
            .header("access-token", &self.config.channel.token)
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json")
            .timeout(timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let result = send(request).await;
        match &result {
            Ok(_) => debug!(%method, path, "upstream call succeeded"),
            Err(err) => warn!(%method, path, error = %err, "upstream call failed"),
        }
        result
    }

    pub async fn fetch_users(&self) -> Result<Vec<Value>, UpstreamError> {
        let body = self
            .call::<()>(Method::GET, "/users", None, self.config.timeouts.count)
            .await?;
        parse_users(&body)
    }

    /// `window` restricts the count to chats started inside it and switches to the
    /// longer timeout those queries need.
    pub async fn count_chats(
        &self,
        status: ChatStatus,
        window: Option<DayWindow>,
    ) -> Result<i64, UpstreamError> {
        let timeout = if window.is_some() {
            self.config.timeouts.finished
        } else {
            self.config.timeouts.count
        };
        let payload = CountRequest::new(self.config, status, window);
        let body = self
            .call(Method::POST, "/chats/count", Some(&payload), timeout)
            .await?;
        parse_count(&body)
    }

    /// Collects every sector-scoped manual chat, following `hasNext` page by page.
    /// Any failure discards what was collected so far.
    pub async fn list_manual_chats(&self) -> Result<ChatPages, UpstreamError> {
        let mut collected = ChatPages::default();

        for page in 1..=MAX_PAGES {
            let payload = ListRequest {
                page,
                status: ChatStatus::Manual.code(),
                type_chat: self.config.type_chat,
                sector_id: &self.config.sector.id,
            };
            let body = self
                .call(Method::POST, "/chats/list", Some(&payload), self.config.timeouts.list)
                .await?;
            let (chats, has_next) = parse_page(&body, page)?;

            collected.chats.extend(chats);
            collected.pages = page;
            if !has_next {
                return Ok(collected);
            }
        }

        warn!(max_pages = MAX_PAGES, "chat list still reports hasNext, stopping");
        collected.truncated = true;
        Ok(collected)
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<String, UpstreamError> {
    let response = request
        .send()
        .await
        .map_err(|err| UpstreamError::Connection(err.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| UpstreamError::Connection(format!("failed to read body: {err}")))?;

    if !status.is_success() {
        return Err(UpstreamError::Status {
            code: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

fn parse_page(body: &str, page: u32) -> Result<(Vec<Value>, bool), UpstreamError> {
    let data: Value = serde_json::from_str(body).map_err(|err| {
        UpstreamError::Decode(format!("failed to decode chat list page {page}: {err}"))
    })?;

    let mut object = match data {
        Value::Object(object) => object,
        other => {
            return Err(UpstreamError::Shape(format!(
                "unexpected structure in chat list page {page}: {other}"
            )));
        }
    };

    let has_next = object
        .get("hasNext")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    match object.remove("chats") {
        Some(Value::Array(chats)) => Ok((chats, has_next)),
        _ => Err(UpstreamError::Shape(format!(
            "chat list page {page} has no chats array"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn window() -> DayWindow {
        DayWindow {
            start: "2024-05-10T03:00:00.000Z".to_string(),
            finish: "2024-05-11T02:59:59.999Z".to_string(),
        }
    }

    #[test]
    fn automatic_count_omits_sector() {
        let config = AppConfig::for_tests("http://localhost/");
        let payload = serde_json::to_value(CountRequest::new(&config, ChatStatus::Automatic, None))
            .unwrap();
        assert_eq!(payload, json!({"status": 0, "typeChat": 2}));
    }

    #[test]
    fn other_counts_carry_sector() {
        let config = AppConfig::for_tests("http://localhost/");
        for status in [ChatStatus::Waiting, ChatStatus::Manual, ChatStatus::Finished] {
            let payload = serde_json::to_value(CountRequest::new(&config, status, None)).unwrap();
            assert_eq!(payload["sectorId"], "S1");
            assert_eq!(payload["status"], status.code());
        }
    }

    #[test]
    fn date_filters_serialize_by_start_date() {
        let config = AppConfig::for_tests("http://localhost/");
        let payload = serde_json::to_value(CountRequest::new(
            &config,
            ChatStatus::Finished,
            Some(window()),
        ))
        .unwrap();
        assert_eq!(
            payload["dateFilters"],
            json!({"byStartDate": {
                "start": "2024-05-10T03:00:00.000Z",
                "finish": "2024-05-11T02:59:59.999Z"
            }})
        );
    }

    #[tokio::test]
    async fn sends_token_and_json_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .and(header("access-token", "test-token"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "u1"}])))
            .expect(1)
            .mount(&server)
            .await;

        let config = AppConfig::for_tests(&server.uri());
        let client = UpstreamClient::new(&config).unwrap();
        let users = client.fetch_users().await.unwrap();
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn non_success_status_is_reported_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chats/count"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let config = AppConfig::for_tests(&server.uri());
        let client = UpstreamClient::new(&config).unwrap();
        let err = client
            .count_chats(ChatStatus::Waiting, None)
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Status { code: 503, .. }));
        assert_eq!(err.to_string(), "HTTP 503: maintenance");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_connection_error() {
        let config = AppConfig::for_tests("http://127.0.0.1:9/");
        let client = UpstreamClient::new(&config).unwrap();
        let err = client.fetch_users().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Connection(_)));
        assert!(err.to_string().starts_with("connection error: "));
    }

    #[tokio::test]
    async fn automatic_count_request_body_has_no_sector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chats/count"))
            .and(body_json(json!({"status": 0, "typeChat": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_string("17"))
            .expect(1)
            .mount(&server)
            .await;

        let config = AppConfig::for_tests(&server.uri());
        let client = UpstreamClient::new(&config).unwrap();
        let count = client
            .count_chats(ChatStatus::Automatic, None)
            .await
            .unwrap();
        assert_eq!(count, 17);
    }

    #[tokio::test]
    async fn pagination_follows_has_next() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chats/list"))
            .and(body_partial_json(json!({"page": 1, "status": 2, "sectorId": "S1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chats": [{"id": "c1"}, {"id": "c2"}],
                "hasNext": true
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chats/list"))
            .and(body_partial_json(json!({"page": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chats": [{"id": "c3"}]
            })))
            .mount(&server)
            .await;

        let config = AppConfig::for_tests(&server.uri());
        let client = UpstreamClient::new(&config).unwrap();
        let pages = client.list_manual_chats().await.unwrap();
        assert_eq!(pages.pages, 2);
        assert!(!pages.truncated);
        let ids: Vec<_> = pages.chats.iter().map(|c| c["id"].clone()).collect();
        assert_eq!(ids, vec![json!("c1"), json!("c2"), json!("c3")]);
    }

    #[tokio::test]
    async fn pagination_stops_at_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chats/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chats": [{"id": "c"}],
                "hasNext": true
            })))
            .expect(u64::from(MAX_PAGES))
            .mount(&server)
            .await;

        let config = AppConfig::for_tests(&server.uri());
        let client = UpstreamClient::new(&config).unwrap();
        let pages = client.list_manual_chats().await.unwrap();
        assert!(pages.truncated);
        assert_eq!(pages.pages, MAX_PAGES);
        assert_eq!(pages.chats.len(), MAX_PAGES as usize);
    }

    #[tokio::test]
    async fn pagination_error_discards_partial_pages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chats/list"))
            .and(body_partial_json(json!({"page": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chats": [{"id": "c1"}],
                "hasNext": true
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chats/list"))
            .and(body_partial_json(json!({"page": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        let config = AppConfig::for_tests(&server.uri());
        let client = UpstreamClient::new(&config).unwrap();
        let err = client.list_manual_chats().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Shape(_)));
        assert!(err.to_string().contains("page 2"));
    }
}
