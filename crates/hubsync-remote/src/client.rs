//! reqwest-backed [`HubApi`] implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use hubsync_shared::constants::DEFAULT_HUB_BASE_URL;

use crate::api::{ChatsQuery, HubApi, MessagesQuery, SendRequest};
use crate::error::RemoteError;
use crate::retry::RetryPolicy;
use crate::wire::{ChatsPage, MessagesPage, RawChat, SendResult};

#[derive(Debug, Clone)]
pub struct HubClientConfig {
    /// Base URL including the API prefix, e.g. `http://localhost:23373/v1`.
    pub base_url: String,
    /// Bearer token issued by the hub.
    pub token: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for HubClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_HUB_BASE_URL.to_string(),
            token: String::new(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone)]
pub struct HubClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    retry: RetryPolicy,
}

impl HubClient {
    /// Build a client. Missing credentials are a configuration error and
    /// surface here, before any request is made.
    pub fn new(config: HubClientConfig) -> Result<Self, RemoteError> {
        if config.token.trim().is_empty() {
            return Err(RemoteError::Config("hub access token is not set".into()));
        }

        let base_url = Url::parse(config.base_url.trim())
            .map_err(|e| RemoteError::Config(format!("invalid hub base URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Config(format!(
                "hub base URL cannot carry paths: {base_url}"
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RemoteError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            token: config.token,
            retry: config.retry,
        })
    }

    /// Join path segments onto the base URL, percent-encoding each one
    /// (chat ids routinely contain `!`, `:` and `#`).
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Config("hub base URL cannot carry paths".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send_once<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(RemoteError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status.as_u16(), body, retry_after));
        }

        let body = response.text().await.map_err(RemoteError::from_transport)?;
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        debug!(operation, url = %url, ?query, "hub GET");
        self.retry
            .run(operation, || {
                let request = self.http.get(url.clone()).query(query);
                self.send_once(request)
            })
            .await
    }

    /// POSTs are not retried: a send that timed out may still have been
    /// delivered, and the sync pass reconciles it either way.
    async fn post_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: Url,
        body: &Value,
    ) -> Result<T, RemoteError> {
        debug!(operation, url = %url, "hub POST");
        self.send_once(self.http.post(url).json(body)).await
    }
}

fn page_params(
    cursor: Option<&String>,
    direction: Option<hubsync_shared::SyncDirection>,
    limit: Option<u32>,
) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(cursor) = cursor {
        params.push(("cursor", cursor.clone()));
    }
    if let Some(direction) = direction {
        params.push(("direction", direction.as_str().to_string()));
    }
    if let Some(limit) = limit {
        params.push(("limit", limit.to_string()));
    }
    params
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl HubApi for HubClient {
    async fn fetch_chats_page(&self, query: &ChatsQuery) -> Result<ChatsPage, RemoteError> {
        let url = self.endpoint(&["chats"])?;
        let params = page_params(query.cursor.as_ref(), query.direction, query.limit);
        self.get_json("fetch_chats_page", url, &params).await
    }

    async fn fetch_messages_page(
        &self,
        chat_id: &str,
        query: &MessagesQuery,
    ) -> Result<MessagesPage, RemoteError> {
        let url = self.endpoint(&["chats", chat_id, "messages"])?;
        let params = page_params(query.cursor.as_ref(), query.direction, query.limit);
        self.get_json("fetch_messages_page", url, &params).await
    }

    async fn fetch_chat(&self, chat_id: &str) -> Result<RawChat, RemoteError> {
        let url = self.endpoint(&["chats", chat_id])?;
        self.get_json("fetch_chat", url, &[]).await
    }

    async fn send_message(
        &self,
        chat_id: &str,
        request: &SendRequest,
    ) -> Result<SendResult, RemoteError> {
        let url = self.endpoint(&["chats", chat_id, "messages"])?;
        let body = serde_json::to_value(request).map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.post_json("send_message", url, &body).await
    }

    async fn focus_chat(&self, chat_id: &str, draft_text: Option<&str>) -> Result<(), RemoteError> {
        let url = self.endpoint(&["focus"])?;
        let mut body = serde_json::json!({ "chatID": chat_id });
        if let Some(draft) = draft_text {
            body["draftText"] = Value::String(draft.to_string());
        }
        let _: Value = self.post_json("focus_chat", url, &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use hubsync_shared::SyncDirection;
    use serde_json::json;

    use super::*;

    async fn spawn_hub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn client(base_url: String) -> HubClient {
        HubClient::new(HubClientConfig {
            base_url,
            token: "secret".into(),
            timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
        })
        .unwrap()
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let err = HubClient::new(HubClientConfig::default()).err().unwrap();
        assert!(matches!(err, RemoteError::Config(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn endpoint_encodes_chat_ids() {
        let client = client("http://localhost:23373/v1/".into());
        let url = client
            .endpoint(&["chats", "!room#1:hub", "messages"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:23373/v1/chats/!room%231:hub/messages"
        );
    }

    #[tokio::test]
    async fn fetches_chat_page_with_cursor_and_auth() {
        async fn chats(
            headers: HeaderMap,
            Query(params): Query<HashMap<String, String>>,
        ) -> Result<Json<Value>, StatusCode> {
            if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer secret") {
                return Err(StatusCode::UNAUTHORIZED);
            }
            Ok(Json(json!({
                "items": [{ "id": "!a", "title": "A" }],
                "newestCursor": format!("after-{}", params.get("cursor").cloned().unwrap_or_default()),
                "oldestCursor": params.get("direction").cloned(),
                "hasMore": false
            })))
        }

        let base = spawn_hub(Router::new().route("/v1/chats", get(chats))).await;
        let page = client(base)
            .fetch_chats_page(&ChatsQuery {
                cursor: Some("c1".into()),
                direction: Some(SyncDirection::After),
                limit: None,
            })
            .await
            .unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.newest_cursor.as_deref(), Some("after-c1"));
        assert_eq!(page.oldest_cursor.as_deref(), Some("after"));
    }

    #[tokio::test]
    async fn retries_gateway_errors_then_succeeds() {
        async fn messages(
            State(hits): State<Arc<AtomicUsize>>,
            Path(chat_id): Path<String>,
        ) -> Result<Json<Value>, (StatusCode, String)> {
            if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err((StatusCode::SERVICE_UNAVAILABLE, "tunnel offline".into()));
            }
            Ok(Json(json!({
                "items": [{ "id": "$1", "chatID": chat_id, "sortKey": 5, "text": "hi" }],
                "hasMore": true
            })))
        }

        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/v1/chats/:id/messages", get(messages))
            .with_state(hits.clone());
        let base = spawn_hub(router).await;

        let page = client(base)
            .fetch_messages_page("!a:hub", &MessagesQuery::default())
            .await
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(page.has_more);
        assert_eq!(page.items[0].chat_id.as_deref(), Some("!a:hub"));
        assert_eq!(page.items[0].sort_key.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn auth_failures_are_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/v1/chats",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::UNAUTHORIZED
                }),
            )
            .with_state(hits.clone());
        let base = spawn_hub(router).await;

        let err = client(base)
            .fetch_chats_page(&ChatsQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Auth { status: 401 }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_hub_is_classified_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(format!("http://{addr}/v1"))
            .fetch_chats_page(&ChatsQuery::default())
            .await
            .unwrap_err();
        assert!(err.is_unavailable(), "got {err:?}");
    }

    #[tokio::test]
    async fn send_and_focus_post_json() {
        async fn send(Path(chat_id): Path<String>, Json(body): Json<Value>) -> Json<Value> {
            assert_eq!(body["text"], "hello");
            assert_eq!(body["replyToMessageID"], "$9");
            Json(json!({ "chatID": chat_id, "pendingMessageID": "$pending" }))
        }
        async fn focus(Json(body): Json<Value>) -> StatusCode {
            assert_eq!(body["chatID"], "!a");
            assert_eq!(body["draftText"], "draft");
            StatusCode::NO_CONTENT
        }

        let router = Router::new()
            .route("/v1/chats/:id/messages", post(send))
            .route("/v1/focus", post(focus));
        let client = client(spawn_hub(router).await);

        let sent = client
            .send_message(
                "!a",
                &SendRequest {
                    text: "hello".into(),
                    reply_to_message_id: Some("$9".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(sent.pending_message_id, "$pending");
        assert_eq!(sent.chat_id, "!a");

        client.focus_chat("!a", Some("draft")).await.unwrap();
    }
}
