//! Webhook endpoint for GitHub push notifications.
//!
//! GitHub posts either a JSON body or an urlencoded form whose `payload`
//! field holds the JSON. Only three fields matter: `repository.name`,
//! `repository.url` and `head_commit.id`.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::post;
use hookd_core::Notification;
use hookd_scheduler::DispatchOutcome;
use serde::Deserialize;
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

pub const ACK_QUEUED: &str = "thank you for your patronage.\n";
pub const ACK_IGNORED: &str = "notification ignored.\n";
pub const ACK_UNREADABLE: &str = "i failed to understand your message.\n";
pub const ACK_PING: &str = "pong.\n";

pub fn router() -> Router<AppState> {
    Router::new().route("/github", post(github_webhook))
}

#[derive(Debug, Deserialize)]
struct PushPayload {
    head_commit: HeadCommit,
    repository: RepositoryInfo,
}

#[derive(Debug, Deserialize)]
struct HeadCommit {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryInfo {
    name: String,
    url: String,
}

/// Handle a GitHub webhook delivery.
///
/// Always acknowledges with 200, except when a valid job cannot be queued.
pub async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), ApiError> {
    let event_type = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("push");

    info!(event = %event_type, length = body.len(), "Received webhook");

    if event_type == "ping" {
        info!("Ping event received - webhook is configured correctly");
        return Ok((StatusCode::OK, ACK_PING));
    }

    let notification = match decode_notification(&headers, &body) {
        Ok(notification) => notification,
        Err(reason) => {
            info!(reason = %reason, "Could not decode notification");
            return Ok((StatusCode::OK, ACK_UNREADABLE));
        }
    };

    match state.dispatcher.dispatch(notification) {
        DispatchOutcome::Queued { .. } => Ok((StatusCode::OK, ACK_QUEUED)),
        DispatchOutcome::Rejected(_) => Ok((StatusCode::OK, ACK_IGNORED)),
        DispatchOutcome::Refused(e) => Err(e.into()),
    }
}

/// Extract the notification tuple from a webhook body.
pub fn decode_notification(headers: &HeaderMap, body: &[u8]) -> Result<Notification, String> {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    let payload: PushPayload = if is_form {
        let json = url::form_urlencoded::parse(body)
            .find(|(key, _)| key == "payload")
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| "form body has no payload field".to_string())?;
        serde_json::from_str(&json)
    } else {
        serde_json::from_slice(body)
    }
    .map_err(|e| format!("invalid payload: {}", e))?;

    info!(
        repo = %payload.repository.name,
        url = %payload.repository.url,
        commit = %payload.head_commit.id,
        "Decoded push notification"
    );

    Ok(Notification::new(
        payload.repository.name,
        payload.repository.url,
        payload.head_commit.id,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use hookd_core::AllowList;
    use hookd_scheduler::{Dispatcher, JobQueue, Popped};
    use serde_json::json;
    use std::sync::Arc;

    fn state(capacity: usize) -> AppState {
        let queue = Arc::new(JobQueue::with_capacity(capacity));
        let dispatcher = Arc::new(Dispatcher::new(
            AllowList::new(["hookd"], ["openplans"]),
            queue.clone(),
        ));
        AppState::new(dispatcher, queue, 0)
    }

    fn payload(url: &str, commit: &str) -> String {
        json!({
            "after": commit,
            "head_commit": { "id": commit, "message": "fix things" },
            "repository": { "name": "hookd", "url": url },
        })
        .to_string()
    }

    fn form_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers
    }

    fn form_body(json: &str) -> Bytes {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("payload", json)
            .finish();
        Bytes::from(encoded)
    }

    #[tokio::test]
    async fn test_form_encoded_push_is_queued() {
        let state = state(0);
        let body = form_body(&payload("https://github.com/openplans/hookd", "abc123"));

        let (status, ack) = github_webhook(State(state.clone()), form_headers(), body)
            .await
            .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack, ACK_QUEUED);
        assert_eq!(state.queue.len(), 1);
        let Popped::Job(job) = state.queue.pop_blocking() else {
            panic!("expected a job");
        };
        assert_eq!(job.repo_name, "hookd");
        assert_eq!(job.repo_url, "https://github.com/openplans/hookd");
        assert_eq!(job.commit_id, "abc123");
    }

    #[tokio::test]
    async fn test_json_push_is_queued() {
        let state = state(0);
        let body = Bytes::from(payload("https://github.com/openplans/hookd", "abc123"));

        let (status, _) = github_webhook(State(state.clone()), HeaderMap::new(), body)
            .await
            .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_push_is_still_acknowledged() {
        let state = state(0);
        let body = form_body(&payload("https://github.com/someoneelse/hookd", "abc123"));

        let (status, ack) = github_webhook(State(state.clone()), form_headers(), body)
            .await
            .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack, ACK_IGNORED);
        assert!(state.queue.is_empty());
    }

    #[tokio::test]
    async fn test_garbage_is_acknowledged() {
        let state = state(0);

        for body in ["", "{}", "payload=%7Bnot-json", "definitely not json"] {
            let (status, ack) =
                github_webhook(State(state.clone()), form_headers(), Bytes::from(body))
                    .await
                    .unwrap();
            assert_eq!(status, StatusCode::OK);
            assert_eq!(ack, ACK_UNREADABLE);
        }
        assert!(state.queue.is_empty());
    }

    #[tokio::test]
    async fn test_ping_is_acknowledged_without_dispatch() {
        let state = state(0);
        let mut headers = HeaderMap::new();
        headers.insert("X-GitHub-Event", HeaderValue::from_static("ping"));

        let (status, ack) = github_webhook(State(state.clone()), headers, Bytes::from("{}"))
            .await
            .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack, ACK_PING);
        assert!(state.queue.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_is_reported() {
        let state = state(1);
        let first = Bytes::from(payload("https://github.com/openplans/hookd", "aaaa11"));
        let second = Bytes::from(payload("https://github.com/openplans/hookd", "bbbb22"));

        github_webhook(State(state.clone()), HeaderMap::new(), first)
            .await
            .unwrap();
        let result = github_webhook(State(state.clone()), HeaderMap::new(), second).await;

        assert!(matches!(result, Err(ApiError::QueueFull(_))));
        assert_eq!(state.queue.len(), 1);
    }

    #[test]
    fn test_decode_requires_head_commit() {
        let body = json!({ "repository": { "name": "hookd", "url": "x" } }).to_string();
        assert!(decode_notification(&HeaderMap::new(), body.as_bytes()).is_err());
    }
}
