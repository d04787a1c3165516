use std::convert::Infallible;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::post;
use axum::{Json, Router};
use futures::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use validator::Validate;

use crate::agents::EventSink;
use crate::models::{AppState, StreamRequest};
use crate::types::AppError;

const EVENT_BUFFER: usize = 64;

pub fn router(state: AppState) -> Router {
    Router::new().route("/stream", post(stream)).with_state(state)
}

/// Run one turn in the background and relay its events as SSE
pub async fn stream(
    State(state): State<AppState>,
    payload: Result<Json<StreamRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    request
        .validate()
        .map_err(|e| AppError::InvalidRequest(e.to_string()))?;

    let request = request.into_agent_request(&state.storage)?;
    info!(
        thread_id = ?request.thread_id,
        message_len = request.message.len(),
        "Stream request received"
    );

    let (sink, rx) = EventSink::channel(EVENT_BUFFER);
    let agent = state.agent.clone();
    tokio::spawn(async move {
        if let Err(e) = agent.run(request, sink).await {
            warn!(error = %e, "Agent turn ended with an error");
        }
    });

    let events = ReceiverStream::new(rx).filter_map(|event| {
        serde_json::to_string(&event)
            .ok()
            .map(|data| Ok(Event::default().data(data)))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::tests::reply;
    use crate::routes::tests::{body_string, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/stream")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_stream_relays_agent_events() {
        let app = router(test_state(vec![Ok(reply("chat")), Ok(reply("Hello there."))]));

        let response = app
            .oneshot(post_json(r#"{"message":"hi","thread_id":"t-sse"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");

        let body = body_string(response).await;
        assert!(body.contains(r#"data: {"type":"route","route":"chat"}"#));
        assert!(body.contains(r#"data: {"type":"text","content":"Hello there."}"#));
        assert!(body.contains(r#"data: {"type":"done","thread_id":"t-sse"}"#));
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let app = router(test_state(vec![]));
        let response = app.oneshot(post_json(r#"{"message":""}"#)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.starts_with(r#"{"type":"text","content":"Invalid request"#));
    }

    #[tokio::test]
    async fn test_malformed_body_rejected() {
        let app = router(test_state(vec![]));
        let response = app.oneshot(post_json("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
