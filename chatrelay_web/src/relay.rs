use std::{convert::Infallible, sync::Arc};

use anyhow::Context;
use axum::{
    body::{Bytes, StreamBody},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use session::Message;
use tracing::{error, info};

use crate::{
    upstream::{CompletionRequest, FragmentStream},
    AppState,
};

#[derive(Debug)]
pub enum RelayError {
    InvalidMessages,
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for RelayError {
    fn from(err: anyhow::Error) -> Self {
        RelayError::Internal(err)
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            RelayError::InvalidMessages => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid messages format" })),
            )
                .into_response(),
            RelayError::Internal(err) => {
                error!("Error relaying chat completion: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal Server Error" })),
                )
                    .into_response()
            }
        }
    }
}

/// `POST /api/chat`: forwards the conversation upstream and streams the reply
/// back as plain text, one chunk per upstream fragment.
pub async fn chat(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, RelayError> {
    let messages = parse_messages(&body)?;
    info!("Relaying chat completion: messages = {}", messages.len());

    let fragments = state
        .provider
        .open_stream(CompletionRequest::streaming(messages))
        .await
        .context("failed to open upstream completion stream")?;

    let headers = [
        (header::CONTENT_TYPE, "text/plain"),
        (header::TRANSFER_ENCODING, "chunked"),
    ];
    Ok((headers, StreamBody::new(relay_fragments(fragments))).into_response())
}

/// A body that is not JSON at all is an internal error; a JSON body without a
/// non-empty list of messages is the caller's fault.
pub fn parse_messages(body: &[u8]) -> Result<Vec<Message>, RelayError> {
    let payload: Value = serde_json::from_slice(body).context("request body is not json")?;
    let messages = payload
        .get("messages")
        .filter(|messages| messages.as_array().map_or(false, |a| !a.is_empty()))
        .ok_or(RelayError::InvalidMessages)?;

    Vec::<Message>::deserialize(messages).map_err(|_| RelayError::InvalidMessages)
}

/// One upstream fragment in, one chunk out. A fragment without a delta becomes
/// an empty chunk. An upstream failure truncates the body and closes it
/// cleanly; the failure only shows up in the log.
pub fn relay_fragments(
    mut fragments: FragmentStream,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    async_stream::stream! {
        let mut relayed = 0_usize;
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(fragment) => {
                    relayed += 1;
                    yield Ok::<_, Infallible>(Bytes::from(fragment.into_text()));
                }
                Err(err) => {
                    error!("Upstream failed after {relayed} fragments, truncating reply: {err:#}");
                    break;
                }
            }
        }
        info!("Completed relaying chat completion: fragments = {relayed}");
    }
}
