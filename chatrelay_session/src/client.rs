use anyhow::{anyhow, Context};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    decode::Utf8Decoder,
    message::Message,
    state::{Effect, Event, Session},
};

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [Message],
}

/// HTTP side of the conversation client: posts the history to the relay and
/// streams the reply into a [`Session`].
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ChatClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn open(
        &self,
        history: &[Message],
    ) -> anyhow::Result<impl Stream<Item = reqwest::Result<Bytes>>> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&ChatRequest { messages: history })
            .send()
            .await
            .with_context(|| format!("failed to reach relay at {}", self.endpoint))?;
        let response = response
            .error_for_status()
            .context("relay rejected chat request")?;
        Ok(response.bytes_stream())
    }

    /// Runs one exchange: submit, stream, finalize.
    ///
    /// Returns `false` when the session refused the input (empty text or a
    /// reply already in progress). Request failures are logged and end the
    /// exchange like a normal end of stream.
    pub async fn submit<F>(
        &self,
        session: &mut Session,
        input: impl Into<String>,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> bool
    where
        F: FnMut(&Session),
    {
        let history = match session.apply(Event::Submit(input.into())) {
            Some(Effect::Send(history)) => history,
            _ => return false,
        };
        on_update(session);

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(anyhow!("cancelled before the relay responded")),
            opened = self.open(&history) => opened,
        };
        match opened {
            Ok(body) => stream_into(session, body, cancel, &mut on_update).await,
            Err(e) => {
                error!("Error starting chat stream: {e:#}");
                finish(session, Event::StreamFailed(e.to_string()), &mut on_update);
            }
        }
        true
    }
}

/// Pulls `body` to the end, feeding every decoded increment to `session`.
///
/// `cancel` is checked between pulls; cancelling ends the stream as if the
/// relay had closed it. `on_update` runs after every change to the session.
pub async fn stream_into<S, E, F>(
    session: &mut Session,
    body: S,
    cancel: &CancellationToken,
    mut on_update: F,
) where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
    F: FnMut(&Session),
{
    futures::pin_mut!(body);
    let mut decoder = Utf8Decoder::new();

    let end = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            next = body.next() => Some(next),
        };
        let Some(next) = next else {
            info!("Chat stream cancelled by user");
            break Event::StreamEnded;
        };
        match next {
            Some(Ok(chunk)) => {
                let text = decoder.decode(&chunk);
                if !text.is_empty() {
                    session.apply(Event::Segment(text));
                    on_update(session);
                }
            }
            Some(Err(e)) => {
                error!("Error reading chat stream: {e}");
                break Event::StreamFailed(e.to_string());
            }
            None => break Event::StreamEnded,
        }
    };

    let tail = decoder.finish();
    if !tail.is_empty() {
        session.apply(Event::Segment(tail));
        on_update(session);
    }
    finish(session, end, &mut on_update);
}

fn finish<F>(session: &mut Session, end: Event, on_update: &mut F)
where
    F: FnMut(&Session),
{
    if let Some(Effect::Finalize) = session.apply(end) {
        session.apply(Event::Finalize);
    }
    on_update(session);
}
