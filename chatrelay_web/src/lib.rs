use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{AppendHeaders, Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    tower_ext::{NoCacheExt, NO_CACHE_HEADERS},
    upstream::CompletionProvider,
};

pub mod logging;
pub mod relay;
mod tower_ext;
pub mod upstream;

pub mod env {
    pub const API_PORT: &str = "CHATRELAY_API_PORT";
    pub const API_KEY: &str = "GROQ_API_KEY";
    pub const UPSTREAM_URL: &str = "CHATRELAY_UPSTREAM_URL";
}

/// Shared by every request. Holds no conversation state: each request carries
/// its full history.
pub struct AppState {
    pub provider: Arc<dyn CompletionProvider>,
}

impl AppState {
    pub fn new(provider: impl CompletionProvider + 'static) -> Arc<Self> {
        Arc::new(Self {
            provider: Arc::new(provider),
        })
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/chat", post(relay::chat))
        .nest_service("/scripts", ServeDir::new("public/scripts").no_cache())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Response {
    match std::fs::read_to_string("index.html") {
        Ok(html) => (StatusCode::OK, AppendHeaders(NO_CACHE_HEADERS), Html(html)).into_response(),
        Err(err) => (StatusCode::NOT_FOUND, Html(err.to_string())).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::{body::Body, http::Request};
    use session::{ChatClient, Message, Phase, Session};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;
    use crate::upstream::testing::{Script, ScriptedProvider};

    async fn serve(provider: ScriptedProvider) -> String {
        let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0)))
            .serve(app(AppState::new(provider)).into_make_service());
        let addr = server.local_addr();
        tokio::spawn(server);
        format!("http://{addr}/api/chat")
    }

    async fn get_page(uri: &str) -> (StatusCode, String) {
        let app = app(AppState::new(ScriptedProvider::new(Script::Reply(vec![]))));
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn browser_page_renders_replies_as_markdown() {
        let (status, page) = get_page("/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(page.contains("marked.min.js"), "markdown renderer not loaded");
        assert!(page.contains("highlight.min.js"));
        assert!(page.contains("/scripts/chat.js"));

        let (status, script) = get_page("/scripts/chat.js").await;
        assert_eq!(status, StatusCode::OK);
        assert!(script.contains("marked.parse("));
        // headings and lists still render when the cdn script is unavailable
        assert!(script.contains("<h${level}>"));
        assert!(script.contains("<ul>"));
    }

    #[test_log::test(tokio::test)]
    async fn client_and_relay_complete_an_exchange() {
        let endpoint = serve(ScriptedProvider::new(Script::Reply(vec![
            Some("Hel"),
            None,
            Some("lo"),
        ])))
        .await;
        let client = ChatClient::new(endpoint);
        let mut session = Session::new();
        let mut drafts = vec![];

        let sent = client
            .submit(&mut session, "hi", &CancellationToken::new(), |s| {
                if let Some(draft) = s.visible_draft() {
                    drafts.push(draft.to_owned());
                }
            })
            .await;

        assert!(sent);
        assert_eq!(drafts.last().map(String::as_str), Some("Hello"));
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(
            session.history(),
            &[Message::user("hi"), Message::assistant("Hello")]
        );
    }

    #[test_log::test(tokio::test)]
    async fn client_recovers_from_relay_error() {
        let endpoint = serve(ScriptedProvider::new(Script::RefuseToOpen)).await;
        let client = ChatClient::new(endpoint);
        let mut session = Session::new();

        client
            .submit(&mut session, "hi", &CancellationToken::new(), |_| {})
            .await;

        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.history(), &[Message::user("hi")]);

        let sent = client
            .submit(&mut session, "again", &CancellationToken::new(), |_| {})
            .await;
        assert!(sent);
        assert_eq!(session.history().len(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn truncated_reply_is_kept_by_the_client() {
        let endpoint = serve(ScriptedProvider::new(Script::FailAfter(vec!["par", "tial"]))).await;
        let client = ChatClient::new(endpoint);
        let mut session = Session::new();

        client
            .submit(&mut session, "hi", &CancellationToken::new(), |_| {})
            .await;

        assert_eq!(session.history().last(), Some(&Message::assistant("partial")));
    }
}
