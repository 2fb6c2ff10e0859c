use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing::{info, warn};

use chatrelay_web::{app, env, logging, upstream::OpenAiCompatClient, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::configure_logging()?;
    configure_current_dir()?;

    let app = app(configure_app_state()?);

    let addr = socket_addr_from_env(env::API_PORT, 3000);
    info!("listening on {}", addr);

    axum::Server::try_bind(&addr)
        .with_context(|| format!("failed to bind {addr}"))?
        .serve(app.into_make_service())
        .await
        .context("server stopped unexpectedly")?;
    Ok(())
}

fn socket_addr_from_env(port_env_key: &str, default: u16) -> SocketAddr {
    let port = std::env::var(port_env_key).ok();
    let port = port.and_then(|x| x.parse().ok()).unwrap_or(default);
    SocketAddr::from(([0, 0, 0, 0], port))
}

fn configure_app_state() -> anyhow::Result<Arc<AppState>> {
    let api_key = std::env::var(env::API_KEY)
        .with_context(|| format!("the {} environment variable must be set", env::API_KEY))?;

    let client = OpenAiCompatClient::new(api_key);
    let client = match std::env::var(env::UPSTREAM_URL) {
        Ok(url) => client.with_base_url(url),
        Err(_) => client,
    };
    info!("Relaying completions to {}", client.base_url());

    Ok(AppState::new(client))
}

/// Moves into the crate directory when started from elsewhere in the
/// workspace, so `index.html` and `public/` resolve.
fn configure_current_dir() -> anyhow::Result<()> {
    if std::path::Path::new("./index.html").exists() {
        return Ok(());
    }
    let current_exe = std::env::current_exe().context("failed to get current exe")?;
    let mut dir = Some(current_exe);
    while let Some(current) = dir {
        let content_root = current.join("chatrelay_web");
        if content_root.join("index.html").exists() {
            std::env::set_current_dir(&content_root)
                .context("failed to set current dir to content root")?;
            return Ok(());
        }
        dir = current.parent().map(|x| x.to_path_buf());
    }
    warn!("index.html not found, only the chat api will be served");
    Ok(())
}
