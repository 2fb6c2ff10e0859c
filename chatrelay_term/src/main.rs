use std::io::Write;

use anyhow::Context;
use clap::Parser;
use session::{ChatClient, Role, Session};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

use config::Cli;
use render::Renderer;

mod config;
mod render;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    configure_logging()?;
    let cli = Cli::parse();

    let client = ChatClient::new(&cli.endpoint);
    let renderer = Renderer::new(cli.theme.syntect_name());
    let mut session = Session::new();

    eprintln!("Chatting via {} (Ctrl-C stops a reply, Ctrl-D quits)", client.endpoint());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt()?;
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        exchange(&client, &renderer, &mut session, line).await;
    }
    println!();
    Ok(())
}

/// Sends one message and prints the reply as it streams in. Only complete
/// lines are printed while streaming; the rest follows once the reply is
/// committed.
async fn exchange(client: &ChatClient, renderer: &Renderer, session: &mut Session, input: String) {
    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let history_before = session.history().len();
    let mut printed = 0;
    let mut announced = false;

    client
        .submit(session, input, &cancel, |s| {
            let Some(draft) = s.visible_draft() else {
                return;
            };
            let Some(end) = draft.rfind('\n') else {
                return;
            };
            if !announced {
                println!("{}:", Role::Assistant.as_str());
                announced = true;
            }
            printed = print_from(&renderer.render(&draft[..end]), printed);
        })
        .await;
    interrupt.abort();

    // user turn plus a committed reply
    if session.history().len() == history_before + 2 {
        if let Some(reply) = session.history().last() {
            if !announced {
                println!("{}:", Role::Assistant.as_str());
            }
            let text = reply.content.strip_suffix('\n').unwrap_or(&reply.content);
            print_from(&renderer.render(text), printed);
        }
    }
    println!();
}

fn print_from(lines: &[String], printed: usize) -> usize {
    for line in lines.iter().skip(printed) {
        println!("{line}");
    }
    lines.len().max(printed)
}

fn prompt() -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{}> ", Role::User.as_str())?;
    stdout.flush().context("failed to flush stdout")
}

/// Logs go to stderr so stdout only carries the conversation.
fn configure_logging() -> anyhow::Result<()> {
    let stderr_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::time())
        .with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    let subscriber = Registry::default().with(filter).with(stderr_log);

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")
}
