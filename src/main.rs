//! coral-expand binary: a session over an in-memory comment thread, driven by
//! JSON requests on stdin.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coral_expand::cli::Cli;
use coral_expand::{
    CommentNode, CommentThread, Config, SessionHandle, SyncStorage, ThreadLocator, Visibility,
    WidgetLocator,
};

/// Thread used when no fixture is given.
fn demo_thread() -> CommentThread {
    CommentThread::with_comments(vec![
        CommentNode::new("reader_one", 0, Visibility::Shown),
        CommentNode::new("reader_two", 1, Visibility::Hidden),
        CommentNode::new("reader_three", 2, Visibility::Hidden),
        CommentNode::new("reader_four", 0, Visibility::Hidden),
        CommentNode::new("reader_five", 1, Visibility::Shown),
    ])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    // Logs go to stderr; stdout carries responses only.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log.filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if cli.write_config {
        match &cli.config {
            Some(path) => config.save_to(path),
            None => config.save(),
        }
        .context("Failed to write config")?;
        tracing::info!("Config written");
        return Ok(());
    }

    let thread = match &cli.thread {
        Some(path) => CommentThread::from_json_file(path)
            .with_context(|| format!("Failed to load thread from {}", path.display()))?,
        None => demo_thread(),
    };

    let locator: Arc<dyn WidgetLocator> = if cli.appear_after == 0 {
        Arc::new(ThreadLocator::never())
    } else {
        Arc::new(ThreadLocator::after_attempts(thread, cli.appear_after))
    };

    let storage = SyncStorage::open(config.storage.dir.clone(), &config.storage.scope);
    let session = SessionHandle::start(&config, Arc::new(storage.session()), locator);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = session.request_json(line).await;
        stdout.write_all(response.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    session.shutdown();
    Ok(())
}
