//! Newsync - a terminal client for the news article service.
//!
//! This binary wires the HTTP client into an `ArticleFeed` and exposes the
//! feed's operations as subcommands. `watch` keeps a live subscription open
//! and prints every update the sync engine publishes.

mod cli;
mod config;
mod output;

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use newsync_core::{ApiClient, ArticleFeed, ArticleFilters, QueryState, QueryStatus};

use cli::{Command, Invocation};
use config::Config;

/// Initialize the tracing subscriber for logging
///
/// Logs go to stderr unless a log file is given, in which case they go to a
/// daily rolling file next to it. The returned guard flushes on drop.
fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "newsync.log".to_string());
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match cli::parse_args(&args) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("Error: {:#}\n\n{}", e, cli::USAGE);
            std::process::exit(2);
        }
    };
    if invocation.command == Command::Help {
        println!("{}", cli::USAGE);
        return Ok(());
    }

    let _guard = init_tracing(invocation.log_file.as_deref());
    info!(command = ?invocation.command, "Newsync starting");

    let mut config = Config::load()?;
    if let Command::SetUrl { url } = &invocation.command {
        config.api_base_url = Some(url.trim_end_matches('/').to_string());
        config.save()?;
        println!("Saved {} to {}", url, Config::config_path()?.display());
        return Ok(());
    }

    let base_url = config.base_url(invocation.api_url.as_deref());
    if invocation.command == Command::ShowConfig {
        println!("Config file: {}", Config::config_path()?.display());
        println!("Service:     {}", base_url);
        return print_json(&config.sync);
    }

    let client = ApiClient::new(&base_url).context("Failed to build HTTP client")?;
    let feed = ArticleFeed::new(client, config.sync.clone());
    let result = run(&feed, &invocation).await;
    feed.dispose();

    info!("Newsync shutting down");
    result
}

async fn run(feed: &ArticleFeed<ApiClient>, invocation: &Invocation) -> Result<()> {
    let json = invocation.json;
    match &invocation.command {
        Command::List => {
            let result = feed.articles(&invocation.filters).await?;
            print_listing(result.state(), json)?;
        }
        Command::Watch { interval } => watch(feed, &invocation.filters, *interval, json).await?,
        Command::Article { id } => {
            let article = feed.article(id).await?;
            if json {
                print_json(&article)?;
            } else {
                println!("{}", output::article_detail(&article));
            }
        }
        Command::Bookmark { id } => {
            let result = feed.articles(&invocation.filters).await?;
            if result.status() == QueryStatus::Error {
                print_listing(result.state(), json)?;
                anyhow::bail!("Could not load the listing containing {}", id);
            }
            let page = feed
                .toggle_bookmark(result.key(), id)
                .await
                .with_context(|| format!("Failed to toggle bookmark for {}", id))?;
            let bookmarked = page.find(id).map(|a| a.bookmarked).unwrap_or(false);
            if json {
                print_json(&serde_json::json!({ "id": id, "bookmarked": bookmarked }))?;
            } else {
                println!("{} {}", if bookmarked { "Bookmarked" } else { "Removed bookmark from" }, id);
            }
        }
        Command::Categories | Command::Sources => {
            let result = if invocation.command == Command::Categories {
                feed.categories().await?
            } else {
                feed.sources().await?
            };
            let state = result.state();
            match (&state.data, &state.error) {
                (Some(list), _) if json => print_json(list)?,
                (Some(list), _) => list.iter().for_each(|item| println!("{}", item)),
                (None, Some(e)) => return Err(e.clone().into()),
                (None, None) => {}
            }
        }
        Command::Stats => {
            let stats = feed.stats().await?;
            if json {
                print_json(&stats)?;
            } else {
                println!("{}", output::stats(&stats));
            }
        }
        Command::Health => {
            let health = feed.health().await?;
            if json {
                print_json(&health)?;
            } else {
                println!("{}", output::health(&health));
            }
        }
        Command::Refresh => {
            let response = feed.trigger_refresh().await?;
            if json {
                print_json(&response)?;
            } else if response.is_accepted() {
                println!("Refresh accepted{}", response.message.map(|m| format!(": {}", m)).unwrap_or_default());
            } else {
                println!("Refresh not accepted");
            }
        }
        Command::Help | Command::ShowConfig | Command::SetUrl { .. } => {}
    }
    Ok(())
}

fn print_listing(state: &QueryState<newsync_core::ArticlePage>, json: bool) -> Result<()> {
    if json {
        return print_json(&state.data);
    }
    eprintln!("[{}]", output::state_header(state));
    if let Some(page) = &state.data {
        println!("{}", output::page(page));
    }
    Ok(())
}

/// Subscribe to a listing and print each update until Ctrl-C.
async fn watch(
    feed: &ArticleFeed<ApiClient>,
    filters: &ArticleFilters,
    interval: std::time::Duration,
    json: bool,
) -> Result<()> {
    let engine = feed.engine();
    let options = engine.config().defaults.with_refetch_interval(Some(interval));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let observer = engine.observe(&filters.to_params(), options, move |state| {
        let _ = tx.send(state);
    })?;
    info!(key = %observer.key(), interval_secs = interval.as_secs(), "Watching listing");

    loop {
        tokio::select! {
            state = rx.recv() => match state {
                Some(state) => print_listing(&state, json)?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    observer.detach();
    Ok(())
}
