use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use approval_relay::handler::{ApprovalRelay, Outcome};
use approval_relay::models::event::{decode_event, Delivery};
use approval_relay::{api, build_relay, config};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RELAY_LOG_FORMAT=json switches to JSON lines.
    let json_logs = std::env::var("RELAY_LOG_FORMAT").as_deref() == Ok("json");
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "approval_relay=debug,tower_http=debug".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let args = cli::Cli::parse();
    let cfg = config::load().context("failed to load configuration")?;
    let relay = build_relay(&cfg)?;

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, relay, port).await
        }
        Some(cli::Commands::Handle { event }) => handle_once(&relay, &event).await,
        Some(cli::Commands::Render { event }) => render_once(&relay, &event).await,
        None => {
            let port = cfg.port;
            run_server(cfg, relay, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, relay: ApprovalRelay, port: u16) -> anyhow::Result<()> {
    let source_topic_arn = cfg.require_source_topic()?.to_string();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(
        source = %source_topic_arn,
        relay_topic = %relay.target().topic_arn,
        "approval relay listening on {}",
        addr
    );

    let state = Arc::new(api::AppState {
        relay,
        http: reqwest::Client::new(),
        source_topic_arn,
        endpoint_override: cfg.aws.endpoint_url.clone(),
    });
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("shutting down");
}

fn read_event(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read event from stdin")?;
        Ok(raw)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read event from {}", path.display()))
    }
}

async fn handle_once(relay: &ApprovalRelay, path: &Path) -> anyhow::Result<()> {
    let raw = read_event(path)?;
    match relay.handle_event(&raw).await? {
        Outcome::Published { message_id } => println!("{}", message_id),
        Outcome::ConfirmationRequested { subscribe_url } => {
            tracing::warn!(
                subscribe_url = %subscribe_url,
                "subscription confirmations are only answered by `serve`"
            );
        }
        Outcome::Ignored { kind } => tracing::info!(kind = %kind, "nothing to relay"),
    }
    Ok(())
}

async fn render_once(relay: &ApprovalRelay, path: &Path) -> anyhow::Result<()> {
    let raw = read_event(path)?;
    let notification = match decode_event(&raw)? {
        Delivery::Notification(n) => n,
        other => anyhow::bail!("event carries no approval notification: {:?}", other),
    };
    let message = relay.render(&notification).await?;
    println!("{}", serde_json::to_string_pretty(&message)?);
    Ok(())
}
