use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use approval_bridge::bridge::Bridge;
use approval_bridge::models::approval::ApprovalOutcome;
use approval_bridge::notification::telegram::{decision_keyboard, TelegramClient};
use approval_bridge::notification::MessageChannel;
use approval_bridge::{api, config, jobs, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = cli::Cli::parse();
    let cfg = config::load()?;

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => run_server(cfg, port).await,
        Some(cli::Commands::Send {
            text,
            decision_buttons,
        }) => send_notification(&cfg, &text, decision_buttons).await,
        Some(cli::Commands::Wait {
            message_id,
            timeout_secs,
        }) => wait_for_decision(cfg, &message_id, timeout_secs).await,
        None => run_server(cfg, None).await,
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing() {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    // Export spans over OTLP only when a collector is configured.
    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        match opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "approval-bridge"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
        {
            Ok(tracer) => Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            Err(e) => {
                eprintln!("OpenTelemetry disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "approval_bridge=debug,tower_http=debug".into()),
        ))
        .with(fmt_layer)
        .with(telemetry_layer)
        .init();
}

fn build_bridge(cfg: &config::Config) -> anyhow::Result<Bridge> {
    let channel = TelegramClient::new(&cfg.telegram).context("failed to build Telegram client")?;
    Ok(Bridge::new(Arc::new(channel)))
}

async fn run_server(cfg: config::Config, port: Option<u16>) -> anyhow::Result<()> {
    let bridge = build_bridge(&cfg)?;

    jobs::poller::spawn(bridge.poller(cfg.poll_settings()), bridge.metrics.clone());
    jobs::sweeper::spawn(bridge.registry.clone(), cfg.sweep_interval());
    tracing::info!("Background poller and sweeper started");

    let port = port.unwrap_or(cfg.port);
    let state = AppState::new(bridge, cfg);
    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Approval bridge listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn send_notification(
    cfg: &config::Config,
    text: &str,
    decision_buttons: bool,
) -> anyhow::Result<()> {
    let channel = TelegramClient::new(&cfg.telegram)?;
    let tag = uuid::Uuid::new_v4().simple().to_string();
    let controls = decision_buttons
        .then(|| decision_keyboard(&[("✅ Approve", "approve"), ("❌ Reject", "reject")], &tag));

    let message_id = channel.send_notification(text, controls).await?;
    println!("Notification sent:\n  Message ID: {}", message_id);
    Ok(())
}

async fn wait_for_decision(
    cfg: config::Config,
    message_id: &str,
    timeout_secs: u64,
) -> anyhow::Result<()> {
    let bridge = build_bridge(&cfg)?;
    let outcome = bridge
        .await_with_own_poller(
            message_id,
            Duration::from_secs(timeout_secs),
            cfg.poll_settings(),
        )
        .await;

    match outcome? {
        ApprovalOutcome::Resolved(decision) => {
            println!(
                "Decision received:\n  Action: {}\n  Actor:  {}",
                decision.action, decision.actor
            );
            Ok(())
        }
        ApprovalOutcome::TimedOut => {
            anyhow::bail!("no decision for message {} within {}s", message_id, timeout_secs)
        }
    }
}
