//! jabber: run the email → provider → action pipeline offline.

mod config;
mod console;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use jabber_core::app::{InboundEmail, PipelineBuilder, PipelineConfig};
use jabber_core::domain::ActorDirectory;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use crate::console::{CannedReplies, LoggingFeed, LoggingTransport};

#[derive(Debug, Parser)]
#[command(name = "jabber", version, about = "Employee personas that react to email")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Feed inbound emails through the pipeline with canned provider replies.
    Simulate {
        /// Pipeline config (TOML). Defaults apply when omitted.
        #[arg(long, env = "JABBER_CONFIG")]
        config: Option<PathBuf>,
        /// Actor directory (JSON array).
        #[arg(long, env = "JABBER_ACTORS")]
        actors: PathBuf,
        /// One inbound email or an array of them (webhook JSON).
        #[arg(long)]
        email: PathBuf,
        /// Object mapping actor name to the provider reply.
        #[arg(long)]
        responses: PathBuf,
        /// Run jobs immediately instead of sampling the action delay.
        #[arg(long)]
        no_delay: bool,
        /// Include conversation history in the printed status.
        #[arg(long)]
        conversations: bool,
    },
    /// Print the effective config after file and environment overrides.
    ShowConfig {
        #[arg(long, env = "JABBER_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<InboundEmail>),
    One(Box<InboundEmail>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<InboundEmail> {
        match self {
            OneOrMany::Many(emails) => emails,
            OneOrMany::One(email) => vec![*email],
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env は任意
    let _ = dotenvy::dotenv();
    init_tracing()?;
    install_panic_hook();

    let cli = Cli::parse();
    match cli.command {
        Command::Simulate {
            config,
            actors,
            email,
            responses,
            no_delay,
            conversations,
        } => {
            let mut cfg = config::load(config.as_deref()).await?;
            if no_delay {
                cfg.min_action_delay_ms = 0;
                cfg.max_action_delay_ms = 0;
            }
            simulate(cfg, &actors, &email, &responses, conversations).await
        }
        Command::ShowConfig { config } => {
            let cfg = config::load(config.as_deref()).await?;
            print!("{}", toml::to_string_pretty(&cfg)?);
            Ok(())
        }
    }
}

async fn simulate(
    cfg: PipelineConfig,
    actors: &Path,
    email: &Path,
    responses: &Path,
    with_conversations: bool,
) -> anyhow::Result<()> {
    let directory = ActorDirectory::from_json(&read(actors).await?)
        .with_context(|| format!("load actors {}", actors.display()))?;
    let emails: OneOrMany = serde_json::from_str(&read(email).await?)
        .with_context(|| format!("parse email {}", email.display()))?;
    let replies: HashMap<String, serde_json::Value> = serde_json::from_str(&read(responses).await?)
        .with_context(|| format!("parse responses {}", responses.display()))?;
    let provider = CannedReplies::new(&directory, replies)?;

    // 1 job あたりの上限: 最大遅延 + provider + integration
    let deadline = Duration::from_millis(
        cfg.max_action_delay_ms + cfg.provider_timeout_ms + cfg.integration_timeout_ms,
    );

    let pipeline = PipelineBuilder::new(cfg)
        .directory(directory)
        .provider(Arc::new(provider))
        .feed(Arc::new(LoggingFeed::default()))
        .mail_transport(Arc::new(LoggingTransport))
        .build()?;
    let running = pipeline.start();

    for email in emails.into_vec() {
        let report = pipeline.receive(&email).await?;
        tracing::info!(
            message_id = %email.message_id,
            enqueued = report.enqueued.len(),
            unknown = report.unknown_recipients.len(),
            session_failures = report.session_failures.len(),
            "email ingested"
        );
    }

    let drained = tokio::select! {
        res = tokio::time::timeout(deadline, wait_until_idle(&pipeline)) => res.is_ok(),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted; pending jobs are dropped");
            false
        }
    };
    if !drained {
        tracing::warn!("queue not drained before shutdown");
    }

    let status = pipeline.status(with_conversations).await;
    running.shutdown().await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn wait_until_idle(pipeline: &jabber_core::app::Pipeline) {
    loop {
        if pipeline.queue_counts().await.is_idle() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn read(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) => EnvFilter::new("info,jabber=debug,jabber_core=debug"),
    };
    let log_format = std::env::var("JABBER_LOG_FORMAT")
        .unwrap_or_else(|_| "compact".to_string())
        .to_ascii_lowercase();

    // status JSON は stdout、ログは stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_writer(std::io::stderr);

    match log_format.as_str() {
        "json" => builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .init(),
        "pretty" => builder.pretty().init(),
        "compact" => builder.compact().init(),
        other => {
            return Err(anyhow::anyhow!(
                "unsupported JABBER_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::debug!(log_format = %log_format, "tracing initialized");
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_to_string(panic_info.payload());
        tracing::error!(
            panic_location = %location,
            panic_payload = %payload,
            "panic captured"
        );
        default_hook(panic_info);
    }));
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
