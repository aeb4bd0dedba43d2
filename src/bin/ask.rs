use anyhow::{bail, Result};
use askstream::api::{ApiClient, CompletionSource};
use askstream::config::Config;
use askstream::render::{RenderSink, TerminalSink, WebhookSink};
use askstream::stream::Orchestrator;
use askstream::types::AskerIdentity;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Ask the model a question and watch the answer stream in.
#[derive(Debug, Parser)]
#[command(name = "ask", version)]
struct Cli {
    /// Render into a webhook message instead of the terminal.
    #[arg(long, env = "ASK_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Name shown as the asker.
    #[arg(long)]
    author: Option<String>,

    /// Icon URL shown next to the asker.
    #[arg(long)]
    avatar: Option<String>,

    /// The question.
    #[arg(required = true, num_args = 1..)]
    question: Vec<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("askstream=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn asker_identity(cli: &Cli) -> AskerIdentity {
    let label = cli
        .author
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "you".to_string());
    AskerIdentity::new(label, cli.avatar.clone())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if cli.webhook_url.is_some() {
        config.webhook_url = cli.webhook_url.clone();
    }
    config.validate()?;

    let question = cli.question.join(" ");
    if question.trim().is_empty() {
        bail!("question must not be empty");
    }

    let source: Arc<dyn CompletionSource> = Arc::new(ApiClient::new(&config));
    let sink: Arc<dyn RenderSink> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookSink::new(url)?),
        None => Arc::new(TerminalSink::stdout()),
    };

    let orchestrator = Orchestrator::from_config(&config, source, sink);
    let summary = orchestrator
        .respond(question.trim(), &asker_identity(&cli))
        .await?;

    if let Some(error) = summary.upstream_error {
        bail!("answer incomplete: {error}");
    }
    Ok(())
}
