//! Feed trigger binary entrypoint.
//! Loads the trigger config, activates it and prints output records as JSON lines
//! on stdout until Ctrl-C (or once, with `--once`).

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feed_trigger::config;
use feed_trigger::sink::{EventSink, JsonLinesSink};
use feed_trigger::trigger::{Activation, Driver};

#[derive(Debug, Parser)]
#[command(name = "feed-trigger", version, about = "Poll or stream a social feed into JSON lines")]
struct Cli {
    /// Config file (TOML or JSON). Falls back to $FEED_TRIGGER_CONFIG, then config/trigger.{toml,json}.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single manual fetch and exit instead of starting the loop.
    #[arg(long)]
    once: bool,
}

/// Logs go to stderr; stdout is reserved for records.
/// `RUST_LOG` overrides the default filter, `LOG_FORMAT=json` switches to JSON logs.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("feed_trigger=info,trigger=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    tracing::info!(
        instance = %cfg.instance_id,
        mode = ?cfg.mode,
        "trigger config loaded"
    );

    let provider = cfg.provider.build().context("building feed provider")?;
    let store = cfg.state.build();
    let sink: Arc<dyn EventSink> = Arc::new(JsonLinesSink::stdout());

    let driver = Driver::from_config(&cfg, provider, store, sink).context("invalid trigger inputs")?;

    if cli.once {
        let items = driver.manual_trigger().await?;
        tracing::info!(count = items.len(), "manual run finished");
        return Ok(());
    }

    let mut activation = Activation::start(driver);
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("waiting for ctrl-c")?;
            tracing::info!("shutdown requested");
        }
        _ = activation.finished() => {
            tracing::warn!("trigger stopped on its own; reactivate to resume");
        }
    }
    activation.close().await;
    Ok(())
}
