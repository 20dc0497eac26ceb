//! pullhook entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration** — read flags (and their environment fallbacks)
//!    and build one validated, immutable [`trigger::HookConfig`].
//! 2. **Wire observability** — install `tracing-subscriber` with a text or
//!    JSON layer and, optionally, an OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure** — create the [`runner::UpdateRunner`] and
//!    hand it to the webhook dispatcher as its [`trigger::UpdateTrigger`].
//! 4. **Serve** — listen on TCP or a Unix socket until SIGINT, SIGTERM,
//!    SIGHUP or SIGQUIT, then shut the listener down. Update runs already
//!    in flight are not awaited.

mod args;
mod observability;

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use listener::{router, serve, DispatchState};
use runner::UpdateRunner;
use tracing::{error, info, warn};

use crate::args::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let telemetry = observability::init(cli.log_format, cli.otlp_endpoint.as_deref())?;

    let result = run(&cli).await;
    if let Err(e) = &result {
        error!("pullhook stopped: {e:#}");
    }
    telemetry.shutdown();
    result
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = Arc::new(cli.hook_config()?);
    if config.secret.is_empty() {
        warn!("no webhook secret configured; signatures are checked against the empty key");
    }

    let runner = UpdateRunner::new(Arc::clone(&config));
    let app = router(DispatchState::new(Arc::clone(&config), Arc::new(runner)));
    let endpoint = cli.endpoint();

    info!(
        dir = %config.working_dir.display(),
        path = %config.route_prefix,
        timeout_ms = config.timeout.as_millis() as u64,
        %endpoint,
        "pullhook starting"
    );

    serve(&endpoint, app, shutdown_signal()?)
        .await
        .context("listener failed")?;

    info!("pullhook stopped");
    Ok(())
}

#[cfg(unix)]
fn shutdown_signal() -> anyhow::Result<impl Future<Output = ()> + Send + 'static> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt()).context("cannot watch SIGINT")?;
    let mut terminate = signal(SignalKind::terminate()).context("cannot watch SIGTERM")?;
    let mut hangup = signal(SignalKind::hangup()).context("cannot watch SIGHUP")?;
    let mut quit = signal(SignalKind::quit()).context("cannot watch SIGQUIT")?;

    Ok(async move {
        let received = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = hangup.recv() => "SIGHUP",
            _ = quit.recv() => "SIGQUIT",
        };
        info!(signal = received, "shutting down");
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> anyhow::Result<impl Future<Output = ()> + Send + 'static> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot watch Ctrl-C; shutting down");
            return;
        }
        info!("shutting down");
    })
}
