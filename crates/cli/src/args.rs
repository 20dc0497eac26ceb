//! Command-line flags and their translation into a [`HookConfig`].

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use listener::Endpoint;
use trigger::{
    HookConfig, RoutePrefix, Secret, UpdateCommand, DEFAULT_MAX_BODY_BYTES, DEFAULT_ROUTE_PREFIX,
    DEFAULT_SHELL, DEFAULT_UPDATE_COMMAND,
};

/// Log line encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// Runs the repository's update command whenever an authenticated push
/// notification arrives.
#[derive(Debug, Parser)]
#[command(name = "pullhook", version, about)]
pub struct Cli {
    /// Webhook secret used to verify x-hub-signature.
    #[arg(long, env = "PULLHOOK_SECRET", default_value = "", hide_env_values = true)]
    pub secret: String,

    /// Directory of the repository checkout.
    #[arg(long, env = "PULLHOOK_DIR")]
    pub dir: PathBuf,

    /// Webhook path prefix.
    #[arg(long, default_value = DEFAULT_ROUTE_PREFIX)]
    pub path: String,

    /// TCP address to listen on.
    #[arg(long, default_value = "localhost:8081")]
    pub bind: String,

    /// Unix socket to listen on instead of TCP.
    #[arg(long)]
    pub unix: Option<PathBuf>,

    /// Unix socket permissions, as octal digits.
    #[arg(long = "unix-perm", default_value = "777", value_parser = parse_mode)]
    pub unix_perm: u32,

    /// Update timeout in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    pub timeout: u64,

    /// Shell used to run the update command.
    #[arg(long, default_value = DEFAULT_SHELL)]
    pub shell: PathBuf,

    /// Update command line, passed to the shell with -c.
    #[arg(long, default_value = DEFAULT_UPDATE_COMMAND)]
    pub command: String,

    /// Largest request body accepted, in bytes.
    #[arg(long = "max-body", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body: usize,

    /// Log line encoding.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP/gRPC endpoint spans are exported to.
    #[arg(long = "otlp-endpoint", env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Cli {
    /// Builds and validates the daemon configuration.
    pub fn hook_config(&self) -> anyhow::Result<HookConfig> {
        let meta = std::fs::metadata(&self.dir)
            .with_context(|| format!("cannot open repository directory {}", self.dir.display()))?;
        if !meta.is_dir() {
            bail!("{} is not a directory", self.dir.display());
        }

        let mut config = HookConfig::new(Secret::new(self.secret.as_bytes()), &self.dir);
        config.route_prefix = RoutePrefix::new(self.path.as_str()).context("--path is empty")?;
        config.command = UpdateCommand::new(self.command.as_str()).context("--command is empty")?;
        config.timeout = Duration::from_millis(self.timeout);
        config.shell = self.shell.clone();
        config.max_body_bytes = self.max_body;
        config.validate()?;
        Ok(config)
    }

    /// The listener endpoint; `--unix` wins over `--bind`.
    pub fn endpoint(&self) -> Endpoint {
        match &self.unix {
            Some(path) => Endpoint::Unix {
                path: path.clone(),
                mode: self.unix_perm,
            },
            None => Endpoint::Tcp(self.bind.clone()),
        }
    }
}

/// Parses permission bits written as octal digits (`"777"`, `"0660"`).
fn parse_mode(raw: &str) -> Result<u32, String> {
    let mode = u32::from_str_radix(raw, 8).map_err(|e| format!("'{raw}' is not octal: {e}"))?;
    if mode > 0o7777 {
        return Err(format!("'{raw}' is not a permission mode"));
    }
    Ok(mode)
}
