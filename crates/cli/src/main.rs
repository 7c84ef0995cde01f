use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{builder::BoolishValueParser, ArgAction, Parser};
use ipo_controller::OperatorError;
use ipo_core::OperatorConfig;
use ipo_kubehub::KubeClient;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "installplan-operator", version, about = "Approve pending operator updates from declarative specs")]
struct Cli {
    /// Approve matching InstallPlans (default: dry run, log only)
    #[arg(long = "approve-updates", env = "IPO_APPROVE_UPDATES", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    approve_updates: bool,

    /// Directory holding update specs (*.yml, *.yaml)
    #[arg(long = "config-dir", env = "IPO_CONFIG_DIR", default_value = "/subscriptions")]
    config_dir: PathBuf,

    /// Run a check at least this often, in seconds
    #[arg(long = "max-interval", env = "IPO_MAX_INTERVAL", default_value_t = 900, value_parser = clap::value_parser!(u64).range(1..))]
    max_interval: u64,

    /// Ignore triggers arriving sooner than this after the last check, in seconds
    #[arg(long = "min-interval", env = "IPO_MIN_INTERVAL", default_value_t = 10)]
    min_interval: u64,

    /// Log filter, e.g. "info" or "ipo_apply=debug,info"
    #[arg(long = "log-level", env = "IPO_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Colorize log output
    #[arg(long = "colorize-logs", env = "IPO_COLORIZE_LOGS", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    colorize_logs: bool,

    /// Serve Prometheus metrics on host:port
    #[arg(long = "metrics-addr", env = "IPO_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

impl Cli {
    fn operator_config(&self) -> OperatorConfig {
        OperatorConfig {
            approve_updates: self.approve_updates,
            config_dir: self.config_dir.clone(),
            max_interval: Duration::from_secs(self.max_interval),
            min_interval: Duration::from_secs(self.min_interval),
        }
    }
}

fn init_tracing(level: &str, colorize: bool) {
    let filter = tracing_subscriber::EnvFilter::from_str(level).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(colorize)
        .init();
}

fn init_metrics(addr: SocketAddr) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("installing metrics exporter on {}", addr))?;
    info!(addr = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

fn report(err: &OperatorError) -> ExitCode {
    error!(code = err.exit_code(), "{}", err);
    ExitCode::from(err.exit_code())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.colorize_logs);
    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = init_metrics(addr) {
            warn!(error = ?e, "metrics disabled");
        }
    }
    let config = cli.operator_config();

    let client = match KubeClient::try_default().await {
        Ok(c) => Arc::new(c),
        Err(e) => return report(&OperatorError::from(e)),
    };

    tokio::select! {
        res = ipo_controller::run(&config, client) => match res {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => report(&e),
        },
        _ = signal::ctrl_c() => {
            info!("Ctrl-C received; exiting");
            ExitCode::SUCCESS
        }
    }
}
