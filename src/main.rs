//! Egress Sentinel - CLI Entry Point
//!
//! Accepts Go-style single-dash long flags as well as the standard form:
//! - `-proxy` (Go style) and `--proxy` (standard) both work
//! - `-isp` and `--isp` both work
//! - `-port` and `--port` both work
//! - `-proxy=http://...` is accepted too

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Parser, ValueEnum};
use egress_sentinel::{Config, Sentinel, VERSION};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Go-style long options that use single dash (Go's flag package behavior)
/// These need to be converted to double-dash for clap compatibility
const GO_STYLE_LONG_OPTIONS: &[&str] = &[
    "-proxy",
    "-isp",
    "-port",
    "-config",
    "-interval",
    "-timeout",
    "-bind-address",
    "-echo-url",
    "-log-level",
    "-log-format",
    "-test",
];

/// Convert Go-style CLI arguments to standard double-dash format
///
/// Handles both `-proxy value` and `-proxy=value`.
fn normalize_args<I: IntoIterator<Item = String>>(args: I) -> Vec<String> {
    args.into_iter()
        .map(|arg| {
            if arg.starts_with('-') && !arg.starts_with("--") {
                let name = arg.split('=').next().unwrap_or(&arg);
                if GO_STYLE_LONG_OPTIONS.contains(&name) {
                    return format!("-{}", arg);
                }
            }
            arg
        })
        .collect()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "egress-sentinel")]
#[command(version = VERSION)]
#[command(about = "Reports the public IP behind a forward proxy and probes domain reachability")]
struct Args {
    /// Optional YAML configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// HTTP proxy URL to use (empty for direct)
    #[arg(long, env = "SENTINEL_PROXY")]
    proxy: Option<String>,

    /// ISP name for identification
    #[arg(long, env = "SENTINEL_ISP")]
    isp: Option<String>,

    /// Listening port [default: 8080]
    #[arg(short = 'p', long, env = "SENTINEL_PORT")]
    port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long = "bind-address")]
    bind_address: Option<String>,

    /// Seconds between self-checks [default: 60]
    #[arg(long)]
    interval: Option<u64>,

    /// Outbound request timeout in seconds [default: 10]
    #[arg(long)]
    timeout: Option<u64>,

    /// IP echo endpoint used for self-checks
    #[arg(long = "echo-url")]
    echo_url: Option<String>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Test configuration and exit
    #[arg(short = 't', long = "test")]
    test: bool,
}

impl Args {
    /// Layer CLI/env values over the file (or default) configuration
    fn apply(self, config: &mut Config) {
        if let Some(proxy) = self.proxy {
            config.proxy = proxy;
        }
        if let Some(isp) = self.isp {
            config.isp = isp;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind_address) = self.bind_address {
            config.bind_address = bind_address;
        }
        if let Some(interval) = self.interval {
            config.refresh_interval = interval;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout = timeout;
        }
        if let Some(echo_url) = self.echo_url {
            config.echo_url = echo_url;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
    }
}

fn init_logging(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(format!("egress_sentinel={level},tower_http={level}")),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get().max(2))
        .enable_all()
        .thread_name("sentinel-worker")
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let args = Args::parse_from(normalize_args(std::env::args()));

    let mut config = match &args.config {
        Some(path) => Config::load(path).await?,
        None => Config::default(),
    };
    let log_format = args.log_format;
    let config_path = args.config.clone();
    let test_only = args.test;
    args.apply(&mut config);

    init_logging(&config.log_level, log_format)?;

    info!("Egress Sentinel v{}", VERSION);
    if let Some(path) = config_path {
        info!("Loaded configuration from: {}", path.display());
    }
    info!(
        "Checking with the following proxy: {}",
        config.proxy_url().unwrap_or("<direct>")
    );

    let sentinel = match Sentinel::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to initialize sentinel: {}", e);
            std::process::exit(1);
        }
    };

    if test_only {
        info!("Configuration test passed");
        return Ok(());
    }

    if let Err(e) = sentinel.run().await {
        error!("Sentinel error: {}", e);
        std::process::exit(1);
    }

    info!("Application stopped");
    Ok(())
}
