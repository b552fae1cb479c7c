//! Egress Sentinel - egress identity monitor
//!
//! Keeps track of the public IP the agent egresses from (optionally through
//! a forward proxy) and answers ad-hoc "is this domain reachable from here"
//! questions over a small JSON API.
//!
//! # Architecture
//!
//! ```text
//!      +-------------+   read    +---------------+
//!      |  hub/ (API) |---------->|    status/    |
//!      +------+------+           | (store+loop)  |
//!             |                  +-------+-------+
//!             | /check                   | self-check
//!             v                          v
//!      +-------------------------------------------+
//!      |          probe/ (ReachabilityProbe)       |
//!      +---------------------+---------------------+
//!                            |
//!                    +-------v-------+
//!                    |   outbound/   |
//!                    | (ProxyClient) |
//!                    +---------------+
//! ```

pub mod common;
pub mod config;
pub mod hub;
pub mod outbound;
pub mod probe;
pub mod status;

pub use common::error::{Error, Result};
pub use config::Config;

use hub::AppState;
use outbound::ProxyClient;
use probe::{EchoSource, ReachabilityProbe};
use status::{RefreshLoop, StatusStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Crate version, reported by `/version` and the User-Agent
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sentinel instance wiring all components together
pub struct Sentinel {
    config: Config,
    store: Arc<StatusStore>,
    probe: ReachabilityProbe,
    refresher: Arc<RefreshLoop>,
    shutdown: broadcast::Sender<()>,
    /// Latched once shutdown is requested, so a request made before
    /// `run_on` subscribes is not lost
    stopping: AtomicBool,
}

impl Sentinel {
    /// Create a new Sentinel from configuration
    ///
    /// Fails if the configuration is invalid or the proxy cannot be honored.
    pub fn new(config: Config) -> Result<Self> {
        info!("Initializing Egress Sentinel v{}", VERSION);
        config.validate()?;

        let client = ProxyClient::from_config(&config)?;
        let probe = ReachabilityProbe::new(client);

        let store = Arc::new(StatusStore::new(
            config.isp.clone(),
            config.proxy_url().unwrap_or_default().to_string(),
        ));

        let source = Arc::new(EchoSource::new(probe.clone(), config.echo_url.clone()));
        let refresher = Arc::new(RefreshLoop::new(
            source,
            store.clone(),
            config.refresh_interval(),
        ));
        info!(
            "Self-check against {} every {:?}",
            config.echo_url,
            config.refresh_interval()
        );

        let (shutdown, _) = broadcast::channel(1);

        Ok(Sentinel {
            config,
            store,
            probe,
            refresher,
            shutdown,
            stopping: AtomicBool::new(false),
        })
    }

    /// Bind the configured address and run until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr()?).await?;
        self.run_on(listener).await
    }

    /// Run on an already bound listener until SIGINT/SIGTERM or
    /// [`Sentinel::shutdown`]
    pub async fn run_on(&self, listener: TcpListener) -> Result<()> {
        info!("Starting sentinel...");

        let refresh_handle = {
            let refresher = self.refresher.clone();
            let shutdown_rx = self.shutdown.subscribe();
            tokio::spawn(async move { refresher.run(shutdown_rx).await })
        };

        let server_shutdown = self.shutdown.subscribe();

        if self.stopping.load(Ordering::SeqCst) {
            let _ = self.shutdown.send(());
        }

        let signal_handle = {
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                match wait_for_signal().await {
                    Ok(()) => {
                        info!("Received shutdown signal");
                        let _ = shutdown.send(());
                    }
                    Err(e) => warn!("Failed to listen for shutdown signals: {}", e),
                }
            })
        };

        let served = hub::serve(listener, self.app_state(), server_shutdown).await;

        // Server may have exited on its own; make sure the loop follows
        let _ = self.shutdown.send(());
        signal_handle.abort();
        if let Err(e) = refresh_handle.await {
            warn!("Refresh loop ended abnormally: {}", e);
        }

        info!("Sentinel stopped");
        served
    }

    /// Trigger the same graceful shutdown a signal would
    ///
    /// Takes effect even when called before [`Sentinel::run_on`].
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.shutdown.send(());
    }

    /// Create AppState for the REST API
    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.store.clone(),
            self.probe.clone(),
            self.config.max_concurrent_checks,
        )
    }

    /// Get current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get status store reference
    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }
}

/// Resolve on SIGINT or (on unix) SIGTERM
async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_new_rejects_bad_proxy() {
        let config = Config {
            proxy: "::nope::".to_string(),
            ..Config::default()
        };
        assert!(matches!(Sentinel::new(config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_initial_state() {
        let config = Config {
            isp: "lab-isp".to_string(),
            proxy: "http://127.0.0.1:3128".to_string(),
            ..Config::default()
        };
        let sentinel = Sentinel::new(config).unwrap();
        let record = sentinel.store().read();
        assert!(!record.online);
        assert_eq!(record.isp, "lab-isp");
        assert_eq!(record.proxy_endpoint, "http://127.0.0.1:3128");
    }

    #[tokio::test]
    async fn test_shutdown_before_run_is_honored() {
        let sentinel = Sentinel::new(Config {
            echo_url: "http://127.0.0.1:9/ip".to_string(),
            ..Config::default()
        })
        .unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        sentinel.shutdown();

        let stopped = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            sentinel.run_on(listener),
        )
        .await;
        tokio_test::assert_ok!(tokio_test::assert_ok!(stopped));
    }
}
