//! Outbound HTTP client bound to zero or one forward proxy

use crate::config::Config;
use crate::{Error, Result, VERSION};
use reqwest::redirect::Policy;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Redirect hops followed before a request counts as failed
pub const MAX_REDIRECTS: usize = 10;

/// Shared outbound client
///
/// Built once at startup and cloned into every component that issues
/// requests. Clones share one connection pool. There is no way to change
/// the proxy after construction.
#[derive(Clone, Debug)]
pub struct ProxyClient {
    inner: reqwest::Client,
    proxy: Option<String>,
    timeout: Duration,
}

impl ProxyClient {
    /// Build a client. `proxy` of `None` (or blank) means direct connections.
    ///
    /// A proxy URL that does not parse, or whose scheme cannot be proxied
    /// through, is a configuration error.
    pub fn new(proxy: Option<&str>, timeout: Duration) -> Result<Self> {
        let proxy = proxy.map(str::trim).filter(|p| !p.is_empty());

        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .user_agent(format!("egress-sentinel/{}", VERSION));

        match proxy {
            Some(raw) => {
                let url = Url::parse(raw)
                    .map_err(|e| Error::config(format!("invalid proxy URL {:?}: {}", raw, e)))?;
                let proxy = reqwest::Proxy::all(url)
                    .map_err(|e| Error::config(format!("unsupported proxy URL {:?}: {}", raw, e)))?;
                builder = builder.proxy(proxy);
                info!("Outbound requests go through proxy {}", raw);
            }
            None => {
                // Ignore HTTP_PROXY and friends: empty means direct
                builder = builder.no_proxy();
                info!("Outbound requests use direct connections");
            }
        }

        let inner = builder.build()?;

        Ok(ProxyClient {
            inner,
            proxy: proxy.map(str::to_string),
            timeout,
        })
    }

    /// Build from the startup configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.proxy_url(), config.request_timeout())
    }

    /// Configured proxy URL, `None` when connecting directly
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue a GET, following redirects
    pub async fn get(&self, url: &str) -> std::result::Result<reqwest::Response, reqwest::Error> {
        debug!("GET {}", url);
        self.inner.get(url).send().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_client() {
        let client = ProxyClient::new(None, Duration::from_secs(10)).unwrap();
        assert!(client.proxy().is_none());
        assert_eq!(client.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_blank_proxy_is_direct() {
        let client = ProxyClient::new(Some("  "), Duration::from_secs(10)).unwrap();
        assert!(client.proxy().is_none());
    }

    #[test]
    fn test_http_proxy_client() {
        let client = ProxyClient::new(Some("http://127.0.0.1:3128"), Duration::from_secs(5)).unwrap();
        assert_eq!(client.proxy(), Some("http://127.0.0.1:3128"));
    }

    #[test]
    fn test_invalid_proxy_is_config_error() {
        let err = ProxyClient::new(Some("::bogus::"), Duration::from_secs(10)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_config() {
        let config = Config {
            proxy: "http://proxy.internal:8080".to_string(),
            request_timeout: 3,
            ..Config::default()
        };
        let client = ProxyClient::from_config(&config).unwrap();
        assert_eq!(client.proxy(), Some("http://proxy.internal:8080"));
        assert_eq!(client.timeout(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_user_agent_header() {
        use wiremock::matchers::{header, method};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let user_agent = format!("egress-sentinel/{}", VERSION);
        Mock::given(method("GET"))
            .and(header("user-agent", user_agent.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = ProxyClient::new(None, Duration::from_secs(5)).unwrap();
        let response = client.get(&server.uri()).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }
}
