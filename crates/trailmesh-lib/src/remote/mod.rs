//! Remote routing services and the router contract they share with the
//! offline assembler.
//!
//! A [`RemoteBackend`] knows one service's URL, payload and response shapes.
//! [`RemoteRouter`] wraps a backend with a per-instance route cache, request
//! coalescing and a single fallback attempt on another [`Router`].

mod cache;
mod ors;
mod osrm;
mod router;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::assembler::RouteOptions;
use crate::config::RoutingConfig;
use crate::error::{Error, Result};
use crate::geo::Coordinate;
use crate::route::Route;

pub use cache::{cache_key, RouteCache};
pub use ors::{surface_name, way_type_name, OrsBackend};
pub use osrm::OsrmBackend;
pub use router::RemoteRouter;

/// Default user agent for remote requests.
pub const DEFAULT_USER_AGENT: &str = concat!("trailmesh/", env!("CARGO_PKG_VERSION"));

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for a remote routing service.
#[derive(Clone)]
pub struct RemoteConfig {
    /// Base URL of the service, e.g. `"http://localhost:5000"`.
    pub base_url: String,
    /// Sent as the `Authorization` header when present.
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl RemoteConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Base URL without a trailing slash.
    pub(crate) fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub(crate) fn build_client(&self) -> Result<Client> {
        Client::builder()
            .user_agent(&self.user_agent)
            .connect_timeout(self.timeout)
            .timeout(self.timeout)
            .build()
            .map_err(|err| Error::Config {
                message: format!("failed to build HTTP client: {err}"),
            })
    }
}

/// Anything that can answer a route request: the offline assembler or a
/// remote router.
#[async_trait]
pub trait Router: Send + Sync {
    /// Short name used in logs and in `fallback_source`.
    fn name(&self) -> &str;

    fn supports_mode(&self, mode: &str) -> bool;

    async fn get_route(
        &self,
        waypoints: &[Coordinate],
        options: &RouteOptions,
    ) -> Result<Option<Route>>;
}

/// One remote routing service.
#[async_trait]
pub trait RemoteBackend: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Whether `mode` maps onto one of the service's profiles.
    fn supports_mode(&self, mode: &str) -> bool;

    /// Fetch and normalize a route. Waypoints are already validated.
    async fn fetch(
        &self,
        waypoints: &[Coordinate],
        mode: &str,
        config: &RoutingConfig,
    ) -> Result<Route>;
}

/// Map a transport failure: timeouts and connection errors mean no response
/// arrived; anything else is the service's fault.
pub(crate) fn transport_error(service: &str, url: &str, error: &reqwest::Error) -> Error {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        return Error::NetworkUnavailable {
            message: format!("{service} at {url}: {error}"),
        };
    }
    match error.status() {
        Some(status) => Error::remote(service, format!("{url} returned {status}")),
        None => Error::remote(service, format!("{url}: {error}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_api_key() {
        let config = RemoteConfig::new("https://ors.example.com/").with_api_key("secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
        assert_eq!(config.base(), "https://ors.example.com");
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = RemoteConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("trailmesh/"));
    }
}
