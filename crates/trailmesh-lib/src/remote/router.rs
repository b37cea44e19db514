use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{cache_key, RemoteBackend, RouteCache, Router};
use crate::assembler::{validate_waypoints, RouteAssembler, RouteOptions};
use crate::config::RoutingConfig;
use crate::error::{Error, Result};
use crate::geo::Coordinate;
use crate::route::Route;

type InFlight = Arc<OnceCell<Result<Route>>>;

/// A remote backend with caching, request coalescing and one fallback.
///
/// Identical requests (same cache key) issued while a fetch is running share
/// that fetch and all receive its outcome. Successful routes are cached for
/// the lifetime of the router; errors are never cached.
pub struct RemoteRouter<B> {
    backend: B,
    config: RoutingConfig,
    fallback: Option<Arc<dyn Router>>,
    cache: RouteCache,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

impl<B: fmt::Debug> fmt::Debug for RemoteRouter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteRouter")
            .field("backend", &self.backend)
            .field("fallback", &self.fallback.as_ref().map(|fallback| fallback.name()))
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl<B: RemoteBackend> RemoteRouter<B> {
    pub fn new(backend: B, config: RoutingConfig) -> Self {
        let cache = RouteCache::new(config.cache_capacity);
        Self {
            backend,
            config,
            fallback: None,
            cache,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Router consulted once when the backend fails.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn Router>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> &RouteCache {
        &self.cache
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<String, InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route through `waypoints`. Fewer than two waypoints yield `Ok(None)`.
    pub async fn get_route(
        &self,
        waypoints: &[Coordinate],
        options: &RouteOptions,
    ) -> Result<Option<Route>> {
        if waypoints.len() < 2 {
            return Ok(None);
        }
        validate_waypoints(waypoints)?;

        let key = cache_key(&options.mode, waypoints, &options.preserved_segments);
        if let Some(route) = self.cache.get(&key) {
            debug!(service = self.backend.name(), "route cache hit");
            return Ok(Some(route));
        }

        let cell = {
            let mut in_flight = self.in_flight();
            Arc::clone(
                in_flight
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };
        let outcome = cell
            .get_or_init(|| async {
                if let Some(route) = self.cache.get(&key) {
                    return Ok(route);
                }
                let outcome = self.compute(waypoints, options).await;
                if let Ok(route) = &outcome {
                    self.cache.insert(key.clone(), route.clone());
                }
                outcome
            })
            .await
            .clone();

        {
            let mut in_flight = self.in_flight();
            if in_flight
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &cell))
            {
                in_flight.remove(&key);
            }
        }

        outcome.map(Some)
    }

    async fn compute(&self, waypoints: &[Coordinate], options: &RouteOptions) -> Result<Route> {
        let service = self.backend.name();
        let primary = match self
            .backend
            .fetch(waypoints, &options.mode, &self.config)
            .await
        {
            Ok(route) => {
                info!(service, legs = route.legs().len(), "remote route received");
                return Ok(route);
            }
            Err(err) => err,
        };

        let Some(fallback) = self
            .fallback
            .as_ref()
            .filter(|fallback| fallback.supports_mode(&options.mode))
        else {
            warn!(service, error = %primary, "remote routing failed without fallback");
            return Err(primary);
        };

        warn!(
            service,
            fallback = fallback.name(),
            error = %primary,
            "remote routing failed; trying fallback"
        );
        match fallback.get_route(waypoints, options).await {
            Ok(Some(mut route)) => {
                route.properties.fallback_source = Some(service.to_string());
                route.properties.warnings.push(format!(
                    "{service} routing failed ({primary}); route computed by {}",
                    fallback.name()
                ));
                Ok(route)
            }
            Ok(None) => Err(Error::FallbackExhausted {
                primary: Box::new(primary),
                fallback: Box::new(Error::no_path(format!(
                    "{} returned no route",
                    fallback.name()
                ))),
            }),
            Err(err) => Err(Error::FallbackExhausted {
                primary: Box::new(primary),
                fallback: Box::new(err),
            }),
        }
    }
}

#[async_trait]
impl<B: RemoteBackend> Router for RemoteRouter<B> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn supports_mode(&self, mode: &str) -> bool {
        self.backend.supports_mode(mode)
    }

    async fn get_route(
        &self,
        waypoints: &[Coordinate],
        options: &RouteOptions,
    ) -> Result<Option<Route>> {
        RemoteRouter::get_route(self, waypoints, options).await
    }
}

#[async_trait]
impl Router for RouteAssembler {
    fn name(&self) -> &str {
        self.engine_source().as_str()
    }

    fn supports_mode(&self, mode: &str) -> bool {
        RouteAssembler::supports_mode(self, mode)
    }

    async fn get_route(
        &self,
        waypoints: &[Coordinate],
        options: &RouteOptions,
    ) -> Result<Option<Route>> {
        RouteAssembler::get_route(self, waypoints, options)
    }
}
