mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use trailmesh_lib::{
    Coordinate, OrsBackend, OsrmBackend, RemoteConfig, RemoteRouter, RouteAssembler, RouteOptions,
    Router, RoutingConfig,
};
use wiremock::matchers::{body_partial_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{line, osrm_body, remote_waypoints};

fn offline_fallback(points: &[(f64, f64)]) -> Arc<dyn Router> {
    Arc::new(RouteAssembler::from_features(
        &[line(points)],
        RoutingConfig::default(),
    ))
}

#[tokio::test]
async fn osrm_response_is_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/route/v1/foot/7,46;7\.01,46$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(osrm_body()))
        .expect(1)
        .mount(&server)
        .await;

    let backend = OsrmBackend::new(RemoteConfig::new(server.uri())).expect("client");
    let router = RemoteRouter::new(backend, RoutingConfig::default());
    let route = router
        .get_route(&remote_waypoints(), &RouteOptions::new("foot-hiking"))
        .await
        .expect("remote route")
        .expect("two waypoints");

    assert_eq!(route.properties.engine, "osrm");
    assert_eq!(route.coordinates().len(), 3);
    assert_eq!(route.legs()[0].duration, 550.0);
    assert!((route.properties.summary.distance_m - 770.0).abs() < 1e-9);
    assert!(route.properties.fallback_source.is_none());
}

#[tokio::test]
async fn ors_request_and_extras_are_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/directions/foot-hiking/geojson"))
        .and(header("authorization", "test-key"))
        .and(body_partial_json(json!({
            "coordinates": [[7.0, 46.0], [7.01, 46.0]],
            "elevation": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "LineString", "coordinates": [
                    [7.0, 46.0, 1200.0], [7.005, 46.0, 1260.0], [7.01, 46.0, 1250.0]
                ]},
                "properties": {
                    "segments": [{"distance": 770.0, "duration": 690.0}],
                    "way_points": [0, 2],
                    "extras": {
                        "surface": {"values": [[0, 1, 17], [1, 2, 12]]},
                        "waytype": {"values": [[0, 2, 5]]}
                    }
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend =
        OrsBackend::new(RemoteConfig::new(server.uri()).with_api_key("test-key")).expect("client");
    let router = RemoteRouter::new(backend, RoutingConfig::default());
    let route = router
        .get_route(&remote_waypoints(), &RouteOptions::new("foot-hiking"))
        .await
        .expect("remote route")
        .expect("two waypoints");

    assert_eq!(route.properties.engine, "ors");
    assert!((route.properties.summary.ascent_m - 60.0).abs() < 1e-9);
    assert!((route.properties.summary.descent_m - 10.0).abs() < 1e-9);
    let surfaces: Vec<_> = route
        .properties
        .coordinate_metadata
        .iter()
        .filter_map(|entry| entry.attributes.as_ref()?.surface.clone())
        .collect();
    assert_eq!(surfaces, vec!["grass".to_string(), "ground".to_string()]);
    assert!(route
        .properties
        .coordinate_metadata
        .iter()
        .all(|entry| entry.attributes.as_ref().and_then(|a| a.way_type.as_deref()) == Some("track")));
}

#[tokio::test]
async fn unreachable_service_falls_back_offline() {
    let backend = OsrmBackend::new(
        RemoteConfig::new("http://127.0.0.1:9").with_timeout(Duration::from_secs(2)),
    )
    .expect("client");
    let router = RemoteRouter::new(backend, RoutingConfig::default())
        .with_fallback(offline_fallback(&[(7.0, 46.0), (7.005, 46.0), (7.01, 46.0)]));

    let route = router
        .get_route(&remote_waypoints(), &RouteOptions::new("foot"))
        .await
        .expect("fallback succeeds")
        .expect("route");

    assert_eq!(route.properties.fallback_source.as_deref(), Some("osrm"));
    assert_ne!(route.properties.engine, "osrm");
    assert_eq!(route.warnings().len(), 1);
    assert!(route.warnings()[0].contains("osrm"));
}

#[tokio::test]
async fn unreachable_service_without_fallback_is_unavailable() {
    let backend = OsrmBackend::new(
        RemoteConfig::new("http://127.0.0.1:9").with_timeout(Duration::from_secs(2)),
    )
    .expect("client");
    let router = RemoteRouter::new(backend, RoutingConfig::default());
    let error = router
        .get_route(&remote_waypoints(), &RouteOptions::new("foot"))
        .await
        .expect_err("nothing listens on port 9");
    assert_eq!(error.kind(), "network_unavailable");
}

#[tokio::test]
async fn failing_service_and_failing_fallback_report_both() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let backend = OsrmBackend::new(RemoteConfig::new(server.uri())).expect("client");
    // The offline network is far beyond the bridge distance from the waypoints.
    let router = RemoteRouter::new(backend, RoutingConfig::default())
        .with_fallback(offline_fallback(&[(0.0, 0.0), (0.01, 0.0)]));

    let error = router
        .get_route(&remote_waypoints(), &RouteOptions::new("foot"))
        .await
        .expect_err("both fail");
    assert_eq!(error.kind(), "fallback_exhausted");
    let message = error.to_string();
    assert!(message.contains("503"), "{message}");
    assert!(message.contains("no path"), "{message}");
}

#[tokio::test]
async fn concurrent_identical_requests_hit_the_service_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(osrm_body())
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let backend = OsrmBackend::new(RemoteConfig::new(server.uri())).expect("client");
    let router = RemoteRouter::new(backend, RoutingConfig::default());
    let options = RouteOptions::new("foot");
    let waypoints = remote_waypoints();

    let (a, b, c) = tokio::join!(
        router.get_route(&waypoints, &options),
        router.get_route(&waypoints, &options),
        router.get_route(&waypoints, &options),
    );
    let a = a.expect("ok").expect("route");
    assert_eq!(Some(&a), b.expect("ok").as_ref());
    assert_eq!(Some(&a), c.expect("ok").as_ref());

    // Served from the cache; a mutated copy does not leak back.
    let mut cached = router
        .get_route(&waypoints, &options)
        .await
        .expect("ok")
        .expect("route");
    cached.geometry.coordinates.clear();
    let again = router
        .get_route(&waypoints, &options)
        .await
        .expect("ok")
        .expect("route");
    assert_eq!(again, a);
}

#[tokio::test]
async fn different_modes_are_cached_separately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(osrm_body()))
        .expect(2)
        .mount(&server)
        .await;

    let backend = OsrmBackend::new(RemoteConfig::new(server.uri())).expect("client");
    let router = RemoteRouter::new(backend, RoutingConfig::default());
    let waypoints = remote_waypoints();
    for mode in ["foot", "cycling", "foot"] {
        router
            .get_route(&waypoints, &RouteOptions::new(mode))
            .await
            .expect("ok");
    }
    assert_eq!(router.cache().len(), 2);
}

#[tokio::test]
async fn remote_router_and_assembler_share_the_router_contract() {
    let routers: Vec<Arc<dyn Router>> = vec![
        offline_fallback(&[(7.0, 46.0), (7.01, 46.0)]),
        Arc::new(RemoteRouter::new(
            OsrmBackend::new(RemoteConfig::default()).expect("client"),
            RoutingConfig::default(),
        )),
    ];
    for router in &routers {
        assert!(router.supports_mode("foot"));
        let single = router
            .get_route(&[Coordinate::new(7.0, 46.0)], &RouteOptions::default())
            .await
            .expect("no error");
        assert!(single.is_none(), "{} returned a route", router.name());
    }
}
