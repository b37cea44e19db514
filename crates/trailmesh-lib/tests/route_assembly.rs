mod common;

use trailmesh_lib::{
    Coordinate, NetworkFeature, PortionSource, RouteAssembler, RouteOptions, RoutingConfig,
};

use common::{baseline_assembler, grid, line, strict_config};

#[test]
fn same_edge_waypoints_need_no_search() {
    // 0.0018 degrees of longitude at the equator is about 200 m.
    let features = [line(&[(0.0, 0.0), (0.0018, 0.0)])];
    let router = RouteAssembler::from_features(&features, RoutingConfig::default());
    let waypoints = [Coordinate::new(0.000_36, 0.0), Coordinate::new(0.001_44, 0.0)];

    let route = router
        .get_route(&waypoints, &RouteOptions::new("foot"))
        .expect("routable")
        .expect("two waypoints");

    assert_eq!(router.engine().search_count(), 0);
    let distance_m = route.properties.summary.distance_m;
    assert!((distance_m - 120.0).abs() < 1.0, "got {distance_m}");
    assert_eq!(route.legs().len(), 1);
    assert!(route
        .properties
        .segment_metadata
        .iter()
        .any(|entry| entry.source == PortionSource::Network));
}

#[test]
fn preserved_leg_survives_moving_the_middle_waypoint() {
    let features = [line(&[
        (0.0, 0.0),
        (0.002, 0.0),
        (0.004, 0.0),
        (0.006, 0.0),
        (0.008, 0.0),
        (0.01, 0.0),
    ])];
    let router = baseline_assembler(&features, RoutingConfig::default());
    let options = RouteOptions::new("foot");
    let first_waypoints = [
        Coordinate::new(0.0005, 0.0002),
        Coordinate::new(0.005, 0.0002),
        Coordinate::new(0.0095, 0.0002),
    ];
    let first = router
        .get_route(&first_waypoints, &options)
        .expect("routable")
        .expect("route");
    let snapshots = first.to_leg_snapshots();

    // About 11 m east: within the anchor tolerance.
    let moved = Coordinate::new(0.0051, 0.0002);
    let second_waypoints = [first_waypoints[0], moved, first_waypoints[2]];
    let second = router
        .get_route(
            &second_waypoints,
            &options.clone().with_preserved(vec![snapshots[0].clone()]),
        )
        .expect("routable")
        .expect("route");

    let first_leg = &first.legs()[0];
    let second_leg = &second.legs()[0];
    let before = &first.coordinates()[..first_leg.coordinate_end];
    let after = &second.coordinates()[..second_leg.coordinate_end];
    assert_eq!(before, after);
    let anchor = second.coordinates()[second_leg.coordinate_end];
    assert_eq!((anchor.lng, anchor.lat), (moved.lng, moved.lat));

    let reused: Vec<_> = second
        .properties
        .segment_metadata
        .iter()
        .filter(|entry| entry.leg_index == 0)
        .collect();
    assert_eq!(reused.len(), snapshots[0].metadata.len());
    for (entry, original) in reused.iter().zip(&snapshots[0].metadata) {
        assert_eq!(entry.source, PortionSource::Preserved);
        assert_eq!(entry.distance_km, original.distance_km);
        assert_eq!(entry.start_distance_km, original.start_distance_km);
    }

    // The second leg was planned again and starts where the reused one ends.
    let replanned = second
        .properties
        .segment_metadata
        .iter()
        .find(|entry| entry.leg_index == 1)
        .expect("second leg metadata");
    assert_ne!(replanned.source, PortionSource::Preserved);
    assert!((replanned.start_distance_km - first_leg.distance / 1000.0).abs() < 1e-9);
}

#[test]
fn preserved_leg_is_ignored_when_its_waypoints_moved_too_far() {
    let features = [line(&[(0.0, 0.0), (0.005, 0.0), (0.01, 0.0)])];
    let router = baseline_assembler(&features, RoutingConfig::default());
    let options = RouteOptions::new("foot");
    let waypoints = [Coordinate::new(0.0005, 0.0), Coordinate::new(0.0095, 0.0)];
    let first = router.get_route(&waypoints, &options).expect("ok").expect("route");

    let far = [Coordinate::new(0.0005, 0.0), Coordinate::new(0.0085, 0.0)];
    let second = router
        .get_route(&far, &options.with_preserved(first.to_leg_snapshots()))
        .expect("ok")
        .expect("route");
    assert!(second
        .properties
        .segment_metadata
        .iter()
        .all(|entry| entry.source != PortionSource::Preserved));
}

#[test]
fn cycling_only_edges_are_never_used_on_foot() {
    let features = [
        line(&[(0.0, 0.0), (0.002, 0.0)]).with_modes(["cycling"]),
        line(&[(0.0, 0.0), (0.0, 0.001), (0.002, 0.001), (0.002, 0.0)]),
    ];
    let router = baseline_assembler(&features, strict_config());
    let waypoints = [Coordinate::new(0.0, 0.0), Coordinate::new(0.002, 0.0)];

    let cycling = router
        .get_route(&waypoints, &RouteOptions::new("cycling"))
        .expect("ok")
        .expect("route");
    let hiking = router
        .get_route(&waypoints, &RouteOptions::new("foot-hiking"))
        .expect("ok")
        .expect("route");

    assert!(cycling.distance_km() < 0.25);
    assert!(hiking.distance_km() > 0.4);
    assert!(hiking
        .coordinates()
        .iter()
        .any(|point| (point.lat - 0.001).abs() < 1e-9));
}

#[test]
fn no_compatible_path_is_an_error_without_direct_fallback() {
    let features = [line(&[(0.0, 0.0), (0.002, 0.0)]).with_modes(["cycling"])];
    let router = baseline_assembler(&features, strict_config());
    let error = router
        .get_route(
            &[Coordinate::new(0.0, 0.0), Coordinate::new(0.002, 0.0)],
            &RouteOptions::new("foot-hiking"),
        )
        .expect_err("no foot edges");
    assert_eq!(error.kind(), "no_path");
}

#[test]
fn mode_without_edges_is_no_path_even_with_direct_fallback() {
    let features = [line(&[(0.0, 0.0), (0.002, 0.0)]).with_modes(["cycling"])];
    let router = baseline_assembler(&features, RoutingConfig::default());
    let error = router
        .get_route(
            &[Coordinate::new(0.0, 0.0), Coordinate::new(0.002, 0.0)],
            &RouteOptions::new("foot-hiking"),
        )
        .expect_err("no foot edges");
    assert_eq!(error.kind(), "no_path");
    assert!(error.to_string().contains("foot-hiking"));
}

#[test]
fn mode_incompatible_link_is_no_path_even_with_direct_fallback() {
    let features = [
        line(&[(0.0, 0.0), (0.001, 0.0)]),
        line(&[(0.001, 0.0), (0.002, 0.0)]).with_modes(["cycling"]),
        line(&[(0.002, 0.0), (0.003, 0.0)]),
    ];
    let router = baseline_assembler(&features, RoutingConfig::default());
    let error = router
        .get_route(
            &[Coordinate::new(0.0, 0.0), Coordinate::new(0.003, 0.0)],
            &RouteOptions::new("foot-hiking"),
        )
        .expect_err("only a cycling link joins the two halves");
    assert_eq!(error.kind(), "no_path");
}

#[test]
fn request_mode_is_matched_case_insensitively() {
    let features = [line(&[(0.0, 0.0), (0.002, 0.0)]).with_modes(["cycling"])];
    let router = baseline_assembler(&features, RoutingConfig::default());
    let route = router
        .get_route(
            &[Coordinate::new(0.0, 0.0), Coordinate::new(0.002, 0.0)],
            &RouteOptions::new(" Cycling "),
        )
        .expect("routable")
        .expect("route");
    assert!(route.warnings().is_empty());
    assert!(route
        .properties
        .segment_metadata
        .iter()
        .all(|entry| entry.source != PortionSource::Direct));
}

#[test]
fn disconnected_components_degrade_to_a_direct_leg() {
    let features = [
        line(&[(0.0, 0.0), (0.001, 0.0)]),
        line(&[(0.003, 0.0), (0.004, 0.0)]),
    ];
    let router = baseline_assembler(&features, RoutingConfig::default());
    let route = router
        .get_route(
            &[Coordinate::new(0.0, 0.0), Coordinate::new(0.004, 0.0)],
            &RouteOptions::new("foot"),
        )
        .expect("direct fallback")
        .expect("route");
    assert_eq!(route.warnings().len(), 1);
    assert_eq!(route.properties.segment_metadata[0].source, PortionSource::Direct);
    assert_eq!(route.coordinates().len(), 2);
}

#[test]
fn reversed_waypoints_cover_the_same_distance() {
    let router = RouteAssembler::from_features(&grid(6, 0.001), RoutingConfig::default());
    let options = RouteOptions::new("foot");
    let forward = [Coordinate::new(0.0003, 0.0011), Coordinate::new(0.0042, 0.0047)];
    let backward = [forward[1], forward[0]];

    let there = router.get_route(&forward, &options).expect("ok").expect("route");
    let back = router.get_route(&backward, &options).expect("ok").expect("route");
    assert!((there.distance_km() - back.distance_km()).abs() < 1e-9);
}

#[test]
fn repeated_requests_return_equal_independent_routes() {
    let router = RouteAssembler::from_features(&grid(4, 0.001), RoutingConfig::default());
    let options = RouteOptions::default();
    let waypoints = [
        Coordinate::new(0.0, 0.0),
        Coordinate::new(0.0025, 0.001),
        Coordinate::new(0.003, 0.003),
    ];

    let mut first = router.get_route(&waypoints, &options).expect("ok").expect("route");
    let second = router.get_route(&waypoints, &options).expect("ok").expect("route");
    assert_eq!(first, second);

    first.properties.warnings.push("edited".into());
    first.geometry.coordinates.clear();
    assert!(second.warnings().is_empty());
    assert!(!second.coordinates().is_empty());
}

#[test]
fn every_leg_indexes_its_geometry() {
    let router = RouteAssembler::from_features(&grid(5, 0.001), RoutingConfig::default());
    let waypoints = [
        Coordinate::new(0.0, 0.0),
        Coordinate::new(0.002, 0.0015),
        Coordinate::new(0.004, 0.004),
        Coordinate::new(0.0005, 0.0035),
    ];
    let route = router
        .get_route(&waypoints, &RouteOptions::new("foot"))
        .expect("ok")
        .expect("route");

    assert_eq!(route.legs().len(), 3);
    for (index, leg) in route.legs().iter().enumerate() {
        assert_eq!((leg.start_index, leg.end_index), (index, index + 1));
        assert!(leg.coordinate_start <= leg.coordinate_end);
        assert!(leg.duration > 0.0);
    }
    let last = route.legs().last().expect("legs");
    assert_eq!(last.coordinate_end, route.coordinates().len() - 1);

    let total: f64 = route.legs().iter().map(|leg| leg.distance).sum();
    assert!((total - route.properties.summary.distance_m).abs() < 1e-6);
}

#[test]
fn cost_multiplier_steers_the_search() {
    let features = [
        line(&[(0.0, 0.0), (0.002, 0.0)]).with_cost_multiplier(5.0),
        line(&[(0.0, 0.0), (0.0, 0.0005), (0.002, 0.0005), (0.002, 0.0)]),
    ];
    let router = baseline_assembler(&features, RoutingConfig::default());
    let route = router
        .get_route(
            &[Coordinate::new(0.0, 0.0), Coordinate::new(0.002, 0.0)],
            &RouteOptions::new("foot"),
        )
        .expect("ok")
        .expect("route");
    assert!(route.distance_km() > 0.3);
    assert!(route
        .properties
        .coordinate_metadata
        .iter()
        .all(|entry| (entry.cost_multiplier - 1.0).abs() < 1e-9));
}

#[test]
fn unrestricted_mode_uses_every_edge() {
    let features: Vec<NetworkFeature> =
        vec![line(&[(0.0, 0.0), (0.002, 0.0)]).with_modes(["cycling"])];
    let router = baseline_assembler(&features, strict_config());
    let route = router
        .get_route(
            &[Coordinate::new(0.0, 0.0), Coordinate::new(0.002, 0.0)],
            &RouteOptions::new(""),
        )
        .expect("ok")
        .expect("route");
    assert!(route.warnings().is_empty());
    assert!(route.distance_km() < 0.25);
}
