//! Integration tests for the full reactor step.
//!
//! These tests verify:
//! 1. Without settling or loads, phosphorus only changes by the sediment return
//! 2. The step monitor stays healthy over a day of forcing
//! 3. A JSON configuration drives a reactor end to end
//! 4. A fast current at the default step is substepped and stays bounded

use wq_rs::analysis::{MonitorThresholds, StepMonitor};
use wq_rs::benthic::SettlingConfig;
use wq_rs::biology::{GroupConfig, PhytoplanktonConfig};
use wq_rs::chemistry::Species;
use wq_rs::config::{ClockConfig, EngineConfig, MixingMode};
use wq_rs::mesh::TriangularMesh;
use wq_rs::error::EngineError;
use wq_rs::reactor::{Forcing, Reactor};
use wq_rs::state::{Field, FieldArena, Tracer};
use wq_rs::transport::ElementVelocity;
use wq_rs::types::NodeIndex;
use wq_rs::vertical::Layers;

const TOL: f64 = 1e-9;

fn create_basin() -> (TriangularMesh, Layers) {
    let mesh = TriangularMesh::rectangle_with_depth(4, 3, 400.0, 300.0, |x, _| 6.0 + x / 100.0).unwrap();
    let layers = Layers::uniform(4).unwrap();
    (mesh, layers)
}

fn initial_fields(n: usize, l: usize) -> FieldArena {
    let mut fields = FieldArena::new(n, l);
    for (tracer, value) in [
        (Tracer::Oxygen, 7.5),
        (Tracer::Phosphate, 0.04),
        (Tracer::LabileDop, 0.01),
        (Tracer::LabilePop, 0.02),
        (Tracer::Ammonium, 0.1),
        (Tracer::Nitrate, 0.3),
        (Tracer::LabilePon, 0.05),
        (Tracer::Silicate, 0.8),
        (Tracer::LabilePoc, 0.5),
    ] {
        fields
            .insert(tracer, Field::from_fn(n, l, |node, k| value * (1.0 + 0.05 * ((node + k) % 3) as f64)))
            .unwrap();
    }
    fields
}

/// Groups and particles that never leave the water column.
fn suspended_config() -> EngineConfig {
    let groups = vec![
        GroupConfig::diatom(0).with_settling(0.0).with_initial_carbon(0.2),
        GroupConfig::flagellate(1).with_settling(0.0).with_initial_carbon(0.1),
    ];
    EngineConfig::default()
        .with_phytoplankton(PhytoplanktonConfig {
            groups,
            ..PhytoplanktonConfig::default()
        })
        .with_settling(
            SettlingConfig::default()
                .with_organic_velocity(0.0)
                .with_sorbed_velocity(0.0),
        )
        .with_clock(ClockConfig::default().with_dt(900))
}

fn create_forcing(mesh: &TriangularMesh, layers: &Layers) -> Forcing {
    let velocity = ElementVelocity::from_fn(mesh, layers.n_layers(), |_, y, k| {
        (0.05 * (y / 300.0) / (1.0 + k as f64), 0.0)
    });
    Forcing::still(mesh, layers, 16.0, 31.0)
        .with_velocity(velocity)
        .with_irradiance(250.0)
        .with_suspended(5.0)
        .with_turbulence(5e-4)
}

#[test]
fn test_phosphorus_changes_only_by_sediment_return() {
    let (mesh, layers) = create_basin();
    let (n, l) = (mesh.n_nodes(), layers.n_layers());
    // No advection: the depth gradient makes any discrete flow divergent
    let forcing = Forcing::still(&mesh, &layers, 16.0, 31.0)
        .with_irradiance(250.0)
        .with_suspended(5.0)
        .with_turbulence(5e-4);
    let areas: Vec<f64> = (0..n).map(|i| mesh.node_area(NodeIndex::new(i))).collect();
    let mut reactor = Reactor::new(mesh, layers, suspended_config(), initial_fields(n, l)).unwrap();

    let dt = reactor.clock().dt() as f64;
    for _ in 0..12 {
        let report = reactor.step(&forcing).unwrap();
        let returned: f64 = report
            .return_flux
            .iter()
            .zip(&areas)
            .map(|(flux, area)| flux.phosphate * area * dt)
            .sum();
        let before = report.budget_before.total(Species::Phosphorus);
        let change = report.budget_after.total(Species::Phosphorus) - before;
        assert!(
            (change - returned).abs() < TOL * before,
            "change {change:e} vs returned {returned:e}"
        );
    }
    for (tracer, field) in reactor.fields().iter() {
        assert!(field.min() >= 0.0, "{tracer} negative");
    }
}

#[test]
fn test_monitor_stays_healthy_over_a_day() {
    let (mesh, layers) = create_basin();
    let (n, l) = (mesh.n_nodes(), layers.n_layers());
    let forcing = create_forcing(&mesh, &layers);
    let config = EngineConfig::default()
        .with_mixing(MixingMode::Dynamic)
        .with_clock(ClockConfig::default().with_dt(1800));
    let mut reactor = Reactor::new(mesh, layers, config, initial_fields(n, l)).unwrap();
    let mut monitor = StepMonitor::new(MonitorThresholds::default());

    let mut days = 0;
    for _ in 0..48 {
        let report = reactor.step(&forcing).unwrap();
        days += usize::from(report.new_day);
        let status = monitor.check(reactor.fields(), Some((&report.budget_before, &report.budget_after)));
        assert!(!status.has_critical_warnings(), "{:?}", status.warnings);
        assert!(!monitor.should_stop());
    }
    assert_eq!(days, 1);
    assert_eq!(monitor.total_checks(), 48);
    assert!(reactor.sediment().column(0).unwrap().temperature > 10.0);
}

#[test]
fn test_json_configuration_drives_reactor() {
    let mut document: serde_json::Value =
        serde_json::from_str(&EngineConfig::default().to_json().unwrap()).unwrap();
    document["chemistry"]["phosphorus"]["hydrolysis_labile"]["kappa"] = 0.5.into();
    document["phytoplankton"]["groups"] = serde_json::json!([]);
    document["transport"]["horizontal_enabled"] = false.into();
    document["clock"] = serde_json::json!({ "dt": 3600, "calendar": "2024-07-01T00:00:00" });
    let config = EngineConfig::from_json(&document.to_string()).unwrap();
    assert_eq!(config.chemistry.phosphorus.hydrolysis_labile.kappa, 0.5);

    let (mesh, layers) = create_basin();
    let (n, l) = (mesh.n_nodes(), layers.n_layers());
    let fields = FieldArena::new(n, l)
        .with(Tracer::Phosphate, Field::constant(n, l, 0.02))
        .unwrap()
        .with(Tracer::LabilePop, Field::constant(n, l, 0.05))
        .unwrap();
    let forcing = Forcing::still(&mesh, &layers, 20.0, 30.0);
    let mut reactor = Reactor::new(mesh, layers, config, fields).unwrap();
    let start = reactor.clock().elapsed();

    for _ in 0..6 {
        reactor.step(&forcing).unwrap();
    }
    assert_eq!(reactor.clock().elapsed() - start, 6 * 3600);
    // Hydrolysis turns particulate into dissolved organic phosphorus
    assert!(reactor.field(Tracer::LabileDop).unwrap().min() > 0.0);
    assert!(reactor.field(Tracer::LabilePop).unwrap().max() < 0.05);
}

/// Silicate front on a 100 m grid with no biomass to take it up.
fn create_front() -> (TriangularMesh, Layers, FieldArena, EngineConfig) {
    let mesh = TriangularMesh::rectangle(4, 4, 400.0, 400.0, 10.0).unwrap();
    let layers = Layers::uniform(4).unwrap();
    let (n, l) = (mesh.n_nodes(), layers.n_layers());
    let west: Vec<bool> = (0..n).map(|i| mesh.coordinates(NodeIndex::new(i)).0 < 200.0).collect();
    let fields = FieldArena::new(n, l)
        .with(Tracer::Silicate, Field::from_fn(n, l, |node, _| if west[node] { 1.0 } else { 0.0 }))
        .unwrap();
    let config = EngineConfig::default().with_phytoplankton(PhytoplanktonConfig {
        groups: Vec::new(),
        ..PhytoplanktonConfig::default()
    });
    (mesh, layers, fields, config)
}

#[test]
fn test_fast_current_is_substepped_without_overshoot() {
    let (mesh, layers, fields, config) = create_front();
    assert_eq!(config.clock.dt, 600);
    // 0.5 m/s over 100 m cells is a Courant number of 3 at 600 s
    let forcing = Forcing::still(&mesh, &layers, 15.0, 30.0)
        .with_velocity(ElementVelocity::uniform(&mesh, &layers, 0.5, 0.0));
    let mut reactor = Reactor::new(mesh, layers, config, fields).unwrap();

    for _ in 0..6 {
        let report = reactor.step(&forcing).unwrap();
        assert!(report.substeps >= 3, "{} substeps", report.substeps);
        let surface = reactor.field(Tracer::Silicate).unwrap().layer(0);
        let (min, max) = surface.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &c| {
            (lo.min(c), hi.max(c))
        });
        assert!(max <= 1.0 + TOL, "surface silicate rose to {max}");
        assert!(min >= -TOL, "surface silicate fell to {min}");
    }
    // The front has moved east
    let silicate = reactor.field(Tracer::Silicate).unwrap();
    assert!(silicate.get(4, 0) > 0.0);
}

#[test]
fn test_still_water_takes_one_substep() {
    let (mesh, layers, fields, config) = create_front();
    let forcing = Forcing::still(&mesh, &layers, 15.0, 30.0);
    let mut reactor = Reactor::new(mesh, layers, config, fields).unwrap();
    assert_eq!(reactor.step(&forcing).unwrap().substeps, 1);
}

#[test]
fn test_unresolvable_current_is_rejected() {
    let (mesh, layers, fields, config) = create_front();
    let forcing = Forcing::still(&mesh, &layers, 15.0, 30.0)
        .with_velocity(ElementVelocity::uniform(&mesh, &layers, 1e4, 0.0));
    let mut reactor = Reactor::new(mesh, layers, config, fields).unwrap();
    assert!(matches!(
        reactor.step(&forcing),
        Err(EngineError::NumericInstability { context: "transport", .. })
    ));
}
