mod common;

use common::{Behavior, FakeNewSteps};
use newsteps_qa_common::config::ConcurrencyConfig;
use newsteps_qa_common::LayerId;
use newsteps_qa_e2e::layers::{build_layer, concurrency_check, health_layer, integration_layer};
use newsteps_qa_e2e::{registry, HttpProbe};
use std::time::Duration;

async fn probe_for(app: &FakeNewSteps) -> HttpProbe {
    HttpProbe::new(&app.base_url(), Duration::from_secs(5)).unwrap()
}

/// Build layer against a healthy deployment
///
/// Every public page answers 200 and every API endpoint one of its
/// declared statuses, including 405 for POST-only routes and 401 for the
/// profile.
#[tokio::test]
async fn build_layer_accepts_declared_statuses() {
    let app = FakeNewSteps::start().await;
    let layer = build_layer(&probe_for(&app).await, registry()).await;

    assert_eq!(layer.layer, LayerId::Build);
    assert_eq!(layer.total(), 19);
    assert_eq!(layer.passed(), layer.total(), "issues: {:?}", layer.issues);
    assert!(layer.issues.is_empty());
    let contact = layer.tests.iter().find(|t| t.name == "api:/api/contact").unwrap();
    assert_eq!(contact.details["status"], 405);
}

#[tokio::test]
async fn integration_layer_reads_health_and_schemas() {
    let app = FakeNewSteps::start().await;
    let layer = integration_layer(&probe_for(&app).await).await;

    assert_eq!(layer.passed(), layer.total(), "issues: {:?}", layer.issues);
    let health = layer.tests.iter().find(|t| t.name == "health_connected").unwrap();
    assert_eq!(health.details["database"], "connected");
    assert_eq!(health.details["environment"], "test");
    let shoes = layer.tests.iter().find(|t| t.name == "schema:/api/shoes").unwrap();
    assert_eq!(shoes.details["count"], 2);
    assert_eq!(
        layer.tests.iter().filter(|t| t.name.starts_with("write:")).count(),
        4
    );
}

#[tokio::test]
async fn disconnected_datastore_is_an_issue() {
    let app = FakeNewSteps::with_behavior(Behavior {
        database: "disconnected",
        ..Default::default()
    })
    .await;
    let layer = integration_layer(&probe_for(&app).await).await;

    let health = layer.tests.iter().find(|t| t.name == "health_connected").unwrap();
    assert!(!health.success);
    assert_eq!(health.error(), Some("data store reported disconnected"));
    assert!(layer.issues.iter().any(|i| i.starts_with("health:")));
}

/// Health layer: budgets hold locally, the admin page redirects, and all
/// seven admin APIs refuse an anonymous caller
#[tokio::test]
async fn health_layer_confirms_admin_protection() {
    let app = FakeNewSteps::start().await;
    let config = app.config();
    let layer = health_layer(
        &probe_for(&app).await,
        registry(),
        &config.thresholds,
        &config.concurrency,
    )
    .await;

    assert_eq!(layer.passed(), layer.total(), "issues: {:?}", layer.issues);
    let admin = layer.tests.iter().find(|t| t.name == "security:/admin").unwrap();
    assert_eq!(admin.details["status"], 302);
    let aggregate = layer
        .tests
        .iter()
        .find(|t| t.name == "security:admin_apis_protected")
        .unwrap();
    assert_eq!(aggregate.details["protected"], 7);
    assert_eq!(layer.tests.last().unwrap().name, "concurrent_health");
}

#[tokio::test]
async fn concurrency_check_reports_every_task() {
    let app = FakeNewSteps::start().await;
    let concurrency = ConcurrencyConfig {
        tasks: 12,
        workers: 3,
        min_success_ratio: 0.8,
    };
    let check = concurrency_check(&probe_for(&app).await, &concurrency).await;

    assert!(check.success);
    assert_eq!(check.details["succeeded"], 12);
    assert_eq!(check.details["ratio"], 1.0);
}
