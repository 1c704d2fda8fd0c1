//! HTTP probe layers: build (L1), integration (L2), and health (L4).
//!
//! Every check lands in the layer as one leaf; nothing here raises. A layer
//! issue is added for each failure an operator should look at.

use newsteps_qa_common::config::{ConcurrencyConfig, ThresholdConfig};
use newsteps_qa_common::report::{PERF_CHECK_PREFIX, SECURITY_CHECK_PREFIX};
use newsteps_qa_common::{details, CheckRecord, LayerId, LayerResult};
use serde_json::Value;
use tracing::{info, warn};

use crate::payloads;
use crate::probe::{Expect, HttpProbe, ProbeRecord, ProbeRequest};
use crate::registry::{paths, Registry};

/// Admin APIs that must refuse an anonymous caller for the aggregate check
pub const MIN_PROTECTED_APIS: usize = 3;

const SETTINGS_KEYS: [&str; 2] = ["maxShoesPerRequest", "shippingFee"];

fn probe_check(name: String, record: &ProbeRecord, expect: &Expect) -> CheckRecord {
    let mut details = record.details();
    details.insert("expected".into(), Value::String(expect.describe()));
    CheckRecord::new(name, record.success, details)
}

fn describe_failure(method: &str, path: &str, record: &ProbeRecord, expect: &Expect) -> String {
    match &record.error {
        Some(error) if record.status == 0 => format!("{} {} unreachable: {}", method, path, error),
        _ => format!(
            "{} {} answered {} (expected {})",
            method,
            path,
            record.status,
            expect.describe()
        ),
    }
}

/// L1: every public page and API endpoint answers with a declared status
pub async fn build_layer(probe: &HttpProbe, registry: &Registry) -> LayerResult {
    let mut layer = LayerResult::new(LayerId::Build);

    let pages = registry.public_pages().into_iter().map(|e| ("page", e));
    let apis = registry.api_endpoints().into_iter().map(|e| ("api", e));
    for (kind, endpoint) in pages.chain(apis) {
        let record = probe.get(endpoint.path, endpoint.expect.clone()).await;
        if !record.success {
            layer.add_issue(describe_failure("GET", endpoint.path, &record, &endpoint.expect));
        }
        layer.record(probe_check(
            format!("{}:{}", kind, endpoint.path),
            &record,
            &endpoint.expect,
        ));
    }

    info!("{}: {}/{} endpoints as expected", LayerId::Build.title(), layer.passed(), layer.total());
    layer
}

/// Data-store state from a health body: a string under a known key, or the
/// `status`/`state` of an object there
pub fn datastore_state(data: &Value) -> Option<&str> {
    ["database", "db", "mongodb", "datastore"]
        .iter()
        .filter_map(|key| data.get(key))
        .find_map(|v| match v {
            Value::String(s) => Some(s.as_str()),
            Value::Object(o) => o
                .get("status")
                .or_else(|| o.get("state"))
                .and_then(Value::as_str),
            _ => None,
        })
}

/// Settings keys missing from the body, looked up at the top level or
/// under `settings`
pub fn missing_settings(data: &Value) -> Vec<&'static str> {
    let scope = data.get("settings").filter(|s| s.is_object()).unwrap_or(data);
    SETTINGS_KEYS
        .iter()
        .copied()
        .filter(|key| scope.get(key).is_none())
        .collect()
}

/// L2: data-store connectivity, minimum schemas, and write endpoints that
/// do not crash on a minimal valid body
pub async fn integration_layer(probe: &HttpProbe) -> LayerResult {
    let mut layer = LayerResult::new(LayerId::Integration);

    // Health reports a connected data store
    let health = probe.get(paths::API_HEALTH, Expect::Functional).await;
    let state = datastore_state(&health.data).map(str::to_string);
    let connected = health.success
        && state
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("connected"))
            .unwrap_or(false);
    let mut details = health.details();
    details.insert("database".into(), serde_json::json!(state));
    if let Some(env) = health.field("environment") {
        details.insert("environment".into(), env.clone());
    }
    if connected {
        layer.record(CheckRecord::pass("health_connected", details));
    } else {
        let reason = match (&health.error, &state) {
            (Some(error), _) => error.clone(),
            (None, Some(state)) => format!("data store reported {}", state),
            (None, None) => format!("no data-store state (status {})", health.status),
        };
        layer.add_issue(format!("health: {}", reason));
        layer.record(CheckRecord::fail("health_connected", reason, details));
    }

    // Catalog is a list under `shoes`
    let shoes = probe.get(paths::API_SHOES, Expect::Functional).await;
    let list = shoes.field("shoes").and_then(Value::as_array);
    let mut details = shoes.details();
    details.insert("count".into(), serde_json::json!(list.map(Vec::len)));
    let name = format!("schema:{}", paths::API_SHOES);
    match (shoes.success, list) {
        (true, Some(_)) => layer.record(CheckRecord::pass(name, details)),
        (true, None) => {
            layer.add_issue(format!("{} has no shoes list", paths::API_SHOES));
            layer.record(CheckRecord::fail(name, "missing key: shoes", details));
        }
        (false, _) => {
            layer.add_issue(describe_failure("GET", paths::API_SHOES, &shoes, &Expect::Functional));
            layer.record(CheckRecord::new(name, false, details));
        }
    }

    // Settings carry the named scalars
    let settings = probe.get(paths::API_SETTINGS, Expect::Functional).await;
    let missing = missing_settings(&settings.data);
    let mut details = settings.details();
    details.insert("missing".into(), serde_json::json!(missing));
    let name = format!("schema:{}", paths::API_SETTINGS);
    if settings.success && missing.is_empty() {
        layer.record(CheckRecord::pass(name, details));
    } else if settings.success {
        let reason = format!("missing keys: {}", missing.join(", "));
        layer.add_issue(format!("{} {}", paths::API_SETTINGS, reason));
        layer.record(CheckRecord::fail(name, reason, details));
    } else {
        layer.add_issue(describe_failure("GET", paths::API_SETTINGS, &settings, &Expect::Functional));
        layer.record(CheckRecord::new(name, false, details));
    }

    // Writes: validation answers are healthy, 5xx is not
    let person = payloads::default_person();
    let writes = [
        (paths::API_CONTACT, payloads::contact(&person)),
        (paths::API_DONATIONS, payloads::shoe_donation(&person)),
        (paths::API_MONEY_DONATIONS, payloads::money_donation(&person)),
        (paths::API_VOLUNTEERS, payloads::volunteer(&person)),
    ];
    for (path, body) in writes {
        let record = probe.post(path, body, Expect::NotServerError).await;
        if !record.success {
            layer.add_issue(describe_failure("POST", path, &record, &Expect::NotServerError));
        }
        layer.record(probe_check(format!("write:{}", path), &record, &Expect::NotServerError));
    }

    info!("{}: {}/{} checks passed", LayerId::Integration.title(), layer.passed(), layer.total());
    layer
}

/// L4: response-time budgets, admin protection, and a concurrent burst
pub async fn health_layer(
    probe: &HttpProbe,
    registry: &Registry,
    thresholds: &ThresholdConfig,
    concurrency: &ConcurrencyConfig,
) -> LayerResult {
    let mut layer = LayerResult::new(LayerId::Health);

    for (name, path, budget) in [
        ("homepage_load", paths::HOME, thresholds.homepage_max_ms),
        ("api_response", paths::API_SHOES, thresholds.api_max_ms),
    ] {
        let record = probe.get(path, Expect::Functional).await;
        let within = record.elapsed_ms < budget;
        let mut details = record.details();
        details.insert("budget_ms".into(), Value::from(budget));
        let check_name = format!("{}{}", PERF_CHECK_PREFIX, name);
        if record.success && within {
            layer.record(CheckRecord::pass(check_name, details));
        } else if record.success {
            let reason = format!("{} took {} ms (budget {} ms)", path, record.elapsed_ms, budget);
            warn!("{}", reason);
            layer.add_issue(reason.clone());
            layer.record(CheckRecord::fail(check_name, reason, details));
        } else {
            layer.add_issue(describe_failure("GET", path, &record, &Expect::Functional));
            layer.record(CheckRecord::new(check_name, false, details));
        }
    }

    // Unauthenticated access to admin surfaces must be refused
    let mut surfaces = vec![paths::ADMIN];
    surfaces.extend(registry.protected_apis());
    let mut protected_apis = 0;
    for path in &surfaces {
        let record = probe.get(path, Expect::AuthRequired).await;
        if record.success && *path != paths::ADMIN {
            protected_apis += 1;
        }
        if !record.success {
            let issue = if record.status == 0 {
                describe_failure("GET", path, &record, &Expect::AuthRequired)
            } else {
                format!("{} is not protected: anonymous GET answered {}", path, record.status)
            };
            layer.add_issue(issue);
        }
        layer.record(probe_check(
            format!("{}{}", SECURITY_CHECK_PREFIX, path),
            &record,
            &Expect::AuthRequired,
        ));
    }
    let details = details! {
        "protected" => protected_apis,
        "checked" => surfaces.len() - 1,
        "required" => MIN_PROTECTED_APIS,
    };
    let name = format!("{}admin_apis_protected", SECURITY_CHECK_PREFIX);
    if protected_apis >= MIN_PROTECTED_APIS {
        layer.record(CheckRecord::pass(name, details));
    } else {
        layer.record(CheckRecord::fail(
            name,
            format!("only {} admin APIs refused anonymous access", protected_apis),
            details,
        ));
    }

    layer.record(concurrency_check(probe, concurrency).await);
    if let Some(check) = layer.tests.last().filter(|c| !c.success) {
        let issue = check.error().unwrap_or("concurrent probe failed").to_string();
        layer.add_issue(issue);
    }

    info!("{}: {}/{} checks passed", LayerId::Health.title(), layer.passed(), layer.total());
    layer
}

/// Parallel health probes through a bounded pool
pub async fn concurrency_check(probe: &HttpProbe, concurrency: &ConcurrencyConfig) -> CheckRecord {
    let records = probe
        .fan_out(
            ProbeRequest::get(paths::API_HEALTH),
            concurrency.tasks,
            concurrency.workers,
        )
        .await;
    let succeeded = records.iter().filter(|r| r.success).count();
    let ratio = if records.is_empty() {
        0.0
    } else {
        succeeded as f64 / records.len() as f64
    };
    let slowest = records.iter().map(|r| r.elapsed_ms).max().unwrap_or(0);
    let details = details! {
        "tasks" => concurrency.tasks,
        "workers" => concurrency.workers,
        "succeeded" => succeeded,
        "ratio" => ratio,
        "slowest_ms" => slowest,
    };
    if !records.is_empty() && ratio >= concurrency.min_success_ratio {
        CheckRecord::pass("concurrent_health", details)
    } else {
        CheckRecord::fail(
            "concurrent_health",
            format!(
                "{}/{} concurrent health probes succeeded (need {:.0}%)",
                succeeded,
                records.len(),
                concurrency.min_success_ratio * 100.0
            ),
            details,
        )
    }
}
