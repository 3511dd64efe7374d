//! End-to-end resolver flows against an in-process backend.
//!
//! The fake backend serves a small two-city dataset the way the dashboard API
//! does, and can hold individual URLs in flight to reorder completions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use cityboard_core::config::DashboardConfig;
use cityboard_core::types::{DashboardQuery, FetchState};
use cityboard_dashboard::{
    component_url, index_url, DashboardError, DashboardResolver, RunOutcome,
};
use cityboard_gateway::{GatewayError, HttpGateway};

// =============================================================================
// Helpers
// =============================================================================

const BASE: &str = "http://localhost:4000";

/// Dashboard API stand-in keyed by full URL.
struct Backend {
    routes: HashMap<String, Value>,
    failing: Vec<String>,
    held: Mutex<HashMap<String, Arc<Notify>>>,
    requests: Mutex<Vec<String>>,
}

impl Backend {
    fn new() -> Self {
        let mut routes = HashMap::new();
        let dataset = json!({"data": {
            "taipei": [
                {"index": "traffic", "components": [57, 114, 20, 99]},
                {"index": "metro", "components": [3]},
            ],
            "metrotaipei": [
                {"index": "traffic", "components": [7, 8]},
            ],
        }});
        for city in ["taipei", "metrotaipei"] {
            let mut payload = json!({"data": {}});
            payload["data"][city] = dataset["data"][city].clone();
            routes.insert(index_url(BASE, city), payload);
        }
        for (city, ids) in [("taipei", vec![57, 114, 20, 99, 3]), ("metrotaipei", vec![7, 8])] {
            for id in ids {
                routes.insert(
                    component_url(BASE, cityboard_core::ComponentRef::new(id), city),
                    json!({"status": "success", "data": [{"name": city, "id": id}]}),
                );
            }
        }
        Self {
            routes,
            failing: Vec::new(),
            held: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn failing(mut self, url: String) -> Self {
        self.failing.push(url);
        self
    }

    fn hold(&self, url: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.held
            .lock()
            .unwrap()
            .insert(url.to_string(), Arc::clone(&gate));
        gate
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpGateway for Backend {
    async fn get(&self, url: &str) -> Result<Value, GatewayError> {
        self.requests.lock().unwrap().push(url.to_string());
        let gate = self.held.lock().unwrap().get(url).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing.iter().any(|u| u == url) {
            return Err(GatewayError::Status {
                status: 503,
                message: "Service Unavailable".to_string(),
            });
        }
        self.routes
            .get(url)
            .cloned()
            .ok_or_else(|| GatewayError::Status {
                status: 404,
                message: "Not Found".to_string(),
            })
    }

    async fn post(
        &self,
        _url: &str,
        _headers: &[(&str, &str)],
        _body: &Value,
    ) -> Result<Value, GatewayError> {
        Err(GatewayError::Status {
            status: 405,
            message: "Method Not Allowed".to_string(),
        })
    }
}

fn chart(id: u64, city: &str) -> String {
    component_url(BASE, cityboard_core::ComponentRef::new(id), city)
}

fn ids(resolver: &DashboardResolver) -> Vec<u64> {
    resolver
        .snapshot()
        .components
        .iter()
        .map(|slot| slot.component.id)
        .collect()
}

// =============================================================================
// Flows
// =============================================================================

#[tokio::test]
async fn test_default_query_from_config() {
    let backend = Arc::new(Backend::new());
    let config = DashboardConfig::default();
    let resolver = DashboardResolver::new(backend.clone(), &format!("{}/", config.base_url));

    let outcome = resolver.build(config.default_query()).wait().await;
    assert_eq!(
        outcome,
        RunOutcome::Completed {
            succeeded: 4,
            failed: 0
        }
    );
    assert_eq!(ids(&resolver), vec![57, 114, 20, 99]);
    assert_eq!(backend.requests()[0], "http://localhost:4000/api/v1/dashboard?city=taipei");

    let snap = resolver.snapshot();
    let slot = snap.component(20).unwrap();
    assert_eq!(slot.state.data().unwrap()["data"][0]["id"], json!(20));
}

#[tokio::test]
async fn test_switching_city_mid_flight_keeps_only_latest() {
    let backend = Arc::new(Backend::new());
    let gate = backend.hold(&index_url(BASE, "taipei"));
    let resolver = DashboardResolver::new(backend.clone(), BASE);

    let stale = resolver.build(DashboardQuery::new("taipei", "traffic", 4));
    let fresh = resolver.build(DashboardQuery::new("metrotaipei", "traffic", 4));
    assert_eq!(
        fresh.wait().await,
        RunOutcome::Completed {
            succeeded: 2,
            failed: 0
        }
    );

    gate.notify_one();
    assert_eq!(stale.wait().await, RunOutcome::Superseded);

    let snap = resolver.snapshot();
    assert_eq!(snap.query.unwrap().city, "metrotaipei");
    assert_eq!(ids(&resolver), vec![7, 8]);
    assert!(!backend.requests().contains(&chart(57, "taipei")));
}

#[tokio::test]
async fn test_failed_component_does_not_block_siblings() {
    let backend = Arc::new(Backend::new().failing(chart(114, "taipei")));
    let resolver = DashboardResolver::new(backend, BASE);

    let outcome = resolver
        .build(DashboardQuery::new("taipei", "traffic", 3))
        .wait()
        .await;
    assert_eq!(
        outcome,
        RunOutcome::Completed {
            succeeded: 2,
            failed: 1
        }
    );

    let snap = resolver.snapshot();
    assert!(matches!(snap.component(57).unwrap().state, FetchState::Success(_)));
    assert_eq!(
        snap.component(114).unwrap().state.error(),
        Some(&DashboardError::transport("Service Unavailable"))
    );
    assert!(matches!(snap.component(20).unwrap().state, FetchState::Success(_)));
}

#[tokio::test]
async fn test_unknown_index_reports_not_found() {
    let backend = Arc::new(Backend::new());
    let resolver = DashboardResolver::new(backend.clone(), BASE);

    let outcome = resolver
        .build(DashboardQuery::new("metrotaipei", "metro", 4))
        .wait()
        .await;
    let err = match outcome {
        RunOutcome::IndexFailed(err) => err,
        other => panic!("expected index failure, got {:?}", other),
    };
    assert_eq!(
        err.to_string(),
        "Index \"metro\" not found under city=\"metrotaipei\"."
    );
    assert_eq!(backend.requests().len(), 1);
    assert!(resolver.snapshot().components.is_empty());
}

#[tokio::test]
async fn test_rebuild_while_chart_in_flight() {
    let backend = Arc::new(Backend::new());
    let gate = backend.hold(&chart(3, "taipei"));
    let resolver = DashboardResolver::new(backend.clone(), BASE);
    let mut updates = resolver.subscribe();

    let first = resolver.build(DashboardQuery::new("taipei", "metro", 4));
    updates
        .wait_for(|snap| snap.component(3).is_some_and(|s| s.state.is_loading()))
        .await
        .unwrap();

    // Rebuild while the chart request is still held.
    backend.held.lock().unwrap().clear();
    let second = resolver.rebuild().unwrap();
    assert_eq!(
        second.wait().await,
        RunOutcome::Completed {
            succeeded: 1,
            failed: 0
        }
    );

    gate.notify_one();
    assert_eq!(first.wait().await, RunOutcome::Superseded);
    assert!(!resolver.snapshot().is_loading());
    assert_eq!(
        backend
            .requests()
            .iter()
            .filter(|u| **u == chart(3, "taipei"))
            .count(),
        2
    );
}

#[tokio::test]
async fn test_late_index_failure_leaves_latest_city_alone() {
    let backend = Arc::new(Backend::new().failing(index_url(BASE, "taipei")));
    let gate = backend.hold(&index_url(BASE, "taipei"));
    let resolver = DashboardResolver::new(backend.clone(), BASE);

    let stale = resolver.build(DashboardQuery::new("taipei", "traffic", 4));
    let fresh = resolver.build(DashboardQuery::new("metrotaipei", "traffic", 4));
    assert!(matches!(fresh.wait().await, RunOutcome::Completed { .. }));
    let settled = resolver.snapshot();

    gate.notify_one();
    assert_eq!(stale.wait().await, RunOutcome::Superseded);

    let snap = resolver.snapshot();
    assert_eq!(snap, settled);
    assert!(snap.index.error().is_none());
    assert_eq!(ids(&resolver), vec![7, 8]);
}
