// Shared helpers for the HTTP-level collector tests: an in-process mock
// job board on 127.0.0.1:0 and the JSON fixtures under tests/fixtures.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use jobaggregator::collectors::{FetchOptions, SourceSettings};

/// Query strings and selected headers seen by the mock server, in order.
#[derive(Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<SeenRequest>>>);

#[derive(Clone, Debug)]
pub struct SeenRequest {
    pub query: std::collections::HashMap<String, String>,
    pub api_key: Option<String>,
    pub api_host: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestLog {
    pub fn push(&self, request: SeenRequest) {
        self.0.lock().unwrap().push(request);
    }

    pub fn all(&self) -> Vec<SeenRequest> {
        self.0.lock().unwrap().clone()
    }

    /// Values of one query parameter across all requests.
    pub fn param(&self, name: &str) -> Vec<String> {
        self.all()
            .iter()
            .filter_map(|r| r.query.get(name).cloned())
            .collect()
    }
}

/// Serve `app` on an ephemeral port and return its base URL.
pub async fn spawn_mock(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("mock server addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server");
    });
    format!("http://{addr}")
}

pub fn fixture(name: &str) -> Value {
    let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
    let raw = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("read {path}: {e}"));
    serde_json::from_str(&raw).unwrap_or_else(|e| panic!("parse {path}: {e}"))
}

pub fn settings(base_url: &str, api_key: Option<&str>) -> SourceSettings {
    SourceSettings {
        base_url: base_url.to_string(),
        api_key: api_key.map(String::from),
        request_timeout: Duration::from_secs(5),
        page_delay: Duration::ZERO,
    }
}

/// Fixed cutoff older than every fixture posting.
pub fn cutoff() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

pub fn unbounded() -> FetchOptions {
    FetchOptions {
        cutoff: Some(cutoff()),
        ..Default::default()
    }
}
