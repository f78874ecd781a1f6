//! Shared harness for router-level tests.
//!
//! Builds the full router over a seeded `MockStore` and an in-memory cache,
//! and drives it with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde::de::DeserializeOwned;
use tempfile::TempDir;
use testbed_api::{build_app, ApiConfig, AppState};
use testbed_core::{EventRecorder, Mode, ModeConfig};
use testbed_storage::{CacheBackend, InMemoryCacheBackend, MockStore};
use testbed_test_utils::fixtures;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MockStore>,
    pub recorder: Arc<EventRecorder>,
    pub results_dir: TempDir,
}

pub struct TestAppBuilder {
    mode: ModeConfig,
    latency: Duration,
    request_timeout: Duration,
    cache: Option<Arc<dyn CacheBackend>>,
}

impl TestAppBuilder {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode: ModeConfig::for_mode(mode),
            latency: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
            cache: None,
        }
    }

    pub fn mode_config(mut self, mode: ModeConfig) -> Self {
        self.mode = mode;
        self
    }

    pub fn store_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> TestApp {
        let recorder = Arc::new(EventRecorder::new());
        let store = Arc::new(
            fixtures::recording_store(recorder.clone()).with_latency(self.latency),
        );
        let results_dir = tempfile::tempdir().expect("temp dir");
        let config = ApiConfig {
            request_timeout: self.request_timeout,
            results_dir: results_dir.path().to_path_buf(),
            ..ApiConfig::default()
        };
        let cache: Arc<dyn CacheBackend> = match self.cache {
            Some(cache) => cache,
            None => Arc::new(InMemoryCacheBackend::new()),
        };

        let (state, router) = build_app(self.mode, &config, store.clone(), cache, recorder.clone())
            .expect("app builds");

        TestApp {
            router,
            state,
            store,
            recorder,
            results_dir,
        }
    }
}

pub fn app(mode: Mode) -> TestApp {
    TestAppBuilder::new(mode).build()
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    pub fn value(&self) -> serde_json::Value {
        self.json()
    }
}

impl TestApp {
    pub async fn send(&self, method: Method, uri: &str, body: Option<serde_json::Value>) -> TestResponse {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send_request(request.body(body).expect("valid request")).await
    }

    pub async fn send_request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable")
            .to_vec();
        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: serde_json::Value) -> TestResponse {
        self.send(Method::POST, uri, Some(body)).await
    }

    pub async fn post_empty(&self, uri: &str) -> TestResponse {
        self.send(Method::POST, uri, None).await
    }

    pub async fn checkout(&self, user_id: i64, items: &[(i64, i32)]) -> TestResponse {
        let items: Vec<serde_json::Value> = items
            .iter()
            .map(|(product_id, quantity)| {
                serde_json::json!({ "productId": product_id, "quantity": quantity })
            })
            .collect();
        self.post("/checkout", serde_json::json!({ "userId": user_id, "items": items }))
            .await
    }
}
