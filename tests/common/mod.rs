//! In-process stand-in for the Tableau REST API and VizQL Data Service.
#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use pulse_dashboard_backend::{
    auth::AssertionSigner,
    config::{parse_base_url, TableauEndpoints},
    tableau::TableauClient,
    AppConfig, AppState, ServiceIdentity,
};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::task::JoinHandle;

pub const SIGN_IN: &str = "/api/3.21/auth/signin";
pub const METRIC: &str = "/api/-/pulse/metrics/metric-1";
pub const DEFINITION: &str = "/api/-/pulse/definitions/def-1";
pub const DATASOURCE: &str = "/api/3.21/sites/site-luid/datasources/ds-1";
pub const READ_METADATA: &str = "/vds/read-metadata";
pub const QUERY: &str = "/vds/query-datasource";

pub const SECRET: &str = "connected-app-secret";
pub const REST_TOKEN: &str = "rest-session-token";

#[derive(Clone)]
pub struct Fixture {
    pub status: StatusCode,
    pub body: Value,
    pub delay: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
}

#[derive(Clone, Default)]
struct StubState {
    fixtures: Arc<HashMap<String, Fixture>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Responses for a metric whose chain resolves cleanly.
pub fn happy_path() -> HashMap<String, Fixture> {
    let mut fixtures = HashMap::new();
    let mut put = |path: &str, body: Value| {
        fixtures.insert(
            path.to_string(),
            Fixture {
                status: StatusCode::OK,
                body,
                delay: None,
            },
        );
    };

    put(
        SIGN_IN,
        json!({"credentials": {"token": REST_TOKEN, "site": {"id": "site-luid", "contentUrl": "datafam"}}}),
    );
    put(
        METRIC,
        json!({"metric": {"id": "metric-1", "definition_id": "def-1", "specification": {}}}),
    );
    put(
        DEFINITION,
        json!({"definition": {
            "metadata": {"name": "Revenue", "id": "def-1"},
            "specification": {
                "datasource": {"id": "ds-1"},
                "basic_specification": {
                    "measure": {"field": "amount", "aggregation": "AGGREGATION_SUM"},
                    "time_dimension": {"field": "order_date"}
                }
            },
            "extension_options": {"allowed_dimensions": ["region", "segment"]}
        }}),
    );
    put(
        DATASOURCE,
        json!({"datasource": {"id": "ds-1", "name": "Superstore Orders", "contentUrl": "Superstore"}}),
    );
    put(
        READ_METADATA,
        json!({"data": [
            {"columnName": "region", "caption": "Region", "dataType": "STRING"},
            {"columnName": "order_date", "caption": "Order Date", "dataType": "DATE"},
            {"columnName": "amount", "caption": "Amount", "dataType": "REAL"}
        ]}),
    );
    put(
        QUERY,
        json!({"data": [
            {"region": "East", "segment": "Consumer", "order_date": "2024-01-01", "SUM(amount)": 120.5},
            {"region": "West", "segment": "Corporate", "order_date": "2024-01-01", "SUM(amount)": 98.0}
        ]}),
    );
    fixtures
}

pub fn fixture(status: StatusCode, body: Value) -> Fixture {
    Fixture {
        status,
        body,
        delay: None,
    }
}

pub struct StubPlatform {
    pub addr: SocketAddr,
    state: StubState,
    server: JoinHandle<()>,
}

impl StubPlatform {
    pub async fn spawn(fixtures: HashMap<String, Fixture>) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = StubState {
            fixtures: Arc::new(fixtures),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new().fallback(handle).with_state(state.clone());
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            addr,
            state,
            server,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    pub fn config(&self) -> AppConfig {
        test_config(&self.base_url(), Duration::from_secs(5))
    }

    pub fn client(&self) -> TableauClient {
        client_for(&self.config())
    }
}

impl Drop for StubPlatform {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(RecordedRequest {
        method,
        path: path.clone(),
        headers,
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    match state.fixtures.get(&path) {
        Some(fixture) => {
            if let Some(delay) = fixture.delay {
                tokio::time::sleep(delay).await;
            }
            (fixture.status, Json(fixture.body.clone())).into_response()
        }
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "no fixture"}))).into_response(),
    }
}

pub fn identity(secret: &str) -> ServiceIdentity {
    ServiceIdentity {
        issuer_id: "connected-app-id".to_string(),
        signing_key_id: "connected-app-secret-id".to_string(),
        signing_secret: secret.to_string(),
        subject_email: "analyst@example.com".to_string(),
        site_name: "datafam".to_string(),
        domain: "10ax.online.tableau.com".to_string(),
    }
}

pub fn test_config(base_url: &str, timeout: Duration) -> AppConfig {
    AppConfig {
        identity: identity(SECRET),
        endpoints: TableauEndpoints {
            base_url: parse_base_url(base_url).unwrap(),
            vds_base_url: parse_base_url(&format!("{}/vds", base_url)).unwrap(),
            api_version: "3.21".to_string(),
        },
        metric_ids: vec!["metric-1".to_string(), "metric-2".to_string()],
        request_timeout: timeout,
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        cors_origin: None,
    }
}

pub fn client_for(config: &AppConfig) -> TableauClient {
    TableauClient::new(
        config.endpoints.clone(),
        AssertionSigner::new(config.identity.clone()),
        config.request_timeout,
    )
    .unwrap()
}

pub fn app_state(config: AppConfig) -> AppState {
    let client = client_for(&config);
    AppState {
        config: Arc::new(config),
        client,
    }
}
