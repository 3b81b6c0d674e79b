use std::io::Write;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use edge_value::codec;
use edge_value::engine::MemStore;
use edge_value::eval::{self, Reason, ResolvedValue};
use edge_value::model::{EvaluationTest, TargetingRule, Value, ValueConfig, ValueEvaluation};
use edge_value::sdk::{Client, ClientConfig, Session};
use edge_value::{Error, ValueReader, ValueWriter};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

const KEY_ID: &str = "key-id";
const KEY: &str = "secret";

struct ServerState {
    store: MemStore,
}

#[derive(Deserialize)]
struct IdRequest {
    id: String,
}

fn status_of(err: &Error) -> StatusCode {
    match err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::AlreadyExists(_) | Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Validation(_) | Error::Decode(_) | Error::Serialization(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reply(result: edge_value::Result<Vec<u8>>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => (status_of(&err), err.to_string()).into_response(),
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("X-API-KEY-ID").and_then(|v| v.to_str().ok()) == Some(KEY_ID)
        && headers.get("X-API-KEY").and_then(|v| v.to_str().ok()) == Some(KEY)
}

async fn handle_get(State(state): State<Arc<ServerState>>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    reply(async {
        let req: IdRequest = serde_json::from_slice(&body)?;
        let value = state.store.get(&req.id).await?;
        Ok::<_, Error>(codec::encode(&value)?)
    }
    .await)
}

async fn handle_create(State(state): State<Arc<ServerState>>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    reply(async {
        state.store.create(&codec::decode(&body)?).await?;
        Ok::<_, Error>(b"{}".to_vec())
    }
    .await)
}

async fn handle_update(State(state): State<Arc<ServerState>>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    reply(async {
        state.store.update(&codec::decode(&body)?).await?;
        Ok::<_, Error>(b"{}".to_vec())
    }
    .await)
}

async fn handle_delete(State(state): State<Arc<ServerState>>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    reply(async {
        let req: IdRequest = serde_json::from_slice(&body)?;
        state.store.delete(&req.id).await?;
        Ok::<_, Error>(b"{}".to_vec())
    }
    .await)
}

/// Starts a value service backed by a [`MemStore`] and returns its base URL.
async fn start_server() -> String {
    let _ = env_logger::builder().is_test(true).try_init();

    let state = Arc::new(ServerState {
        store: MemStore::default(),
    });
    let app = Router::new()
        .route("/service.Value/Get", post(handle_get))
        .route("/service.Value/Create", post(handle_create))
        .route("/service.Value/Update", post(handle_update))
        .route("/service.Value/Delete", post(handle_delete))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/", addr)
}

async fn connect() -> (Session, Arc<Client>) {
    let endpoint = start_server().await;
    let client = Arc::new(Client::new(ClientConfig::new(endpoint).with_credentials(KEY_ID, KEY)).unwrap());
    (Session::new(client.clone()), client)
}

fn env_flag(id: &str) -> Value {
    Value::new(id, "off")
        .with_description("on in prod")
        .with_variant("on", ValueEvaluation::Boolean(true))
        .with_variant("off", ValueEvaluation::Boolean(false))
        .with_rule(TargetingRule::cel("on", "env == 'prod'"))
}

fn vars(v: serde_json::Value) -> eval::Variables {
    v.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_create_read_evaluate() {
    let (session, _) = connect().await;
    session.create(&env_flag("checkout")).await.unwrap();

    let value = session.read("checkout").await.unwrap();
    assert!(value.create_time.is_some());
    assert_eq!(value.without_server_fields(), env_flag("checkout"));

    let prod = eval::evaluate(&value, &vars(json!({"env": "prod"}))).unwrap().unwrap();
    assert_eq!(prod.variant, "on");
    assert_eq!(prod.reason, Reason::Rule(0));
    assert_eq!(prod.value, ResolvedValue::Boolean(true));

    let dev = eval::evaluate(&value, &vars(json!({"env": "dev"}))).unwrap().unwrap();
    assert_eq!(dev.variant, "off");
    assert_eq!(dev.reason, Reason::Default);
}

#[tokio::test]
async fn test_duplicate_create() {
    let (session, _) = connect().await;
    session.create(&env_flag("dup")).await.unwrap();
    let err = session.create(&env_flag("dup")).await.unwrap_err();
    assert!(matches!(err, Error::Status { status: 409, .. }));
}

#[tokio::test]
async fn test_failing_evaluation_test_blocks_create() {
    let (session, _) = connect().await;

    let bad = env_flag("guarded").with_test(EvaluationTest::new(vars(json!({"env": "dev"})), "on"));
    assert!(matches!(session.create(&bad).await, Err(Error::TestFailure(_))));
    assert!(matches!(session.read("guarded").await, Err(Error::NotFound(_))));

    let good = env_flag("guarded").with_test(EvaluationTest::new(vars(json!({"env": "prod"})), "on"));
    session.create(&good).await.unwrap();
    assert_eq!(session.read("guarded").await.unwrap().tests.len(), 1);
}

#[tokio::test]
async fn test_update_preserves_create_time() {
    let (session, client) = connect().await;
    session.create(&env_flag("upd")).await.unwrap();
    let before = session.read("upd").await.unwrap();

    session.update(&env_flag("upd").with_enabled(false)).await.unwrap();
    let after = session.read("upd").await.unwrap();
    assert!(!after.enabled);
    assert_eq!(after.create_time, before.create_time);
    assert_ne!(after.update_time, before.update_time);
    assert!(eval::evaluate(&after, &vars(json!({"env": "prod"}))).unwrap().is_none());

    // Writing with the old timestamps directly is rejected as stale.
    let err = client.update(&before).await.unwrap_err();
    assert!(matches!(err, Error::Status { status: 409, .. }));
}

#[tokio::test]
async fn test_update_missing() {
    let (session, _) = connect().await;
    assert!(matches!(session.update(&env_flag("ghost")).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_delete() {
    let (session, _) = connect().await;
    session.create(&env_flag("gone")).await.unwrap();
    session.delete("gone").await.unwrap();
    assert!(matches!(session.read("gone").await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_bad_credentials() {
    let endpoint = start_server().await;
    let client = Client::new(ClientConfig::new(endpoint).with_credentials(KEY_ID, "wrong")).unwrap();
    let err = client.get("anything").await.unwrap_err();
    assert!(matches!(err, Error::Status { status: 401, .. }));
}

#[tokio::test]
async fn test_config_file_to_service() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let config = json!({
        "value_id": "feed",
        "description": "feed payload",
        "default_variant": "full",
        "json_value": [{
            "variant": "full",
            "value": "{\"items\": [{\"content\": \"c1\", \"viewable\": true}, {\"content\": \"c2\", \"viewable\": false}]}",
            "transform": [{
                "expr": "{'items': value.items.map(i, i.viewable ? i : {'viewable': i.viewable})}"
            }]
        }],
        "test": [{ "variables": "{}", "expected": "full" }]
    });
    write!(file, "{}", config).unwrap();

    let value = ValueConfig::from_file(file.path()).unwrap().build().unwrap();
    let (session, _) = connect().await;
    session.create(&value).await.unwrap();

    let stored = session.read("feed").await.unwrap();
    let evaluation = eval::evaluate(&stored, &eval::Variables::new()).unwrap().unwrap();
    assert_eq!(
        evaluation.value,
        ResolvedValue::Json(json!({
            "items": [
                {"content": "c1", "viewable": true},
                {"viewable": false}
            ]
        }))
    );
}

#[tokio::test]
async fn test_concurrent_sessions_updates() {
    let (session, _) = connect().await;
    session.create(&env_flag("busy")).await.unwrap();

    let updates = (0..5).map(|i| {
        let session = session.clone();
        async move { session.update(&env_flag("busy").with_description(format!("rev {}", i))).await }
    });
    for result in futures::future::join_all(updates).await {
        result.unwrap();
    }
    assert!(session.read("busy").await.unwrap().description.starts_with("rev "));
}
