//! In-memory stand-in for the payment API, used by the client's integration
//! tests and for local experiments.
//!
//! Every request must carry valid `x-mac-*` headers. Entities live in memory;
//! transactions are versioned and a stale version is answered with 409.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sha2::Sha512;
use tokio::{net::TcpListener, sync::RwLock};

pub const BASE_PATH: &str = "/api";
pub const DEFAULT_USER_ID: u64 = 512;
pub const DEFAULT_SECRET: &[u8] = b"mock-secret";
/// Id of the one account the mock knows.
pub const ACCOUNT_ID: i64 = 1;
/// Allowed distance between the MAC timestamp and the server clock.
pub const MAX_CLOCK_SKEW_SECS: i64 = 600;

/// Credentials the server accepts.
#[derive(Clone, Debug)]
pub struct MockConfig {
    pub user_id: u64,
    pub secret: Vec<u8>,
}

impl MockConfig {
    /// The secret as clients configure it.
    pub fn authentication_key(&self) -> String {
        STANDARD.encode(&self.secret)
    }
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            user_id: DEFAULT_USER_ID,
            secret: DEFAULT_SECRET.to_vec(),
        }
    }
}

#[derive(Default)]
struct Store {
    next_id: i64,
    transactions: BTreeMap<i64, Value>,
    refunds: BTreeMap<i64, Value>,
    subscriptions: BTreeMap<i64, Value>,
    webhook_urls: BTreeMap<i64, Value>,
}

impl Store {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

struct AppState {
    user_id: u64,
    secret: Vec<u8>,
    store: RwLock<Store>,
}

type Shared = Arc<AppState>;

/// Error answers of the mock, shaped like the real API's client errors.
#[derive(Debug)]
pub enum MockError {
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    BadRequest(String),
}

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            Self::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, "NOT_FOUND", m),
            Self::Conflict(m) => (StatusCode::CONFLICT, "CONFLICT", m),
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", m),
        };
        (status, Json(json!({ "type": kind, "message": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, MockError>;

pub fn app(config: MockConfig) -> Router {
    let state: Shared = Arc::new(AppState {
        user_id: config.user_id,
        secret: config.secret,
        store: RwLock::new(Store::default()),
    });

    let api = Router::new()
        .route("/account/read", get(read_account))
        .route("/transaction/create", post(create_transaction))
        .route("/transaction/read", get(read_transaction))
        .route("/transaction/{id}", put(update_transaction))
        .route("/transaction/count", post(count_transactions))
        .route("/transaction/search", post(search_transactions))
        .route("/transaction/getInvoiceDocument", get(invoice_document))
        .route("/refund/refund", post(create_refund))
        .route("/refund/read", get(read_refund))
        .route("/subscription/create", post(create_subscription))
        .route("/subscription/read", get(read_subscription))
        .route("/subscription/terminate", post(terminate_subscription))
        .route("/webhook-url/create", post(create_webhook_url))
        .route("/webhook-url/read", get(read_webhook_url))
        .route("/webhook-url/{id}", delete(delete_webhook_url));

    Router::new()
        .nest(BASE_PATH, api)
        .layer(middleware::from_fn_with_state(state.clone(), verify_mac))
        .with_state(state)
}

pub async fn run(listener: TcpListener, config: MockConfig) -> Result<(), std::io::Error> {
    axum::serve(listener, app(config)).await
}

/// MAC over `version|user|timestamp|METHOD|path`, base64 encoded.
pub fn sign(secret: &[u8], user_id: u64, timestamp: i64, method: &str, path: &str) -> Option<String> {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret).ok()?;
    mac.update(format!("1|{user_id}|{timestamp}|{method}|{path}").as_bytes());
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

async fn verify_mac(State(state): State<Shared>, request: Request, next: Next) -> Response {
    match check_mac(&state, request.headers(), request.method().as_str(), request.uri().path()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::warn!(path = %request.uri().path(), "rejected request");
            e.into_response()
        }
    }
}

fn check_mac(state: &AppState, headers: &HeaderMap, method: &str, path: &str) -> ApiResult<()> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| MockError::Unauthorized(format!("missing {name} header")))
    };
    if header("x-mac-version")? != "1" {
        return Err(MockError::Unauthorized("unsupported MAC version".into()));
    }
    let user_id: u64 = header("x-mac-userid")?
        .parse()
        .map_err(|_| MockError::Unauthorized("malformed user id".into()))?;
    if user_id != state.user_id {
        return Err(MockError::Unauthorized(format!("unknown user {user_id}")));
    }
    let timestamp: i64 = header("x-mac-timestamp")?
        .parse()
        .map_err(|_| MockError::Unauthorized("malformed timestamp".into()))?;
    if (unix_now() - timestamp).abs() > MAX_CLOCK_SKEW_SECS {
        return Err(MockError::Unauthorized("timestamp outside the allowed window".into()));
    }
    let expected = sign(&state.secret, user_id, timestamp, method, path);
    if Some(header("x-mac-value")?) != expected.as_deref() {
        return Err(MockError::Unauthorized("MAC mismatch".into()));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityParams {
    #[serde(rename = "spaceId")]
    _space_id: i64,
    id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpaceParams {
    space_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountParams {
    id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TerminateParams {
    #[serde(rename = "spaceId")]
    _space_id: i64,
    subscription_id: i64,
    respect_termination_period: bool,
}

fn now_rfc3339() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S+00:00").to_string()
}

fn object(body: Value) -> ApiResult<Map<String, Value>> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(MockError::BadRequest("expected a JSON object".into())),
    }
}

fn not_found(kind: &str, id: i64) -> MockError {
    MockError::NotFound(format!("{kind} with id {id} does not exist"))
}

async fn read_account(Query(params): Query<AccountParams>) -> ApiResult<Json<Value>> {
    if params.id != ACCOUNT_ID {
        return Err(not_found("Account", params.id));
    }
    Ok(Json(json!({
        "id": ACCOUNT_ID,
        "version": 1,
        "name": "Mock account",
        "state": "ACTIVE",
    })))
}

async fn create_transaction(
    State(state): State<Shared>,
    Query(params): Query<SpaceParams>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let mut entity = object(body)?;
    for transient in ["successUrl", "failedUrl", "autoConfirmationEnabled"] {
        entity.remove(transient);
    }
    let mut store = state.store.write().await;
    let id = store.allocate_id();
    entity.insert("id".into(), json!(id));
    entity.insert("version".into(), json!(1));
    entity.insert("linkedSpaceId".into(), json!(params.space_id));
    entity.insert("state".into(), json!("PENDING"));
    entity.insert("createdOn".into(), json!(now_rfc3339()));
    let entity = Value::Object(entity);
    store.transactions.insert(id, entity.clone());
    tracing::debug!(id, "transaction created");
    Ok(Json(entity))
}

async fn read_transaction(
    State(state): State<Shared>,
    Query(params): Query<EntityParams>,
) -> ApiResult<Json<Value>> {
    let store = state.store.read().await;
    store
        .transactions
        .get(&params.id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found("Transaction", params.id))
}

async fn update_transaction(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    Query(_params): Query<SpaceParams>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let changes = object(body)?;
    let mut store = state.store.write().await;
    let stored = store
        .transactions
        .get_mut(&id)
        .ok_or_else(|| not_found("Transaction", id))?;
    let current = stored["version"].as_i64().unwrap_or_default();
    let sent = changes.get("version").and_then(Value::as_i64);
    if sent != Some(current) {
        return Err(MockError::Conflict(format!(
            "Transaction {id} was modified concurrently, current version is {current}"
        )));
    }
    if stored["state"] != "PENDING" {
        return Err(MockError::BadRequest(format!("Transaction {id} is no longer pending")));
    }
    if let Value::Object(target) = stored {
        for (key, value) in changes {
            if key != "id" && key != "version" {
                target.insert(key, value);
            }
        }
        target.insert("version".into(), json!(current + 1));
    }
    Ok(Json(stored.clone()))
}

/// Supports `LEAF` filters with `EQUALS` plus `AND` / `OR` nodes.
fn matches(entity: &Value, filter: &Value) -> bool {
    match filter["type"].as_str() {
        Some("AND") => children(filter).iter().all(|c| matches(entity, c)),
        Some("OR") => children(filter).iter().any(|c| matches(entity, c)),
        _ => {
            let field = filter["fieldName"].as_str().unwrap_or_default();
            match filter["operator"].as_str() {
                Some("NOT_EQUALS") => entity[field] != filter["value"],
                _ => entity[field] == filter["value"],
            }
        }
    }
}

fn children(filter: &Value) -> &[Value] {
    filter["children"].as_array().map(Vec::as_slice).unwrap_or_default()
}

fn parse_optional(body: &Bytes) -> ApiResult<Option<Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| MockError::BadRequest(format!("invalid JSON body: {e}")))
}

async fn count_transactions(
    State(state): State<Shared>,
    Query(_params): Query<SpaceParams>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let filter = parse_optional(&body)?;
    let store = state.store.read().await;
    let count = store
        .transactions
        .values()
        .filter(|t| filter.as_ref().map_or(true, |f| matches(t, f)))
        .count();
    Ok(Json(json!(count)))
}

async fn search_transactions(
    State(state): State<Shared>,
    Query(_params): Query<SpaceParams>,
    Json(query): Json<Value>,
) -> ApiResult<Json<Value>> {
    let store = state.store.read().await;
    let filter = query.get("filter").filter(|f| !f.is_null());
    let start = query["startingEntity"].as_u64().unwrap_or(0) as usize;
    let limit = query["numberOfEntities"].as_u64().unwrap_or(100) as usize;
    let found: Vec<Value> = store
        .transactions
        .values()
        .filter(|t| filter.map_or(true, |f| matches(t, f)))
        .skip(start)
        .take(limit)
        .cloned()
        .collect();
    Ok(Json(Value::Array(found)))
}

async fn invoice_document(
    State(state): State<Shared>,
    Query(params): Query<EntityParams>,
) -> ApiResult<Response> {
    let store = state.store.read().await;
    if !store.transactions.contains_key(&params.id) {
        return Err(not_found("Transaction", params.id));
    }
    let pdf = format!("%PDF-1.4\n% invoice for transaction {}\n%%EOF\n", params.id);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"invoice-{}.pdf\"", params.id),
            ),
        ],
        pdf,
    )
        .into_response())
}

async fn create_refund(
    State(state): State<Shared>,
    Query(_params): Query<SpaceParams>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let mut entity = object(body)?;
    let transaction_id = entity
        .get("transaction")
        .and_then(Value::as_i64)
        .ok_or_else(|| MockError::BadRequest("refund needs a transaction id".into()))?;
    let mut store = state.store.write().await;
    let transaction = store
        .transactions
        .get(&transaction_id)
        .cloned()
        .ok_or_else(|| MockError::BadRequest(format!("Transaction {transaction_id} cannot be refunded")))?;
    let id = store.allocate_id();
    entity.insert("id".into(), json!(id));
    entity.insert("version".into(), json!(1));
    entity.insert("state".into(), json!("SUCCESSFUL"));
    entity.insert("transaction".into(), transaction);
    entity.insert("createdOn".into(), json!(now_rfc3339()));
    let entity = Value::Object(entity);
    store.refunds.insert(id, entity.clone());
    Ok(Json(entity))
}

async fn read_refund(
    State(state): State<Shared>,
    Query(params): Query<EntityParams>,
) -> ApiResult<Json<Value>> {
    let store = state.store.read().await;
    store
        .refunds
        .get(&params.id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found("Refund", params.id))
}

async fn create_subscription(
    State(state): State<Shared>,
    Query(_params): Query<SpaceParams>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let mut entity = object(body)?;
    let mut store = state.store.write().await;
    let id = store.allocate_id();
    entity.insert("id".into(), json!(id));
    entity.insert("version".into(), json!(1));
    entity.insert("state".into(), json!("PENDING"));
    entity.insert("createdOn".into(), json!(now_rfc3339()));
    let entity = Value::Object(entity);
    store.subscriptions.insert(id, entity.clone());
    Ok(Json(entity))
}

async fn read_subscription(
    State(state): State<Shared>,
    Query(params): Query<EntityParams>,
) -> ApiResult<Json<Value>> {
    let store = state.store.read().await;
    store
        .subscriptions
        .get(&params.id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found("Subscription", params.id))
}

async fn terminate_subscription(
    State(state): State<Shared>,
    Query(params): Query<TerminateParams>,
) -> ApiResult<StatusCode> {
    let mut store = state.store.write().await;
    let subscription = store
        .subscriptions
        .get_mut(&params.subscription_id)
        .ok_or_else(|| not_found("Subscription", params.subscription_id))?;
    let (new_state, stamp_field) = if params.respect_termination_period {
        ("TERMINATING", "plannedTerminationDate")
    } else {
        ("TERMINATED", "terminatedOn")
    };
    subscription["state"] = json!(new_state);
    subscription[stamp_field] = json!(now_rfc3339());
    Ok(StatusCode::NO_CONTENT)
}

async fn create_webhook_url(
    State(state): State<Shared>,
    Query(_params): Query<SpaceParams>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let mut entity = object(body)?;
    if !entity.get("url").and_then(Value::as_str).is_some_and(|u| u.starts_with("https://")) {
        return Err(MockError::BadRequest("webhook URL must use https".into()));
    }
    let mut store = state.store.write().await;
    let id = store.allocate_id();
    entity.insert("id".into(), json!(id));
    entity.insert("version".into(), json!(1));
    entity.entry("state").or_insert(json!("ACTIVE"));
    let entity = Value::Object(entity);
    store.webhook_urls.insert(id, entity.clone());
    Ok(Json(entity))
}

async fn read_webhook_url(
    State(state): State<Shared>,
    Query(params): Query<EntityParams>,
) -> ApiResult<Json<Value>> {
    let store = state.store.read().await;
    store
        .webhook_urls
        .get(&params.id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found("WebhookUrl", params.id))
}

async fn delete_webhook_url(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    Query(_params): Query<SpaceParams>,
) -> ApiResult<(StatusCode, [(header::HeaderName, &'static str); 1], String)> {
    let mut store = state.store.write().await;
    store
        .webhook_urls
        .remove(&id)
        .ok_or_else(|| not_found("WebhookUrl", id))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        format!("Webhook URL {id} deleted"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_matches_reference_vector() {
        assert_eq!(
            sign(b"secret", 42, 1_700_000_000, "GET", "/account").as_deref(),
            Some("/7Ca5OwAtTdDtLV1u3tmEvLcO5gS4E+NCt93P2F0zeOh5zjkXz4cCd04pFQcCC5tpqkU1Za/N0JrF3e3BVc4Zw==")
        );
    }

    #[test]
    fn leaf_filter_compares_field() {
        let tx = json!({"state": "PENDING", "currency": "CHF"});
        let eq = json!({"type": "LEAF", "fieldName": "state", "operator": "EQUALS", "value": "PENDING"});
        let ne = json!({"type": "LEAF", "fieldName": "currency", "operator": "NOT_EQUALS", "value": "CHF"});
        assert!(matches(&tx, &eq));
        assert!(!matches(&tx, &ne));
        assert!(!matches(&tx, &json!({"type": "AND", "children": [eq.clone(), ne.clone()]})));
        assert!(matches(&tx, &json!({"type": "OR", "children": [eq, ne]})));
    }

    #[test]
    fn empty_body_is_no_filter() {
        assert!(parse_optional(&Bytes::from_static(b"  ")).unwrap().is_none());
        assert!(parse_optional(&Bytes::from_static(b"{}")).unwrap().is_some());
        assert!(parse_optional(&Bytes::from_static(b"{")).is_err());
    }

    #[test]
    fn authentication_key_is_base64_of_secret() {
        assert_eq!(MockConfig::default().authentication_key(), "bW9jay1zZWNyZXQ=");
    }
}
