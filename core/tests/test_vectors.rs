//! Verify signing, request building and response parsing against JSON test
//! vectors stored in `test-vectors/`.
//!
//! Each vector file describes inputs, expected requests, simulated responses,
//! and expected results or errors. Bodies are compared as parsed JSON, so key
//! order in the files does not matter.

use payment_sdk::catalog;
use payment_sdk::models::{Transaction, TransactionCreate, TransactionPending};
use payment_sdk::{
    ApiCall, ApiClient, ClientConfig, Credentials, Error, Headers, HttpMethod, HttpRequest,
    HttpResponse, RequestAuthenticator, Result, Serializer,
};

const BASE_PATH: &str = "https://pay.example.test/api";

fn client() -> ApiClient {
    ApiClient::new(ClientConfig::new(42, "c2VjcmV0").with_base_path(BASE_PATH)).unwrap()
}

fn load(raw: &str) -> Vec<serde_json::Value> {
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();
    vectors["cases"].as_array().unwrap().clone()
}

/// Parse the method string from test vectors into `HttpMethod`.
fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn check_request(name: &str, req: &HttpRequest, expected: &serde_json::Value) {
    assert_eq!(req.method, parse_method(expected["method"].as_str().unwrap()), "{name}: method");
    assert_eq!(
        req.url,
        format!("{BASE_PATH}{}", expected["path"].as_str().unwrap()),
        "{name}: url"
    );
    for pair in expected["headers"].as_array().into_iter().flatten() {
        let header = pair[0].as_str().unwrap();
        assert_eq!(req.headers.get(header), pair[1].as_str(), "{name}: header {header}");
    }
    match expected.get("body") {
        Some(body) => {
            let sent: serde_json::Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
            assert_eq!(&sent, body, "{name}: body");
        }
        None => assert!(req.body.is_none(), "{name}: body should be None"),
    }
}

fn simulated(case: &serde_json::Value) -> HttpResponse {
    let sim = &case["simulated_response"];
    HttpResponse {
        status: sim["status"].as_u64().unwrap() as u16,
        headers: Headers::new(),
        body: sim["body"].as_str().unwrap().as_bytes().to_vec(),
    }
}

fn check_outcome(name: &str, case: &serde_json::Value, result: Result<Transaction>) {
    if let Some(expected) = case.get("expected_error") {
        let err = result.unwrap_err();
        match (expected["kind"].as_str().unwrap(), &err) {
            ("api", Error::Api(api)) => {
                assert_eq!(Some(u64::from(api.status)), expected["status"].as_u64(), "{name}: status");
                if let Some(message) = expected.get("message") {
                    assert_eq!(api.message, message.as_str().unwrap(), "{name}: message");
                }
                if let Some(message) = expected.get("server_message") {
                    assert_eq!(api.server_message(), message.as_str(), "{name}: server message");
                }
            }
            ("versioning", Error::Versioning { resource_path }) => {
                assert_eq!(resource_path, expected["resource_path"].as_str().unwrap(), "{name}");
            }
            ("serialization", Error::Serialization(_)) => {}
            (kind, other) => panic!("{name}: expected {kind} error, got {other:?}"),
        }
    } else {
        let transaction = result.unwrap();
        let encoded = Serializer::default().serialize_model(&transaction).unwrap();
        assert_eq!(encoded, case["expected_result"], "{name}: parsed result");
    }
}

fn exchange(c: &ApiClient, call: &ApiCall, case: &serde_json::Value) -> Result<Transaction> {
    let req = c.build_request(call)?;
    c.parse_response(call, &req.url, simulated(case))?.into_value()
}

// ---------------------------------------------------------------------------
// MAC
// ---------------------------------------------------------------------------

#[test]
fn mac_test_vectors() {
    for case in load(include_str!("../../test-vectors/mac.json")) {
        let name = case["name"].as_str().unwrap();
        let credentials = Credentials::new(
            case["user_id"].as_u64().unwrap(),
            case["authentication_key"].as_str().unwrap(),
        )
        .unwrap();
        let headers = RequestAuthenticator::new(&credentials).unwrap().sign_at(
            parse_method(case["method"].as_str().unwrap()),
            case["path"].as_str().unwrap(),
            case["timestamp"].as_i64().unwrap(),
        );
        assert_eq!(headers.mac, case["expected_mac"].as_str().unwrap(), "{name}");
    }
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[test]
fn create_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/create.json")) {
        let name = case["name"].as_str().unwrap();
        let input: TransactionCreate = c.serializer().deserialize_model(&case["input"]).unwrap();
        let call = catalog::TRANSACTION_CREATE
            .call()
            .query("spaceId", case["space_id"].as_i64().unwrap())
            .model_body(&input);

        check_request(name, &c.build_request(&call).unwrap(), &case["expected_request"]);
        check_outcome(name, &case, exchange(&c, &call, &case));
    }
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

#[test]
fn read_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/read.json")) {
        let name = case["name"].as_str().unwrap();
        let call = catalog::TRANSACTION_READ
            .call()
            .query("spaceId", case["space_id"].as_i64().unwrap())
            .query("id", case["id"].as_i64().unwrap());

        check_request(name, &c.build_request(&call).unwrap(), &case["expected_request"]);
        check_outcome(name, &case, exchange(&c, &call, &case));
    }
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

#[test]
fn update_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/update.json")) {
        let name = case["name"].as_str().unwrap();
        let input: TransactionPending = c.serializer().deserialize_model(&case["input"]).unwrap();
        let call = catalog::TRANSACTION_UPDATE
            .call()
            .path_param("id", &input.id.unwrap())
            .query("spaceId", case["space_id"].as_i64().unwrap())
            .model_body(&input);

        check_request(name, &c.build_request(&call).unwrap(), &case["expected_request"]);
        check_outcome(name, &case, exchange(&c, &call, &case));
    }
}
