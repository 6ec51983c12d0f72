//! The dispatcher: builds, signs, sends and interprets API calls.
//!
//! # Design
//! `ApiClient` is generic over the resource catalog. A call is described by
//! an `ApiCall` (method, resource path, query, headers, body, expected
//! response type); the client turns it into a signed `HttpRequest`
//! (`build_request`), hands it to the `Transport`, and converts the
//! `HttpResponse` (`parse_response`). The two halves are public so callers
//! can run the exchange themselves.
//!
//! The client holds only configuration. Every call gets a fresh correlation
//! id and a fresh MAC, so one client can serve many threads at once.

use std::path::PathBuf;

use uuid::Uuid;

use crate::auth::RequestAuthenticator;
use crate::config::ClientConfig;
use crate::error::{ApiError, Error, ErrorBody, Result};
use crate::http::{Headers, HttpMethod, HttpRequest, HttpResponse};
use crate::model::{DeclaredType, FieldType, Model, Value};
use crate::serializer::{self, Serializer};
use crate::services::{
    AccountService, RefundService, SubscriptionService, TransactionService, WebhookUrlService,
};
use crate::transport::{Transport, UreqTransport};

const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// Payload of a request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Untyped JSON, sent as is.
    Json(serde_json::Value),
    /// A model (or any typed value) encoded through its type descriptor.
    Model(Value),
    /// Raw bytes, sent without a JSON envelope.
    Bytes { data: Vec<u8>, content_type: String },
    /// Contents of a local file, sent without a JSON envelope.
    File(PathBuf),
}

impl RequestBody {
    pub fn model<M: Model>(model: &M) -> Self {
        RequestBody::Model(Value::Object(model.to_object()))
    }
}

/// What the caller expects back on success.
#[derive(Debug, Clone)]
pub enum ResponseType {
    /// The body is ignored.
    Empty,
    /// Untyped JSON, falling back to text when the body is not JSON.
    Json,
    /// The body as text.
    Text,
    /// The body bytes, untouched.
    Bytes,
    /// The body written to a temp file.
    File,
    /// JSON converted through the declared type.
    Value(DeclaredType),
}

impl ResponseType {
    pub fn of<T: FieldType>() -> Self {
        ResponseType::Value(T::declared_type())
    }

    fn accept(&self) -> &'static str {
        match self {
            ResponseType::Json | ResponseType::Value(_) | ResponseType::Empty => CONTENT_TYPE_JSON,
            ResponseType::Text => "text/plain",
            ResponseType::Bytes | ResponseType::File => "*/*",
        }
    }
}

/// One API call: what to send and what to expect back.
#[derive(Debug, Clone)]
pub struct ApiCall {
    pub method: HttpMethod,
    /// Path below the base path, e.g. `/transaction/read`.
    pub resource_path: String,
    /// The catalog endpoint this call came from, for logs.
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub headers: Headers,
    pub body: Option<RequestBody>,
    pub response_type: ResponseType,
}

impl ApiCall {
    pub fn new(method: HttpMethod, resource_path: impl Into<String>) -> Self {
        let resource_path = resource_path.into();
        Self {
            method,
            endpoint: resource_path.clone(),
            resource_path,
            query: Vec::new(),
            headers: Headers::new(),
            body: None,
            response_type: ResponseType::Json,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Add a query parameter rendered from a `Value` (dates, enums, lists).
    pub fn query_value(mut self, name: impl Into<String>, value: &Value) -> Self {
        if !value.is_null() {
            self.query.push((name.into(), serializer::to_query_value(value)));
        }
        self
    }

    /// Substitute `{name}` in the resource path with the path-encoded value.
    pub fn path_param(mut self, name: &str, value: &impl FieldType) -> Self {
        let rendered = serializer::to_path_value(&value.to_value());
        self.resource_path = self.resource_path.replace(&format!("{{{name}}}"), &rendered);
        self
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn model_body<M: Model>(self, model: &M) -> Self {
        self.body(RequestBody::model(model))
    }

    pub fn expect(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }
}

/// Converted payload of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Empty,
    Json(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
    File(PathBuf),
    Value(Value),
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct ApiResult {
    pub status: u16,
    pub headers: Headers,
    pub data: ResponseData,
}

impl ApiResult {
    /// Convert the payload of a `ResponseType::Value` call into `T`.
    pub fn into_value<T: FieldType>(self) -> Result<T> {
        match self.data {
            ResponseData::Value(value) => T::from_value(value),
            ResponseData::Empty => T::from_value(Value::Null),
            other => Err(Error::serialization(format!(
                "response holds {} data, not a typed value",
                data_kind(&other)
            ))),
        }
    }

    pub fn into_text(self) -> Result<String> {
        match self.data {
            ResponseData::Text(text) => Ok(text),
            ResponseData::Bytes(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            ResponseData::Value(Value::String(text)) => Ok(text),
            ResponseData::Json(serde_json::Value::String(text)) => Ok(text),
            ResponseData::Empty => Ok(String::new()),
            other => Err(Error::serialization(format!(
                "response holds {} data, not text",
                data_kind(&other)
            ))),
        }
    }

    pub fn into_file(self) -> Result<PathBuf> {
        match self.data {
            ResponseData::File(path) => Ok(path),
            other => Err(Error::serialization(format!(
                "response holds {} data, not a file",
                data_kind(&other)
            ))),
        }
    }
}

fn data_kind(data: &ResponseData) -> &'static str {
    match data {
        ResponseData::Empty => "no",
        ResponseData::Json(_) => "JSON",
        ResponseData::Text(_) => "text",
        ResponseData::Bytes(_) => "binary",
        ResponseData::File(_) => "file",
        ResponseData::Value(_) => "typed",
    }
}

/// Client for the payment API.
pub struct ApiClient {
    config: ClientConfig,
    default_headers: Headers,
    authenticator: RequestAuthenticator,
    serializer: Serializer,
    transport: Box<dyn Transport>,
}

impl ApiClient {
    /// Build a client that talks HTTP through `ureq`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an invalid configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = UreqTransport::new(&config)?;
        Self::assemble(config, Box::new(transport))
    }

    /// Build a client on top of a custom transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an invalid configuration.
    pub fn with_transport(config: ClientConfig, transport: impl Transport + 'static) -> Result<Self> {
        config.validate()?;
        Self::assemble(config, Box::new(transport))
    }

    /// Wire up an already validated configuration.
    fn assemble(config: ClientConfig, transport: Box<dyn Transport>) -> Result<Self> {
        let authenticator = RequestAuthenticator::new(&config.credentials()?)?;
        let default_headers = config.default_headers.iter().collect();
        let serializer = Serializer::new(config.temp_dir.clone());
        Ok(Self {
            config,
            default_headers,
            authenticator,
            serializer,
            transport,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn serializer(&self) -> &Serializer {
        &self.serializer
    }

    pub fn base_path(&self) -> &str {
        self.config.base_url()
    }

    pub fn set_default_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.default_headers.insert(name, value);
    }

    pub fn default_headers(&self) -> &Headers {
        &self.default_headers
    }

    pub fn accounts(&self) -> AccountService<'_> {
        AccountService::new(self)
    }

    pub fn transactions(&self) -> TransactionService<'_> {
        TransactionService::new(self)
    }

    pub fn refunds(&self) -> RefundService<'_> {
        RefundService::new(self)
    }

    pub fn subscriptions(&self) -> SubscriptionService<'_> {
        SubscriptionService::new(self)
    }

    pub fn webhook_urls(&self) -> WebhookUrlService<'_> {
        WebhookUrlService::new(self)
    }

    /// Execute one call: build, sign, send, classify, convert.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] when the exchange fails,
    /// - [`Error::Versioning`] on 409,
    /// - [`Error::Api`] on any other non-2xx status,
    /// - [`Error::Serialization`] when the body does not match the expected type.
    pub fn call_api(&self, call: ApiCall) -> Result<ApiResult> {
        let correlation_id = correlation_id();
        let span = tracing::debug_span!(
            "call_api",
            method = %call.method,
            endpoint = %call.endpoint,
            correlation_id = %correlation_id
        );
        let _entered = span.enter();

        let request = self
            .signed_request(&call, correlation_id)
            .inspect_err(|e| tracing::debug!(error = %e, "request could not be built"))?;
        tracing::debug!(url = %request.url, "sending request");
        let response = self.transport.send(&request)?;
        tracing::debug!(status = response.status, "received response");

        self.parse_response(&call, &request.url, response)
    }

    /// Turn `call` into a signed request.
    ///
    /// # Errors
    ///
    /// Fails if the body cannot be serialized or an upload file cannot be read.
    pub fn build_request(&self, call: &ApiCall) -> Result<HttpRequest> {
        self.signed_request(call, correlation_id())
    }

    fn signed_request(&self, call: &ApiCall, correlation_id: String) -> Result<HttpRequest> {
        let path = format!("{}{}", self.base_path(), call.resource_path);
        let url = if call.query.is_empty() {
            path
        } else {
            let query = serde_urlencoded::to_string(&call.query)
                .map_err(|e| Error::serialization(format!("query string: {e}")))?;
            format!("{path}?{query}")
        };

        let mut headers = Headers::new();
        headers.insert("Accept", call.response_type.accept());
        headers.insert("User-Agent", self.config.user_agent.clone());
        let body = match &call.body {
            None => None,
            Some(RequestBody::Json(json)) => {
                headers.insert("Content-Type", CONTENT_TYPE_JSON);
                Some(serde_json::to_vec(json).map_err(|e| Error::serialization(e.to_string()))?)
            }
            Some(RequestBody::Model(value)) => {
                headers.insert("Content-Type", CONTENT_TYPE_JSON);
                let json = self.serializer.serialize(value)?;
                Some(serde_json::to_vec(&json).map_err(|e| Error::serialization(e.to_string()))?)
            }
            Some(RequestBody::Bytes { data, content_type }) => {
                headers.insert("Content-Type", content_type.clone());
                Some(data.clone())
            }
            Some(RequestBody::File(path)) => {
                headers.insert("Content-Type", CONTENT_TYPE_OCTET_STREAM);
                Some(std::fs::read(path)?)
            }
        };

        headers.extend(&self.default_headers);
        headers.extend(&call.headers);
        let mac = self.authenticator.sign(call.method, url_path(&url));
        headers.extend(&mac.to_headers());

        Ok(HttpRequest {
            method: call.method,
            url,
            headers,
            body,
            correlation_id,
        })
    }

    /// Classify `response` and convert its body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::call_api`].
    pub fn parse_response(&self, call: &ApiCall, url: &str, response: HttpResponse) -> Result<ApiResult> {
        match response.status {
            200..=299 => {
                let data = self.convert_success(&call.response_type, &response)?;
                Ok(ApiResult {
                    status: response.status,
                    headers: response.headers,
                    data,
                })
            }
            409 => Err(Error::Versioning {
                resource_path: call.resource_path.clone(),
            }),
            status => {
                let body = match serde_json::from_slice(&response.body) {
                    Ok(json) => ErrorBody::Json(json),
                    Err(_) => ErrorBody::Text(response.text()),
                };
                Err(ApiError::new(status, url, response.headers, body).into())
            }
        }
    }

    fn convert_success(&self, expected: &ResponseType, response: &HttpResponse) -> Result<ResponseData> {
        Ok(match expected {
            ResponseType::Empty => ResponseData::Empty,
            ResponseType::Bytes => ResponseData::Bytes(response.body.clone()),
            ResponseType::Text => ResponseData::Text(response.text()),
            ResponseType::File => {
                let filename = response
                    .headers
                    .get("content-disposition")
                    .and_then(filename_from_disposition);
                ResponseData::File(
                    self.serializer
                        .write_temp_file(&response.body, filename.as_deref())?,
                )
            }
            ResponseType::Json => match decode_body(response) {
                Decoded::Empty => ResponseData::Empty,
                Decoded::Json(json) => ResponseData::Json(json),
                Decoded::Text(text) => ResponseData::Text(text),
            },
            ResponseType::Value(declared) => match decode_body(response) {
                Decoded::Empty => ResponseData::Empty,
                Decoded::Json(json) => ResponseData::Value(self.serializer.deserialize(&json, declared)?),
                Decoded::Text(text) => match declared {
                    DeclaredType::String => ResponseData::Value(Value::String(text)),
                    _ => {
                        return Err(Error::serialization(format!(
                            "expected {declared}, response body is not JSON"
                        )))
                    }
                },
            },
        })
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("default_headers", &self.default_headers)
            .finish_non_exhaustive()
    }
}

enum Decoded {
    Empty,
    Json(serde_json::Value),
    Text(String),
}

/// Non-JSON success bodies (plain-text acknowledgements) fall back to text.
fn decode_body(response: &HttpResponse) -> Decoded {
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Decoded::Empty;
    }
    match serde_json::from_slice(&response.body) {
        Ok(json) => Decoded::Json(json),
        Err(_) => Decoded::Text(response.text()),
    }
}

/// Path component of `url`, without scheme, authority or query.
fn url_path(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let after_scheme = match without_query.find("://") {
        Some(i) => &without_query[i + 3..],
        None => without_query,
    };
    match after_scheme.find('/') {
        Some(i) => &after_scheme[i..],
        None => "/",
    }
}

/// Random UUID v4 rendered as upper-case `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`.
fn correlation_id() -> String {
    format!("{:X}", Uuid::new_v4().hyphenated())
}

fn filename_from_disposition(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(serializer::sanitize_filename)
        .filter(|name| !name.is_empty())
}
