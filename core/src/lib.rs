//! Synchronous client for the payment REST API.
//!
//! # Overview
//! Every call goes through one dispatcher, `ApiClient::call_api`: build the
//! URL and headers, sign the request with an HMAC-SHA512 MAC, send it
//! through a pluggable `Transport`, classify the status and convert the body
//! through the descriptor-driven `Serializer`.
//!
//! # Design
//! - `ApiClient` holds configuration only; it is `Send + Sync` and shared by
//!   reference. Services (`client.transactions()`, ...) borrow it.
//! - `build_request` and `parse_response` are public, so the I/O boundary
//!   stays explicit and testable without a network.
//! - Models declare their wire names through `model!`; the generated
//!   `TypeDescriptor` drives both JSON directions.
//! - Failures are one `Error` enum: connection, versioning (409), API
//!   (other non-2xx), serialization, configuration and local I/O.

pub mod auth;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod models;
pub mod serializer;
pub mod services;
pub mod transport;

pub use auth::{Credentials, MacHeaders, RequestAuthenticator};
pub use client::{ApiCall, ApiClient, ApiResult, RequestBody, ResponseData, ResponseType};
pub use config::ClientConfig;
pub use error::{ApiError, Error, ErrorBody, Result};
pub use http::{Headers, HttpMethod, HttpRequest, HttpResponse};
pub use model::{DeclaredType, FieldType, Model, Value};
pub use serializer::Serializer;
pub use transport::{Transport, UreqTransport};
