//! Core type definitions for inbound calls and the JSON-RPC error envelope.
//!
//! # Call lifecycle
//!
//! Every inbound request body is parsed exactly once into a [`Call`]. Parsing is
//! schema-less and never fails: a body that is not a JSON object (or is not JSON at
//! all) yields a call with an empty method, which the access policy rejects when it
//! is enabled. The original bytes travel with the call so HTTP upstreams can forward
//! them verbatim.
//!
//! Parameters are kept as [`serde_json::Value`], a closed tagged variant over
//! string, number, object, array, bool and null. Classification code pattern-matches
//! on it instead of casting.

use crate::utils::block_param::BlockParameter;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// JSON-RPC protocol version constant to avoid repeated allocations.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for JSON-RPC version.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// Error code carried by every envelope the gateway generates itself.
pub const GATEWAY_ERROR_CODE: i32 = -32602;

/// Reads further than this many blocks behind the cached head go to the archival
/// companion endpoint.
pub const ARCHIVAL_BLOCK_DISTANCE: u64 = 100;

/// Methods whose second parameter selects the block the state is read at.
const ARCHIVAL_METHODS: &[&str] = &["eth_call", "eth_getBalance"];

/// A classified inbound JSON-RPC call.
///
/// Immutable after parse. The stream transport substitutes its own correlation id
/// on the wire but never mutates the call itself.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: String,
    /// The caller's id as received; `null` when missing.
    pub id: Value,
    pub params: Vec<Value>,
    /// The original request body.
    pub raw: Bytes,
}

/// Borrowed view used to serialize a call with a substituted id.
#[derive(Serialize)]
struct WireRequest<'a> {
    jsonrpc: &'a str,
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

impl Call {
    /// Parses a raw request body. Unknown fields are ignored and missing fields take
    /// their empty value.
    #[must_use]
    pub fn parse(raw: Bytes) -> Self {
        let Ok(Value::Object(mut fields)) = serde_json::from_slice::<Value>(&raw) else {
            return Self { method: String::new(), id: Value::Null, params: Vec::new(), raw };
        };

        let method = match fields.remove("method") {
            Some(Value::String(method)) => method,
            _ => String::new(),
        };
        let id = fields.remove("id").unwrap_or(Value::Null);
        let params = match fields.remove("params") {
            Some(Value::Array(params)) => params,
            _ => Vec::new(),
        };

        Self { method, id, params, raw }
    }

    /// Builds a call from its parts, rendering the raw body.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Vec<Value>, id: Value) -> Self {
        let method = method.into();
        let mut body = Map::with_capacity(4);
        body.insert("jsonrpc".to_string(), Value::String(JSONRPC_VERSION.to_string()));
        body.insert("id".to_string(), id.clone());
        body.insert("method".to_string(), Value::String(method.clone()));
        body.insert("params".to_string(), Value::Array(params.clone()));

        let raw = serde_json::to_vec(&body).map(Bytes::from).unwrap_or_default();
        Self { method, id, params, raw }
    }

    /// The synthetic `eth_blockNumber` call used to refresh cached block heights.
    #[must_use]
    pub fn block_number_probe() -> Self {
        Self::new("eth_blockNumber", Vec::new(), Value::from(1))
    }

    /// Serializes the call for a multiplexed connection, replacing the caller's id
    /// with `correlation_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter cannot be serialized.
    pub fn to_wire(&self, correlation_id: u64) -> Result<String, serde_json::Error> {
        serde_json::to_string(&WireRequest {
            jsonrpc: JSONRPC_VERSION,
            id: correlation_id,
            method: &self.method,
            params: &self.params,
        })
    }

    /// Returns true when this call reads state older than the archival threshold
    /// relative to `current_block_height`.
    ///
    /// Only `eth_call` and `eth_getBalance` with exactly two parameters qualify. The
    /// second parameter may be a base-prefixed integer string or a JSON number; tags,
    /// objects, arrays and unparseable strings are never archival.
    #[must_use]
    pub fn is_archival_read(&self, current_block_height: u64) -> bool {
        if !ARCHIVAL_METHODS.contains(&self.method.as_str()) || self.params.len() != 2 {
            return false;
        }

        BlockParameter::from_param(&self.params[1]).is_some_and(|requested| {
            current_block_height
                .checked_sub(requested)
                .is_some_and(|distance| distance > ARCHIVAL_BLOCK_DISTANCE)
        })
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Envelope returned to the caller when a call fails inside the gateway.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope<'a> {
    pub jsonrpc: Cow<'static, str>,
    pub id: &'a Value,
    pub error: JsonRpcError,
}

impl<'a> ErrorEnvelope<'a> {
    #[must_use]
    pub fn new(id: &'a Value, reason: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            id,
            error: JsonRpcError { code: GATEWAY_ERROR_CODE, message: reason.into(), data: None },
        }
    }

    /// Renders the envelope as
    /// `{"jsonrpc":"2.0","id":<id>,"error":{"code":-32602,"message":<reason>}}`.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        match serde_json::to_vec(self) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                tracing::error!(error = %e, "failed to render error envelope");
                Bytes::from_static(
                    br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32602,"message":"internal error"}}"#,
                )
            }
        }
    }
}

/// Returns true when `body` is a JSON object without a non-null top-level `error`
/// field. Bodies that are not JSON objects are never successful.
#[must_use]
pub fn is_success_body(body: &[u8]) -> bool {
    match serde_json::from_slice::<Map<String, Value>>(body) {
        Ok(fields) => fields.get("error").is_none_or(Value::is_null),
        Err(e) => {
            tracing::debug!(error = %e, "upstream body is not a JSON object");
            false
        }
    }
}
