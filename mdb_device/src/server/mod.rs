//! Request envelope and response documents.
//!
//! Two request forms are accepted on every channel:
//!
//! - array: `["method", arg0, arg1, ...]`, echoed back with the method name as id
//! - object: `{"id": <any>, "method": "name", "params": [arg0, ...]}`
//!
//! Responses are `{"id": .., "result": ..}` or
//! `{"id": .., "error": {"code": .., "message": .., "data": ..}}`.

pub mod api;

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::client::ClientError;
use crate::forward::RoutingError;
use crate::time::TimeError;

/// Request-level errors with JSON-RPC style codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    /// The message is not valid JSON.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The message is JSON but not a request.
    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    /// No function, callback or property has this name.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Wrong parameter count, type or range.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// A handler failed unexpectedly.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A handler reported a domain error (routing, time).
    #[error("Server error: {0}")]
    Server(String),
}

impl ServerError {
    /// Numeric error code.
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse(_) => -32700,
            Self::InvalidRequest(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) => -32602,
            Self::Internal(_) => -32603,
            Self::Server(_) => -32000,
        }
    }

    /// Short category message.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Parse(_) => "Parse error",
            Self::InvalidRequest(_) => "Invalid Request",
            Self::MethodNotFound(_) => "Method not found",
            Self::InvalidParams(_) => "Invalid params",
            Self::Internal(_) => "Internal error",
            Self::Server(_) => "Server error",
        }
    }

    /// Detail text.
    pub fn data(&self) -> &str {
        match self {
            Self::Parse(d)
            | Self::InvalidRequest(d)
            | Self::MethodNotFound(d)
            | Self::InvalidParams(d)
            | Self::Internal(d)
            | Self::Server(d) => d,
        }
    }
}

impl From<RoutingError> for ServerError {
    fn from(e: RoutingError) -> Self {
        Self::Server(e.to_string())
    }
}

impl From<TimeError> for ServerError {
    fn from(e: TimeError) -> Self {
        Self::Server(e.to_string())
    }
}

impl From<ClientError> for ServerError {
    fn from(e: ClientError) -> Self {
        Self::Server(e.to_string())
    }
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Echoed back in the response.
    pub id: Value,
    /// Function, callback or property name.
    pub method: String,
    /// Positional arguments.
    pub params: Vec<Value>,
}

impl Request {
    /// Decode a request document.
    ///
    /// # Errors
    /// Returns `ServerError::InvalidRequest` if `message` has neither form.
    pub fn parse(message: Value) -> Result<Self, ServerError> {
        match message {
            Value::Array(mut items) => {
                if items.is_empty() {
                    return Err(ServerError::InvalidRequest("empty request array".into()));
                }
                let Value::String(method) = items.remove(0) else {
                    return Err(ServerError::InvalidRequest(
                        "first element must be the method name".into(),
                    ));
                };
                Ok(Self {
                    id: Value::String(method.clone()),
                    method,
                    params: items,
                })
            }
            Value::Object(mut fields) => {
                let id = fields.remove("id").unwrap_or(Value::Null);
                let Some(Value::String(method)) = fields.remove("method") else {
                    return Err(ServerError::InvalidRequest("missing method".into()));
                };
                let params = match fields.remove("params") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(params)) => params,
                    Some(_) => {
                        return Err(ServerError::InvalidRequest(
                            "params must be an array".into(),
                        ));
                    }
                };
                Ok(Self { id, method, params })
            }
            _ => Err(ServerError::InvalidRequest(
                "request must be an array or object".into(),
            )),
        }
    }

    /// Best-effort id of a message that failed to parse as a request.
    pub fn id_of(message: &Value) -> Value {
        match message {
            Value::Object(fields) => fields.get("id").cloned().unwrap_or(Value::Null),
            Value::Array(items) => match items.first() {
                Some(method @ Value::String(_)) => method.clone(),
                _ => Value::Null,
            },
            _ => Value::Null,
        }
    }
}

/// True for a response document: an object carrying `result` or `error`
/// and no `method`.
pub fn is_response(message: &Value) -> bool {
    message.as_object().is_some_and(|fields| {
        !fields.contains_key("method")
            && (fields.contains_key("result") || fields.contains_key("error"))
    })
}

/// True if `message` has the shape of a request in either form.
pub fn is_request(message: &Value) -> bool {
    match message {
        Value::Array(items) => matches!(items.first(), Some(Value::String(_))),
        Value::Object(fields) => fields.get("method").is_some_and(Value::is_string),
        _ => false,
    }
}

/// Successful response document.
pub fn result_response(id: &Value, result: Value) -> Value {
    json!({ "id": id, "result": result })
}

/// Error response document.
pub fn error_response(id: &Value, error: &ServerError) -> Value {
    let mut body = Map::new();
    body.insert("code".into(), json!(error.code()));
    body.insert("message".into(), json!(error.message()));
    body.insert("data".into(), json!(error.data()));
    json!({ "id": id, "error": body })
}
