use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const METHOD_ERROR: i64 = -32000;

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub id: Value,
}

impl Response {
    pub fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", result: Some(result), error: None, id }
    }

    pub fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(ErrorBody { code, message: message.into() }),
            id,
        }
    }

    /// Serializes the frame for sending over the wire; never fails in
    /// practice since every field is already JSON-representable.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"jsonrpc":"2.0","error":{"code":-32000,"message":"internal serialization error"},"id":null}"#.to_string())
    }
}

/// Parses a raw frame into a `Request`, distinguishing JSON syntax errors
/// (-32700) from well-formed-but-invalid envelopes (-32600) so the caller
/// can reply with the right code even when no `id` could be recovered.
pub fn parse(raw: &[u8]) -> Result<Request, Response> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| Response::err(Value::Null, PARSE_ERROR, e.to_string()))?;

    let id = value.get("id").cloned().unwrap_or(Value::Null);

    if value.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(Response::err(id.clone(), INVALID_REQUEST, "missing or bad jsonrpc version"));
    }
    if value.get("method").and_then(Value::as_str).is_none() {
        return Err(Response::err(id, INVALID_REQUEST, "missing method"));
    }

    serde_json::from_value(value).map_err(|e| Response::err(id, INVALID_REQUEST, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_json() {
        let err = parse(b"{not json").unwrap_err();
        assert_eq!(err.error.unwrap().code, PARSE_ERROR);
    }

    #[test]
    fn rejects_missing_method() {
        let err = parse(br#"{"jsonrpc":"2.0","id":1}"#).unwrap_err();
        assert_eq!(err.error.unwrap().code, INVALID_REQUEST);
    }

    #[test]
    fn parses_well_formed_request() {
        let req = parse(br#"{"jsonrpc":"2.0","method":"login","params":{"WalletID":"w1"},"id":1}"#).unwrap();
        assert_eq!(req.method, "login");
    }
}
