//! Line-delimited JSON framing for the peripheral manager connection
//!
//! One request or response per line:
//!
//! ```text
//! -> {"id":7,"method":"db_0_get_sensors","params":["<token>","RX"]}
//! <- {"id":7,"result":["lowband_lo_locked","lo_locked"]}
//! <- {"id":8,"error":"invalid session token"}
//! ```

use rhodium_core::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Exactly one of `result` and `error` is expected. A response carrying
/// neither is a null result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(id: u64, result: Value) -> Self {
        Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, error: impl Into<String>) -> Self {
        Response {
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Turn the response into the call outcome
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(RpcError::Remote(error)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Serialize `message` as one newline-terminated line
pub fn encode_line<M: Serialize>(message: &M) -> Result<String, RpcError> {
    let mut line =
        serde_json::to_string(message).map_err(|e| RpcError::Malformed(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

pub fn decode_request(line: &str) -> Result<Request, RpcError> {
    serde_json::from_str(line.trim_end()).map_err(|e| RpcError::Malformed(e.to_string()))
}

pub fn decode_response(line: &str) -> Result<Response, RpcError> {
    serde_json::from_str(line.trim_end()).map_err(|e| RpcError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_line() {
        let request = Request {
            id: 3,
            method: "db_0_get_sensors".to_string(),
            params: vec![json!("tok"), json!("RX")],
        };
        let line = encode_line(&request).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(decode_request(&line).unwrap(), request);
    }

    #[test]
    fn test_response_outcomes() {
        let ok = decode_response(r#"{"id":1,"result":[1,2]}"#).unwrap();
        assert_eq!(ok.into_result().unwrap(), json!([1, 2]));

        let null = decode_response(r#"{"id":2,"result":null}"#).unwrap();
        assert_eq!(null.into_result().unwrap(), Value::Null);

        let err = decode_response("{\"id\":3,\"error\":\"no such sensor\"}\n").unwrap();
        assert_eq!(
            err.into_result(),
            Err(RpcError::Remote("no such sensor".to_string()))
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(decode_response("hello"), Err(RpcError::Malformed(_))));
        assert!(matches!(
            decode_response(r#"{"result":1}"#),
            Err(RpcError::Malformed(_))
        ));
    }

    #[test]
    fn test_error_response_omits_result() {
        let line = encode_line(&Response::err(9, "busy")).unwrap();
        assert_eq!(line, "{\"id\":9,\"error\":\"busy\"}\n");
    }
}
