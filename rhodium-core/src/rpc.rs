//! Client side of the peripheral manager RPC bridge
//!
//! The client never touches sockets. It marshals arguments to JSON, hands
//! them to an injected [`RpcTransport`] and decodes the result. Session token
//! handling is limited to prepending the token the client was built with.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Failures of a remote call. The controller treats all of them alike.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    /// Connection lost, refused or timed out
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response did not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The remote side rejected the call
    #[error("Remote error: {0}")]
    Remote(String),
}

/// Blocking request/response channel to the peripheral manager
pub trait RpcTransport: Send + Sync {
    /// Issue `method` with positional `params`, blocking for the result
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError>;
}

/// Typed RPC client holding a negotiated session token
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn RpcTransport>,
    token: String,
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient").finish_non_exhaustive()
    }
}

impl RpcClient {
    pub fn new(transport: Arc<dyn RpcTransport>, token: impl Into<String>) -> Self {
        RpcClient {
            transport,
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Call `method` without a token.
    ///
    /// `args` is anything serializing to a JSON array (usually a tuple);
    /// `()` sends no arguments and a scalar is sent as one argument.
    pub fn request<T, A>(&self, method: &str, args: A) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
        A: Serialize,
    {
        let params = to_params(args)?;
        self.invoke(method, params)
    }

    /// Call `method` with the session token as the first argument
    pub fn request_with_token<T, A>(&self, method: &str, args: A) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
        A: Serialize,
    {
        let mut params = Vec::with_capacity(4);
        params.push(Value::String(self.token.clone()));
        params.extend(to_params(args)?);
        self.invoke(method, params)
    }

    fn invoke<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T, RpcError> {
        log::trace!("RPC {} with {} params", method, params.len());
        let result = self.transport.call(method, params)?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::Malformed(format!("{}: {}", method, e)))
    }
}

fn to_params<A: Serialize>(args: A) -> Result<Vec<Value>, RpcError> {
    match serde_json::to_value(args) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(Value::Null) => Ok(Vec::new()),
        Ok(other) => Ok(vec![other]),
        Err(e) => Err(RpcError::Malformed(format!("cannot encode arguments: {}", e))),
    }
}
