//! Blocking TCP transport for the peripheral manager RPC bridge
//!
//! One persistent connection carries one request at a time. A transport
//! failure drops the connection; the next call opens a fresh one.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use rhodium_core::{RpcError, RpcTransport};
use serde_json::Value;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::config::TransportConfig;
use crate::wire::{self, Request};

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

pub struct TcpTransport {
    address: SocketAddr,
    config: TransportConfig,
    connection: Mutex<Option<Connection>>,
    next_id: AtomicU64,
}

fn transport_error(context: &str, e: io::Error) -> RpcError {
    RpcError::Transport(format!("{}: {}", context, e))
}

impl TcpTransport {
    /// Resolve the configured address and open the connection
    pub fn connect(config: &TransportConfig) -> Result<Self, RpcError> {
        let address = config
            .address
            .to_socket_addrs()
            .map_err(|e| transport_error(&config.address, e))?
            .next()
            .ok_or_else(|| RpcError::Transport(format!("{}: no address", config.address)))?;

        let connection = Self::open(address, config)?;
        log::debug!("Connected to peripheral manager at {}", address);
        Ok(TcpTransport {
            address,
            config: config.clone(),
            connection: Mutex::new(Some(connection)),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.address
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn open(address: SocketAddr, config: &TransportConfig) -> Result<Connection, RpcError> {
        let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| transport_error("socket", e))?;
        socket
            .set_nodelay(true)
            .map_err(|e| transport_error("nodelay", e))?;

        let target = SockAddr::from(address);
        match config.connect_timeout() {
            Some(timeout) => socket.connect_timeout(&target, timeout),
            None => socket.connect(&target),
        }
        .map_err(|e| transport_error(&format!("connect {}", address), e))?;

        socket
            .set_read_timeout(config.io_timeout())
            .map_err(|e| transport_error("read timeout", e))?;
        socket
            .set_write_timeout(config.io_timeout())
            .map_err(|e| transport_error("write timeout", e))?;

        let writer: TcpStream = socket.into();
        let reader = writer
            .try_clone()
            .map_err(|e| transport_error("clone", e))?;
        Ok(Connection {
            reader: BufReader::new(reader),
            writer,
        })
    }

    fn exchange(connection: &mut Connection, line: &str) -> Result<String, RpcError> {
        connection
            .writer
            .write_all(line.as_bytes())
            .and_then(|_| connection.writer.flush())
            .map_err(|e| transport_error("send", e))?;

        let mut reply = String::new();
        let n = connection
            .reader
            .read_line(&mut reply)
            .map_err(|e| transport_error("receive", e))?;
        if n == 0 {
            return Err(RpcError::Transport("connection closed by peer".to_string()));
        }
        Ok(reply)
    }
}

impl RpcTransport for TcpTransport {
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = wire::encode_line(&Request {
            id,
            method: method.to_string(),
            params,
        })?;

        let mut guard = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            log::debug!("Reconnecting to peripheral manager at {}", self.address);
            *guard = Some(Self::open(self.address, &self.config)?);
        }
        let Some(connection) = guard.as_mut() else {
            return Err(RpcError::Transport("not connected".to_string()));
        };

        log::trace!("-> {}", line.trim_end());
        let reply = match Self::exchange(connection, &line) {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("{} failed: {}", method, e);
                *guard = None;
                return Err(e);
            }
        };
        log::trace!("<- {}", reply.trim_end());

        let response = wire::decode_response(&reply)?;
        if response.id != id {
            // Stream is out of step with our requests
            *guard = None;
            return Err(RpcError::Malformed(format!(
                "response id {} does not match request id {}",
                response.id, id
            )));
        }
        response.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Response;
    use rhodium_core::RpcClient;
    use serde_json::json;
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::thread;

    /// Answer each request according to its method name
    fn serve(stream: TcpStream) {
        let mut writer = stream.try_clone().unwrap();
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            let Ok(line) = line else { return };
            let request = wire::decode_request(&line).unwrap();
            let response = match request.method.as_str() {
                "echo" => Response::ok(request.id, Value::Array(request.params)),
                "fail" => Response::err(request.id, "rejected"),
                "skew" => Response::ok(request.id + 100, Value::Null),
                "garbage" => {
                    writer.write_all(b"not json\n").unwrap();
                    continue;
                }
                "hangup" => return,
                "stall" => {
                    thread::sleep(std::time::Duration::from_millis(500));
                    continue;
                }
                _ => Response::err(request.id, "unknown method"),
            };
            let out = wire::encode_line(&response).unwrap();
            if writer.write_all(out.as_bytes()).is_err() {
                return;
            }
        }
    }

    fn server() -> TransportConfig {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                thread::spawn(move || serve(stream));
            }
        });
        TransportConfig {
            address: address.to_string(),
            connect_timeout_ms: 1000,
            io_timeout_ms: 200,
        }
    }

    #[test]
    fn test_round_trip_through_client() {
        let transport = Arc::new(TcpTransport::connect(&server()).unwrap());
        let client = RpcClient::new(transport, "tok");

        let echoed: (String, String, usize) =
            client.request_with_token("echo", ("RX", 0)).unwrap();
        assert_eq!(echoed, ("tok".to_string(), "RX".to_string(), 0));

        let plain: Vec<i32> = client.request("echo", (1, 2, 3)).unwrap();
        assert_eq!(plain, vec![1, 2, 3]);
    }

    #[test]
    fn test_remote_error() {
        let transport = TcpTransport::connect(&server()).unwrap();
        assert_eq!(
            transport.call("fail", vec![]),
            Err(RpcError::Remote("rejected".to_string()))
        );
        assert!(transport.is_connected());
        assert_eq!(transport.call("echo", vec![json!(1)]).unwrap(), json!([1]));
    }

    #[test]
    fn test_id_mismatch_is_malformed() {
        let transport = TcpTransport::connect(&server()).unwrap();
        assert!(matches!(transport.call("skew", vec![]), Err(RpcError::Malformed(_))));
        assert!(!transport.is_connected());
        assert_eq!(transport.call("echo", vec![]).unwrap(), json!([]));
    }

    #[test]
    fn test_garbage_reply_is_malformed() {
        let transport = TcpTransport::connect(&server()).unwrap();
        assert!(matches!(transport.call("garbage", vec![]), Err(RpcError::Malformed(_))));
    }

    #[test]
    fn test_hangup_then_reconnect() {
        let transport = TcpTransport::connect(&server()).unwrap();
        assert!(matches!(transport.call("hangup", vec![]), Err(RpcError::Transport(_))));
        assert!(!transport.is_connected());
        assert_eq!(transport.call("echo", vec![json!("x")]).unwrap(), json!(["x"]));
        assert!(transport.is_connected());
    }

    #[test]
    fn test_read_timeout() {
        let transport = TcpTransport::connect(&server()).unwrap();
        assert!(matches!(transport.call("stall", vec![]), Err(RpcError::Transport(_))));
    }

    #[test]
    fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);
        let config = TransportConfig {
            address: address.to_string(),
            ..TransportConfig::default()
        };
        assert!(matches!(TcpTransport::connect(&config), Err(RpcError::Transport(_))));
    }

    #[test]
    fn test_unresolvable_address() {
        let config = TransportConfig {
            address: "not an address".to_string(),
            ..TransportConfig::default()
        };
        assert!(matches!(TcpTransport::connect(&config), Err(RpcError::Transport(_))));
    }
}
