//! Raw TCP transport to the instrument.
//!
//! Every send is an independent transaction: resolve, connect, write the
//! payload once, read at most one chunk, close. Nothing is pooled and nothing
//! is retried.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Largest response read from the instrument. Longer replies are truncated.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Outcome of one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendResult {
    /// The payload was written. The response may be empty when the
    /// instrument did not answer within the read window.
    Success(String),
    /// The exchange failed; carries a human-readable cause.
    Failure(String),
}

impl SendResult {
    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        matches!(self, SendResult::Success(_))
    }
}

/// Reasons a transaction can fail before a result is produced.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("could not resolve {host}: no addresses found")]
    NoAddress { host: String },

    #[error("Connection refused by {addr} - is the instrument listening?")]
    Refused { addr: SocketAddr },

    #[error("{addr} is unreachable: {source}")]
    Unreachable {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Connection to {target} timed out after {timeout:?}")]
    ConnectTimeout { target: String, timeout: Duration },

    #[error("I/O error talking to {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: io::Error,
    },
}

/// Timeouts applied to a single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    /// Upper bound for resolving and connecting.
    pub connect_timeout: Duration,
    /// How long to wait for a reply after writing.
    pub read_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_millis(100),
        }
    }
}

/// Something that can carry one payload to an instrument.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, host: &str, port: u16, payload: &str) -> SendResult;
}

/// Plain TCP transport.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    options: TransportOptions,
}

impl TcpTransport {
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, host: &str, port: u16, payload: &str) -> SendResult {
        send(host, port, payload, &self.options).await
    }
}

/// Send `payload` to `host:port` and wait briefly for one reply.
///
/// Every error is folded into [`SendResult::Failure`]; a read timeout is a
/// successful, empty response.
pub async fn send(host: &str, port: u16, payload: &str, options: &TransportOptions) -> SendResult {
    let target = format!("{}:{}", host, port);

    let mut stream = match connect(host, port, options.connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            debug!("Connect to {} failed: {}", target, e);
            return SendResult::Failure(e.to_string());
        }
    };

    let outcome = exchange(&mut stream, payload, options.read_timeout)
        .await
        .map_err(|source| TransportError::Io {
            target: target.clone(),
            source,
        });

    // The exchange outcome wins over any close error.
    if let Err(e) = stream.shutdown().await {
        debug!("Closing connection to {} failed: {}", target, e);
    }

    match outcome {
        Ok(response) => SendResult::Success(response),
        Err(e) => SendResult::Failure(e.to_string()),
    }
}

/// Resolve `host` and connect to the first address that accepts.
async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, TransportError> {
    let target = format!("{}:{}", host, port);

    let addrs: Vec<SocketAddr> =
        match tokio::time::timeout(timeout, tokio::net::lookup_host((host, port))).await {
            Ok(Ok(addrs)) => addrs.collect(),
            Ok(Err(source)) => {
                return Err(TransportError::Resolve {
                    host: host.to_string(),
                    source,
                })
            }
            Err(_) => return Err(TransportError::ConnectTimeout { target, timeout }),
        };

    let mut last_error = TransportError::NoAddress {
        host: host.to_string(),
    };

    for addr in addrs {
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                debug!("Connected to {}", addr);
                return Ok(stream);
            }
            Ok(Err(source)) => last_error = classify_connect_error(addr, source, timeout),
            Err(_) => {
                last_error = TransportError::ConnectTimeout {
                    target: target.clone(),
                    timeout,
                }
            }
        }
    }

    Err(last_error)
}

fn classify_connect_error(addr: SocketAddr, source: io::Error, timeout: Duration) -> TransportError {
    match source.kind() {
        io::ErrorKind::ConnectionRefused => TransportError::Refused { addr },
        io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable
        | io::ErrorKind::AddrNotAvailable => TransportError::Unreachable { addr, source },
        io::ErrorKind::TimedOut => TransportError::ConnectTimeout {
            target: addr.to_string(),
            timeout,
        },
        _ => TransportError::Io {
            target: addr.to_string(),
            source,
        },
    }
}

/// Write the payload, then read one chunk within `read_timeout`.
async fn exchange(stream: &mut TcpStream, payload: &str, read_timeout: Duration) -> io::Result<String> {
    stream.write_all(payload.as_bytes()).await?;
    stream.flush().await?;

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    match tokio::time::timeout(read_timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) => Ok(String::from_utf8_lossy(&buf[..n]).into_owned()),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            debug!("No response within {:?}", read_timeout);
            Ok(String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn options() -> TransportOptions {
        TransportOptions {
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_millis(200),
        }
    }

    /// Accept one connection, hand back what was read, optionally reply,
    /// then hold the socket open until the client is done.
    async fn one_shot_server(reply: Option<&'static [u8]>) -> (u16, oneshot::Receiver<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            if let Some(reply) = reply {
                socket.write_all(reply).await.unwrap();
            }
            let _ = tx.send(buf[..n].to_vec());
            // Wait for the client to close.
            let _ = socket.read(&mut buf).await;
        });

        (port, rx)
    }

    #[tokio::test]
    async fn test_send_receives_response() {
        let (port, received) = one_shot_server(Some(b"ACME,DMM-1,123,1.0\n")).await;

        let result = send("127.0.0.1", port, "*IDN?\n", &options()).await;

        assert_eq!(result, SendResult::Success("ACME,DMM-1,123,1.0\n".to_string()));
        assert_eq!(received.await.unwrap(), b"*IDN?\n");
    }

    #[tokio::test]
    async fn test_silent_listener_is_empty_success() {
        let (port, received) = one_shot_server(None).await;

        let result = send("127.0.0.1", port, "OUTP ON\n", &options()).await;

        assert_eq!(result, SendResult::Success(String::new()));
        assert_eq!(received.await.unwrap(), b"OUTP ON\n");
    }

    #[tokio::test]
    async fn test_closed_port_is_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = send("127.0.0.1", port, "*IDN?\n", &options()).await;

        match result {
            SendResult::Failure(reason) => assert!(reason.contains("refused"), "{}", reason),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unresolvable_host_fails() {
        let result = send("instrument.invalid", 5025, "*IDN?\n", &options()).await;
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_response_truncated_to_buffer() {
        static BIG: [u8; READ_BUFFER_SIZE + 512] = [b'x'; READ_BUFFER_SIZE + 512];
        let (port, _received) = one_shot_server(Some(&BIG)).await;

        // Give the whole reply time to land before the single read.
        let opts = TransportOptions {
            read_timeout: Duration::from_secs(1),
            ..options()
        };
        match send("127.0.0.1", port, "DATA?\n", &opts).await {
            SendResult::Success(response) => {
                assert!(!response.is_empty());
                assert!(response.len() <= READ_BUFFER_SIZE);
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_decoded_lossily() {
        let (port, _received) = one_shot_server(Some(&[0x4f, 0x4b, 0xff])).await;

        let result = send("127.0.0.1", port, "X\n", &options()).await;

        assert_eq!(result, SendResult::Success("OK\u{fffd}".to_string()));
    }

    #[test]
    fn test_refused_error_message() {
        let addr: SocketAddr = "127.0.0.1:5025".parse().unwrap();
        let err = classify_connect_error(
            addr,
            io::Error::from(io::ErrorKind::ConnectionRefused),
            Duration::from_secs(1),
        );
        assert!(matches!(err, TransportError::Refused { .. }));
        assert!(err.to_string().contains("Connection refused"));
    }
}
