//! In-process scripted server speaking the wire protocol.
//!
//! The mock accepts one connection, performs the server side of the
//! handshake, then feeds every decoded client envelope to the test's
//! handler closure. Whatever `(token, json)` pairs the handler returns are
//! framed and written back. Every received envelope is also mirrored to an
//! unbounded channel so tests can assert on the exact frames the driver
//! produced.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub struct MockServer {
    pub addr: SocketAddr,
    /// Every `(token, envelope)` the client sent, in wire order.
    pub frames: mpsc::UnboundedReceiver<(u64, Value)>,
}

impl MockServer {
    /// Receive the next client frame, failing the test after two seconds.
    pub async fn next_frame(&mut self) -> (u64, Value) {
        tokio::time::timeout(Duration::from_secs(2), self.frames.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("mock server stopped")
    }

    /// Assert no further frame arrives within the grace period.
    pub async fn assert_quiet(&mut self, grace: Duration) {
        if let Ok(Some((token, envelope))) =
            tokio::time::timeout(grace, self.frames.recv()).await
        {
            panic!("unexpected frame for token {token}: {envelope}");
        }
    }
}

/// Spawn a mock server. `handler` is called with each client envelope and
/// returns the response frames to write back.
pub async fn spawn<H>(mut handler: H) -> MockServer
where
    H: FnMut(u64, &Value) -> Vec<(u64, Value)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
    let addr = listener.local_addr().expect("mock addr");
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (mut stream, _) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(_) => return,
        };

        // Server side of the handshake.
        let _version = stream.read_u32_le().await.expect("version magic");
        let key_len = stream.read_u32_le().await.expect("auth key length");
        let mut key = vec![0u8; key_len as usize];
        stream.read_exact(&mut key).await.expect("auth key");
        let _protocol = stream.read_u32_le().await.expect("protocol magic");
        stream.write_all(b"SUCCESS\0").await.expect("handshake reply");

        loop {
            let token = match stream.read_u64_le().await {
                Ok(token) => token,
                Err(_) => return,
            };
            let length = stream.read_u32_le().await.expect("frame length");
            let mut payload = vec![0u8; length as usize];
            stream.read_exact(&mut payload).await.expect("frame payload");
            let envelope: Value = serde_json::from_slice(&payload).expect("frame JSON");

            let _ = tx.send((token, envelope.clone()));

            for (reply_token, reply) in handler(token, &envelope) {
                let body = serde_json::to_vec(&reply).expect("reply JSON");
                let mut frame = Vec::with_capacity(12 + body.len());
                frame.extend_from_slice(&reply_token.to_le_bytes());
                frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
                frame.extend_from_slice(&body);
                if stream.write_all(&frame).await.is_err() {
                    return;
                }
            }
        }
    });

    MockServer { addr, frames: rx }
}

/// The envelope's query-type code (`START = 1`, `CONTINUE = 2`, ...).
pub fn query_type(envelope: &Value) -> u64 {
    envelope
        .get(0)
        .and_then(Value::as_u64)
        .expect("envelope starts with a query type")
}
