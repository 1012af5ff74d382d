//! TCP connection management and response demultiplexing.
//!
//! One [`Connection`] owns a socket and a single background reader task. Any
//! number of queries run concurrently over it, each identified by a 64-bit
//! token. The reader decodes frames and files each response into the
//! per-token cache; callers block on [`Connection::wait_for_response`] until
//! their token has something queued.
//!
//! # Locks
//!
//! - the **writer** lock serializes frame writes (frames are assembled into
//!   one buffer first, so payloads are contiguous on the wire);
//! - the **cache** lock guards the token map and each entry's
//!   `{closed, queue, notify}` record, and is only ever held briefly - never
//!   across socket I/O;
//! - the reader half is owned exclusively by the background task, enforced
//!   by the `loop_active` flag.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::net::cursor::Cursor;
use crate::net::protocol::{client_handshake, encode_frame, read_frame};
use crate::net::response::Response;
use crate::reql::datum::Datum;
use crate::reql::json;
use crate::reql::query::OptArgs;
use crate::reql::terms::{QueryType, ResponseType};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 28015;

/// Connection parameters. The defaults match the server's defaults:
/// `localhost:28015` with an empty auth key.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub auth_key: String,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            auth_key: String::new(),
        }
    }
}

impl ConnectOptions {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn auth_key(mut self, auth_key: impl Into<String>) -> Self {
        self.auth_key = auth_key.into();
        self
    }

    pub async fn connect(self) -> Result<Connection> {
        Connection::connect(self).await
    }
}

/// Open a connection to the server.
pub async fn connect(host: &str, port: u16, auth_key: &str) -> Result<Connection> {
    ConnectOptions {
        host: host.to_string(),
        port,
        auth_key: auth_key.to_string(),
    }
    .connect()
    .await
}

/// Per-token record in the response cache.
struct TokenCache {
    closed: bool,
    queue: VecDeque<Response>,
    notify: Arc<Notify>,
}

impl TokenCache {
    fn new() -> TokenCache {
        TokenCache {
            closed: false,
            queue: VecDeque::new(),
            notify: Arc::new(Notify::new()),
        }
    }
}

struct ConnectionInner {
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    cache: Mutex<HashMap<u64, TokenCache>>,
    next_token: AtomicU64,
    loop_active: AtomicBool,
    closed: AtomicBool,
    stop_tx: mpsc::UnboundedSender<u64>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }
}

/// A handle to one server connection. Cheap to clone; all clones share the
/// same socket, token allocator and response cache.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

/// Lock a std mutex without caring about poisoning: the guarded state stays
/// consistent even if a holder panicked mid-update elsewhere.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn envelope(query_type: QueryType, term: Option<Datum>, optargs: Option<Datum>) -> Vec<u8> {
    let mut parts = vec![Datum::Number(query_type.code() as f64)];
    if let Some(term) = term {
        parts.push(term);
    }
    if let Some(optargs) = optargs {
        parts.push(optargs);
    }
    json::write(&Datum::Array(parts)).into_bytes()
}

impl Connection {
    /// Connect and perform the handshake, then spawn the background reader.
    pub async fn connect(options: ConnectOptions) -> Result<Connection> {
        let mut stream = TcpStream::connect((options.host.as_str(), options.port)).await?;
        client_handshake(&mut stream, &options.auth_key).await?;
        tracing::debug!(host = %options.host, port = options.port, "connection established");

        let (read_half, write_half) = stream.into_split();
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        let connection = Connection {
            inner: Arc::new(ConnectionInner {
                writer: tokio::sync::Mutex::new(Some(write_half)),
                cache: Mutex::new(HashMap::new()),
                next_token: AtomicU64::new(1),
                loop_active: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                stop_tx,
                tasks: Mutex::new(Vec::new()),
            }),
        };
        connection.spawn_reader(read_half)?;
        connection.spawn_stop_dispatcher(stop_rx);
        Ok(connection)
    }

    fn spawn_reader(&self, read_half: OwnedReadHalf) -> Result<()> {
        if self.inner.loop_active.swap(true, Ordering::SeqCst) {
            return Err(Error::Protocol(
                "cannot run more than one read loop on the same connection".into(),
            ));
        }
        let inner = Arc::downgrade(&self.inner);
        let task = tokio::spawn(reader_loop(read_half, inner));
        lock(&self.inner.tasks).push(task);
        Ok(())
    }

    fn spawn_stop_dispatcher(&self, mut stop_rx: mpsc::UnboundedReceiver<u64>) {
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(token) = stop_rx.recv().await {
                let Some(inner) = weak.upgrade() else { return };
                let connection = Connection { inner };
                let _ = connection.stop_query(token).await;
                connection.retire_token(token);
            }
        });
        lock(&self.inner.tasks).push(task);
    }

    fn check_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            Err(Error::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// Allocate a token, register its cache entry, send START and hand back
    /// a cursor. With `noreply` the cursor comes back already terminated and
    /// nothing blocks; otherwise this waits for the query's first response.
    pub(crate) async fn start_query(&self, term: Datum, optargs: OptArgs) -> Result<Cursor> {
        self.check_open()?;
        let noreply = optargs.noreply();
        let token = self.inner.next_token.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.cache).insert(token, TokenCache::new());

        let optargs = optargs.into_datum()?;
        let payload = envelope(QueryType::Start, Some(term), optargs);
        tracing::trace!(token, "START");
        if let Err(err) = self.send_frame(token, &payload).await {
            lock(&self.inner.cache).remove(&token);
            return Err(err);
        }

        if noreply {
            lock(&self.inner.cache).remove(&token);
            return Ok(Cursor::noreply(self.clone(), token));
        }

        let mut cursor = Cursor::fresh(self.clone(), token);
        let response = self.wait_for_response(token, None).await?;
        cursor.add_response(response)?;
        Ok(cursor)
    }

    /// Request the next batch for a partial stream.
    pub async fn continue_query(&self, token: u64) -> Result<()> {
        tracing::trace!(token, "CONTINUE");
        self.send_frame(token, &envelope(QueryType::Continue, None, None))
            .await
    }

    /// Cancel a stream. Sent only while the token's cache entry exists and
    /// is not already closed.
    pub async fn stop_query(&self, token: u64) -> Result<()> {
        let live = lock(&self.inner.cache)
            .get(&token)
            .map_or(false, |entry| !entry.closed);
        if live {
            tracing::trace!(token, "STOP");
            self.send_frame(token, &envelope(QueryType::Stop, None, None))
                .await?;
        }
        Ok(())
    }

    /// Wait for all previous `noreply` writes on this connection to settle.
    pub async fn noreply_wait(&self) -> Result<()> {
        self.check_open()?;
        let token = self.inner.next_token.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.cache).insert(token, TokenCache::new());
        tracing::trace!(token, "NOREPLY_WAIT");
        if let Err(err) = self
            .send_frame(token, &envelope(QueryType::NoreplyWait, None, None))
            .await
        {
            lock(&self.inner.cache).remove(&token);
            return Err(err);
        }
        let response = self.wait_for_response(token, None).await?;
        match response.kind {
            ResponseType::WaitComplete => Ok(()),
            _ => Err(response.into_error()),
        }
    }

    /// Ask the server to describe itself.
    pub async fn server_info(&self) -> Result<Datum> {
        self.check_open()?;
        let token = self.inner.next_token.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.cache).insert(token, TokenCache::new());
        tracing::trace!(token, "SERVER_INFO");
        if let Err(err) = self
            .send_frame(token, &envelope(QueryType::ServerInfo, None, None))
            .await
        {
            lock(&self.inner.cache).remove(&token);
            return Err(err);
        }
        let response = self.wait_for_response(token, None).await?;
        match response.kind {
            ResponseType::ServerInfo => response
                .result
                .into_iter()
                .next()
                .ok_or_else(|| Error::Protocol("empty SERVER_INFO response".into())),
            _ => Err(response.into_error()),
        }
    }

    /// Block until a response for `token` is available, up to `timeout`
    /// (`None` waits forever). The queue is re-checked before every wait so
    /// a wakeup can never be lost; a timeout leaves the token valid for
    /// further waits.
    pub async fn wait_for_response(&self, token: u64, timeout: Option<Duration>) -> Result<Response> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        loop {
            let notify = {
                let mut cache = lock(&self.inner.cache);
                let Some(entry) = cache.get_mut(&token) else {
                    return Err(Error::ConnectionClosed);
                };
                if let Some(response) = entry.queue.pop_front() {
                    if entry.closed && entry.queue.is_empty() {
                        cache.remove(&token);
                    }
                    return Ok(response);
                }
                if entry.closed || self.inner.closed.load(Ordering::SeqCst) {
                    return Err(Error::ConnectionClosed);
                }
                entry.notify.clone()
            };
            match deadline {
                None => notify.notified().await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notify.notified())
                        .await
                        .is_err()
                    {
                        return Err(Error::Timeout);
                    }
                }
            }
        }
    }

    /// Queue a STOP for `token` without blocking; used from cursor drops.
    pub(crate) fn stop_request(&self, token: u64) {
        let _ = self.inner.stop_tx.send(token);
    }

    /// Forget a token. Any straggler frames for it will be dropped by the
    /// reader as unknown.
    pub(crate) fn retire_token(&self, token: u64) {
        lock(&self.inner.cache).remove(&token);
    }

    async fn send_frame(&self, token: u64, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(token, payload);
        let mut writer = self.inner.writer.lock().await;
        let Some(write_half) = writer.as_mut() else {
            return Err(Error::ConnectionClosed);
        };
        write_half.write_all(&frame).await?;
        write_half.flush().await?;
        Ok(())
    }

    /// Shut the connection down: stop every live query, close the socket,
    /// wake all waiters. Idempotent; I/O failures during teardown are
    /// swallowed so closing during unwinding never re-raises.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!("closing connection");

        let live_tokens: Vec<u64> = lock(&self.inner.cache)
            .iter()
            .filter(|(_, entry)| !entry.closed)
            .map(|(token, _)| *token)
            .collect();
        for token in live_tokens {
            let _ = self
                .send_frame(token, &envelope(QueryType::Stop, None, None))
                .await;
        }

        {
            let mut writer = self.inner.writer.lock().await;
            if let Some(mut write_half) = writer.take() {
                let _ = write_half.shutdown().await;
            }
        }

        for task in lock(&self.inner.tasks).drain(..) {
            task.abort();
        }

        let mut cache = lock(&self.inner.cache);
        for entry in cache.values_mut() {
            entry.closed = true;
            entry.notify.notify_one();
        }
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .field(
                "next_token",
                &self.inner.next_token.load(Ordering::SeqCst),
            )
            .finish()
    }
}

/// The single background reader: decode frames, file them by token, mark
/// entries closed on any terminal (non-PARTIAL) response. Stops on the
/// first I/O or protocol error, closing every entry so waiters observe
/// `ConnectionClosed`.
async fn reader_loop(mut read_half: OwnedReadHalf, weak: Weak<ConnectionInner>) {
    let error = loop {
        let (token, payload) = match read_frame(&mut read_half).await {
            Ok(frame) => frame,
            Err(err) => break err,
        };
        let response = match json::parse_slice(&payload).and_then(Response::decode) {
            Ok(response) => response,
            Err(err) => break err,
        };
        let Some(inner) = weak.upgrade() else { return };
        tracing::trace!(
            token,
            kind = response.kind.name(),
            results = response.result.len(),
            "response frame"
        );
        let mut cache = lock(&inner.cache);
        match cache.get_mut(&token) {
            None => {
                tracing::warn!(token, "dropping frame for unknown token");
            }
            Some(entry) if entry.closed => {
                tracing::trace!(token, "dropping frame for closed token");
            }
            Some(entry) => {
                if response.kind != ResponseType::SuccessPartial {
                    entry.closed = true;
                }
                entry.queue.push_back(response);
                entry.notify.notify_one();
            }
        }
    };

    if let Some(inner) = weak.upgrade() {
        if !inner.closed.load(Ordering::SeqCst) {
            tracing::error!(error = %error, "reader loop terminated");
        }
        inner.closed.store(true, Ordering::SeqCst);
        let mut cache = lock(&inner.cache);
        for entry in cache.values_mut() {
            entry.closed = true;
            entry.notify.notify_one();
        }
    }
}
