//! Network layer: handshake, framing, the connection multiplexer and
//! cursors.
//!
//! ## Protocol Flow
//!
//! 1. **Handshake**: version magic, auth key, JSON protocol magic; the
//!    server answers a NUL-terminated `"SUCCESS"`.
//! 2. **Query/Response Loop**: frames of `[token][length][JSON payload]` in
//!    both directions. Many queries multiplex over one socket; a single
//!    background reader task files responses by token.
//! 3. **Cursors**: each query's responses are pulled through a [`Cursor`],
//!    which issues CONTINUE for further batches and STOP on cancellation.

pub mod connection;
pub mod cursor;
pub mod protocol;
pub mod response;

pub use connection::{connect, ConnectOptions, Connection, DEFAULT_HOST, DEFAULT_PORT};
pub use cursor::Cursor;
pub use response::Response;
