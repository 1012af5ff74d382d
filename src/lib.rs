//! Async client driver for PhotonDB's binary-framed JSON wire protocol.
//!
//! The driver has three tightly coupled parts: a connection multiplexer
//! that runs many concurrent queries over one TCP socket (keyed by 64-bit
//! tokens), a cursor engine that lazily pulls result batches and requests
//! continuations on demand, and a query builder for the server's typed term
//! language with hygienic variable binding.
//!
//! # Example
//!
//! ```rust,ignore
//! use photondb_client::{connect, r};
//!
//! #[tokio::main]
//! async fn main() -> photondb_client::Result<()> {
//!     let conn = connect("localhost", 28015, "").await?;
//!     let total = r::range(4).count().run(&conn).await?.to_datum().await?;
//!     assert_eq!(total.get_number(), Some(4.0));
//!
//!     let mut cursor = r::table("users")
//!         .filter(r::row().bracket("age").gt(30))
//!         .run(&conn)
//!         .await?;
//!     while let Some(user) = cursor.try_next().await? {
//!         println!("{user}");
//!     }
//!     conn.close().await
//! }
//! ```

#![warn(rust_2018_idioms)]

pub mod error;
pub mod net;
pub mod reql;

pub use error::{Error, Result, ServerErrorKind};
pub use net::connection::{connect, ConnectOptions, Connection, DEFAULT_HOST, DEFAULT_PORT};
pub use net::cursor::Cursor;
pub use net::response::Response;
pub use reql::datum::Datum;
pub use reql::query::{OptArgs, Query, Var};
pub use reql::terms::{ErrorType, QueryType, ResponseType, TermType};

/// ReQL command constructors, conventionally imported as `r`.
pub use reql::commands as r;

/// Driver version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
