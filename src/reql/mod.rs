//! The query-language layer.
//!
//! Three pieces:
//!
//! 1. **Datum** (`datum.rs`): the tagged value type exchanged with the
//!    server, plus its canonical JSON codec (`json.rs`).
//! 2. **Terms** (`terms.rs`): the numeric wire codes for operations,
//!    query kinds, response kinds and error kinds.
//! 3. **Query builder** (`query.rs`, `commands.rs`): the expression-tree
//!    builder with hygienic variable binding, and the command surface over
//!    it.

pub mod commands;
pub mod datum;
pub mod json;
pub mod query;
pub mod terms;

pub use datum::Datum;
pub use query::{func0, func1, func2, func_wrap, OptArgs, Query, Var};
pub use terms::{ErrorType, QueryType, ResponseType, TermType};
