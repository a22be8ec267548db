#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Postgres binding of the storage primitives the reconciliation engine writes through.
//! Layout: sql.rs (identifier checks and statement text), store.rs (`PgStore`), error.rs.

pub mod error;
pub mod sql;
pub mod store;

pub use error::{DataError, Result as DataResult};
pub use store::PgStore;
