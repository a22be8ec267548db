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

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (row and condition builders), postgres.rs (disposable
//! Postgres databases), schema.rs (tables the engine reconciles).

pub mod fixtures;
pub mod postgres;
pub mod schema;

pub use crate::postgres::{TestDatabase, start_postgres};
pub use crate::schema::apply_schema;
