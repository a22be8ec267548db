#![forbid(unsafe_code)]
#![deny(
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

//! Nested child-collection reconciliation.
//!
//! Layout: `plan.rs` (pure matcher producing insert/update/delete plans),
//! `store.rs` (storage primitives), `memory.rs` (in-memory store),
//! `engine.rs` (`Reconciler`: level-by-level execution and id backfill),
//! `filter.rs` (filter validation and formula persistence), `load.rs`
//! (stored tree loading), `writes.rs` (audit write log).

pub mod engine;
pub mod error;
pub mod filter;
pub mod load;
pub mod memory;
pub mod plan;
pub mod store;
pub mod writes;

pub use engine::{Group, Reconciled, ReconciledGroups, Reconciler, SyncedByOwner};
pub use error::{ReconcileError, ReconcileResult, StoreError, StoreResult};
pub use filter::{FilterJob, SyncedFilter, SyncedFilters};
pub use load::{load_conditions, load_existing};
pub use memory::{MemoryStore, StoreCall, StoreOp};
pub use plan::{Plan, plan};
pub use store::{Correlation, InsertRow, RowUpdate, SelectedRow, Store};
pub use writes::{DeletedRow, InsertedRow, TableWrites, UpdatedRow, WriteLog};
