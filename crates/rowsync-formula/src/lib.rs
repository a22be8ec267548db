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

//! Boolean filter formulas over condition letters and condition identifiers.
//!
//! Layout: `parse.rs` (tokenizer and recursive-descent parser for both the
//! letter and the numeric dialect), `letters.rs` (letter encoding),
//! `auto.rs` (canonical ordering and generated formulas), `validate.rs`
//! (expression filters against their conditions), `rewrite.rs` (dialect
//! substitution passes), `display.rs` (read-back shaping).
//!
//! Every function here is pure; nothing performs I/O.

pub mod auto;
pub mod display;
pub mod error;
pub mod letters;
pub mod parse;
pub mod rewrite;
pub mod validate;

pub use auto::{
    assign_formula_ids, canonical_letters, canonical_order, compute_auto_formula,
    compute_auto_numeric_formula,
};
pub use display::{FilterView, read_back, read_back_filter};
pub use error::{FormulaError, FormulaResult};
pub use letters::{letter, letter_index};
pub use parse::{Constant, Expr, Formula, Operand, parse, parse_numeric};
pub use rewrite::{
    letters_by_appearance, reset_formula_ids, rewrite_ids_to_letters, rewrite_letters_to_ids,
};
pub use validate::{validate, validate_filter};
