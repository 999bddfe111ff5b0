//! Checks and rewrites the orchestrator runs around lowering.
//!
//! `type_check` and `const_fold` work on the statement tree before lowering;
//! `init_check` works on the lowered graph. Each is deterministic and reports
//! user problems as diagnostics.

pub mod const_fold;
pub mod init_check;
pub mod type_check;

pub use const_fold::fold_function;
