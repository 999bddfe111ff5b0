// This module defines the fatal error type for the packc compiler core using the thiserror
// crate. CompileError covers the failures that indicate a defect rather than a user mistake:
// checker-contract violations reaching lowering (kind mismatches, unknown variables, wrong
// arity), malformed loop control (unknown or duplicate labels, break/continue outside a loop),
// and emission invariant violations (an unreachable end instruction, an unresolved callee, a
// register where a frame slot is required). Sink I/O failures are wrapped as well. User-facing
// problems are never raised through this type; they travel as Diagnostic values instead.

//! Error types for the packc compiler.
//!
//! Using thiserror for idiomatic error handling.

use crate::ir::{NodeId, Slot};
use crate::tree::{FuncRef, Kind, SourceLoc};
use thiserror::Error;

/// Fatal compiler error.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("kind mismatch at {loc}: expected {expected}, found {found}")]
    KindMismatch {
        expected: Kind,
        found: Kind,
        loc: SourceLoc,
    },

    #[error("unknown variable `{name}` at {loc}")]
    UnknownVariable { name: String, loc: SourceLoc },

    #[error("unknown function {func}")]
    UnknownFunction { func: FuncRef },

    #[error("call to `{callee}` at {loc} passes {found} arguments, expected {expected}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        found: usize,
        loc: SourceLoc,
    },

    #[error("unknown loop label `{label}` at {loc}")]
    UnknownLabel { label: String, loc: SourceLoc },

    #[error("duplicate loop label `{label}` at {loc}")]
    DuplicateLabel { label: String, loc: SourceLoc },

    #[error("`{keyword}` outside of a loop at {loc}")]
    LoopControlOutsideLoop { keyword: &'static str, loc: SourceLoc },

    #[error("node {node} already has an end instruction")]
    NodeAlreadyClosed { node: NodeId },

    #[error("node {node} reached emission with an unreachable end instruction")]
    UnreachableEmitted { node: NodeId },

    #[error("callee {callee} has no assigned unit name")]
    UnresolvedCallee { callee: FuncRef },

    #[error("{slot} is register-resident where a frame slot is required")]
    RegisterAtFrameSite { slot: Slot },

    #[error("{slot} is read from a register that does not hold it")]
    RegisterLifetime { slot: Slot },

    #[error("{slot} is read but was never placed")]
    UnplacedSlot { slot: Slot },

    #[error("sink error: {0}")]
    Sink(#[from] std::io::Error),
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
