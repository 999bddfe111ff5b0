// This module gathers the target-independent machinery of packc: the analyzer computing the
// order and predecessors of reachable nodes, the storage allocator placing every logical slot in
// a scratch register or a frame field, the register-content cache the emitter consults, the
// per-function arena session with its statistics, the fatal error type, and the orchestrator
// that memoizes and parallelizes compilation across a module. Everything the datapack target
// needs to know about a function flows through these types.

//! Core packc infrastructure.
//!
//! # Key Components
//!
//! ## Analysis (`analyzer`)
//! - Reverse post-order of reachable nodes
//! - Reachable predecessors per node
//!
//! ## Storage Allocation (`value_assignment`)
//! - One-node lookahead keeping just-produced operands in scratch registers
//! - Dense frame locals for everything else
//!
//! ## Register Cache (`register_file`)
//! - Tracks which slot each scratch register holds within a unit
//!
//! ## Session Management (`session`)
//! - Arena-based allocation of unit names and lines using `bumpalo`
//! - Emission statistics
//!
//! ## Orchestration (`compiler`)
//! - At-most-once compilation per function with `parking_lot` completion cells
//! - Callee fan-out on `rayon`

pub mod analyzer;
pub mod compiler;
pub mod error;
pub mod register_file;
pub mod session;
pub mod test_utils;
pub mod value_assignment;

pub use analyzer::Analyzer;
pub use compiler::{Compiled, Compiler, CompilerOptions, Exported};
pub use error::{CompileError, CompileResult};
pub use register_file::{RegisterFile, ScratchReg, SCRATCH_REGISTERS};
pub use session::{CompilationSession, SessionStats};
pub use value_assignment::{Location, StorageAllocation, StorageAllocator, ValLocalIdx};
