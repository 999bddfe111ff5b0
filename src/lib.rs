//! packc - a compiler core for frame-stack command machines.
//!
//! packc lowers a small typed imperative language into command text for a
//! machine that only has named callable units, a data storage and a
//! scoreboard: two scratch registers, a stack of call frames, and one unit per
//! basic block that is not inlined into its predecessor.
//!
//! # Primary Usage
//!
//! ```ignore
//! use packc::{Compiler, MemorySink, Module, TargetConfig};
//!
//! let sink = MemorySink::new();
//! let compiler = Compiler::new(&module, &sink, TargetConfig::default());
//! let exported = compiler.export("fact", fact, &["n".to_string()])?;
//! compiler.emit_runtime_init()?;
//! ```
//!
//! # Architecture
//!
//! - [`tree`] - Typed statement tree and builder (input)
//! - [`passes`] - Kind checking, constant folding, definite assignment
//! - [`lower`] - Statement tree to control-flow graph
//! - [`ir`] - Control-flow graph IR and printer
//! - [`core`] - Analyzer, storage allocator, register cache, orchestrator
//! - [`datapack`] - Command rendering, calling convention, emitter
//! - [`sink`] - Where emitted units go

pub mod core;
pub mod datapack;
pub mod diagnostics;
pub mod ir;
pub mod lower;
pub mod passes;
pub mod sink;
pub mod tree;

pub use crate::core::{
    // Orchestration
    Compiled, Compiler, CompilerOptions, Exported,
    // Errors
    CompileError, CompileResult,
    // Session management
    CompilationSession, SessionStats,
};
pub use datapack::TargetConfig;
pub use diagnostics::{Diagnostic, Severity};
pub use sink::{DirSink, MemorySink, Sink, UnitWriter};
pub use tree::{FuncRef, Kind, Module, SourceLoc, Value};
