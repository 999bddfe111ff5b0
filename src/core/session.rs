// This module provides arena-based session management for compiling one function, using the
// bumpalo crate so every unit name and emitted line produced while emitting a function shares a
// single lifetime. CompilationSession owns a reference to the arena, interns unit names, and
// tracks emission statistics: units and branch units opened, lines written, frame pushes and
// pops, calls, and register copies the emitter could elide. SessionStats is merged across
// functions by the orchestrator and printed as a summary by the command line driver.

//! Arena-based compilation session management.
//!
//! A session lives for the emission of one function; its arena is dropped once
//! the function's units have been written to the sink.

use bumpalo::Bump;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for unit names and lines.
    arena: &'arena Bump,

    /// Session statistics.
    stats: RefCell<SessionStats>,

    /// String interning for unit names.
    interned_strings: RefCell<HashMap<String, &'arena str>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Copy a string into the arena without interning it.
    pub fn alloc_str(&self, s: &str) -> &'arena str {
        self.arena.alloc_str(s)
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Record that a function's units were all written.
    pub fn record_function_compiled(&self, name: &str, lines: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_compiled += 1;
        if stats.largest_function_lines < lines {
            stats.largest_function_lines = lines;
            stats.largest_function_name = name.to_string();
        }
    }

    /// Record a unit opened for a node or the function root.
    pub fn record_unit(&self) {
        self.stats.borrow_mut().units_emitted += 1;
    }

    /// Record a macro branch unit.
    pub fn record_branch_unit(&self) {
        let mut stats = self.stats.borrow_mut();
        stats.units_emitted += 1;
        stats.branch_units += 1;
    }

    pub fn record_lines(&self, count: usize) {
        self.stats.borrow_mut().lines_emitted += count;
    }

    pub fn record_frame_push(&self) {
        self.stats.borrow_mut().frame_pushes += 1;
    }

    pub fn record_frame_pop(&self) {
        self.stats.borrow_mut().frame_pops += 1;
    }

    /// Record a register load skipped because the register already held the value.
    pub fn record_copy_elided(&self) {
        self.stats.borrow_mut().copies_elided += 1;
    }

    /// Record a call site.
    pub fn record_call_site(&self, callee: &str) {
        self.stats.borrow_mut().total_calls += 1;
        log::debug!("Call site recorded: {}", callee);
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Number of functions compiled.
    pub functions_compiled: usize,

    /// Units written, branch units included.
    pub units_emitted: usize,

    /// Macro branch units written.
    pub branch_units: usize,

    /// Lines written across all units.
    pub lines_emitted: usize,

    /// Frame push sites.
    pub frame_pushes: usize,

    /// Frame pop sites.
    pub frame_pops: usize,

    /// Register loads skipped by the register cache.
    pub copies_elided: usize,

    /// Total function calls compiled.
    pub total_calls: usize,

    /// Line count of the largest function.
    pub largest_function_lines: usize,

    /// Name of largest function.
    pub largest_function_name: String,
}

impl SessionStats {
    /// Fold another function's statistics into this one.
    pub fn merge(&mut self, other: &SessionStats) {
        self.functions_compiled += other.functions_compiled;
        self.units_emitted += other.units_emitted;
        self.branch_units += other.branch_units;
        self.lines_emitted += other.lines_emitted;
        self.frame_pushes += other.frame_pushes;
        self.frame_pops += other.frame_pops;
        self.copies_elided += other.copies_elided;
        self.total_calls += other.total_calls;
        if other.largest_function_lines > self.largest_function_lines
            || (other.largest_function_lines == self.largest_function_lines
                && other.largest_function_name < self.largest_function_name)
        {
            self.largest_function_lines = other.largest_function_lines;
            self.largest_function_name = other.largest_function_name.clone();
        }
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Functions compiled: {}", self.functions_compiled)?;
        writeln!(f, "  Units emitted: {}", self.units_emitted)?;
        writeln!(f, "  Branch units: {}", self.branch_units)?;
        writeln!(f, "  Lines emitted: {}", self.lines_emitted)?;
        writeln!(f, "  Frame pushes/pops: {}/{}", self.frame_pushes, self.frame_pops)?;
        writeln!(f, "  Register copies elided: {}", self.copies_elided)?;
        writeln!(f, "  Function calls compiled: {}", self.total_calls)?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} lines)",
                self.largest_function_name, self.largest_function_lines
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_session_creation() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let stats = session.stats();
        assert_eq!(stats.functions_compiled, 0);
        assert_eq!(stats.units_emitted, 0);
    }

    #[test]
    fn test_string_interning() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let s1 = session.intern_str("packc:__internal/fn_n_n_0");
        let s2 = session.intern_str("packc:__internal/fn_n_n_0");
        let s3 = session.intern_str("packc:__internal/fn_n_n_0/b1");

        assert_eq!(s1.as_ptr(), s2.as_ptr()); // Same string interned
        assert_ne!(s1.as_ptr(), s3.as_ptr()); // Different strings
    }

    #[test]
    fn test_session_statistics() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_unit();
        session.record_branch_unit();
        session.record_lines(7);
        session.record_frame_push();
        session.record_frame_pop();
        session.record_frame_pop();
        session.record_copy_elided();
        session.record_call_site("packc:__internal/fn_n_n_0");
        session.record_function_compiled("fact", 7);

        let stats = session.stats();
        assert_eq!(stats.units_emitted, 2);
        assert_eq!(stats.branch_units, 1);
        assert_eq!(stats.lines_emitted, 7);
        assert_eq!(stats.frame_pushes, 1);
        assert_eq!(stats.frame_pops, 2);
        assert_eq!(stats.copies_elided, 1);
        assert_eq!(stats.total_calls, 1);
        assert_eq!(stats.largest_function_name, "fact");
    }

    #[test]
    fn test_merge_and_display() {
        let mut total = SessionStats::default();
        let a = SessionStats {
            functions_compiled: 1,
            lines_emitted: 10,
            largest_function_lines: 10,
            largest_function_name: "fact".into(),
            ..SessionStats::default()
        };
        let b = SessionStats {
            functions_compiled: 1,
            lines_emitted: 4,
            copies_elided: 2,
            largest_function_lines: 4,
            largest_function_name: "greet".into(),
            ..SessionStats::default()
        };
        total.merge(&a);
        total.merge(&b);

        assert_eq!(total.functions_compiled, 2);
        assert_eq!(total.lines_emitted, 14);
        let output = format!("{}", total);
        assert!(output.contains("Functions compiled: 2"));
        assert!(output.contains("Register copies elided: 2"));
        assert!(output.contains("fact (10 lines)"));
    }
}
