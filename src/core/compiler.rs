// This module implements the compilation orchestrator. Compiler owns the memo table that maps
// every function of a module to its internal unit name and a completion cell, so each
// function is compiled at most once even when several callers reach it concurrently: the first
// request claims the cell under the table lock, later requests made while compiling a caller
// return the reserved name at once without waiting. A claimed function is kind checked,
// optionally constant folded, lowered and definite-assignment checked; any error diagnostic
// stops it before emission. Its callees are then compiled, fanned out over rayon when parallel
// compilation is enabled, and finally the storage allocator and the datapack emitter write its
// units into the sink. The public compile entry then joins: it waits for the completion cells
// of everything reachable from the function and marks the function failed when any of them
// failed. Exports reserve their external name first, compile the function, and only write
// the wrapper unit once that join succeeded. Waiting happens only at these entry points, never
// inside a compilation, so mutually recursive requests on different threads cannot deadlock.

//! Compilation orchestrator.
//!
//! Typical flow:
//! ```text
//! export("fact", f, ["n"]) {
//!     reserve "fact";
//!     compile(f) {
//!         claim f -> fn_n_n_0;
//!         type_check; const_fold; lower; init_check;
//!         request(callees) in parallel;
//!         allocate; emit units;
//!         wait for f and its callees;
//!     }
//!     emit wrapper packc:fact;
//! }
//! ```

use super::analyzer::Analyzer;
use super::error::{CompileError, CompileResult};
use super::session::{CompilationSession, SessionStats};
use super::value_assignment::StorageAllocator;
use crate::datapack::calling_convention::mangle_tag;
use crate::datapack::{emit_export_wrapper, emit_runtime_init, FunctionCodegen, TargetConfig};
use crate::diagnostics::{has_errors, Diagnostic};
use crate::lower::lower_body;
use crate::passes::{fold_function, init_check, type_check};
use crate::sink::Sink;
use crate::tree::{FuncRef, Module};
use bumpalo::Bump;
use hashbrown::{HashMap, HashSet};
use parking_lot::{Condvar, Mutex};
use rayon::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;

/// Orchestrator switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Fold constant subexpressions before lowering.
    pub fold_constants: bool,
    /// Compile independent callees on the rayon pool.
    pub parallel: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self { fold_constants: true, parallel: true }
    }
}

/// Result of [`Compiler::compile`].
#[derive(Debug, Clone)]
pub struct Compiled {
    /// Internal unit name.
    pub name: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of [`Compiler::export`].
#[derive(Debug, Clone)]
pub struct Exported {
    pub full_name: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl Exported {
    pub fn is_ok(&self) -> bool {
        !has_errors(&self.diagnostics)
    }
}

#[derive(Debug)]
enum CellState {
    InProgress,
    Done { dependencies: Vec<FuncRef>, failed: bool },
}

/// Completion cell of one function.
#[derive(Debug)]
struct CompileCell {
    name: String,
    state: Mutex<CellState>,
    done: Condvar,
}

impl CompileCell {
    fn new(name: String) -> Self {
        Self { name, state: Mutex::new(CellState::InProgress), done: Condvar::new() }
    }

    fn finish(&self, dependencies: Vec<FuncRef>, failed: bool) {
        *self.state.lock() = CellState::Done { dependencies, failed };
        self.done.notify_all();
    }

    /// A callee failed after this function was emitted.
    fn mark_failed(&self) {
        if let CellState::Done { failed, .. } = &mut *self.state.lock() {
            *failed = true;
        }
    }

    /// Block until the function finished; returns its callees and whether it failed.
    fn wait(&self) -> (Vec<FuncRef>, bool) {
        let mut state = self.state.lock();
        loop {
            match &*state {
                CellState::Done { dependencies, failed } => return (dependencies.clone(), *failed),
                CellState::InProgress => self.done.wait(&mut state),
            }
        }
    }
}

#[derive(Debug, Default)]
struct Memo {
    cells: HashMap<FuncRef, Arc<CompileCell>>,
    next_id: usize,
}

/// Memoized, concurrent compiler of one module into one sink.
pub struct Compiler<'a> {
    module: &'a Module,
    sink: &'a dyn Sink,
    config: TargetConfig,
    options: CompilerOptions,
    memo: Mutex<Memo>,
    exports: Mutex<HashMap<String, FuncRef>>,
    stats: Mutex<SessionStats>,
}

impl<'a> Compiler<'a> {
    pub fn new(module: &'a Module, sink: &'a dyn Sink, config: TargetConfig) -> Self {
        Self::with_options(module, sink, config, CompilerOptions::default())
    }

    pub fn with_options(
        module: &'a Module,
        sink: &'a dyn Sink,
        config: TargetConfig,
        options: CompilerOptions,
    ) -> Self {
        Self {
            module,
            sink,
            config,
            options,
            memo: Mutex::new(Memo::default()),
            exports: Mutex::new(HashMap::new()),
            stats: Mutex::new(SessionStats::default()),
        }
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    pub fn options(&self) -> CompilerOptions {
        self.options
    }

    /// Aggregated emission statistics of every function compiled so far.
    pub fn stats(&self) -> SessionStats {
        self.stats.lock().clone()
    }

    /// Internal unit name reserved for `func`, if it was ever requested.
    pub fn internal_name(&self, func: FuncRef) -> Option<String> {
        self.memo.lock().cells.get(&func).map(|cell| cell.name.clone())
    }

    /// Compile `func` and, transitively, its callees, then wait until every function
    /// it reaches has finished. A callee that failed, possibly on another thread, is
    /// reported against `func` and fails it too. A function already requested reports
    /// no diagnostics of its own a second time.
    pub fn compile(&self, func: FuncRef) -> CompileResult<Compiled> {
        let mut compiled = self.request(func)?;
        if has_errors(&compiled.diagnostics) {
            return Ok(compiled);
        }
        let Some(failed) = self.wait_for_closure(func) else {
            return Ok(compiled);
        };
        if failed != func {
            let function = self.module.get(func).ok_or(CompileError::UnknownFunction { func })?;
            let callee = self.module.get(failed).map_or("?", |f| f.name.as_str());
            log::debug!("`{}` depends on failed `{callee}`", function.name);
            compiled.diagnostics.push(Diagnostic::error(
                format!("`{}` depends on `{callee}`, which failed to compile", function.name),
                function.loc,
            ));
            if let Some(cell) = self.memo.lock().cells.get(&func) {
                cell.mark_failed();
            }
        }
        Ok(compiled)
    }

    /// Compile `func` unless it was already requested. Never waits on another thread.
    fn request(&self, func: FuncRef) -> CompileResult<Compiled> {
        let (cell, claimed) = self.claim(func)?;
        if !claimed {
            return Ok(Compiled { name: cell.name.clone(), diagnostics: Vec::new() });
        }

        let result = self.compile_claimed(func, &cell);
        match &result {
            Ok((dependencies, diagnostics)) => {
                cell.finish(dependencies.clone(), has_errors(diagnostics))
            }
            Err(err) => {
                log::warn!("compiling {} failed: {}", cell.name, err);
                cell.finish(Vec::new(), true);
            }
        }
        let (_, diagnostics) = result?;
        Ok(Compiled { name: cell.name.clone(), diagnostics })
    }

    fn claim(&self, func: FuncRef) -> CompileResult<(Arc<CompileCell>, bool)> {
        let function = self.module.get(func).ok_or(CompileError::UnknownFunction { func })?;
        let mut memo = self.memo.lock();
        if let Some(cell) = memo.cells.get(&func) {
            return Ok((Arc::clone(cell), false));
        }
        let id = memo.next_id;
        memo.next_id += 1;
        let name = self.config.internal_unit(&mangle_tag(&function.signature), id);
        let cell = Arc::new(CompileCell::new(name));
        memo.cells.insert(func, Arc::clone(&cell));
        Ok((cell, true))
    }

    fn compile_claimed(
        &self,
        func: FuncRef,
        cell: &CompileCell,
    ) -> CompileResult<(Vec<FuncRef>, Vec<Diagnostic>)> {
        let function = self.module.get(func).ok_or(CompileError::UnknownFunction { func })?;
        log::debug!("compiling `{}` as {}", function.name, cell.name);

        let mut diagnostics = type_check::check_function(self.module, function);
        if has_errors(&diagnostics) {
            return Ok((Vec::new(), diagnostics));
        }

        let folded;
        let function = if self.options.fold_constants {
            folded = fold_function(function);
            &folded
        } else {
            function
        };
        let lowered = lower_body(self.module, function)?;
        diagnostics.extend(lowered.diagnostics.iter().cloned());
        diagnostics.extend(init_check::check_function(&lowered));
        if has_errors(&diagnostics) {
            return Ok((Vec::new(), diagnostics));
        }

        let dependencies: Vec<FuncRef> =
            lowered.dependencies.iter().copied().filter(|dep| *dep != func).collect();
        let results: Vec<CompileResult<Compiled>> = if self.options.parallel {
            dependencies.par_iter().map(|dep| self.request(*dep)).collect()
        } else {
            dependencies.iter().map(|dep| self.request(*dep)).collect()
        };

        let mut callees = HashMap::with_capacity(dependencies.len() + 1);
        callees.insert(func, cell.name.clone());
        for (dep, result) in dependencies.iter().zip(results) {
            let compiled = result?;
            diagnostics.extend(compiled.diagnostics);
            callees.insert(*dep, compiled.name);
        }
        if has_errors(&diagnostics) {
            return Ok((dependencies, diagnostics));
        }

        let analyzer = Analyzer::new(&lowered.cfg, lowered.entry);
        let allocation = StorageAllocator::allocate(&lowered.storage, &lowered.cfg, &analyzer);
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        FunctionCodegen::new(
            &self.config,
            &session,
            self.sink,
            &lowered,
            &analyzer,
            &allocation,
            &callees,
        )
        .emit(&cell.name)?;
        self.stats.lock().merge(&session.stats());
        Ok((dependencies, diagnostics))
    }

    /// Compile `func` and expose it as `<namespace>:<name>` taking `params` as macro arguments.
    pub fn export(&self, name: &str, func: FuncRef, params: &[String]) -> CompileResult<Exported> {
        let function = self.module.get(func).ok_or(CompileError::UnknownFunction { func })?;
        let full_name = self.config.export_unit(name);

        {
            let mut exports = self.exports.lock();
            match exports.get(name) {
                Some(existing) if *existing == func => {
                    return Ok(Exported { full_name, diagnostics: Vec::new() });
                }
                Some(existing) => {
                    let other = self.module.get(*existing).map_or("?", |f| f.name.as_str());
                    let message = format!("export name `{name}` is already used by `{other}`");
                    let diagnostics = vec![Diagnostic::error(message, function.loc)];
                    return Ok(Exported { full_name, diagnostics });
                }
                None => {
                    exports.insert(name.to_string(), func);
                }
            }
        }

        if params.len() != function.signature.args.len() {
            self.exports.lock().remove(name);
            let message = format!(
                "export `{name}` names {} parameters but `{}` takes {}",
                params.len(),
                function.name,
                function.signature.args.len()
            );
            let diagnostics = vec![Diagnostic::error(message, function.loc)];
            return Ok(Exported { full_name, diagnostics });
        }

        let compiled = match self.compile(func) {
            Ok(compiled) => compiled,
            Err(err) => {
                self.exports.lock().remove(name);
                return Err(err);
            }
        };
        let mut diagnostics = compiled.diagnostics;
        if !has_errors(&diagnostics) {
            if let Some(failed) = self.wait_for_closure(func) {
                let failed = self.module.get(failed).map_or("?", |f| f.name.as_str());
                diagnostics.push(Diagnostic::error(
                    format!("`{}` cannot be exported: `{failed}` failed to compile", function.name),
                    function.loc,
                ));
            }
        }
        if has_errors(&diagnostics) {
            self.exports.lock().remove(name);
            return Ok(Exported { full_name, diagnostics });
        }

        emit_export_wrapper(
            &self.config,
            self.sink,
            name,
            &compiled.name,
            &function.signature,
            params,
        )?;
        log::info!("exported `{}` as {}", function.name, full_name);
        Ok(Exported { full_name, diagnostics })
    }

    /// Wait until `func` and everything it reaches finished compiling.
    /// Returns the first function found to have failed.
    fn wait_for_closure(&self, func: FuncRef) -> Option<FuncRef> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([func]);
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            let cell = self.memo.lock().cells.get(&next).cloned();
            let Some(cell) = cell else { return Some(next) };
            let (dependencies, failed) = cell.wait();
            if failed {
                return Some(next);
            }
            queue.extend(dependencies);
        }
        None
    }

    /// Write the unit that prepares the objective and the frame stack.
    pub fn emit_runtime_init(&self) -> CompileResult<String> {
        emit_runtime_init(&self.config, self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::init_logging;
    use crate::sink::MemorySink;
    use crate::tree::builder::*;
    use crate::tree::Kind;

    fn countdown_module() -> (Module, FuncRef, FuncRef) {
        let mut module = Module::new();
        let step = module.declare("step", &[("n", Kind::Number)], Kind::Number);
        let countdown = module.declare("countdown", &[("n", Kind::Number)], Kind::Number);
        module.define(step, body(|b| {
            b.return_(Some(sub(var("n", Kind::Number), num(1))));
        }));
        module.define(countdown, body(|b| {
            b.if_(lt(var("n", Kind::Number), num(1)), |b| {
                b.return_(Some(num(0)));
            });
            let stepped = call(step, Kind::Number, vec![var("n", Kind::Number)]);
            b.return_(Some(call(countdown, Kind::Number, vec![stepped])));
        }));
        (module, step, countdown)
    }

    #[test]
    fn test_memoized_names() {
        init_logging();
        let (module, step, countdown) = countdown_module();
        let sink = MemorySink::new();
        let compiler = Compiler::with_options(
            &module,
            &sink,
            TargetConfig::default(),
            CompilerOptions { fold_constants: true, parallel: false },
        );

        let first = compiler.compile(countdown).unwrap();
        assert_eq!(first.name, "packc:__internal/fn_n_n_0");
        assert!(first.diagnostics.is_empty());
        assert_eq!(compiler.internal_name(step).as_deref(), Some("packc:__internal/fn_n_n_1"));

        let units = sink.len();
        let again = compiler.compile(countdown).unwrap();
        assert_eq!(again.name, first.name);
        assert!(again.diagnostics.is_empty());
        assert_eq!(sink.len(), units);
        assert_eq!(compiler.stats().functions_compiled, 2);
    }

    #[test]
    fn test_type_errors_stop_emission() {
        init_logging();
        let mut module = Module::new();
        let f = module.declare("f", &[], Kind::Number);
        module.define(f, body(|b| {
            b.return_(Some(string("nope")));
        }));
        let sink = MemorySink::new();
        let compiler = Compiler::new(&module, &sink, TargetConfig::default());

        let compiled = compiler.compile(f).unwrap();
        assert!(has_errors(&compiled.diagnostics));
        assert!(sink.is_empty());

        let exported = compiler.export("f", f, &[]).unwrap();
        assert!(!exported.is_ok());
        assert!(exported.diagnostics[0].message.contains("failed to compile"));
        assert!(!sink.contains("packc:f"));
    }

    #[test]
    fn test_export_names() {
        init_logging();
        let (module, step, countdown) = countdown_module();
        let sink = MemorySink::new();
        let compiler = Compiler::new(&module, &sink, TargetConfig::default());
        let n = vec!["n".to_string()];

        let exported = compiler.export("countdown", countdown, &n).unwrap();
        assert!(exported.is_ok());
        assert_eq!(exported.full_name, "packc:countdown");
        assert!(sink.contains("packc:countdown"));

        let again = compiler.export("countdown", countdown, &n).unwrap();
        assert!(again.is_ok());

        let clash = compiler.export("countdown", step, &n).unwrap();
        assert!(!clash.is_ok());
        assert!(clash.diagnostics[0].message.contains("already used by `countdown`"));

        let arity = compiler.export("step", step, &[]).unwrap();
        assert!(!arity.is_ok());
        assert!(arity.diagnostics[0].message.contains("names 0 parameters"));
        // A rejected export does not keep its name.
        assert!(compiler.export("step", step, &n).unwrap().is_ok());
    }

    #[test]
    fn test_runtime_init() {
        let module = Module::new();
        let sink = MemorySink::new();
        let config = TargetConfig::new("demo").with_objective("calc");
        let compiler = Compiler::new(&module, &sink, config);
        assert_eq!(compiler.emit_runtime_init().unwrap(), "demo:__internal/init");
        assert_eq!(
            sink.unit("demo:__internal/init").unwrap()[0],
            "scoreboard objectives add calc dummy"
        );
    }
}
