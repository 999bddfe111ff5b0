//! Shared helpers for the integration tests.

#![allow(dead_code)]

use packc::{
    Compiler, CompilerOptions, Exported, FuncRef, MemorySink, Module, SessionStats, TargetConfig,
};
use std::collections::{BTreeMap, HashMap};

pub const STORAGE: &str = "storage packc:vm";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Everything one compiler run left behind.
pub struct Build {
    pub units: BTreeMap<String, Vec<String>>,
    pub internal: HashMap<FuncRef, String>,
    pub exported: Vec<Exported>,
    pub stats: SessionStats,
}

impl Build {
    pub fn internal(&self, func: FuncRef) -> &str {
        self.internal
            .get(&func)
            .map(String::as_str)
            .unwrap_or_else(|| panic!("{func:?} was not compiled"))
    }

    pub fn unit(&self, name: &str) -> &[String] {
        self.units
            .get(name)
            .unwrap_or_else(|| panic!("missing unit {name}; have {:?}", self.units.keys()))
    }

    /// Root unit of `func` followed by its node and macro units.
    pub fn units_of(&self, func: FuncRef) -> Vec<(&str, &[String])> {
        let root = self.internal(func);
        let prefix = format!("{root}/");
        self.units
            .iter()
            .filter(|(name, _)| name.as_str() == root || name.starts_with(&prefix))
            .map(|(name, lines)| (name.as_str(), lines.as_slice()))
            .collect()
    }

    /// Units with every internal function name replaced by `fn<index>`.
    pub fn normalized(&self) -> BTreeMap<String, Vec<String>> {
        let mut names: Vec<(&String, String)> =
            self.internal.iter().map(|(func, name)| (name, format!("fn{}", func.0))).collect();
        // `fn_n_0` is a prefix of `fn_n_01`; replace longer names first.
        names.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
        let rename = |text: &str| {
            names.iter().fold(text.to_string(), |acc, (from, to)| acc.replace(from.as_str(), to))
        };
        self.units
            .iter()
            .map(|(name, lines)| (rename(name), lines.iter().map(|line| rename(line)).collect()))
            .collect()
    }
}

pub fn params(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// Export every `(name, func, params)` entry into a fresh memory sink.
pub fn build_with(
    module: &Module,
    exports: &[(&str, FuncRef, Vec<String>)],
    options: CompilerOptions,
) -> Build {
    init_logging();
    let sink = MemorySink::new();
    let compiler = Compiler::with_options(module, &sink, TargetConfig::default(), options);
    let exported = exports
        .iter()
        .map(|(name, func, params)| compiler.export(name, *func, params).expect("export failed"))
        .collect();
    let internal = module
        .iter()
        .filter_map(|(func, _)| compiler.internal_name(func).map(|name| (func, name)))
        .collect();
    Build { units: sink.snapshot(), internal, exported, stats: compiler.stats() }
}

pub fn build(module: &Module, exports: &[(&str, FuncRef, Vec<String>)]) -> Build {
    build_with(module, exports, CompilerOptions::default())
}

/// Name of the unit a jump line calls, if `line` is one.
pub fn jump_target(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("function ")?;
    if rest.contains(' ') {
        return None;
    }
    Some(rest)
}

/// Name of the unit a switch entry line calls, if `line` is one.
pub fn guarded_target(line: &str) -> Option<&str> {
    if !line.starts_with("execute if score $sel ") {
        return None;
    }
    line.split(" run return run function ").nth(1)
}
