// This module contains everything specific to the datapack target: the command text the
// machine understands, the frame-stack calling convention, and the per-function emitter that
// turns an allocated control-flow graph into named units. TargetConfig carries the three names
// every emitted command is built from (the function namespace, the scoreboard objective used
// for arithmetic, and the storage root holding registers and the frame stack) and derives the
// unit names of internal functions, exports and the runtime init unit from them.

//! Datapack target.
//!
//! - [`encoder`] renders individual commands
//! - [`calling_convention`] describes frames, argument packing and name mangling
//! - [`function_codegen`] emits a function's units into a [`Sink`](crate::sink::Sink)

pub mod calling_convention;
pub mod encoder;
pub mod function_codegen;

pub use calling_convention::FrameLayout;
pub use encoder::CommandEncoder;
pub use function_codegen::{emit_export_wrapper, emit_runtime_init, FunctionCodegen};

/// Names shared by every emitted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    namespace: String,
    objective: String,
    storage: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            namespace: "packc".to_string(),
            objective: "packc".to_string(),
            storage: "vm".to_string(),
        }
    }
}

impl TargetConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), ..Self::default() }
    }

    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = objective.into();
        self
    }

    pub fn with_storage(mut self, storage: impl Into<String>) -> Self {
        self.storage = storage.into();
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn objective(&self) -> &str {
        &self.objective
    }

    /// Storage resource id, e.g. `packc:vm`.
    pub fn storage_id(&self) -> String {
        format!("{}:{}", self.namespace, self.storage)
    }

    /// Unit of the `n`th internal function with mangling tag `tag`.
    pub fn internal_unit(&self, tag: &str, n: usize) -> String {
        format!("{}:__internal/fn_{}_{}", self.namespace, tag, n)
    }

    /// Unit callers outside the pack invoke.
    pub fn export_unit(&self, name: &str) -> String {
        format!("{}:{}", self.namespace, name)
    }

    pub fn init_unit(&self) -> String {
        format!("{}:__internal/init", self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let config = TargetConfig::default();
        assert_eq!(config.storage_id(), "packc:vm");
        assert_eq!(config.internal_unit("n_n", 3), "packc:__internal/fn_n_n_3");
        assert_eq!(config.export_unit("fact"), "packc:fact");
        assert_eq!(config.init_unit(), "packc:__internal/init");
    }

    #[test]
    fn test_builder_setters() {
        let config = TargetConfig::new("demo").with_objective("calc").with_storage("stack");
        assert_eq!(config.namespace(), "demo");
        assert_eq!(config.objective(), "calc");
        assert_eq!(config.storage_id(), "demo:stack");
    }
}
