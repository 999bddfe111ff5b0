//! Textual dump of a lowered function, used for trace logging and tests.

use super::{Cfg, FunctionStorage, NodeId};
use std::fmt::Write;

/// Render storage and every node of `cfg` in arena order.
pub fn print(storage: &FunctionStorage, cfg: &Cfg, entry: NodeId) -> String {
    let mut out = String::new();
    let args: Vec<String> = storage
        .args
        .iter()
        .enumerate()
        .map(|(i, kind)| format!("a{i}: {kind}"))
        .collect();
    let _ = writeln!(out, "fn({}) entry {entry}", args.join(", "));
    for (i, local) in storage.locals.iter().enumerate() {
        match &local.name {
            Some(name) => {
                let _ = writeln!(out, "  l{i}: {} ({name})", local.kind);
            }
            None => {
                let _ = writeln!(out, "  l{i}: {}", local.kind);
            }
        }
    }
    for id in cfg.ids() {
        let node = cfg.node(id);
        let _ = writeln!(out, "{id}:");
        for inst in &node.instructions {
            let _ = writeln!(out, "  {inst}");
        }
        let _ = writeln!(out, "  {}", node.end);
    }
    out
}
