// This module implements definite-assignment checking over the lowered control-flow graph. It
// is a forward must-dataflow analysis: a named local counts as assigned at a node's entry only
// if it is assigned at the exit of every reachable predecessor. Nodes start at "everything
// assigned" (the top of the lattice) except the entry, which starts empty, and the analysis
// iterates over the analyzer's reverse post-order until nothing changes. A second pass then
// replays each node and reports the first read of a variable that is not definitely assigned.
// Temporaries are assigned before use by construction and are not tracked.

//! Definite-assignment check for named locals.

use crate::core::analyzer::Analyzer;
use crate::diagnostics::Diagnostic;
use crate::ir::{EndInstruction, Instruction, Node, Ref, Rvalue, Slot};
use crate::lower::LoweredFunction;
use crate::tree::SourceLoc;
use hashbrown::{HashMap, HashSet};

/// Report reads of named locals that may happen before any assignment.
pub fn check_function(lowered: &LoweredFunction) -> Vec<Diagnostic> {
    let analyzer = Analyzer::new(&lowered.cfg, lowered.entry);
    let tracked = lowered.storage.locals.len();

    // `None` is the top of the lattice: not yet reached by the fixpoint.
    let mut exit: HashMap<_, Option<Vec<bool>>> =
        analyzer.order().iter().map(|n| (*n, None)).collect();

    let entry_state = |node, exit: &HashMap<_, Option<Vec<bool>>>| -> Vec<bool> {
        if node == lowered.entry {
            return vec![false; tracked];
        }
        let mut state: Option<Vec<bool>> = None;
        for pred in analyzer.predecessors(node) {
            if let Some(Some(out)) = exit.get(pred) {
                state = Some(match state {
                    None => out.clone(),
                    Some(acc) => acc.iter().zip(out).map(|(a, b)| *a && *b).collect(),
                });
            }
        }
        state.unwrap_or_else(|| vec![true; tracked])
    };

    let mut changed = true;
    while changed {
        changed = false;
        for &node_id in analyzer.order() {
            let mut state = entry_state(node_id, &exit);
            for inst in &lowered.cfg.node(node_id).instructions {
                if let Instruction::Assign { slot, .. } = inst {
                    if slot.is_local() {
                        state[slot.index] = true;
                    }
                }
            }
            let out = exit.entry(node_id).or_insert(None);
            if out.as_ref() != Some(&state) {
                *out = Some(state);
                changed = true;
            }
        }
    }

    let mut reported = HashSet::new();
    let mut diagnostics = Vec::new();
    for &node_id in analyzer.order() {
        let mut state = entry_state(node_id, &exit);
        let node = lowered.cfg.node(node_id);
        let mut report = |slot: Slot, loc: SourceLoc, state: &[bool]| {
            if !slot.is_local() || state[slot.index] {
                return;
            }
            if let Some(name) = lowered.storage.name(slot) {
                if reported.insert(slot) {
                    diagnostics.push(Diagnostic::error(
                        format!("`{name}` may be used before it is assigned"),
                        loc,
                    ));
                }
            }
        };
        for (inst, loc) in node.instructions.iter().zip(&node.spans) {
            for slot in reads(inst) {
                report(slot, *loc, &state);
            }
            if let Instruction::Assign { slot, .. } = inst {
                if slot.is_local() {
                    state[slot.index] = true;
                }
            }
        }
        for slot in end_reads(node) {
            report(slot, node.end_span, &state);
        }
    }
    diagnostics
}

fn reads(inst: &Instruction) -> Vec<Slot> {
    match inst {
        Instruction::Assign { rvalue, .. } => match rvalue {
            Rvalue::Ref(r) | Rvalue::Unary(_, r) => r.slot().into_iter().collect(),
            Rvalue::Binary(_, lhs, rhs) => lhs.slot().into_iter().chain(rhs.slot()).collect(),
            Rvalue::Call { args, .. } => args.iter().filter_map(Ref::slot).collect(),
            Rvalue::Capture { template, .. } => template.slots().collect(),
        },
        Instruction::Execute(template) => template.slots().collect(),
    }
}

fn end_reads(node: &Node) -> Vec<Slot> {
    match &node.end {
        EndInstruction::SwitchInt { selector, .. } => selector.slot().into_iter().collect(),
        EndInstruction::Return(value) => value.slot().into_iter().collect(),
        EndInstruction::Jump(_) | EndInstruction::Unreachable => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::lower_function;
    use crate::tree::builder::*;
    use crate::tree::{Kind, Module, Template};

    fn check(module: &Module, name: &str) -> Vec<Diagnostic> {
        let lowered = lower_function(module, module.find(name).unwrap()).unwrap();
        check_function(&lowered)
    }

    #[test]
    fn test_if_without_else_flags_later_use() {
        let mut module = Module::new();
        let f = module.declare("f", &[("c", Kind::Number)], Kind::Number);
        module.define(f, body(|b| {
            b.let_("x", Kind::Number, None);
            b.if_(var("c", Kind::Number), |b| {
                b.assign("x", num(1));
            });
            b.return_(Some(var("x", Kind::Number)));
        }));

        let diagnostics = check(&module, "f");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("`x`"));
        assert_eq!(diagnostics[0].location.line, 4);
    }

    #[test]
    fn test_assignment_before_if_is_clean() {
        let mut module = Module::new();
        let f = module.declare("f", &[("c", Kind::Number)], Kind::Number);
        module.define(f, body(|b| {
            b.let_("x", Kind::Number, Some(num(0)));
            b.if_(var("c", Kind::Number), |b| {
                b.assign("x", num(1));
            });
            b.return_(Some(var("x", Kind::Number)));
        }));

        assert!(check(&module, "f").is_empty());
    }

    #[test]
    fn test_both_branches_and_loops() {
        let mut module = Module::new();
        let f = module.declare("f", &[("c", Kind::Number)], Kind::Empty);
        module.define(f, body(|b| {
            b.let_("x", Kind::Number, None);
            b.let_("y", Kind::Number, None);
            b.if_else(
                var("c", Kind::Number),
                |b| {
                    b.assign("x", num(1));
                },
                |b| {
                    b.assign("x", num(2));
                },
            );
            b.loop_(None, |b| {
                b.execute(Template::new().text("say ").expr(var("x", Kind::Number)));
                b.execute(Template::new().text("say ").expr(var("y", Kind::Number)));
                b.execute(Template::new().text("say ").expr(var("y", Kind::Number)));
                b.assign("y", num(3));
            });
        }));

        let diagnostics = check(&module, "f");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("`y`"));
    }
}
