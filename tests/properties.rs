//! Whole-output properties: frame balance, register lifetime, determinism and
//! definite assignment, checked over a module exercising every construct.

mod common;

use common::{build, build_with, guarded_target, jump_target, params, Build, STORAGE};
use packc::tree::builder::*;
use packc::tree::{BinaryOp, CaptureMode, Template};
use packc::{CompilerOptions, FuncRef, Kind, Module};

struct Sample {
    module: Module,
    exports: Vec<(&'static str, FuncRef, Vec<String>)>,
}

fn sample() -> Sample {
    let mut module = Module::new();
    let fact = module.declare("fact", &[("n", Kind::Number)], Kind::Number);
    let count = module.declare("count", &[("limit", Kind::Number)], Kind::Number);
    let counter = module.declare("counter", &[], Kind::Number);
    let leaf = module.declare("leaf", &[], Kind::Number);
    let is_night = module.declare("is_night", &[], Kind::Number);
    let greet = module.declare("greet", &[("who", Kind::String)], Kind::Empty);
    let tick = module.declare("tick", &[], Kind::Empty);
    let mix = module.declare("mix", &[("a", Kind::Number), ("b", Kind::Number)], Kind::Number);

    module.define(fact, body(|b| {
        b.if_(lt(var("n", Kind::Number), num(2)), |b| {
            b.return_(Some(num(1)));
        });
        b.return_(Some(mul(
            var("n", Kind::Number),
            call(fact, Kind::Number, vec![sub(var("n", Kind::Number), num(1))]),
        )));
    }));
    module.define(count, body(|b| {
        b.let_("i", Kind::Number, Some(num(0)));
        b.while_(Some("counting"), lt(var("i", Kind::Number), var("limit", Kind::Number)), |b| {
            b.execute(Template::new().text("say ").expr(var("i", Kind::Number)));
            b.assign("i", add(var("i", Kind::Number), num(1)));
        });
        b.return_(Some(var("i", Kind::Number)));
    }));
    module.define(counter, body(|b| {
        b.let_("i", Kind::Number, Some(num(0)));
        b.loop_(None, |b| {
            b.if_(binary(BinaryOp::Ge, var("i", Kind::Number), num(3)), |b| {
                b.break_(None);
            });
            b.assign("i", add(var("i", Kind::Number), num(1)));
        });
        b.return_(Some(var("i", Kind::Number)));
    }));
    module.define(leaf, body(|b| {
        b.return_(Some(num(5)));
    }));
    module.define(is_night, body(|b| {
        b.let_(
            "time",
            Kind::Number,
            Some(capture(CaptureMode::Result, Template::new().text("time query daytime"))),
        );
        b.return_(Some(binary(BinaryOp::Ge, var("time", Kind::Number), num(13000))));
    }));
    module.define(greet, body(|b| {
        b.execute(Template::new().text("say hello ").expr(var("who", Kind::String)));
    }));
    module.define(tick, body(|b| {
        b.if_else(
            call(is_night, Kind::Number, vec![]),
            |b| {
                b.execute(Template::new().text("say good night"));
            },
            |b| {
                b.expr(call(greet, Kind::Empty, vec![string("world")]));
            },
        );
    }));
    module.define(mix, body(|b| {
        b.let_("s", Kind::Number, Some(mul(var("a", Kind::Number), var("b", Kind::Number))));
        b.if_else(
            binary(BinaryOp::Gt, var("s", Kind::Number), num(10)),
            |b| {
                b.return_(Some(sub(var("s", Kind::Number), call(leaf, Kind::Number, vec![]))));
            },
            |b| {
                b.assign("s", add(var("s", Kind::Number), call(counter, Kind::Number, vec![])));
            },
        );
        let tail = call(fact, Kind::Number, vec![var("b", Kind::Number)]);
        b.return_(Some(add(var("s", Kind::Number), tail)));
    }));

    Sample {
        module,
        exports: vec![
            ("fact", fact, params(&["n"])),
            ("count", count, params(&["limit"])),
            ("counter", counter, Vec::new()),
            ("leaf", leaf, Vec::new()),
            ("is_night", is_night, Vec::new()),
            ("greet", greet, params(&["who"])),
            ("tick", tick, Vec::new()),
            ("mix", mix, params(&["a", "b"])),
        ],
    }
}

fn build_sample(options: CompilerOptions) -> (Sample, Build) {
    let sample = sample();
    let out = build_with(&sample.module, &sample.exports, options);
    for exported in &out.exported {
        assert!(exported.is_ok(), "{}: {:?}", exported.full_name, exported.diagnostics);
    }
    (sample, out)
}

/// Walk every path through the node units of one function, tracking frame depth.
/// Returns the number of paths that reached a return.
fn walk_frames(
    out: &Build,
    unit: &str,
    node_prefix: &str,
    mut depth: i32,
    visiting: &mut Vec<String>,
) -> usize {
    let own_push = format!("data modify {STORAGE} frames append value {{}}");
    let pop = format!("data remove {STORAGE} frames[-1]");
    visiting.push(unit.to_string());
    let mut paths = 0;
    let mut fell_off = true;
    for line in out.unit(unit) {
        if *line == own_push {
            depth += 1;
        } else if *line == pop {
            depth -= 1;
            assert!(depth >= 0, "{unit} pops a frame it does not own");
        } else if let Some(target) = guarded_target(line) {
            if !visiting.iter().any(|v| v == target) {
                paths += walk_frames(out, target, node_prefix, depth, visiting);
            }
        } else if let Some(target) = jump_target(line).filter(|t| t.starts_with(node_prefix)) {
            if !visiting.iter().any(|v| v == target) {
                paths += walk_frames(out, target, node_prefix, depth, visiting);
            }
            fell_off = false;
            break;
        }
    }
    if fell_off {
        assert_eq!(depth, 0, "{unit} returns with {depth} unbalanced frames");
        paths += 1;
    }
    visiting.pop();
    paths
}

#[test]
fn test_frames_balanced_on_every_path() {
    let (sample, out) = build_sample(CompilerOptions::default());

    for (func, function) in sample.module.iter() {
        let root = out.internal(func);
        let entry_depth = i32::from(!function.signature.args.is_empty());
        let paths = walk_frames(&out, root, &format!("{root}/b"), entry_depth, &mut Vec::new());
        assert!(paths > 0, "`{}` never returns", function.name);
    }

    // Every pushed argument frame is consumed by the call right after it.
    let push_next = format!("data modify {STORAGE} frames append from {STORAGE} next");
    for (name, lines) in &out.units {
        for (i, line) in lines.iter().enumerate() {
            if *line == push_next {
                let call = lines.get(i + 1).and_then(|next| jump_target(next));
                assert!(
                    call.is_some_and(|c| {
                        c.starts_with("packc:__internal/fn_") && !c.contains("/b")
                    }),
                    "{name}: frame pushed without a call"
                );
            }
        }
    }

    // Only argument-less functions with frame locals push their own frame.
    let own_push = format!("data modify {STORAGE} frames append value {{}}");
    let pushes_own = |func: FuncRef| out.unit(out.internal(func)).first() == Some(&own_push);
    assert!(pushes_own(sample.module.find("counter").unwrap()));
    assert!(!pushes_own(sample.module.find("leaf").unwrap()));
    assert!(!pushes_own(sample.module.find("fact").unwrap()));
    assert!(out.stats.frame_pops > 0);
}

/// Scratch registers read and written by one command line, reads first.
fn register_uses(line: &str) -> (Vec<&'static str>, Vec<&'static str>) {
    let mut reads = Vec::new();
    let mut writes = Vec::new();
    for reg in ["r0", "r1"] {
        let token = format!("{STORAGE} {reg}");
        for (pos, _) in line.match_indices(&token) {
            let rest = &line[pos + token.len()..];
            if !(rest.is_empty() || rest.starts_with(' ')) {
                continue;
            }
            let before = &line[..pos];
            if before.ends_with("data modify ")
                || before.ends_with("execute store result ")
                || before.ends_with("execute store success ")
            {
                writes.push(reg);
            } else {
                reads.push(reg);
            }
        }
    }
    if jump_target(line).is_some() {
        // A callee leaves its result in r0.
        writes.push("r0");
    }
    (reads, writes)
}

fn assert_registers_written_before_read(out: &Build) {
    for (name, lines) in &out.units {
        let mut written: Vec<&str> = Vec::new();
        for line in lines {
            let (reads, writes) = register_uses(line);
            for reg in reads {
                assert!(
                    written.contains(&reg),
                    "{name}: `{line}` reads {reg} before any write in the unit"
                );
            }
            written.extend(writes);
        }
    }
}

#[test]
fn test_registers_written_before_read() {
    let (_, out) = build_sample(CompilerOptions::default());
    assert_registers_written_before_read(&out);
}

#[test]
fn test_parameter_store_keeps_pending_value_in_frame() {
    let mut module = Module::new();
    let shift = module.declare("shift", &[("a", Kind::Number), ("b", Kind::Number)], Kind::Number);
    module.define(shift, body(|b| {
        b.let_("x", Kind::Number, Some(add(var("a", Kind::Number), num(1))));
        b.assign("a", add(var("b", Kind::Number), num(2)));
        b.let_("y", Kind::Number, Some(mul(var("x", Kind::Number), num(3))));
        b.return_(Some(add(var("y", Kind::Number), var("a", Kind::Number))));
    }));

    let out = build(&module, &[("shift", shift, params(&["a", "b"]))]);
    assert!(out.exported[0].is_ok(), "{:?}", out.exported[0].diagnostics);
    assert_registers_written_before_read(&out);

    // `x` is parked in the frame before the store to `a` overwrites r0.
    let lines = out.unit(out.internal(shift));
    let park = format!("data modify {STORAGE} frames[-1].l0 set from {STORAGE} r0");
    let store_a = format!("data modify {STORAGE} frames[-1].a0 set from {STORAGE} r0");
    let reload = format!("data modify {STORAGE} r0 set from {STORAGE} frames[-1].l0");
    let at = |needle: &String| lines.iter().position(|line| line == needle);
    assert!(at(&park).is_some() && at(&park) < at(&store_a), "{lines:#?}");
    assert!(at(&store_a) < at(&reload), "{lines:#?}");
}

#[test]
fn test_sequential_output_is_reproducible() {
    let options = CompilerOptions { parallel: false, ..CompilerOptions::default() };
    let (_, first) = build_sample(options);
    let (_, second) = build_sample(options);
    assert_eq!(first.units, second.units);
    assert_eq!(first.internal, second.internal);
    assert_eq!(first.stats, second.stats);
}

#[test]
fn test_parallel_matches_sequential_modulo_names() {
    let options = CompilerOptions { parallel: false, ..CompilerOptions::default() };
    let (_, sequential) = build_sample(options);
    for _ in 0..4 {
        let (_, parallel) = build_sample(CompilerOptions::default());
        assert_eq!(parallel.normalized(), sequential.normalized());
        assert_eq!(parallel.stats.lines_emitted, sequential.stats.lines_emitted);
        assert_eq!(parallel.stats.functions_compiled, 8);
    }
}

#[test]
fn test_read_before_assignment_rejected() {
    let mut module = Module::new();
    let maybe = module.declare("maybe", &[("a", Kind::Number)], Kind::Number);
    let surely = module.declare("surely", &[("a", Kind::Number)], Kind::Number);
    module.define(maybe, body(|b| {
        b.let_("x", Kind::Number, None);
        b.if_(var("a", Kind::Number), |b| {
            b.assign("x", num(1));
        });
        b.return_(Some(var("x", Kind::Number)));
    }));
    module.define(surely, body(|b| {
        b.let_("x", Kind::Number, None);
        b.if_else(
            var("a", Kind::Number),
            |b| {
                b.assign("x", num(1));
            },
            |b| {
                b.assign("x", num(2));
            },
        );
        b.return_(Some(var("x", Kind::Number)));
    }));

    let exports = [("maybe", maybe, params(&["a"])), ("surely", surely, params(&["a"]))];
    let out = build(&module, &exports);

    let rejected = &out.exported[0];
    assert!(!rejected.is_ok());
    assert!(rejected
        .diagnostics
        .iter()
        .any(|d| d.message == "`x` may be used before it is assigned"));
    assert!(out.units_of(maybe).is_empty());
    assert!(!out.units.contains_key("packc:maybe"));

    let accepted = &out.exported[1];
    assert!(accepted.is_ok(), "{:?}", accepted.diagnostics);
    assert!(!out.units_of(surely).is_empty());
    assert!(out.units.contains_key("packc:surely"));
}
