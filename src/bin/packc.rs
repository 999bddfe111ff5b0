//! packc command line driver.
//!
//! Compiles the bundled demo module into a datapack directory, or prints the
//! lowered IR of its functions.

use clap::{Parser, Subcommand};
use packc::diagnostics::group_by_location;
use packc::ir::print::print;
use packc::lower::lower_function;
use packc::tree::builder::*;
use packc::tree::{BinaryOp, CaptureMode, Template};
use packc::{Compiler, CompilerOptions, Diagnostic, DirSink, FuncRef, Kind, Module, TargetConfig};
use std::path::PathBuf;
use std::process;

/// packc - compile to frame-stack command machines
#[derive(Parser)]
#[command(name = "packc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the demo module into a datapack directory
    Build {
        /// Datapack root directory
        #[arg(short, long)]
        out: PathBuf,

        /// Function namespace
        #[arg(long, default_value = "packc")]
        namespace: String,

        /// Scoreboard objective used for arithmetic
        #[arg(long, default_value = "packc")]
        objective: String,

        /// Compile callees on the calling thread
        #[arg(long)]
        sequential: bool,

        /// Skip constant folding
        #[arg(long)]
        no_fold: bool,
    },

    /// Print the lowered IR of the demo functions
    Ir {
        /// Only print this function
        #[arg(short, long)]
        function: Option<String>,
    },
}

struct Demo {
    module: Module,
    exports: Vec<(&'static str, FuncRef, Vec<String>)>,
}

/// Factorial, a counting loop, a greeting command and a clock check.
fn demo_module() -> Demo {
    let mut module = Module::new();
    let fact = module.declare("fact", &[("n", Kind::Number)], Kind::Number);
    let count = module.declare("count", &[("limit", Kind::Number)], Kind::Number);
    let greet = module.declare("greet", &[("who", Kind::String)], Kind::Empty);
    let is_night = module.declare("is_night", &[], Kind::Number);
    let tick = module.declare("tick", &[], Kind::Empty);

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

    module.define(greet, body(|b| {
        b.execute(
            Template::new()
                .text("tellraw @a {\"text\":\"Hello, ")
                .expr(var("who", Kind::String))
                .text("!\"}"),
        );
    }));

    module.define(is_night, body(|b| {
        b.let_(
            "time",
            Kind::Number,
            Some(capture(CaptureMode::Result, Template::new().text("time query daytime"))),
        );
        b.return_(Some(binary(BinaryOp::Ge, var("time", Kind::Number), num(13000))));
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

    Demo {
        module,
        exports: vec![
            ("fact", fact, vec!["n".to_string()]),
            ("count", count, vec!["limit".to_string()]),
            ("greet", greet, vec!["who".to_string()]),
            ("tick", tick, Vec::new()),
        ],
    }
}

fn print_diagnostics(module: &Module, func: FuncRef, diagnostics: &[Diagnostic]) {
    let name = module.get(func).map_or("?", |f| f.name.as_str());
    for (location, group) in group_by_location(diagnostics) {
        for diagnostic in group {
            eprintln!("{name}:{location}: {}: {}", diagnostic.severity, diagnostic.message);
        }
    }
}

fn build(out: PathBuf, config: TargetConfig, options: CompilerOptions) -> Result<(), String> {
    let demo = demo_module();
    let sink = DirSink::new(out);
    let compiler = Compiler::with_options(&demo.module, &sink, config, options);

    let mut failed = false;
    for (name, func, params) in &demo.exports {
        let exported = compiler.export(name, *func, params).map_err(|e| e.to_string())?;
        print_diagnostics(&demo.module, *func, &exported.diagnostics);
        if exported.is_ok() {
            log::info!("{} ready", exported.full_name);
        } else {
            failed = true;
        }
    }
    let init = compiler.emit_runtime_init().map_err(|e| e.to_string())?;
    log::info!("runtime init unit {}", init);
    log::info!("{}", compiler.stats());

    if failed {
        return Err("some exports failed".to_string());
    }
    println!("wrote {} units to {}", compiler.stats().units_emitted, sink.root().display());
    Ok(())
}

fn print_ir(function: Option<&str>) -> Result<(), String> {
    let demo = demo_module();
    for (func, f) in demo.module.iter() {
        if function.is_some_and(|name| name != f.name) {
            continue;
        }
        let lowered = lower_function(&demo.module, func).map_err(|e| e.to_string())?;
        print!("{}: {}", f.name, print(&lowered.storage, &lowered.cfg, lowered.entry));
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();

    let result = match cli.command {
        Commands::Build { out, namespace, objective, sequential, no_fold } => {
            let config = TargetConfig::new(namespace).with_objective(objective);
            let options = CompilerOptions { fold_constants: !no_fold, parallel: !sequential };
            build(out, config, options)
        }
        Commands::Ir { function } => print_ir(function.as_deref()),
    };

    if let Err(error) = result {
        eprintln!("{}", error);
        process::exit(1);
    }
}
