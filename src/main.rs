//=====================================================
// File: main.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Bigton CLI entry point
// Objective: Load a compiled program, drive it through the tick protocol
//            with a small builtin set, and report the outcome
//=====================================================

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, warn};

use bigton_runtime::{
    ErrorCode, ExecStatus, Handle, Runtime, Settings, TraceEntry, ValueType, logging,
};

/// Nesting depth past which `print` abbreviates composites.
const RENDER_DEPTH: usize = 8;

#[derive(Parser, Debug)]
#[command(name = "bigton", about = "Bigton bytecode runtime")]
pub struct Args {
    /// Emit debug diagnostics on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a compiled program.
    Run(RunArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Compiled program to execute.
    pub program: PathBuf,

    /// TOML file with runtime limits.
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Instructions per batch.
    #[arg(long = "tick-limit")]
    pub tick_limit: Option<u64>,

    /// Heap limit in bytes.
    #[arg(long = "memory-limit")]
    pub memory_limit: Option<usize>,

    #[arg(long = "max-call-depth")]
    pub max_call_depth: Option<u32>,

    #[arg(long = "max-tuple-size")]
    pub max_tuple_size: Option<u32>,

    /// Stop after this many ticks.
    #[arg(long = "max-ticks")]
    pub max_ticks: Option<u64>,

    /// Print the final report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Print,
    Log,
    Error,
}

impl Builtin {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "print" => Some(Builtin::Print),
            "log" => Some(Builtin::Log),
            "error" => Some(Builtin::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct Counters {
    ticks: u64,
    batches: u64,
    builtin_calls: u64,
}

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    status: ExecStatus,
    error: Option<String>,
    error_code: Option<u32>,
    limit_exceeded: bool,
    file: &'a str,
    line: u32,
    used_memory: usize,
    #[serde(flatten)]
    counters: Counters,
    trace: Vec<TraceEntry<'a>>,
    log: Vec<&'a str>,
    settings: Settings,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init("bigton", args.verbose);

    match args.command {
        Command::Run(cmd) => run_entry(cmd),
    }
}

fn resolve_settings(args: &RunArgs) -> Result<Settings> {
    let mut settings = match &args.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(limit) = args.tick_limit {
        settings.tick_instruction_limit = limit;
    }
    if let Some(limit) = args.memory_limit {
        settings.memory_usage_limit = limit;
    }
    if let Some(depth) = args.max_call_depth {
        settings.max_call_depth = depth;
    }
    if let Some(size) = args.max_tuple_size {
        settings.max_tuple_size = size;
    }
    Ok(settings)
}

fn run_entry(args: RunArgs) -> Result<()> {
    let settings = resolve_settings(&args)?;
    let bytes = fs::read(&args.program)
        .with_context(|| format!("failed to read {}", args.program.display()))?;
    let mut runtime = Runtime::new(&settings, &bytes)
        .with_context(|| format!("failed to load {}", args.program.display()))?;

    let (status, counters) = drive(&mut runtime, args.max_ticks);
    print_report(&runtime, status, counters, args.json)?;

    if let Some(code) = runtime.error() {
        bail!("program failed: {code} (code {})", code.code());
    }
    Ok(())
}

fn drive(runtime: &mut Runtime<'_>, max_ticks: Option<u64>) -> (ExecStatus, Counters) {
    let mut counters = Counters::default();
    runtime.start_tick();
    counters.ticks = 1;
    loop {
        let status = runtime.execute_batch();
        counters.batches += 1;
        if runtime.has_error() {
            return (ExecStatus::Error, counters);
        }
        match status {
            ExecStatus::Continue => {}
            ExecStatus::ExecBuiltinFun => {
                counters.builtin_calls += 1;
                run_builtin(runtime);
            }
            ExecStatus::AwaitTick => {
                if max_ticks.is_some_and(|max| counters.ticks >= max) {
                    debug!(ticks = counters.ticks, "tick limit reached");
                    return (status, counters);
                }
                counters.ticks += 1;
                runtime.start_tick();
            }
            ExecStatus::Complete | ExecStatus::Error => return (status, counters),
        }
    }
}

fn run_builtin(runtime: &mut Runtime<'_>) {
    let Some(index) = runtime.awaiting_builtin() else {
        return;
    };
    let name = runtime.program().builtin_name(index).unwrap_or("?");
    let Some(builtin) = Builtin::from_name(name) else {
        warn!(builtin = name, "program called an unknown builtin");
        runtime.set_error(ErrorCode::ByProgram);
        return;
    };
    let argument = runtime.pop().unwrap_or_else(Handle::null);
    match builtin {
        Builtin::Print => {
            let mut line = String::new();
            render(runtime, &argument, 0, &mut line);
            println!("{line}");
        }
        Builtin::Log => log_value(runtime, &argument),
        Builtin::Error => {
            log_value(runtime, &argument);
            runtime.set_error(ErrorCode::ByProgram);
        }
    }
    runtime.free(argument);
    runtime.push(&Handle::null());
}

fn log_value(runtime: &mut Runtime<'_>, value: &Handle) {
    if value.value_type() == ValueType::String {
        runtime.append_log(value);
        return;
    }
    let mut text = String::new();
    render(runtime, value, 0, &mut text);
    if let Some(line) = runtime.create_string(text.as_bytes()) {
        runtime.append_log(&line);
        runtime.free(line);
    }
}

fn render(runtime: &mut Runtime<'_>, value: &Handle, depth: usize, out: &mut String) {
    match value.value_type() {
        ValueType::Null => out.push_str("null"),
        ValueType::Int => out.push_str(&value.as_int().unwrap_or_default().to_string()),
        ValueType::Float => out.push_str(&value.as_float().unwrap_or_default().to_string()),
        ValueType::String => out.push_str(runtime.get_string(value).unwrap_or("")),
        _ if depth >= RENDER_DEPTH => out.push_str("..."),
        ValueType::Tuple => {
            let len = runtime.tuple_len(value).unwrap_or(0);
            render_members(runtime, ("(", ")"), len, depth, out, |rt, i| {
                rt.tuple_member(value, i)
            });
        }
        ValueType::Array => {
            let len = runtime.array_len(value).unwrap_or(0);
            render_members(runtime, ("[", "]"), len, depth, out, |rt, i| {
                rt.array_element(value, i)
            });
        }
        ValueType::Object => {
            let len = runtime.object_size(value).unwrap_or(0);
            out.push('{');
            for slot in 0..len {
                if slot > 0 {
                    out.push_str(", ");
                }
                let name = runtime
                    .object_prop_name(value, slot)
                    .and_then(|id| runtime.const_string(id))
                    .unwrap_or("?");
                out.push_str(name);
                out.push_str(": ");
                if let Some(member) = runtime.object_member(value, slot) {
                    render(runtime, &member, depth + 1, out);
                    runtime.free(member);
                }
            }
            out.push('}');
        }
    }
}

fn render_members(
    runtime: &mut Runtime<'_>,
    (open, close): (&str, &str),
    len: usize,
    depth: usize,
    out: &mut String,
    mut member: impl FnMut(&mut Runtime<'_>, usize) -> Option<Handle>,
) {
    out.push_str(open);
    for index in 0..len {
        if index > 0 {
            out.push_str(", ");
        }
        if let Some(handle) = member(runtime, index) {
            render(runtime, &handle, depth + 1, out);
            runtime.free(handle);
        }
    }
    out.push_str(close);
}

fn print_report(
    runtime: &Runtime<'_>,
    status: ExecStatus,
    counters: Counters,
    json: bool,
) -> Result<()> {
    let report = RunReport {
        status,
        error: runtime.error().map(|code| code.to_string()),
        error_code: runtime.error().map(ErrorCode::code),
        limit_exceeded: runtime.error().is_some_and(ErrorCode::is_limit),
        file: runtime.current_file(),
        line: runtime.current_line(),
        used_memory: runtime.used_memory(),
        counters,
        trace: runtime.trace_entries(),
        log: runtime.log_lines().collect(),
        settings: *runtime.settings(),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in &report.log {
        eprintln!("log: {line}");
    }
    eprintln!(
        "status: {} after {} tick(s), {} batch(es), {} builtin call(s); {} bytes in use",
        report.status,
        report.counters.ticks,
        report.counters.batches,
        report.counters.builtin_calls,
        report.used_memory
    );
    if let Some(message) = &report.error {
        let kind = if report.limit_exceeded {
            "resource limit"
        } else {
            "runtime error"
        };
        eprintln!("{kind}: {message} at {}:{}", report.file, report.line);
        for frame in report.trace.iter().rev() {
            eprintln!(
                "    in {} ({}:{}) called from {}:{}",
                frame.name, frame.decl_file, frame.decl_line, frame.from_file, frame.from_line
            );
        }
    }
    Ok(())
}
