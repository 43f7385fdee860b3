//! CLI entry point for the TMC4671 scenario runner.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

#[cfg(test)]
use tempfile as _;
use tmc4671_core::{Direction, Tmc4671};
use tmc4671_sim::runner::run_scenario;
use tmc4671_sim::scenario::{parse_literal, parse_scenario};

const USAGE_TEXT: &str = "\
Usage: tmc4671-sim <command> [options]

Commands:
  run    <scenario> [--verbose]           Run a scenario against a reset TMC4671
  encode <read|write> <address> <content> Print the 40-bit SPI word

Options:
  -v, --verbose  Log frame activity to stderr (run only)
  -h, --help     Show this help message

Examples:
  tmc4671-sim run scenarios/chipinfo.scn
  tmc4671-sim encode write 0x01 2
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run(RunArgs),
    Encode(EncodeArgs),
}

#[derive(Debug, PartialEq, Eq)]
struct RunArgs {
    input: PathBuf,
    verbose: bool,
}

#[derive(Debug, PartialEq, Eq)]
struct EncodeArgs {
    direction: String,
    address: String,
    content: String,
}

#[derive(Debug)]
enum ParseResult {
    Command(Command),
    Help,
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let first = args.next().ok_or_else(|| "missing command".to_string())?;

    if first == "--help" || first == "-h" {
        return Ok(ParseResult::Help);
    }

    let command_str = first.to_string_lossy().to_string();

    match command_str.as_str() {
        "run" => parse_run_args(args)
            .map(Command::Run)
            .map(ParseResult::Command),
        "encode" => parse_encode_args(args)
            .map(Command::Encode)
            .map(ParseResult::Command),
        other => Err(format!("unknown command: {other}")),
    }
}

fn parse_run_args(args: impl Iterator<Item = OsString>) -> Result<RunArgs, String> {
    let mut input: Option<PathBuf> = None;
    let mut verbose = false;

    for arg in args {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        if arg == "--verbose" || arg == "-v" {
            verbose = true;
            continue;
        }

        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }

        if input.is_some() {
            return Err("multiple scenario paths provided".to_string());
        }
        input = Some(PathBuf::from(arg));
    }

    let input = input.ok_or_else(|| "missing scenario path".to_string())?;
    Ok(RunArgs { input, verbose })
}

fn parse_encode_args(args: impl Iterator<Item = OsString>) -> Result<EncodeArgs, String> {
    let mut positional = Vec::new();

    for arg in args {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }
        positional.push(arg.to_string_lossy().to_string());
    }

    match <[String; 3]>::try_from(positional) {
        Ok([direction, address, content]) => Ok(EncodeArgs {
            direction,
            address,
            content,
        }),
        Err(_) => Err("encode expects <read|write> <address> <content>".to_string()),
    }
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.format_timestamp(None).init();
}

fn run_run(args: &RunArgs) -> Result<(), i32> {
    init_logging(args.verbose);

    let content = fs::read_to_string(&args.input).map_err(|e| {
        eprintln!("error: failed to read {}: {e}", args.input.display());
        1
    })?;

    let scenario = parse_scenario(&content).map_err(|e| {
        eprintln!("{}:{e}", args.input.display());
        1
    })?;

    let result = run_scenario(&scenario).map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;

    for step in &result.step_results {
        println!("{step}");
    }

    let summary = result.summary();
    let diag = &result.diagnostics;
    println!();
    println!("Scenario Summary: {summary} (total: {})", summary.total);
    println!(
        "Slave: {} frames, {} reads, {} writes, {} hook updates, {} faults",
        diag.frames,
        diag.reads,
        diag.writes,
        diag.hook_updates,
        diag.total_faults()
    );

    if result.all_passed() {
        Ok(())
    } else {
        Err(1)
    }
}

fn run_encode(args: &EncodeArgs) -> Result<(), i32> {
    let fail = |message: String| {
        eprintln!("error: {message}");
        1
    };

    let direction: Direction = args.direction.parse::<Direction>().map_err(|e| fail(e.to_string()))?;
    let address = parse_literal(&args.address)
        .and_then(|value| u8::try_from(value).map_err(|_| "address out of range".to_string()))
        .map_err(fail)?;
    let content = parse_literal(&args.content)
        .and_then(|value| u32::try_from(value).map_err(|_| "content out of range".to_string()))
        .map_err(fail)?;

    let slave = Tmc4671::slave().map_err(|e| fail(e.to_string()))?;
    let word = slave
        .create_spi_word(direction, address, content)
        .map_err(|e| fail(e.to_string()))?;

    println!("0x{word:010X}");
    Ok(())
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Command(Command::Run(args))) => match run_run(&args) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Ok(ParseResult::Command(Command::Encode(args))) => match run_encode(&args) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Err(error) => {
            if error.starts_with("Usage:") {
                println!("{error}");
            } else {
                eprintln!("error: {error}");
                eprintln!("{USAGE_TEXT}");
            }
            1
        }
    };

    std::process::exit(exit_code);
}
