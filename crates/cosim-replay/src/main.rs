//! CLI entry point for the co-simulation replay binary.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use cosim_core::CancelToken;
use cosim_replay::runner::{replay, ReplayError, EXIT_FAIL, EXIT_PASS};
use cosim_replay::scenario::{base_dir, Scenario};
use env_logger::Env;
use log as _;
use serde as _;
use serde_json as _;
#[cfg(test)]
use tempfile as _;
use thiserror as _;

const USAGE_TEXT: &str = "\
Usage: cosim-replay <command> [options]

Commands:
  run   <scenario.json> [--log <filter>]  Replay a recorded run through the engine
  check <scenario.json>                   Parse and validate a scenario only

Options:
  -l, --log <filter>  Log filter (default: $COSIM_LOG, then info)
  -h, --help          Show this help message

Exit codes:
  0    the pass address retired
  1    divergence, timeout, exhausted recording or error
  130  interrupted

Examples:
  cosim-replay run traces/boot.json
  cosim-replay run traces/boot.json --log debug
  cosim-replay check traces/boot.json
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run(RunArgs),
    Check(CheckArgs),
}

#[derive(Debug, PartialEq, Eq)]
struct RunArgs {
    input: PathBuf,
    log: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
struct CheckArgs {
    input: PathBuf,
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
        "check" => parse_check_args(args)
            .map(Command::Check)
            .map(ParseResult::Command),
        other => Err(format!("unknown command: {other}")),
    }
}

#[allow(clippy::while_let_on_iterator)]
fn parse_run_args(mut args: impl Iterator<Item = OsString>) -> Result<RunArgs, String> {
    let mut input: Option<PathBuf> = None;
    let mut log: Option<String> = None;

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        if arg == "-l" || arg == "--log" {
            let value = args
                .next()
                .ok_or_else(|| "missing value for --log".to_string())?;
            log = Some(value.to_string_lossy().to_string());
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
    Ok(RunArgs { input, log })
}

fn parse_check_args(args: impl Iterator<Item = OsString>) -> Result<CheckArgs, String> {
    let mut input: Option<PathBuf> = None;

    for arg in args {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
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
    Ok(CheckArgs { input })
}

fn init_logging(filter: Option<&str>) {
    let env = Env::default()
        .filter_or("COSIM_LOG", "info")
        .write_style_or("COSIM_LOG_STYLE", "auto");
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(filter) = filter {
        builder.parse_filters(filter);
    }
    builder.init();
}

fn load(input: &Path) -> Result<Scenario, i32> {
    Scenario::from_path(input).map_err(|e| {
        eprintln!("error: {e}");
        EXIT_FAIL
    })
}

fn run_replay(args: &RunArgs) -> Result<(), i32> {
    init_logging(args.log.as_deref());
    let scenario = load(&args.input)?;

    let report = match replay(&scenario, &base_dir(&args.input), &CancelToken::new()) {
        Ok(report) => report,
        Err(ReplayError::Scenario(e)) => {
            eprintln!("error: invalid scenario {}: {e}", args.input.display());
            return Err(EXIT_FAIL);
        }
        Err(e) => {
            eprintln!("error: {e}");
            return Err(EXIT_FAIL);
        }
    };

    println!("{}", report.outcome);
    println!(
        "cycles: {}  commits: {}  gets: {}  puts: {}  acquires: {}",
        report.cycles,
        report.stats.commits,
        report.stats.gets,
        report.stats.puts,
        report.stats.acquires
    );

    match report.outcome.exit_code() {
        EXIT_PASS => Ok(()),
        code => Err(code),
    }
}

fn run_check(args: &CheckArgs) -> Result<(), i32> {
    let scenario = load(&args.input)?;

    if let Err(e) = scenario.validate(&base_dir(&args.input)) {
        eprintln!("error: invalid scenario {}: {e}", args.input.display());
        return Err(EXIT_FAIL);
    }

    println!(
        "{}: ok ({} segments, {} script steps, {} cycles)",
        args.input.display(),
        scenario.memory.len(),
        scenario.script.len(),
        scenario.cycles.len()
    );
    Ok(())
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Command(Command::Run(args))) => match run_replay(&args) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Ok(ParseResult::Command(Command::Check(args))) => match run_check(&args) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::path::PathBuf;

    #[test]
    fn parses_run_command() {
        let result = parse_run_args(
            [
                OsString::from("boot.json"),
                OsString::from("--log"),
                OsString::from("cosim_core=trace"),
            ]
            .into_iter(),
        )
        .expect("valid run args should parse");

        assert_eq!(
            result,
            RunArgs {
                input: PathBuf::from("boot.json"),
                log: Some("cosim_core=trace".to_string()),
            }
        );
    }

    #[test]
    fn parses_check_command() {
        let result = parse_check_args([OsString::from("boot.json")].into_iter())
            .expect("valid check args should parse");

        assert_eq!(
            result,
            CheckArgs {
                input: PathBuf::from("boot.json"),
            }
        );
    }

    #[test]
    fn parses_help_flag() {
        let result = parse_args([OsString::from("-h")].into_iter())
            .expect("help should parse without error");
        assert!(matches!(result, ParseResult::Help));
    }

    #[test]
    fn rejects_unknown_command() {
        let error = parse_args([OsString::from("build")].into_iter())
            .expect_err("unknown command should fail parse");
        assert!(error.contains("unknown command"));
    }

    #[test]
    fn run_log_requires_value() {
        let error = parse_run_args([OsString::from("a.json"), OsString::from("-l")].into_iter())
            .expect_err("dangling --log should fail");
        assert!(error.contains("missing value"));
    }

    #[test]
    fn run_rejects_second_scenario() {
        let error =
            parse_run_args([OsString::from("a.json"), OsString::from("b.json")].into_iter())
                .expect_err("two inputs should fail");
        assert!(error.contains("multiple scenario paths"));
    }

    #[test]
    fn check_rejects_options() {
        let error = parse_check_args([OsString::from("--log")].into_iter())
            .expect_err("check should reject options");
        assert!(error.contains("unknown option"));
    }

    #[test]
    fn check_missing_input() {
        let error = parse_check_args(std::iter::empty()).expect_err("missing input should fail");
        assert!(error.contains("missing scenario path"));
    }
}
