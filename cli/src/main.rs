//! CLI for the `proc-harness` crate.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use is_terminal::IsTerminal;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use std::{
    io::{self, Write},
    path::PathBuf,
    process,
    time::Duration,
};

use proc_harness::{
    report::format_exit_outcome, tokenize, ExitOutcome, FormattingSink, Invocation,
    ProcessRunner, RunFailure, RunnerOptions, StreamFormatter, StreamMarkers, Value,
};

/// Exit code used if the process has timed out.
const TIMEOUT_EXIT_CODE: i32 = 124;
/// Exit code used if the process could not be executed.
const EXECUTION_FAILURE_EXIT_CODE: i32 = 125;

/// CLI for tokenizing commands and running processes with timeouts.
#[derive(Debug, Parser)]
#[command(author, version, about)]
enum Args {
    /// Splits a command into tokens and prints them, one token per line.
    Tokenize {
        /// Command to tokenize.
        command: String,
        /// Prints tokens as a JSON array.
        #[arg(long)]
        json: bool,
    },

    /// Runs a command, streaming its output, and prints the outcome.
    Run(RunArgs),
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// Command to run, e.g. `git commit -m "Initial commit"`. Executed without a shell.
    command: String,
    /// Explicit argument placed before the args supplied in the command.
    #[arg(long = "arg", short = 'a', value_name = "ARG", allow_hyphen_values = true)]
    args: Vec<String>,
    /// Env variable for the process in the `NAME=VALUE` form.
    #[arg(long, short = 'e', value_name = "NAME=VALUE", value_parser = parse_env_var)]
    env: Vec<(String, String)>,
    /// Line supplied to the process stdin. If omitted, stdin is connected to the null device.
    #[arg(long = "input", short = 'i', value_name = "LINE")]
    inputs: Vec<String>,
    /// Working directory for the process.
    #[arg(long, value_name = "DIR")]
    cwd: Option<PathBuf>,
    /// Total timeout in seconds.
    #[arg(
        long,
        short = 't',
        value_name = "SECS",
        default_value_t = RunnerOptions::DEFAULT_TIMEOUT.as_secs_f64(),
        value_parser = parse_secs
    )]
    timeout: f64,
    /// Timeout in seconds for the process to produce no output.
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = RunnerOptions::DEFAULT_IDLE_TIMEOUT.as_secs_f64(),
        value_parser = parse_secs
    )]
    idle_timeout: f64,
    /// Disables streaming process output while it runs.
    #[arg(long)]
    no_stream: bool,
    /// Dims streamed output lines.
    #[arg(long)]
    dim: bool,
    /// Controls coloring of the output.
    #[arg(long, short = 'c', value_enum, default_value_t = ColorPreference::Auto)]
    color: ColorPreference,
    /// Prints the outcome as JSON instead of the diagnostic block. Implies `--no-stream`.
    #[arg(long)]
    json: bool,
}

fn parse_env_var(s: &str) -> anyhow::Result<(String, String)> {
    let (name, value) = s
        .split_once('=')
        .with_context(|| format!("env variable `{s}` is not in the `NAME=VALUE` form"))?;
    anyhow::ensure!(!name.is_empty(), "env variable name is empty");
    Ok((name.to_owned(), value.to_owned()))
}

fn parse_secs(s: &str) -> anyhow::Result<f64> {
    let secs: f64 = s.parse().context("cannot parse timeout")?;
    anyhow::ensure!(
        secs.is_finite() && secs > 0.0,
        "timeout must be a positive number of seconds"
    );
    Ok(secs)
}

impl RunArgs {
    fn invocation(&self) -> anyhow::Result<Invocation> {
        let env = self
            .env
            .iter()
            .map(|(name, value)| (name.as_str(), Value::from(value)));
        Invocation::build(&self.command, &self.args, env)
            .with_context(|| format!("cannot build invocation from `{}`", self.command))
    }

    fn options(&self) -> RunnerOptions {
        let mut options = RunnerOptions::default()
            .with_timeout(Duration::from_secs_f64(self.timeout))
            .with_idle_timeout(Duration::from_secs_f64(self.idle_timeout))
            .with_notices(!self.json);
        if let Some(cwd) = &self.cwd {
            options = options.with_current_dir(cwd.clone());
        }
        options
    }

    fn run(self) -> anyhow::Result<i32> {
        let invocation = self.invocation()?;
        #[cfg(feature = "tracing")]
        tracing::debug!(%invocation, "assembled invocation");

        let inputs: Vec<_> = self.inputs.iter().map(String::as_str).collect();
        let choice = ColorChoice::from(self.color);
        let mut runner = ProcessRunner::new(self.options());

        let handle = if self.no_stream || self.json {
            runner.run(invocation, &inputs)
        } else {
            let formatter = StreamFormatter::new(StreamMarkers::default()).with_dimming(self.dim);
            let mut sink = FormattingSink::new(formatter, StandardStream::stdout(choice));
            runner.run_with(invocation, &inputs, &mut sink)
        };
        let outcome = handle
            .outcome()
            .context("process has not terminated")?
            .clone();

        if self.json {
            let json = serde_json::to_string_pretty(&outcome)?;
            println!("{json}");
        } else {
            report_outcome(&StandardStream::stdout(choice), &outcome)?;
        }
        Ok(exit_code(&outcome))
    }
}

fn report_outcome(out: &StandardStream, outcome: &ExitOutcome) -> io::Result<()> {
    let mut out = out.lock();
    let color = if outcome.is_success() {
        Color::Green
    } else {
        Color::Red
    };
    out.set_color(ColorSpec::new().set_fg(Some(color)).set_intense(true))?;
    write!(out, "{}", if outcome.is_success() { "PASSED" } else { "FAILED" })?;
    out.reset()?;
    writeln!(out)?;
    write!(out, "{}", format_exit_outcome(outcome))
}

fn exit_code(outcome: &ExitOutcome) -> i32 {
    match outcome.failure() {
        Some(RunFailure::Timeout(_) | RunFailure::IdleTimeout(_)) => TIMEOUT_EXIT_CODE,
        Some(_) => EXECUTION_FAILURE_EXIT_CODE,
        None => outcome.exit_code().unwrap_or(EXECUTION_FAILURE_EXIT_CODE),
    }
}

impl Args {
    fn run(self) -> anyhow::Result<i32> {
        match self {
            Self::Tokenize { command, json } => {
                let tokens = tokenize(&command)
                    .with_context(|| format!("cannot tokenize `{command}`"))?;
                let stdout = io::stdout();
                let mut stdout = stdout.lock();
                if json {
                    serde_json::to_writer_pretty(&mut stdout, &tokens)?;
                    writeln!(stdout)?;
                } else {
                    for token in &tokens {
                        writeln!(stdout, "{token}")?;
                    }
                }
                Ok(0)
            }
            Self::Run(args) => args.run(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorPreference {
    Always,
    Ansi,
    Auto,
    Never,
}

impl From<ColorPreference> for ColorChoice {
    fn from(value: ColorPreference) -> Self {
        match value {
            ColorPreference::Always => ColorChoice::Always,
            ColorPreference::Ansi => ColorChoice::AlwaysAnsi,
            ColorPreference::Auto => {
                if io::stdout().is_terminal() {
                    ColorChoice::Auto
                } else {
                    ColorChoice::Never
                }
            }
            ColorPreference::Never => ColorChoice::Never,
        }
    }
}

#[cfg(feature = "tracing")]
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    FmtSubscriber::builder()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();
}

fn main() -> anyhow::Result<()> {
    #[cfg(feature = "tracing")]
    init_tracing();

    let exit_code = Args::parse().run()?;
    if exit_code != 0 {
        process::exit(exit_code);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn parsing_run_args() {
        let args = Args::try_parse_from([
            "proc-harness",
            "run",
            "git commit",
            "-a",
            "--amend",
            "-e",
            "GIT_EDITOR=true",
            "-i",
            "y",
            "-t",
            "2.5",
            "--color",
            "never",
        ])
        .unwrap();
        let Args::Run(args) = args else {
            panic!("unexpected subcommand");
        };
        assert_eq!(args.args, ["--amend"]);
        assert_eq!(args.env, [("GIT_EDITOR".to_owned(), "true".to_owned())]);
        assert_eq!(args.inputs, ["y"]);
        assert_eq!(args.color, ColorPreference::Never);

        let invocation = args.invocation().unwrap();
        assert_eq!(invocation.program(), "git");
        assert_eq!(invocation.args(), ["--amend", "commit"]);
        assert_eq!(invocation.env()["GIT_EDITOR"], "true");

        let options = args.options();
        assert_eq!(options.timeout(), Duration::from_millis(2_500));
        assert_eq!(options.idle_timeout(), RunnerOptions::DEFAULT_IDLE_TIMEOUT);
    }

    #[test]
    fn invalid_run_args() {
        for bogus in [
            &["proc-harness", "run", "ls", "-e", "NO_VALUE"] as &[_],
            &["proc-harness", "run", "ls", "-e", "=value"],
            &["proc-harness", "run", "ls", "-t", "0"],
            &["proc-harness", "run", "ls", "--idle-timeout", "soon"],
        ] {
            assert!(Args::try_parse_from(bogus).is_err(), "{bogus:?}");
        }
    }

    #[test]
    fn invalid_command_is_reported() {
        let Args::Run(args) = Args::parse_from(["proc-harness", "run", "rm;ls"]) else {
            unreachable!();
        };
        let err = args.invocation().unwrap_err();
        assert!(err.to_string().contains("rm;ls"), "{err:#}");
    }
}
