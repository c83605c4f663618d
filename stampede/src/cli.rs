use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use stampede_core::NoDataPolicy;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    // Bare numbers are seconds, matching the scenario file.
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    humantime::parse_duration(s)
        .map_err(|e| format!("invalid duration '{s}' ({e}; expected e.g. 10s, 250ms, 1m)"))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable progress and summary.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) and a final summary line to stdout.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum NoDataArg {
    /// A threshold over a metric with no samples fails.
    Fail,
    /// A threshold over a metric with no samples passes.
    Pass,
}

impl From<NoDataArg> for NoDataPolicy {
    fn from(value: NoDataArg) -> Self {
        match value {
            NoDataArg::Fail => NoDataPolicy::Fail,
            NoDataArg::Pass => NoDataPolicy::Pass,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "stampede",
    author,
    version,
    about = "Stage-driven HTTP load testing",
    long_about = "stampede drives a population of virtual users against one URL.\n\nA scenario file declares stages (ramp to N users over a duration), checks applied to every response, and thresholds the aggregated results must satisfy for the run to pass.\n\nLogs go to stderr; set STAMPEDE_LOG (e.g. `info`, `stampede_core=debug`) to see more.",
    after_help = "Examples:\n  stampede run demos/load.yaml\n  stampede run demos/spike.yaml --url http://127.0.0.1:8080/hello\n  stampede run demos/soak.yaml --output json\n  stampede validate demos/stress.yaml\n\nExit codes: 0 passed, 11 thresholds failed, 12 aborted, 13 no responses, 30 invalid input, 40 runtime error."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test scenario
    #[command(
        long_about = "Run a scenario file: ramp virtual users through its stages, then evaluate thresholds.\n\nCLI flags override values from the scenario file."
    )]
    Run(RunArgs),

    /// Check a scenario file and print the resolved plan without sending traffic
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
pub struct ScenarioOverrides {
    /// Target URL (overrides `url`)
    #[arg(long)]
    pub url: Option<String>,

    /// Pause between iterations of one virtual user (e.g. 1s, 250ms)
    #[arg(long, value_parser = parse_duration)]
    pub sleep: Option<Duration>,

    /// Per-request timeout (e.g. 60s)
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// What a threshold over a metric with no samples evaluates to (overrides `noDataPolicy`)
    #[arg(long = "no-data", value_enum)]
    pub no_data: Option<NoDataArg>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the scenario (.yaml)
    pub scenario: PathBuf,

    #[command(flatten)]
    pub overrides: ScenarioOverrides,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Path to the scenario (.yaml)
    pub scenario: PathBuf,

    #[command(flatten)]
    pub overrides: ScenarioOverrides,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(2 * 60 * 60)));
        assert_eq!(parse_duration("5"), Ok(Duration::from_secs(5)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn cli_parses_run_with_overrides() {
        let parsed = Cli::try_parse_from([
            "stampede",
            "run",
            "load.yaml",
            "--url",
            "http://127.0.0.1:8080/hello",
            "--sleep",
            "250ms",
            "--timeout",
            "5s",
            "--no-data",
            "pass",
            "--output",
            "json",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.scenario, PathBuf::from("load.yaml"));
                assert_eq!(
                    args.overrides.url.as_deref(),
                    Some("http://127.0.0.1:8080/hello")
                );
                assert_eq!(args.overrides.sleep, Some(Duration::from_millis(250)));
                assert_eq!(args.overrides.timeout, Some(Duration::from_secs(5)));
                assert_eq!(args.overrides.no_data, Some(NoDataArg::Pass));
                assert!(matches!(args.output, OutputFormat::Json));
            }
            Command::Validate(_) => panic!("expected run command"),
        }
    }

    #[test]
    fn cli_parses_validate_defaults() {
        let parsed = Cli::try_parse_from(["stampede", "validate", "spike.yaml"]);
        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Validate(args) => {
                assert_eq!(args.scenario, PathBuf::from("spike.yaml"));
                assert!(args.overrides.url.is_none());
                assert!(args.overrides.no_data.is_none());
            }
            Command::Run(_) => panic!("expected validate command"),
        }
    }
}
