use std::path::Path;
use std::time::Duration;

use stampede_core::{ProgressFn, RunConfig, RunVerdict};

use crate::cli::OutputFormat;

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, scenario_path: &Path, cfg: &RunConfig);
    fn progress(&self) -> Option<ProgressFn>;
    fn print_summary(&self, verdict: &RunVerdict) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}

/// Whole-millisecond humantime rendering, e.g. `1m 30s`, `250ms`.
pub(crate) fn format_duration(d: Duration) -> String {
    let ms = Duration::from_millis(u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
    humantime::format_duration(ms).to_string()
}
