use std::path::Path;
use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_ms_opt, format_rate};
use progress::HumanProgress;
use summary::render;

use super::{OutputFormatter, format_duration};

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, scenario_path: &Path, cfg: &stampede_core::RunConfig) {
        println!("scenario: {}", scenario_path.display());
        println!(
            "target: GET {} stages={} duration={} max_vus={}",
            cfg.request().url,
            cfg.stages().len(),
            format_duration(cfg.total_duration()),
            cfg.max_vus()
        );
        println!();
    }

    fn progress(&self) -> Option<stampede_core::ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u| {
            let stage = match &u.stage {
                Some(s) => format!("stage={}/{} ", s.index + 1, s.count),
                None => String::new(),
            };

            let message = format!(
                "{} {stage}vus={}/{} iters/s={} errors={}/{} p95={}",
                u.phase,
                u.live_vus,
                u.target_vus,
                format_rate(u.metrics.iterations_per_sec_now),
                u.metrics.failed_iterations_total,
                u.metrics.iterations_total,
                format_ms_opt(u.metrics.latency_p95_ms),
            );

            progress.update(u.total_duration, u.elapsed, message);
        }))
    }

    fn print_summary(&self, verdict: &stampede_core::RunVerdict) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(verdict));
        Ok(())
    }
}
