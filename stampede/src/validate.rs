use std::fmt::Write as _;
use std::time::Duration;

use stampede_core::RunConfig;

use crate::cli::ValidateArgs;
use crate::exit_codes::ExitCode;
use crate::output::format_duration;
use crate::run::resolve_config;
use crate::run_error::RunError;

pub async fn validate(args: ValidateArgs) -> Result<ExitCode, RunError> {
    let cfg = resolve_config(&args.scenario, &args.overrides).await?;
    print!("{}", render_plan(&cfg));
    Ok(ExitCode::Success)
}

fn render_plan(cfg: &RunConfig) -> String {
    let mut out = String::new();
    let req = cfg.request();

    writeln!(out, "url: {}", req.url).ok();
    writeln!(
        out,
        "duration: {} max_vus: {} start_vus: {}",
        format_duration(cfg.total_duration()),
        cfg.max_vus(),
        cfg.start_vus()
    )
    .ok();
    writeln!(
        out,
        "sleep: {} timeout: {} graceful_stop: {} graceful_ramp_down: {}",
        format_duration(cfg.sleep()),
        format_duration(req.timeout),
        format_duration(cfg.graceful_stop()),
        format_duration(cfg.graceful_ramp_down())
    )
    .ok();

    out.push_str("stages\n");
    let mut at = Duration::ZERO;
    let mut from = cfg.start_vus();
    for (i, stage) in cfg.stages().iter().enumerate() {
        writeln!(
            out,
            "  {}. {} -> {} over {} (ends at {})",
            i + 1,
            from,
            stage.target,
            format_duration(stage.duration),
            format_duration(at + stage.duration)
        )
        .ok();
        at += stage.duration;
        from = stage.target;
    }

    if !req.checks.is_empty() {
        out.push_str("checks\n");
        for c in req.checks.iter() {
            writeln!(out, "  {}", c.name()).ok();
        }
    }

    if !cfg.thresholds().is_empty() {
        out.push_str("thresholds\n");
        for rule in cfg.thresholds() {
            write!(out, "  {rule}").ok();
            if rule.abort_on_fail {
                write!(
                    out,
                    " (abortOnFail after {})",
                    format_duration(rule.delay_abort_eval)
                )
                .ok();
            }
            out.push('\n');
        }
        writeln!(out, "no_data_policy: {}", cfg.no_data()).ok();
    }

    out
}
