use std::path::Path;

use anyhow::Context as _;
use stampede_core::{LoadTestEngine, RunConfig};
use stampede_http::HttpTarget;

use crate::cli::{RunArgs, ScenarioOverrides};
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::scenario;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let cfg = resolve_config(&args.scenario, &args.overrides).await?;
    let target = HttpTarget::new(&cfg.request().url)?;

    out.print_header(&args.scenario, &cfg);

    let mut engine = LoadTestEngine::new(cfg, target);
    if let Some(progress) = out.progress() {
        engine = engine.with_progress(progress);
    }

    let cancel = engine.cancel_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received Ctrl-C; stopping run");
            cancel.cancel();
        }
    });

    let verdict = engine.run().await;
    ctrl_c.abort();

    out.print_summary(&verdict)
        .context("failed to write summary")
        .map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_outcome(verdict.outcome))
}

/// Loads the scenario file, applies CLI overrides and validates the result.
pub(crate) async fn resolve_config(
    path: &Path,
    overrides: &ScenarioOverrides,
) -> Result<RunConfig, RunError> {
    let doc = scenario::load_scenario(path)
        .await
        .map_err(RunError::InvalidInput)?;

    Ok(RunConfig::from_options(doc.into_run_options(overrides))?)
}
