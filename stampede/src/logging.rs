use tracing_subscriber::EnvFilter;

pub(crate) const LOG_ENV: &str = "STAMPEDE_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

/// Logs go to stderr so `--output json` keeps stdout machine-readable.
pub(crate) fn init() -> anyhow::Result<()> {
    let filter = match std::env::var(LOG_ENV) {
        Ok(raw) if !raw.trim().is_empty() => EnvFilter::try_new(raw.trim())
            .map_err(|e| anyhow::anyhow!("invalid {LOG_ENV} filter `{raw}`: {e}"))?,
        _ => EnvFilter::new(DEFAULT_DIRECTIVE),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{e}"))
}
