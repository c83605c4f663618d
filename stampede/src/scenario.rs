use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use stampede_core::{NoDataPolicy, RunOptions, Stage, ThresholdSet, ThresholdSpec};

use crate::cli::ScenarioOverrides;

/// A scenario file: one URL, a stage plan, checks and thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ScenarioYaml {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(rename = "startVUs", default)]
    pub start_vus: Option<u64>,

    #[serde(default)]
    pub stages: Vec<StageYaml>,

    #[serde(default)]
    pub sleep: Option<YamlDuration>,

    #[serde(default)]
    pub timeout: Option<YamlDuration>,

    #[serde(default)]
    pub checks: ChecksYaml,

    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdExprYaml>,

    #[serde(default)]
    pub no_data_policy: Option<NoDataPolicyYaml>,

    #[serde(default)]
    pub graceful_stop: Option<YamlDuration>,

    #[serde(default)]
    pub graceful_ramp_down: Option<YamlDuration>,

    #[serde(default)]
    pub tick_interval: Option<YamlDuration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct StageYaml {
    pub target: u64,

    #[serde(default)]
    pub duration: YamlDuration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ChecksYaml {
    /// `null` disables the status check.
    #[serde(default = "default_status")]
    pub status: Option<u16>,

    #[serde(default)]
    pub max_duration: Option<YamlDuration>,
}

impl Default for ChecksYaml {
    fn default() -> Self {
        Self {
            status: default_status(),
            max_duration: None,
        }
    }
}

fn default_status() -> Option<u16> {
    Some(200)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum NoDataPolicyYaml {
    Fail,
    Pass,
}

impl From<NoDataPolicyYaml> for NoDataPolicy {
    fn from(value: NoDataPolicyYaml) -> Self {
        match value {
            NoDataPolicyYaml::Fail => NoDataPolicy::Fail,
            NoDataPolicyYaml::Pass => NoDataPolicy::Pass,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdExprYaml {
    One(String),
    Many(Vec<ThresholdItemYaml>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdItemYaml {
    Expr(String),
    Detailed(ThresholdDetailYaml),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ThresholdDetailYaml {
    pub threshold: String,

    #[serde(default)]
    pub abort_on_fail: bool,

    #[serde(default)]
    pub delay_abort_eval: Option<YamlDuration>,

    #[serde(default)]
    pub no_data_policy: Option<NoDataPolicyYaml>,
}

impl From<ThresholdItemYaml> for ThresholdSpec {
    fn from(item: ThresholdItemYaml) -> Self {
        match item {
            ThresholdItemYaml::Expr(expression) => ThresholdSpec {
                expression,
                ..ThresholdSpec::default()
            },
            ThresholdItemYaml::Detailed(d) => ThresholdSpec {
                expression: d.threshold,
                abort_on_fail: d.abort_on_fail,
                delay_abort_eval: d.delay_abort_eval.map(YamlDuration::into_inner),
                no_data: d.no_data_policy.map(Into::into),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v < 0 {
                    return Err(E::custom("duration must not be negative"));
                }
                Ok(YamlDuration(Duration::from_secs(v.unsigned_abs())))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&v)
            }
        }

        deserializer.deserialize_any(V)
    }
}

pub(crate) async fn load_scenario(path: &Path) -> anyhow::Result<ScenarioYaml> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read scenario YAML: {}", path.display()))?;

    parse_scenario(&bytes).with_context(|| format!("failed to parse YAML: {}", path.display()))
}

fn parse_scenario(bytes: &[u8]) -> anyhow::Result<ScenarioYaml> {
    Ok(serde_yaml::from_slice(bytes)?)
}

impl ScenarioYaml {
    /// Declared options with CLI overrides applied on top. Validation happens later, in
    /// `RunConfig::from_options`.
    pub(crate) fn into_run_options(self, overrides: &ScenarioOverrides) -> RunOptions {
        let ScenarioYaml {
            url,
            start_vus,
            stages,
            sleep,
            timeout,
            checks,
            thresholds,
            no_data_policy,
            graceful_stop,
            graceful_ramp_down,
            tick_interval,
        } = self;

        let defaults = RunOptions::default();

        let thresholds = thresholds
            .into_iter()
            .map(|(metric, expr)| match expr {
                ThresholdExprYaml::One(s) => ThresholdSet::new(&metric, [s.as_str()]),
                ThresholdExprYaml::Many(items) => ThresholdSet::new(&metric, items),
            })
            .collect();

        RunOptions {
            url: overrides.url.clone().or(url),
            stages: stages
                .into_iter()
                .map(|s| Stage::new(s.duration.into_inner(), s.target))
                .collect(),
            start_vus: start_vus.unwrap_or(defaults.start_vus),
            sleep: overrides
                .sleep
                .or(sleep.map(YamlDuration::into_inner))
                .unwrap_or(defaults.sleep),
            timeout: overrides
                .timeout
                .or(timeout.map(YamlDuration::into_inner))
                .unwrap_or(defaults.timeout),
            expected_status: checks.status,
            max_duration: checks.max_duration.map(YamlDuration::into_inner),
            thresholds,
            no_data: overrides
                .no_data
                .map(Into::into)
                .or(no_data_policy.map(Into::into))
                .unwrap_or(defaults.no_data),
            graceful_stop: graceful_stop
                .map(YamlDuration::into_inner)
                .unwrap_or(defaults.graceful_stop),
            graceful_ramp_down: graceful_ramp_down
                .map(YamlDuration::into_inner)
                .unwrap_or(defaults.graceful_ramp_down),
            tick_interval: tick_interval
                .map(YamlDuration::into_inner)
                .unwrap_or(defaults.tick_interval),
            abort_eval_interval: defaults.abort_eval_interval,
        }
    }
}
