use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const PIPELINE_ROOT_ENV: &str = "STAGEWIRE_PIPELINE_ROOT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Run in-process with the bundled sequential runner.
    #[default]
    Local,
    /// Only assemble and export a plan; something else runs it.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_pipeline_root")]
    pub pipeline_root: PathBuf,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
}

fn default_pipeline_root() -> PathBuf {
    PathBuf::from("./pipeline-root")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline_root: default_pipeline_root(),
            execution_mode: ExecutionMode::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            pipeline_root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(root) = lookup(PIPELINE_ROOT_ENV)
            && !root.trim().is_empty()
        {
            debug!(root = root.as_str(), "Pipeline root overridden from environment");
            self.pipeline_root = PathBuf::from(root);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_replaces_root_only_when_set() {
        let config = PipelineConfig::with_root("/data/a");
        let unchanged = config.clone().with_overrides_from(|_| None);
        assert_eq!(unchanged.pipeline_root, PathBuf::from("/data/a"));

        let blank = config.clone().with_overrides_from(|_| Some("  ".into()));
        assert_eq!(blank.pipeline_root, PathBuf::from("/data/a"));

        let overridden = config.with_overrides_from(|key| {
            (key == PIPELINE_ROOT_ENV).then(|| "/mnt/runs".to_string())
        });
        assert_eq!(overridden.pipeline_root, PathBuf::from("/mnt/runs"));
        assert_eq!(overridden.execution_mode, ExecutionMode::Local);
    }

    #[test]
    fn yaml_defaults_fill_missing_fields() {
        let config: PipelineConfig = serde_yaml::from_str("execution_mode: external").unwrap();
        assert_eq!(config.execution_mode, ExecutionMode::External);
        assert_eq!(config.pipeline_root, PathBuf::from("./pipeline-root"));
    }
}
