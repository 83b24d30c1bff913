use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::artifact::{Artifact, ArtifactMap};
use crate::error::ExecutionError;
use crate::executor::{Executor, single_input, single_output};
use crate::registry::ComponentRegistry;
use crate::spec::ComponentSpec;
use crate::types::{ParameterMap, ScalarType};

pub const DATASET: &str = "Dataset";
pub const STATISTICS: &str = "Statistics";
pub const DIGEST: &str = "Digest";
pub const RECEIPT: &str = "Receipt";

pub fn register_defaults(registry: &mut ComponentRegistry) -> Result<()> {
    let types = registry.types_mut();
    let dataset = types.register(DATASET)?;
    let statistics = types.register(STATISTICS)?;
    let digest = types.register(DIGEST)?;
    let receipt = types.register(RECEIPT)?;

    registry.register(
        ComponentSpec::builder("file_import")
            .parameter("source", ScalarType::String)
            .output("data", &dataset)
            .build()?,
        Arc::new(FileImport),
    );
    registry.register(
        ComponentSpec::builder("line_stats")
            .input("data", &dataset)
            .parameter("max_lines", ScalarType::Integer)
            .parameter("sample_rate", ScalarType::Float)
            .output("stats", &statistics)
            .build()?,
        Arc::new(LineStats),
    );
    registry.register(
        ComponentSpec::builder("checksum")
            .input("data", &dataset)
            .output("digest", &digest)
            .build()?,
        Arc::new(Checksum),
    );
    registry.register(
        ComponentSpec::builder("notify")
            .input("stats", &statistics)
            .parameter("recipient", ScalarType::String)
            .parameter("dry_run", ScalarType::Boolean)
            .output("receipt", &receipt)
            .build()?,
        Arc::new(Notify),
    );
    Ok(())
}

struct FileImport;

impl Executor for FileImport {
    fn execute(
        &self,
        _inputs: &ArtifactMap,
        outputs: &ArtifactMap,
        parameters: &ParameterMap,
    ) -> Result<(), ExecutionError> {
        let source = PathBuf::from(param_str(parameters, "source")?);
        if !source.is_file() {
            return Err(ExecutionError::InvalidParameter {
                name: "source".into(),
                reason: format!("'{}' is not a readable file", source.display()),
            });
        }
        let data = single_output(outputs, "data")?;
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "data".to_string());
        let destination = staging_dir(data)?.join(file_name);

        let bytes = fs::copy(&source, &destination).map_err(|err| {
            ExecutionError::io(
                format!(
                    "Failed to copy {} to {}",
                    source.display(),
                    destination.display()
                ),
                err,
            )
        })?;

        data.set_property("size_bytes", i64::try_from(bytes).unwrap_or(i64::MAX))?;
        data.set_property("source", source.to_string_lossy().to_string())?;
        commit(data, &destination)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LineStatistics {
    pub lines: u64,
    pub words: u64,
    pub bytes: u64,
    pub considered_lines: u64,
    pub sampled_lines: u64,
}

struct LineStats;

impl Executor for LineStats {
    fn execute(
        &self,
        inputs: &ArtifactMap,
        outputs: &ArtifactMap,
        parameters: &ParameterMap,
    ) -> Result<(), ExecutionError> {
        let max_lines = param_i64(parameters, "max_lines")?;
        if max_lines <= 0 {
            return Err(ExecutionError::InvalidParameter {
                name: "max_lines".into(),
                reason: format!("must be positive, got {max_lines}"),
            });
        }
        let sample_rate = param_f64(parameters, "sample_rate")?;
        if !(0.0..=1.0).contains(&sample_rate) {
            return Err(ExecutionError::InvalidParameter {
                name: "sample_rate".into(),
                reason: format!("must be within [0, 1], got {sample_rate}"),
            });
        }

        let source = input_path(inputs, "data")?;
        let content = read_to_string(&source)?;
        let considered: Vec<&str> = content.lines().take(max_lines as usize).collect();
        let stats = LineStatistics {
            lines: content.lines().count() as u64,
            words: considered
                .iter()
                .map(|line| line.split_whitespace().count() as u64)
                .sum(),
            bytes: content.len() as u64,
            considered_lines: considered.len() as u64,
            sampled_lines: (considered.len() as f64 * sample_rate).ceil() as u64,
        };

        let output = single_output(outputs, "stats")?;
        let destination = staging_dir(output)?.join("stats.json");
        let rendered = serde_json::to_vec_pretty(&stats).map_err(|err| anyhow!(err))?;
        write(&destination, &rendered)?;
        output.set_property("lines", i64::try_from(stats.lines).unwrap_or(i64::MAX))?;
        commit(output, &destination)
    }
}

struct Checksum;

impl Executor for Checksum {
    fn execute(
        &self,
        inputs: &ArtifactMap,
        outputs: &ArtifactMap,
        _parameters: &ParameterMap,
    ) -> Result<(), ExecutionError> {
        let source = input_path(inputs, "data")?;
        let bytes = fs::read(&source)
            .map_err(|err| ExecutionError::io(format!("Failed to read {}", source.display()), err))?;
        let digest = format!("{:x}", Sha256::digest(&bytes));

        let output = single_output(outputs, "digest")?;
        let destination = staging_dir(output)?.join("digest.sha256");
        let name = source
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        write(&destination, format!("{digest}  {name}\n").as_bytes())?;
        output.set_property("sha256", digest)?;
        commit(output, &destination)
    }
}

struct Notify;

impl Executor for Notify {
    fn execute(
        &self,
        inputs: &ArtifactMap,
        outputs: &ArtifactMap,
        parameters: &ParameterMap,
    ) -> Result<(), ExecutionError> {
        let recipient = param_str(parameters, "recipient")?;
        if recipient.trim().is_empty() {
            return Err(ExecutionError::InvalidParameter {
                name: "recipient".into(),
                reason: "cannot be empty".into(),
            });
        }
        let dry_run = param_bool(parameters, "dry_run")?;

        let source = input_path(inputs, "stats")?;
        let stats: LineStatistics = serde_json::from_str(&read_to_string(&source)?)
            .map_err(|err| anyhow!("Failed to parse statistics {}: {err}", source.display()))?;
        let message = format!(
            "To {recipient}: dataset has {} line(s), {} word(s) in the first {} line(s)",
            stats.lines, stats.words, stats.considered_lines
        );
        let status = if dry_run { "dry-run" } else { "delivered" };
        info!(recipient, status, "{message}");

        let output = single_output(outputs, "receipt")?;
        let destination = staging_dir(output)?.join("receipt.txt");
        write(
            &destination,
            format!("{message}\nstatus: {status}\n").as_bytes(),
        )?;
        output.set_property("delivered", !dry_run)?;
        commit(output, &destination)
    }
}

fn param_str<'a>(parameters: &'a ParameterMap, key: &str) -> Result<&'a str, ExecutionError> {
    parameters
        .get(key)
        .and_then(|value| value.as_str())
        .ok_or_else(|| missing_parameter(key, ScalarType::String))
}

fn param_i64(parameters: &ParameterMap, key: &str) -> Result<i64, ExecutionError> {
    parameters
        .get(key)
        .and_then(|value| value.as_i64())
        .ok_or_else(|| missing_parameter(key, ScalarType::Integer))
}

fn param_f64(parameters: &ParameterMap, key: &str) -> Result<f64, ExecutionError> {
    parameters
        .get(key)
        .and_then(|value| value.as_f64())
        .ok_or_else(|| missing_parameter(key, ScalarType::Float))
}

fn param_bool(parameters: &ParameterMap, key: &str) -> Result<bool, ExecutionError> {
    parameters
        .get(key)
        .and_then(|value| value.as_bool())
        .ok_or_else(|| missing_parameter(key, ScalarType::Boolean))
}

fn missing_parameter(key: &str, expected: ScalarType) -> ExecutionError {
    ExecutionError::InvalidParameter {
        name: key.to_string(),
        reason: format!("expected a {expected} value"),
    }
}

fn input_path(inputs: &ArtifactMap, name: &str) -> Result<PathBuf, ExecutionError> {
    Ok(PathBuf::from(single_input(inputs, name)?.require_uri()?))
}

fn staging_dir(artifact: &Artifact) -> Result<PathBuf, ExecutionError> {
    let staging = artifact
        .staging_uri()
        .ok_or_else(|| anyhow!("Output artifact {} has no staging location", artifact.id()))?;
    let dir = PathBuf::from(staging);
    fs::create_dir_all(&dir).map_err(|err| {
        ExecutionError::io(
            format!("Failed to create staging directory {}", dir.display()),
            err,
        )
    })?;
    Ok(dir)
}

fn read_to_string(path: &Path) -> Result<String, ExecutionError> {
    fs::read_to_string(path)
        .map_err(|err| ExecutionError::io(format!("Failed to read {}", path.display()), err))
}

fn write(path: &Path, bytes: &[u8]) -> Result<(), ExecutionError> {
    fs::write(path, bytes)
        .map_err(|err| ExecutionError::io(format!("Failed to write {}", path.display()), err))
}

fn commit(artifact: &Artifact, location: &Path) -> Result<(), ExecutionError> {
    artifact.set_uri(location.to_string_lossy().to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarValue;

    #[test]
    fn parameter_helpers_report_the_expected_type() {
        let mut params = ParameterMap::new();
        params.insert("n".into(), ScalarValue::Integer(3));
        assert_eq!(param_i64(&params, "n").unwrap(), 3);
        let err = param_f64(&params, "n").unwrap_err();
        assert!(err.to_string().contains("expected a float value"));
    }
}
