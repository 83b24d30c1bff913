use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::channel::ChannelRef;
use crate::component::Component;
use crate::config::ExecutionMode;
use crate::pipeline::{Pipeline, layers};
use crate::types::ParameterMap;

/// What an external scheduler needs to run a validated pipeline.
#[derive(Debug, Serialize, Deserialize)]
pub struct PipelinePlan {
    pub pipeline: String,
    pub generated_at: DateTime<Utc>,
    pub pipeline_root: String,
    pub execution_mode: ExecutionMode,
    pub inputs: Vec<InputPlan>,
    pub components: Vec<ComponentPlan>,
    /// Groups of components with no dependency between members.
    pub layers: Vec<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InputPlan {
    pub channel: String,
    pub type_name: String,
    pub uris: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentPlan {
    pub name: String,
    pub kind: String,
    pub spec_fingerprint: String,
    pub params_hash: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstream: Vec<String>,
    pub inputs: BTreeMap<String, ChannelPlan>,
    pub outputs: BTreeMap<String, ChannelPlan>,
    pub parameters: ParameterMap,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelPlan {
    pub channel: String,
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
}

pub fn build_plan(pipeline: &Pipeline) -> PipelinePlan {
    let inputs = pipeline
        .inputs()
        .iter()
        .map(|channel| InputPlan {
            channel: channel.id().to_string(),
            type_name: channel.type_name().name().to_string(),
            uris: channel.get_all().iter().filter_map(|a| a.uri()).collect(),
        })
        .collect();

    let components = pipeline
        .execution_order()
        .map(|component| ComponentPlan {
            name: component.name().to_string(),
            kind: component.kind().to_string(),
            spec_fingerprint: component.spec().fingerprint(),
            params_hash: hash_params(component),
            upstream: pipeline
                .upstream(component.name())
                .into_iter()
                .map(str::to_string)
                .collect(),
            inputs: channel_plans(component.inputs()),
            outputs: channel_plans(component.outputs()),
            parameters: component.parameters().clone(),
        })
        .collect();

    PipelinePlan {
        pipeline: pipeline.name().to_string(),
        generated_at: Utc::now(),
        pipeline_root: pipeline
            .config()
            .pipeline_root
            .to_string_lossy()
            .to_string(),
        execution_mode: pipeline.config().execution_mode,
        inputs,
        components,
        layers: layers(pipeline)
            .into_values()
            .map(|names| names.into_iter().map(str::to_string).collect())
            .collect(),
    }
}

pub fn write_plan(plan: &PipelinePlan, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create plan directory: {}", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create plan file: {}", path.display()))?;
    serde_yaml::to_writer(file, plan)
        .with_context(|| format!("Failed to write plan: {}", path.display()))?;
    Ok(())
}

fn channel_plans(channels: &BTreeMap<String, ChannelRef>) -> BTreeMap<String, ChannelPlan> {
    channels
        .iter()
        .map(|(name, channel)| {
            (
                name.clone(),
                ChannelPlan {
                    channel: channel.id().to_string(),
                    type_name: channel.type_name().name().to_string(),
                    producer: channel.producer().map(ToString::to_string),
                },
            )
        })
        .collect()
}

fn hash_params(component: &Component) -> String {
    let mut hasher = Sha256::new();
    let serialized = serde_json::to_vec(component.parameters()).unwrap_or_default();
    hasher.update(component.kind().as_bytes());
    hasher.update(serialized);
    format!("{:x}", hasher.finalize())
}
