use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifact::Artifact;
use crate::channel::{Channel, ChannelRef};
use crate::config::PipelineConfig;
use crate::pipeline::Pipeline;
use crate::registry::ComponentRegistry;
use crate::types::ParameterMap;

pub const RECIPE_VERSION: u32 = 1;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Recipe {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub config: PipelineConfig,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub components: Vec<ComponentEntry>,
}

/// A pipeline-level input channel, optionally pre-populated from storage.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub splits: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComponentEntry {
    pub name: String,
    pub kind: String,
    /// Input name → `<pipeline input>` or `<component>.<output>`.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub params: ParameterMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelReference<'a> {
    Input(&'a str),
    Output { component: &'a str, output: &'a str },
}

impl<'a> ChannelReference<'a> {
    pub fn parse(reference: &'a str) -> Result<Self> {
        let reference = reference.trim();
        match reference.split_once('.') {
            None if !reference.is_empty() => Ok(ChannelReference::Input(reference)),
            Some((component, output))
                if !component.is_empty() && !output.is_empty() && !output.contains('.') =>
            {
                Ok(ChannelReference::Output { component, output })
            }
            _ => bail!(
                "Invalid channel reference '{reference}'; expected '<input>' or '<component>.<output>'"
            ),
        }
    }
}

impl Recipe {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recipe file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse recipe YAML: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Wires every component and assembles the pipeline.
    ///
    /// Output channels are allocated for all components before any of them
    /// is built, so references may point forward in the file; a cyclic
    /// reference therefore reaches the DAG checks instead of failing here.
    pub fn build(&self, registry: &ComponentRegistry) -> Result<Pipeline> {
        if self.version != RECIPE_VERSION {
            bail!("Unsupported recipe version: {}", self.version);
        }

        let inputs = self.input_channels(registry)?;

        let mut allocated: Vec<BTreeMap<String, ChannelRef>> = Vec::new();
        for entry in &self.components {
            let kind = registry
                .get(&entry.kind)
                .with_context(|| format!("Component '{}'", entry.name))?;
            let outputs = kind
                .spec
                .outputs()
                .iter()
                .filter_map(|field| {
                    kind.spec
                        .output_type(&field.name)
                        .map(|ty| (field.name.clone(), Channel::new(ty.clone())))
                })
                .collect();
            allocated.push(outputs);
        }

        let mut components = Vec::with_capacity(self.components.len());
        for (entry, outputs) in self.components.iter().zip(&allocated) {
            let mut builder = registry.builder(&entry.kind)?.name(&entry.name);
            for (field, reference) in &entry.inputs {
                let channel = self
                    .resolve(reference, &inputs, &allocated)
                    .with_context(|| {
                        format!("Component '{}' input '{}'", entry.name, field)
                    })?;
                builder = builder.input(field, &channel);
            }
            for (field, channel) in outputs {
                builder = builder.output(field, channel);
            }
            let component = builder
                .parameters(entry.params.clone())
                .build()
                .with_context(|| format!("Failed to construct component '{}'", entry.name))?;
            debug!(
                component = entry.name.as_str(),
                kind = entry.kind.as_str(),
                "Recipe component built"
            );
            components.push(component);
        }

        let pipeline = Pipeline::new(
            &self.name,
            components,
            inputs.into_values().collect(),
            self.config.clone().with_env_overrides(),
        )
        .with_context(|| format!("Failed to assemble pipeline '{}'", self.name))?;
        Ok(pipeline)
    }

    fn input_channels(&self, registry: &ComponentRegistry) -> Result<BTreeMap<String, ChannelRef>> {
        let mut channels = BTreeMap::new();
        for input in &self.inputs {
            let ty = registry
                .types()
                .lookup(&input.type_name)
                .with_context(|| format!("Pipeline input '{}'", input.name))?;
            let artifacts = match &input.uri {
                Some(uri) => {
                    let artifact = Artifact::placeholder(ty.clone());
                    // Properties seal with the uri, so splits go first.
                    if !input.splits.is_empty() {
                        artifact
                            .set_split_names(&input.splits)
                            .with_context(|| format!("Pipeline input '{}'", input.name))?;
                    }
                    artifact.set_uri(uri.clone())?;
                    vec![Arc::new(artifact)]
                }
                None => Vec::new(),
            };
            let channel = Channel::with_artifacts(ty, artifacts)?;
            if channels.insert(input.name.clone(), channel).is_some() {
                bail!("Pipeline input '{}' is declared more than once", input.name);
            }
        }
        Ok(channels)
    }

    fn resolve(
        &self,
        reference: &str,
        inputs: &BTreeMap<String, ChannelRef>,
        allocated: &[BTreeMap<String, ChannelRef>],
    ) -> Result<ChannelRef> {
        match ChannelReference::parse(reference)? {
            ChannelReference::Input(name) => inputs
                .get(name)
                .cloned()
                .with_context(|| format!("Unknown pipeline input '{name}'")),
            ChannelReference::Output { component, output } => {
                let idx = self
                    .components
                    .iter()
                    .position(|entry| entry.name == component)
                    .with_context(|| format!("Unknown component '{component}'"))?;
                allocated[idx]
                    .get(output)
                    .cloned()
                    .with_context(|| format!("Component '{component}' has no output '{output}'"))
            }
        }
    }
}
