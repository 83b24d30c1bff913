use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::artifact::{Artifact, ArtifactMap};
use crate::channel::{Channel, ChannelRef, Producer, RunBindings};
use crate::error::{ContractError, ExecutionError};
use crate::executor::{ExecutionRequest, Executor};
use crate::spec::ComponentSpec;
use crate::types::{ParameterMap, ScalarValue};

/// A spec-bound, type-checked stage instance. Immutable once built.
pub struct Component {
    name: String,
    spec: Arc<ComponentSpec>,
    executor: Arc<dyn Executor>,
    inputs: BTreeMap<String, ChannelRef>,
    outputs: BTreeMap<String, ChannelRef>,
    parameters: ParameterMap,
}

impl Component {
    pub fn builder(spec: Arc<ComponentSpec>, executor: Arc<dyn Executor>) -> ComponentBuilder {
        ComponentBuilder {
            spec,
            executor,
            name: None,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            parameters: ParameterMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        self.spec.kind()
    }

    pub fn spec(&self) -> &Arc<ComponentSpec> {
        &self.spec
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn inputs(&self) -> &BTreeMap<String, ChannelRef> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeMap<String, ChannelRef> {
        &self.outputs
    }

    pub fn output(&self, name: &str) -> Option<&ChannelRef> {
        self.outputs.get(name)
    }

    pub fn parameters(&self) -> &ParameterMap {
        &self.parameters
    }

    /// Resolves input channels against this run's bindings and allocates a
    /// fresh placeholder per output under
    /// `<staging_root>/<component>/<output>/<run_id>`.
    ///
    /// Every input must resolve to at least one artifact and every resolved
    /// artifact must carry a uri.
    pub fn prepare(
        &self,
        run_id: &str,
        staging_root: &str,
        bindings: &RunBindings,
    ) -> Result<ExecutionRequest, ExecutionError> {
        let mut inputs = ArtifactMap::new();
        for (name, channel) in &self.inputs {
            let artifacts = bindings.get(channel).unwrap_or_default();
            if artifacts.is_empty() || artifacts.iter().any(|artifact| !artifact.is_populated()) {
                return Err(ExecutionError::UnpopulatedInput {
                    component: self.name.clone(),
                    input: name.clone(),
                });
            }
            inputs.insert(name.clone(), artifacts.to_vec());
        }

        let root = staging_root.trim_end_matches('/');
        let mut outputs = ArtifactMap::new();
        let mut output_channels = Vec::with_capacity(self.outputs.len());
        for (name, channel) in &self.outputs {
            let staging = format!("{root}/{}/{name}/{run_id}", self.name);
            let placeholder = Artifact::with_staging_uri(channel.type_name().clone(), staging);
            outputs.insert(name.clone(), vec![Arc::new(placeholder)]);
            output_channels.push((name.clone(), channel.clone()));
        }

        Ok(ExecutionRequest {
            component: self.name.clone(),
            run_id: run_id.to_string(),
            inputs,
            outputs,
            parameters: self.parameters.clone(),
            output_channels,
        })
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("kind", &self.spec.kind())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

pub struct ComponentBuilder {
    spec: Arc<ComponentSpec>,
    executor: Arc<dyn Executor>,
    name: Option<String>,
    inputs: BTreeMap<String, ChannelRef>,
    outputs: BTreeMap<String, ChannelRef>,
    parameters: ParameterMap,
}

impl ComponentBuilder {
    /// Defaults to the spec's kind when unset.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn input(mut self, name: impl Into<String>, channel: &ChannelRef) -> Self {
        self.inputs.insert(name.into(), channel.clone());
        self
    }

    /// Binds an existing channel as an output instead of letting the
    /// component allocate one.
    pub fn output(mut self, name: impl Into<String>, channel: &ChannelRef) -> Self {
        self.outputs.insert(name.into(), channel.clone());
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn parameters(mut self, parameters: ParameterMap) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn build(self) -> Result<Component, ContractError> {
        let ComponentBuilder {
            spec,
            executor,
            name,
            inputs,
            mut outputs,
            parameters,
        } = self;

        let name = name.unwrap_or_else(|| spec.kind().to_string());
        if !is_valid_component_name(&name) {
            return Err(ContractError::InvalidComponentName(name));
        }

        for field in spec.outputs() {
            if outputs.contains_key(&field.name) {
                continue;
            }
            if let Some(ty) = spec.output_type(&field.name) {
                outputs.insert(field.name.clone(), Channel::new(ty.clone()));
            }
        }

        let parameters = spec.validate(Some(&name), &inputs, &outputs, &parameters)?;

        if let Some((_, taken)) = outputs.iter().find(|(_, ch)| ch.producer().is_some()) {
            return Err(ContractError::ChannelAlreadyProduced {
                channel: taken.id(),
                producer: taken
                    .producer()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            });
        }
        let mut distinct = BTreeSet::new();
        if let Some((output, shared)) = outputs.iter().find(|(_, ch)| !distinct.insert(ch.id())) {
            return Err(ContractError::ChannelAlreadyProduced {
                channel: shared.id(),
                producer: format!("{name}.{output}"),
            });
        }
        for (output, channel) in &outputs {
            channel.claim_producer(Producer {
                component: name.clone(),
                output: output.clone(),
            })?;
        }

        debug!(
            component = name.as_str(),
            kind = spec.kind(),
            inputs = inputs.len(),
            outputs = outputs.len(),
            "Component wired"
        );

        Ok(Component {
            name,
            spec,
            executor,
            inputs,
            outputs,
            parameters,
        })
    }
}

fn is_valid_component_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
