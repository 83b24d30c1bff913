use std::sync::Arc;

use tracing::debug;

use crate::artifact::{Artifact, ArtifactMap, ArtifactRecord};
use crate::channel::{ChannelRef, RunBindings};
use crate::error::{ContractError, ExecutionError, FieldPath, SpecViolation};
use crate::types::ParameterMap;

/// Run-time half of a component kind.
///
/// `inputs` hold populated artifacts; `outputs` hold placeholders whose uri
/// the executor must set before returning `Ok`. Re-invocation with the same
/// request should leave storage in the same state.
pub trait Executor: Send + Sync {
    fn execute(
        &self,
        inputs: &ArtifactMap,
        outputs: &ArtifactMap,
        parameters: &ParameterMap,
    ) -> Result<(), ExecutionError>;
}

impl<F> Executor for F
where
    F: Fn(&ArtifactMap, &ArtifactMap, &ParameterMap) -> Result<(), ExecutionError> + Send + Sync,
{
    fn execute(
        &self,
        inputs: &ArtifactMap,
        outputs: &ArtifactMap,
        parameters: &ParameterMap,
    ) -> Result<(), ExecutionError> {
        self(inputs, outputs, parameters)
    }
}

/// Wraps a closure as a shareable executor.
pub fn from_fn<F>(f: F) -> Arc<dyn Executor>
where
    F: Fn(&ArtifactMap, &ArtifactMap, &ParameterMap) -> Result<(), ExecutionError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// A fully resolved invocation of one component: concrete input artifacts,
/// fresh output placeholders and validated parameters.
#[derive(Debug)]
pub struct ExecutionRequest {
    pub(crate) component: String,
    pub(crate) run_id: String,
    pub(crate) inputs: ArtifactMap,
    pub(crate) outputs: ArtifactMap,
    pub(crate) parameters: ParameterMap,
    pub(crate) output_channels: Vec<(String, ChannelRef)>,
}

impl ExecutionRequest {
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn inputs(&self) -> &ArtifactMap {
        &self.inputs
    }

    pub fn outputs(&self) -> &ArtifactMap {
        &self.outputs
    }

    pub fn parameters(&self) -> &ParameterMap {
        &self.parameters
    }

    /// Calls the executor and checks that every output placeholder came back
    /// with a uri.
    pub fn invoke(&self, executor: &dyn Executor) -> Result<(), ExecutionError> {
        debug!(
            component = self.component.as_str(),
            run_id = self.run_id.as_str(),
            "Invoking executor"
        );
        executor.execute(&self.inputs, &self.outputs, &self.parameters)?;
        for (name, artifacts) in &self.outputs {
            if artifacts.iter().any(|artifact| !artifact.is_populated()) {
                return Err(ExecutionError::IncompleteOutput {
                    component: self.component.clone(),
                    output: name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Makes the populated outputs visible to downstream components of the
    /// same run. Call only after a successful `invoke`; the shared output
    /// channels themselves are left untouched.
    pub fn publish(&self, bindings: &mut RunBindings) -> Result<(), ExecutionError> {
        for (name, channel) in &self.output_channels {
            let artifacts = self.outputs.get(name).cloned().unwrap_or_default();
            bindings.bind(channel, artifacts)?;
        }
        Ok(())
    }

    pub fn output_uris(&self) -> Vec<(String, Vec<String>)> {
        self.outputs
            .iter()
            .map(|(name, artifacts)| {
                (
                    name.clone(),
                    artifacts.iter().filter_map(|a| a.uri()).collect(),
                )
            })
            .collect()
    }

    pub fn output_records(&self) -> Vec<(String, Vec<ArtifactRecord>)> {
        self.outputs
            .iter()
            .map(|(name, artifacts)| {
                (
                    name.clone(),
                    artifacts.iter().map(|a| a.to_record()).collect(),
                )
            })
            .collect()
    }
}

/// The single output placeholder an executor writes for `name`.
pub fn single_output<'a>(
    outputs: &'a ArtifactMap,
    name: &str,
) -> Result<&'a Arc<Artifact>, ExecutionError> {
    single(outputs, name)
}

/// The single input artifact bound to `name`.
pub fn single_input<'a>(
    inputs: &'a ArtifactMap,
    name: &str,
) -> Result<&'a Arc<Artifact>, ExecutionError> {
    single(inputs, name)
}

fn single<'a>(map: &'a ArtifactMap, name: &str) -> Result<&'a Arc<Artifact>, ExecutionError> {
    let artifacts = map
        .get(name)
        .ok_or_else(|| ContractError::SpecValidation {
            path: FieldPath::new(None, name),
            violation: SpecViolation::Missing {
                section: "artifact",
            },
        })?;
    match artifacts.as_slice() {
        [only] => Ok(only),
        other => Err(ContractError::Cardinality {
            type_name: other
                .first()
                .map(|a| a.type_name().name().to_string())
                .unwrap_or_default(),
            count: other.len(),
        }
        .into()),
    }
}
