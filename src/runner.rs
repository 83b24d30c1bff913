use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use crate::artifact::ArtifactRecord;
use crate::channel::RunBindings;
use crate::component::Component;
use crate::config::ExecutionMode;
use crate::observability::{MetricsCollector, Outcome};
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub pipeline: String,
    pub run_id: String,
    pub components: Vec<ComponentRun>,
}

impl RunReport {
    pub fn component(&self, name: &str) -> Option<&ComponentRun> {
        self.components.iter().find(|run| run.name == name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentRun {
    pub name: String,
    pub kind: String,
    pub outputs: BTreeMap<String, Vec<ArtifactRecord>>,
    pub duration_ms: f64,
}

impl ComponentRun {
    /// Uris published on `output`, in artifact order.
    pub fn output_uris(&self, output: &str) -> Vec<String> {
        self.outputs
            .get(output)
            .map(|records| records.iter().filter_map(|r| r.uri.clone()).collect())
            .unwrap_or_default()
    }
}

pub fn generate_run_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%3fZ"))
}

/// Sequential in-process scheduler. Walks the execution order, resolves
/// each component's inputs, invokes its executor and publishes the outputs
/// before moving on. The first failure ends the run; nothing is retried.
///
/// Runs never write to the pipeline's channels. Each run keeps its own
/// [`RunBindings`], so one `Pipeline` may be run concurrently.
pub struct LocalRunner {
    staging_root: PathBuf,
    metrics: MetricsCollector,
}

impl LocalRunner {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn for_pipeline(pipeline: &Pipeline) -> Self {
        Self::new(pipeline.config().pipeline_root.clone())
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    #[instrument(skip(self, pipeline), fields(pipeline = pipeline.name()))]
    pub fn run(&self, pipeline: &Pipeline, run_id: &str) -> Result<RunReport> {
        if pipeline.config().execution_mode == ExecutionMode::External {
            bail!(
                "Pipeline '{}' is configured for external execution; export a plan instead",
                pipeline.name()
            );
        }

        self.metrics.begin_run(run_id);
        let total_start = Instant::now();
        let staging_root = self.staging_root.to_string_lossy();
        let mut bindings = RunBindings::seeded(pipeline.inputs());
        let mut runs = Vec::with_capacity(pipeline.components().len());

        for component in pipeline.execution_order() {
            let span = tracing::span!(
                tracing::Level::DEBUG,
                "component",
                component = component.name(),
                kind = component.kind()
            );
            let _span_guard = span.enter();
            let timer = self.metrics.start_component(component.name(), component.kind());

            let outcome = execute_component(component, run_id, &staging_root, &mut bindings);
            let outputs = match outcome {
                Ok(outputs) => outputs,
                Err(err) => {
                    timer.finish(Outcome::Failed);
                    return Err(err);
                }
            };
            let duration = timer.finish(Outcome::Succeeded);

            info!(
                component = component.name(),
                outputs = outputs.len(),
                "Component completed"
            );
            runs.push(ComponentRun {
                name: component.name().to_string(),
                kind: component.kind().to_string(),
                outputs,
                duration_ms: duration.as_secs_f64() * 1_000.0,
            });
        }

        self.metrics.finish_run(total_start.elapsed());

        Ok(RunReport {
            pipeline: pipeline.name().to_string(),
            run_id: run_id.to_string(),
            components: runs,
        })
    }
}

fn execute_component(
    component: &Component,
    run_id: &str,
    staging_root: &str,
    bindings: &mut RunBindings,
) -> Result<BTreeMap<String, Vec<ArtifactRecord>>> {
    let request = component
        .prepare(run_id, staging_root, bindings)
        .with_context(|| format!("Failed to resolve inputs for '{}'", component.name()))?;
    request
        .invoke(component.executor().as_ref())
        .with_context(|| format!("Component '{}' failed", component.name()))?;
    request
        .publish(bindings)
        .with_context(|| format!("Failed to publish outputs of '{}'", component.name()))?;
    Ok(request.output_records().into_iter().collect())
}
