use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Succeeded,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Succeeded => "succeeded",
            Outcome::Failed => "failed",
        }
    }
}

/// Metrics of the latest run, keyed by component name.
#[derive(Debug, Default, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub run_id: Option<String>,
    pub components: BTreeMap<String, ComponentMetrics>,
    pub total_duration_ms: f64,
}

#[derive(Debug, Default, Serialize, Clone)]
pub struct ComponentMetrics {
    pub kind: String,
    pub succeeded: u64,
    pub failed: u64,
    pub last_outcome: Option<Outcome>,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

impl ComponentMetrics {
    pub fn runs(&self) -> u64 {
        self.succeeded + self.failed
    }

    fn record(&mut self, outcome: Outcome, duration_ms: f64) {
        match outcome {
            Outcome::Succeeded => self.succeeded += 1,
            Outcome::Failed => self.failed += 1,
        }
        self.last_outcome = Some(outcome);
        self.total_duration_ms += duration_ms;
        self.max_duration_ms = self.max_duration_ms.max(duration_ms);
    }
}

impl MetricsSnapshot {
    /// Executions with `outcome` across all components.
    pub fn count(&self, outcome: Outcome) -> u64 {
        self.components
            .values()
            .map(|metrics| match outcome {
                Outcome::Succeeded => metrics.succeeded,
                Outcome::Failed => metrics.failed,
            })
            .sum()
    }
}

/// Shared sink for component timings. Cloning yields a handle onto the same
/// snapshot.
#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards the previous run's figures.
    pub fn begin_run(&self, run_id: &str) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = MetricsSnapshot {
            run_id: Some(run_id.to_string()),
            ..MetricsSnapshot::default()
        };
    }

    pub fn start_component(&self, component: &str, kind: &str) -> ComponentTimer {
        ComponentTimer {
            component: component.to_string(),
            kind: kind.to_string(),
            started_at: Instant::now(),
            collector: self.inner.clone(),
            finished: false,
        }
    }

    pub fn finish_run(&self, duration: Duration) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.total_duration_ms = duration.as_secs_f64() * 1_000.0;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Measures one component execution. Dropping it without calling
/// [`ComponentTimer::finish`] records a failure.
pub struct ComponentTimer {
    component: String,
    kind: String,
    started_at: Instant,
    collector: Arc<Mutex<MetricsSnapshot>>,
    finished: bool,
}

impl ComponentTimer {
    /// Records the outcome and returns the measured duration.
    pub fn finish(mut self, outcome: Outcome) -> Duration {
        self.record(outcome)
    }

    fn record(&mut self, outcome: Outcome) -> Duration {
        let duration = self.started_at.elapsed();
        self.finished = true;
        let duration_ms = duration.as_secs_f64() * 1_000.0;
        {
            let mut guard = self.collector.lock().unwrap_or_else(PoisonError::into_inner);
            let metrics = guard.components.entry(self.component.clone()).or_default();
            if metrics.kind.is_empty() {
                metrics.kind = self.kind.clone();
            }
            metrics.record(outcome, duration_ms);
        }
        debug!(
            component = self.component.as_str(),
            kind = self.kind.as_str(),
            status = outcome.as_str(),
            duration_ms,
            "Component outcome recorded"
        );
        duration
    }
}

impl Drop for ComponentTimer {
    fn drop(&mut self) {
        if !self.finished {
            self.record(Outcome::Failed);
        }
    }
}

pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        run_id = snapshot.run_id.as_deref().unwrap_or("-"),
        total_duration_ms = snapshot.total_duration_ms,
        succeeded = snapshot.count(Outcome::Succeeded),
        failed = snapshot.count(Outcome::Failed),
        "Pipeline metrics summary"
    );
    for (component, metrics) in &snapshot.components {
        let status = metrics.last_outcome.map(Outcome::as_str).unwrap_or("-");
        if metrics.failed > 0 {
            warn!(
                component = component.as_str(),
                kind = metrics.kind.as_str(),
                status,
                failed = metrics.failed,
                total_ms = metrics.total_duration_ms,
                "Component metrics"
            );
        } else {
            info!(
                component = component.as_str(),
                kind = metrics.kind.as_str(),
                status,
                runs = metrics.runs(),
                total_ms = metrics.total_duration_ms,
                max_ms = metrics.max_duration_ms,
                "Component metrics"
            );
        }
    }
}

impl MetricsSnapshot {
    /// Prometheus text exposition. Component series carry `component` and
    /// `kind` labels; run counts are further split by `status`.
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        family(
            &mut output,
            "stagewire_component_runs_total",
            "Component executions by outcome",
            "counter",
        );
        for (component, metrics) in &self.components {
            for (outcome, count) in [
                (Outcome::Succeeded, metrics.succeeded),
                (Outcome::Failed, metrics.failed),
            ] {
                output.push_str(&format!(
                    "stagewire_component_runs_total{{{},status=\"{}\"}} {count}\n",
                    component_labels(component, &metrics.kind),
                    outcome.as_str()
                ));
            }
        }

        family(
            &mut output,
            "stagewire_component_duration_seconds_total",
            "Accumulated component duration in seconds",
            "counter",
        );
        for (component, metrics) in &self.components {
            output.push_str(&format!(
                "stagewire_component_duration_seconds_total{{{}}} {:.6}\n",
                component_labels(component, &metrics.kind),
                metrics.total_duration_ms / 1_000.0
            ));
        }

        family(
            &mut output,
            "stagewire_component_duration_seconds_max",
            "Longest single component execution in seconds",
            "gauge",
        );
        for (component, metrics) in &self.components {
            output.push_str(&format!(
                "stagewire_component_duration_seconds_max{{{}}} {:.6}\n",
                component_labels(component, &metrics.kind),
                metrics.max_duration_ms / 1_000.0
            ));
        }

        family(
            &mut output,
            "stagewire_component_last_success",
            "1 when the latest execution of the component succeeded",
            "gauge",
        );
        for (component, metrics) in &self.components {
            let value = u8::from(metrics.last_outcome == Some(Outcome::Succeeded));
            output.push_str(&format!(
                "stagewire_component_last_success{{{}}} {value}\n",
                component_labels(component, &metrics.kind)
            ));
        }

        family(
            &mut output,
            "stagewire_pipeline_run_duration_seconds",
            "Wall time of the latest pipeline run",
            "gauge",
        );
        let run_label = self
            .run_id
            .as_deref()
            .map(|run_id| format!("{{run_id=\"{}\"}}", escape_label(run_id)))
            .unwrap_or_default();
        output.push_str(&format!(
            "stagewire_pipeline_run_duration_seconds{run_label} {:.6}\n",
            self.total_duration_ms / 1_000.0
        ));
        output
    }
}

fn family(output: &mut String, name: &str, help: &str, kind: &str) {
    output.push_str(&format!("# HELP {name} {help}\n# TYPE {name} {kind}\n"));
}

fn component_labels(component: &str, kind: &str) -> String {
    format!(
        "component=\"{}\",kind=\"{}\"",
        escape_label(component),
        escape_label(kind)
    )
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
