use std::collections::BTreeSet;

use serde::Serialize;

use crate::recipe::{ChannelReference, RECIPE_VERSION, Recipe};
use crate::registry::ComponentRegistry;

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Collects every problem in a recipe rather than stopping at the first.
/// The full build only runs once the static checks pass, since its errors
/// would otherwise repeat them.
pub fn validate_recipe(recipe: &Recipe, registry: &ComponentRegistry) -> ValidationReport {
    let mut report = ValidationReport::default();

    if recipe.version != RECIPE_VERSION {
        report
            .errors
            .push(format!("Unsupported recipe version: {}", recipe.version));
    }

    if recipe.name.trim().is_empty() {
        report.errors.push("Pipeline name cannot be empty".into());
    }

    if recipe.components.is_empty() {
        report
            .errors
            .push("Pipeline must contain at least one component".into());
    }

    for input in &recipe.inputs {
        if !registry.types().contains(&input.type_name) {
            report.errors.push(format!(
                "Pipeline input '{}' uses unknown artifact type '{}'",
                input.name, input.type_name
            ));
        }
        if input.uri.is_none() {
            report.warnings.push(format!(
                "Pipeline input '{}' has no uri; components reading it cannot run locally",
                input.name
            ));
        }
    }

    for (idx, entry) in recipe.components.iter().enumerate() {
        report.merge(validate_entry(idx, recipe, registry));
        if entry.name.trim().is_empty() {
            report
                .errors
                .push(format!("Component {} has an empty name", idx + 1));
        }
    }

    if !report.is_ok() {
        return report;
    }

    match recipe.build(registry) {
        Ok(_) => {
            for input in &recipe.inputs {
                let read = recipe.components.iter().any(|entry| {
                    entry
                        .inputs
                        .values()
                        .any(|reference| reference.trim() == input.name)
                });
                if !read {
                    report.warnings.push(format!(
                        "Pipeline input '{}' is not read by any component",
                        input.name
                    ));
                }
            }
        }
        Err(err) => report.errors.push(format!("{err:#}")),
    }

    report
}

fn validate_entry(idx: usize, recipe: &Recipe, registry: &ComponentRegistry) -> ValidationReport {
    let mut report = ValidationReport::default();
    let entry = &recipe.components[idx];
    let label = format!("Component {} ('{}')", idx + 1, entry.name);

    if let Err(err) = registry.get(&entry.kind) {
        report.errors.push(format!("{label}: {err}"));
    }

    let input_names: BTreeSet<&str> = recipe.inputs.iter().map(|i| i.name.as_str()).collect();
    for (field, reference) in &entry.inputs {
        match ChannelReference::parse(reference) {
            Ok(ChannelReference::Input(name)) => {
                if !input_names.contains(name) {
                    report.errors.push(format!(
                        "{label}: input '{field}' references unknown pipeline input '{name}'"
                    ));
                }
            }
            Ok(ChannelReference::Output { component, output }) => {
                let Some(upstream) = recipe.components.iter().find(|e| e.name == component) else {
                    report.errors.push(format!(
                        "{label}: input '{field}' references unknown component '{component}'"
                    ));
                    continue;
                };
                if let Ok(kind) = registry.get(&upstream.kind)
                    && kind.spec.output_type(output).is_none()
                {
                    report.errors.push(format!(
                        "{label}: input '{field}' references '{component}.{output}', but kind '{}' declares no such output",
                        upstream.kind
                    ));
                }
            }
            Err(err) => report.errors.push(format!("{label}: input '{field}': {err}")),
        }
    }

    report
}
