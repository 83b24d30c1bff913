use stagewire::components;
use stagewire::recipe::{ComponentEntry, InputSpec, Recipe};
use stagewire::registry::ComponentRegistry;
use stagewire::types::ParameterMap;
use stagewire::validation::validate_recipe;

fn build_registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    components::register_defaults(&mut registry).unwrap();
    registry
}

fn base_recipe() -> Recipe {
    Recipe {
        version: 1,
        name: "checks".to_string(),
        config: Default::default(),
        inputs: vec![InputSpec {
            name: "raw".to_string(),
            type_name: "Dataset".to_string(),
            uri: Some("/data/raw.txt".to_string()),
            splits: Vec::new(),
        }],
        components: Vec::new(),
    }
}

fn entry(name: &str, kind: &str, inputs: &[(&str, &str)], params: &[(&str, &str)]) -> ComponentEntry {
    let mut map = ParameterMap::new();
    for (key, value) in params {
        map.insert((*key).to_string(), (*value).into());
    }
    ComponentEntry {
        name: name.to_string(),
        kind: kind.to_string(),
        inputs: inputs
            .iter()
            .map(|(field, reference)| (field.to_string(), reference.to_string()))
            .collect(),
        params: map,
    }
}

#[test]
fn valid_recipe_passes() {
    let mut recipe = base_recipe();
    recipe
        .components
        .push(entry("digest", "checksum", &[("data", "raw")], &[]));

    let report = validate_recipe(&recipe, &build_registry());
    assert!(report.is_ok(), "unexpected errors: {:?}", report.errors);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
}

#[test]
fn validation_collects_every_static_problem() {
    let mut recipe = base_recipe();
    recipe.version = 2;
    recipe.components.push(entry("train", "trainer", &[], &[]));
    recipe
        .components
        .push(entry("digest", "checksum", &[("data", "missing")], &[]));
    recipe
        .components
        .push(entry("notify", "notify", &[("stats", "digest.stats")], &[]));
    recipe
        .components
        .push(entry("late", "checksum", &[("data", "ghost.data")], &[]));

    let report = validate_recipe(&recipe, &build_registry());
    assert!(!report.is_ok());
    let all = report.errors.join("\n");
    assert!(all.contains("Unsupported recipe version: 2"), "{all}");
    assert!(all.contains("Unknown component kind 'trainer'"), "{all}");
    assert!(all.contains("unknown pipeline input 'missing'"), "{all}");
    assert!(all.contains("declares no such output"), "{all}");
    assert!(all.contains("unknown component 'ghost'"), "{all}");
}

#[test]
fn contract_errors_come_from_the_full_build() {
    let mut recipe = base_recipe();
    recipe.components.push(entry(
        "notify",
        "notify",
        &[("stats", "raw")],
        &[("recipient", "ops")],
    ));

    let report = validate_recipe(&recipe, &build_registry());
    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    let error = &report.errors[0];
    assert!(error.contains("Failed to construct component 'notify'"), "{error}");
    assert!(error.contains("type mismatch at 'notify.stats'"), "{error}");
}

#[test]
fn missing_uri_and_unread_inputs_are_warnings() {
    let mut recipe = base_recipe();
    recipe.inputs.push(InputSpec {
        name: "pending".to_string(),
        type_name: "Dataset".to_string(),
        uri: None,
        splits: Vec::new(),
    });
    recipe
        .components
        .push(entry("digest", "checksum", &[("data", "pending")], &[]));

    let report = validate_recipe(&recipe, &build_registry());
    assert!(report.is_ok(), "{:?}", report.errors);
    assert_eq!(report.warnings.len(), 2, "{:?}", report.warnings);
    assert!(report.warnings.iter().any(|w| w.contains("'pending' has no uri")));
    assert!(
        report
            .warnings
            .iter()
            .any(|w| w.contains("'raw' is not read by any component"))
    );
}

#[test]
fn unknown_input_types_and_empty_pipelines_are_errors() {
    let mut recipe = base_recipe();
    recipe.inputs[0].type_name = "Schema".to_string();

    let report = validate_recipe(&recipe, &build_registry());
    let all = report.errors.join("\n");
    assert!(all.contains("unknown artifact type 'Schema'"), "{all}");
    assert!(all.contains("at least one component"), "{all}");
}
