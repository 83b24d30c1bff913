use std::fs;
use std::path::Path;

use stagewire::components::{self, DATASET, LineStatistics};
use stagewire::executor::{from_fn, single_output};
use stagewire::plan::{PipelinePlan, build_plan, write_plan};
use stagewire::recipe::{ChannelReference, Recipe};
use stagewire::registry::ComponentRegistry;
use stagewire::runner::LocalRunner;
use stagewire::spec::ComponentSpec;
use stagewire::types::ScalarValue;
use tempfile::tempdir;

fn build_registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    components::register_defaults(&mut registry).unwrap();
    registry
}

fn report_recipe(root: &Path, source: &Path) -> String {
    format!(
        r#"
version: 1
name: text-report
config:
  pipeline_root: {root}
components:
  - name: import
    kind: file_import
    params:
      source: {source}
  - name: stats
    kind: line_stats
    inputs:
      data: import.data
    params:
      max_lines: 2
      sample_rate: 0.5
  - name: digest
    kind: checksum
    inputs:
      data: import.data
  - name: notify
    kind: notify
    inputs:
      stats: stats.stats
    params:
      recipient: ops@example.com
      dry_run: true
"#,
        root = root.display(),
        source = source.display()
    )
}

#[test]
fn recipe_builds_and_runs_builtin_components() {
    let temp = tempdir().unwrap();
    let source = temp.path().join("input.txt");
    fs::write(&source, "alpha beta\ngamma\ndelta epsilon zeta\n").unwrap();
    let root = temp.path().join("root");

    let recipe = Recipe::from_yaml(&report_recipe(&root, &source)).unwrap();
    let registry = build_registry();
    let pipeline = recipe.build(&registry).unwrap();
    assert_eq!(
        pipeline.execution_order_names(),
        vec!["import", "stats", "digest", "notify"]
    );

    let runner = LocalRunner::for_pipeline(&pipeline);
    let report = runner.run(&pipeline, "run-1").unwrap();
    assert_eq!(report.components.len(), 4);

    let imported = root.join("import/data/run-1/input.txt");
    assert_eq!(
        fs::read_to_string(&imported).unwrap(),
        "alpha beta\ngamma\ndelta epsilon zeta\n"
    );
    let data = &report.component("import").unwrap().outputs["data"][0];
    assert_eq!(
        data.properties.get("size_bytes"),
        Some(&ScalarValue::Integer(36))
    );
    assert!(pipeline.component("import").unwrap().output("data").unwrap().is_empty());

    let stats_path = root.join("stats/stats/run-1/stats.json");
    let stats: LineStatistics =
        serde_json::from_str(&fs::read_to_string(&stats_path).unwrap()).unwrap();
    assert_eq!(stats.lines, 3);
    assert_eq!(stats.considered_lines, 2);
    assert_eq!(stats.words, 3);
    assert_eq!(stats.sampled_lines, 1);

    let digest = &report.component("digest").unwrap().outputs["digest"][0];
    let sha = &digest.properties["sha256"];
    assert_eq!(sha.as_str().map(str::len), Some(64));
    assert_eq!(digest.type_name, "Digest");

    // The pipeline can be run again; the new run sees only its own outputs.
    let rerun = runner.run(&pipeline, "run-2").unwrap();
    assert_eq!(
        rerun.component("stats").unwrap().output_uris("stats"),
        vec![root.join("stats/stats/run-2/stats.json").to_string_lossy().to_string()]
    );

    let receipt = fs::read_to_string(root.join("notify/receipt/run-1/receipt.txt")).unwrap();
    assert!(receipt.contains("To ops@example.com"));
    assert!(receipt.contains("status: dry-run"));
}

#[test]
fn invalid_parameter_types_fail_at_build_time() {
    let temp = tempdir().unwrap();
    let yaml = report_recipe(temp.path(), &temp.path().join("missing.txt"))
        .replace("max_lines: 2", "max_lines: 2.5");
    let recipe = Recipe::from_yaml(&yaml).unwrap();

    let err = recipe.build(&build_registry()).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Failed to construct component 'stats'"), "{message}");
    assert!(message.contains("stats.max_lines"), "{message}");
}

#[test]
fn runtime_parameter_checks_surface_through_the_runner() {
    let temp = tempdir().unwrap();
    let yaml = report_recipe(&temp.path().join("root"), &temp.path().join("missing.txt"));
    let pipeline = Recipe::from_yaml(&yaml)
        .unwrap()
        .build(&build_registry())
        .unwrap();

    let err = LocalRunner::for_pipeline(&pipeline)
        .run(&pipeline, "run-1")
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Component 'import' failed"), "{message}");
    assert!(message.contains("invalid parameter 'source'"), "{message}");
}

#[test]
fn pipeline_inputs_carry_uri_and_splits() {
    let yaml = r#"
version: 1
name: from-storage
inputs:
  - name: raw
    type: Dataset
    uri: /data/raw
    splits: [train, eval]
components:
  - name: digest
    kind: checksum
    inputs:
      data: raw
"#;
    let pipeline = Recipe::from_yaml(yaml)
        .unwrap()
        .build(&build_registry())
        .unwrap();

    let raw = &pipeline.inputs()[0];
    assert_eq!(raw.type_name().name(), DATASET);
    assert_eq!(raw.get_split_uri("eval").unwrap(), "/data/raw/eval");
    assert!(pipeline.unused_inputs().is_empty());
}

#[test]
fn cyclic_references_are_caught_by_pipeline_assembly() {
    let mut registry = build_registry();
    let dataset = registry.types().lookup(DATASET).unwrap();
    registry.register(
        ComponentSpec::builder("relay")
            .input("upstream", &dataset)
            .output("data", &dataset)
            .build()
            .unwrap(),
        from_fn(|_, outputs, _| {
            single_output(outputs, "data")?.set_uri("mem://relay")?;
            Ok(())
        }),
    );

    let yaml = r#"
version: 1
name: loop
components:
  - name: first
    kind: relay
    inputs:
      upstream: second.data
  - name: second
    kind: relay
    inputs:
      upstream: first.data
"#;
    let err = Recipe::from_yaml(yaml)
        .unwrap()
        .build(&registry)
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Failed to assemble pipeline 'loop'"), "{message}");
    assert!(
        message.contains("dependency cycle: first -> second -> first"),
        "{message}"
    );
}

#[test]
fn channel_references_parse_inputs_and_outputs() {
    assert_eq!(
        ChannelReference::parse("raw").unwrap(),
        ChannelReference::Input("raw")
    );
    assert_eq!(
        ChannelReference::parse(" import.data ").unwrap(),
        ChannelReference::Output {
            component: "import",
            output: "data"
        }
    );
    assert!(ChannelReference::parse("a.b.c").is_err());
    assert!(ChannelReference::parse(".data").is_err());
    assert!(ChannelReference::parse("").is_err());
}

#[test]
fn plan_lists_components_in_execution_order() {
    let temp = tempdir().unwrap();
    let source = temp.path().join("input.txt");
    let recipe = Recipe::from_yaml(&report_recipe(&temp.path().join("root"), &source)).unwrap();
    let pipeline = recipe.build(&build_registry()).unwrap();

    let plan = build_plan(&pipeline);
    let names: Vec<_> = plan.components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["import", "stats", "digest", "notify"]);
    assert_eq!(
        plan.layers,
        vec![
            vec!["import".to_string()],
            vec!["stats".to_string(), "digest".to_string()],
            vec!["notify".to_string()],
        ]
    );
    let stats = &plan.components[1];
    assert_eq!(stats.upstream, vec!["import"]);
    assert_eq!(
        stats.inputs["data"].producer.as_deref(),
        Some("import.data")
    );
    assert_eq!(stats.parameters["sample_rate"], ScalarValue::Float(0.5));
    assert_eq!(stats.params_hash.len(), 64);

    let path = temp.path().join("plans/text-report.yaml");
    write_plan(&plan, &path).unwrap();
    let reloaded: PipelinePlan = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(reloaded.pipeline, "text-report");
    assert_eq!(reloaded.components.len(), 4);
    assert_eq!(
        reloaded.components[0].spec_fingerprint,
        plan.components[0].spec_fingerprint
    );
}

#[test]
fn recipe_load_reports_the_file() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("broken.yaml");
    fs::write(&path, "version: [not a number").unwrap();
    let err = Recipe::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse recipe YAML"));

    let missing = Recipe::load(&temp.path().join("absent.yaml")).unwrap_err();
    assert!(format!("{missing:#}").contains("Failed to read recipe file"));
}

#[test]
fn registry_error_lists_known_kinds() {
    let registry = build_registry();
    let err = registry.get("trainer").err().map(|e| e.to_string()).unwrap();
    assert!(err.contains("checksum, file_import, line_stats, notify"), "{err}");
    assert_eq!(registry.get("notify").unwrap().spec.kind(), "notify");
}
