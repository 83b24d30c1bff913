use std::fs;

use assert_cmd::Command;
use tempfile::tempdir;

fn stagewire() -> Command {
    let mut cmd = Command::cargo_bin("stagewire").expect("binary present");
    cmd.env_remove("STAGEWIRE_PIPELINE_ROOT");
    cmd
}

#[test]
fn list_components_shows_builtin_contracts() {
    let output = stagewire().arg("list-components").assert().success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    assert!(stdout.contains("file_import"), "{stdout}");
    assert!(stdout.contains("line_stats (inputs: [data: Dataset]"), "{stdout}");
    assert!(stdout.contains("notify"), "{stdout}");
}

#[test]
fn run_writes_outputs_report_and_metrics() {
    let temp = tempdir().unwrap();
    let source = temp.path().join("notes.txt");
    fs::write(&source, "one two\nthree\n").unwrap();
    let recipe = temp.path().join("recipe.yaml");
    fs::write(
        &recipe,
        format!(
            "version: 1\nname: notes\nconfig:\n  pipeline_root: {}\ncomponents:\n  - name: import\n    kind: file_import\n    params:\n      source: {}\n  - name: digest\n    kind: checksum\n    inputs:\n      data: import.data\n",
            temp.path().join("root").display(),
            source.display()
        ),
    )
    .unwrap();

    let report = temp.path().join("out/report.json");
    let prometheus = temp.path().join("out/metrics.prom");
    stagewire()
        .args(["run", recipe.to_str().unwrap(), "--run-id", "cli-run"])
        .arg("--report")
        .arg(&report)
        .arg("--metrics-prometheus")
        .arg(&prometheus)
        .assert()
        .success();

    assert!(
        temp.path()
            .join("root/digest/digest/cli-run/digest.sha256")
            .is_file()
    );
    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(report["run_id"], "cli-run");
    assert_eq!(report["components"].as_array().map(Vec::len), Some(2));
    let metrics = fs::read_to_string(&prometheus).unwrap();
    assert!(
        metrics.contains(
            "stagewire_component_runs_total{component=\"digest\",kind=\"checksum\",status=\"succeeded\"} 1"
        ),
        "{metrics}"
    );
    assert!(metrics.contains("stagewire_pipeline_run_duration_seconds{run_id=\"cli-run\"}"));
    assert_eq!(report["components"][1]["outputs"]["digest"][0]["type_name"], "Digest");

    let plan = temp.path().join("plan.yaml");
    stagewire()
        .args(["plan", recipe.to_str().unwrap(), plan.to_str().unwrap()])
        .assert()
        .success();
    assert!(fs::read_to_string(&plan).unwrap().contains("pipeline: notes"));
}

#[test]
fn validate_and_lint_fail_on_bad_recipes() {
    let temp = tempdir().unwrap();
    let good = temp.path().join("good.yaml");
    fs::write(
        &good,
        "version: 1\nname: ok\ninputs:\n  - name: raw\n    type: Dataset\n    uri: /data/raw\ncomponents:\n  - name: digest\n    kind: checksum\n    inputs:\n      data: raw\n",
    )
    .unwrap();
    let bad = temp.path().join("bad.yaml");
    fs::write(
        &bad,
        "version: 1\nname: broken\ncomponents:\n  - name: digest\n    kind: checksum\n    inputs:\n      data: nowhere\n",
    )
    .unwrap();

    stagewire()
        .args(["validate", good.to_str().unwrap()])
        .assert()
        .success();
    stagewire()
        .args(["validate", bad.to_str().unwrap()])
        .assert()
        .failure();
    stagewire()
        .args(["recipe", "lint", good.to_str().unwrap(), bad.to_str().unwrap()])
        .assert()
        .failure();
    stagewire()
        .args(["recipe", "lint", temp.path().join("g*.yaml").to_str().unwrap()])
        .assert()
        .success();
    stagewire()
        .args(["recipe", "lint", temp.path().join("none-*.yaml").to_str().unwrap()])
        .assert()
        .failure();
}
