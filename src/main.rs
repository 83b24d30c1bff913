use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use glob::glob;
use serde_json::to_writer_pretty;
use stagewire::components;
use stagewire::observability::log_snapshot;
use stagewire::plan::{build_plan, write_plan};
use stagewire::recipe::Recipe;
use stagewire::registry::ComponentRegistry;
use stagewire::runner::{LocalRunner, generate_run_id};
use stagewire::validation::validate_recipe;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_tracing()?;

    match cli.command {
        Commands::Run {
            recipe,
            run_id,
            print_metrics,
            metrics_json,
            metrics_prometheus,
            report,
        } => run_recipe(
            recipe,
            run_id,
            print_metrics,
            metrics_json,
            metrics_prometheus,
            report,
        ),
        Commands::ListComponents => list_components(),
        Commands::Validate { recipe } => validate_recipe_cmd(recipe),
        Commands::Plan { recipe, output } => plan_recipe(recipe, output),
        Commands::Recipe { action } => match action {
            RecipeCommands::Lint { patterns } => lint_recipes(&patterns),
        },
    }
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))
}

fn build_registry() -> Result<ComponentRegistry> {
    let mut registry = ComponentRegistry::new();
    components::register_defaults(&mut registry)?;
    Ok(registry)
}

fn run_recipe(
    recipe_path: PathBuf,
    run_id: Option<String>,
    print_metrics: bool,
    metrics_json: Option<PathBuf>,
    metrics_prometheus: Option<PathBuf>,
    report_path: Option<PathBuf>,
) -> Result<()> {
    let recipe = Recipe::load(&recipe_path)?;
    let registry = build_registry()?;
    let pipeline = recipe.build(&registry)?;

    let runner = LocalRunner::for_pipeline(&pipeline);
    let run_id = run_id.unwrap_or_else(generate_run_id);
    let report = runner.run(&pipeline, &run_id)?;

    for component in &report.components {
        for output in component.outputs.keys() {
            info!(
                component = component.name.as_str(),
                output = output.as_str(),
                uris = ?component.output_uris(output),
                "Output published"
            );
        }
    }

    if let Some(path) = report_path {
        ensure_parent(&path)?;
        let file = File::create(&path)
            .with_context(|| format!("Failed to create run report: {}", path.display()))?;
        to_writer_pretty(file, &report)
            .with_context(|| format!("Failed to write run report: {}", path.display()))?;
        info!(report = %path.display(), "Run report written");
    }

    let snapshot = runner.metrics().snapshot();
    if print_metrics {
        log_snapshot(&snapshot);
    }
    if let Some(path) = metrics_json {
        ensure_parent(&path)?;
        let file = File::create(&path)
            .with_context(|| format!("Failed to create metrics file: {}", path.display()))?;
        to_writer_pretty(file, &snapshot)
            .with_context(|| format!("Failed to write metrics JSON: {}", path.display()))?;
        info!(metrics = %path.display(), "Metrics JSON written");
    }
    if let Some(path) = metrics_prometheus {
        ensure_parent(&path)?;
        std::fs::write(&path, snapshot.to_prometheus())
            .with_context(|| format!("Failed to write Prometheus metrics: {}", path.display()))?;
        info!(metrics = %path.display(), "Prometheus metrics written");
    }

    info!(
        pipeline = pipeline.name(),
        run_id = run_id.as_str(),
        "Pipeline run completed"
    );
    Ok(())
}

fn list_components() -> Result<()> {
    let registry = build_registry()?;
    println!("Available components:");
    for kind in registry.known_kinds() {
        let entry = registry.get(&kind)?;
        let describe = |fields: &[stagewire::spec::FieldDescriptor]| {
            fields
                .iter()
                .map(|field| format!("{}: {}", field.name, field.ty))
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "- {kind} (inputs: [{}], outputs: [{}], parameters: [{}])",
            describe(entry.spec.inputs()),
            describe(entry.spec.outputs()),
            describe(entry.spec.parameters())
        );
    }
    Ok(())
}

fn validate_recipe_cmd(recipe_path: PathBuf) -> Result<()> {
    let recipe = Recipe::load(&recipe_path)?;
    let registry = build_registry()?;
    let report = validate_recipe(&recipe, &registry);

    for warning in &report.warnings {
        warn!(file = %recipe_path.display(), "{warning}");
    }

    if report.is_ok() {
        info!(file = %recipe_path.display(), "Recipe validation passed");
        Ok(())
    } else {
        for error_msg in &report.errors {
            error!(file = %recipe_path.display(), "{error_msg}");
        }
        Err(anyhow!(
            "Recipe validation failed with {} error(s)",
            report.errors.len()
        ))
    }
}

fn plan_recipe(recipe_path: PathBuf, output_path: PathBuf) -> Result<()> {
    let recipe = Recipe::load(&recipe_path)?;
    let registry = build_registry()?;
    let pipeline = recipe.build(&registry)?;
    let plan = build_plan(&pipeline);
    write_plan(&plan, &output_path)?;
    info!(
        plan = %output_path.display(),
        components = plan.components.len(),
        "Execution plan written"
    );
    Ok(())
}

fn lint_recipes(patterns: &[String]) -> Result<()> {
    let recipes = expand_recipe_patterns(patterns)?;
    if recipes.is_empty() {
        bail!("No recipe files supplied for linting");
    }

    let registry = build_registry()?;
    let mut failures = 0usize;

    for recipe_path in &recipes {
        match Recipe::load(recipe_path) {
            Ok(recipe) => {
                let report = validate_recipe(&recipe, &registry);
                for warning in &report.warnings {
                    warn!(file = %recipe_path.display(), "{warning}");
                }
                if report.is_ok() {
                    info!(file = %recipe_path.display(), "Lint passed");
                } else {
                    failures += 1;
                    for error_msg in &report.errors {
                        error!(file = %recipe_path.display(), "{error_msg}");
                    }
                }
            }
            Err(err) => {
                failures += 1;
                error!(file = %recipe_path.display(), "Failed to load recipe: {err:#}");
            }
        }
    }

    if failures > 0 {
        bail!("Lint failed for {failures} recipe(s)");
    }

    info!("All recipe lint checks passed");
    Ok(())
}

fn expand_recipe_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut resolved = Vec::new();
    for pattern in patterns {
        let matches =
            glob(pattern).with_context(|| format!("Invalid glob pattern: {pattern}"))?;
        let mut found = false;
        for entry in matches {
            let path = entry?;
            if path.is_file() {
                resolved.push(path);
                found = true;
            }
        }
        if !found {
            bail!("No recipes matched pattern: {pattern}");
        }
    }
    Ok(resolved)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "stagewire",
    version,
    about = "Typed component contracts and pipeline DAG assembly"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a recipe and run it with the local runner.
    Run {
        recipe: PathBuf,
        #[arg(long = "run-id")]
        run_id: Option<String>,
        #[arg(long)]
        print_metrics: bool,
        #[arg(long = "metrics-json")]
        metrics_json: Option<PathBuf>,
        #[arg(long = "metrics-prometheus")]
        metrics_prometheus: Option<PathBuf>,
        #[arg(long)]
        report: Option<PathBuf>,
    },
    ListComponents,
    Validate {
        recipe: PathBuf,
    },
    /// Write the validated execution plan as YAML.
    Plan {
        recipe: PathBuf,
        output: PathBuf,
    },
    Recipe {
        #[command(subcommand)]
        action: RecipeCommands,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Validate every recipe matching the given paths or glob patterns.
    Lint {
        #[arg(required = true)]
        patterns: Vec<String>,
    },
}
