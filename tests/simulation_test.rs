//! End-to-end tests: datafile on disk -> snapshot -> batch run -> report

use product_sorter::domain::{ExperimentConfig, Variation, VisitorId, BUCKET_RANGE};
use product_sorter::infra::{Config, Metrics};
use product_sorter::services::{Allocator, FileConfigSource, Simulation, SnapshotStore};
use product_sorter::SorterError;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const OFF_TEXT: &str = "alphabetical";

fn write_config(dir: &Path, datafile: &Path) -> Config {
    let config_path = dir.join("config.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[experiment]
flag_key = "product_sort"
variable = "sort_method"
off_text = "{}"

[datafile]
path = "{}"

[simulation]
visitors = 50
seed = 1234
"#,
            OFF_TEXT,
            datafile.display()
        ),
    )
    .unwrap();
    Config::from_file(&config_path).unwrap()
}

fn write_datafile(path: &Path, weights: &[(&str, f64)]) {
    let variations: Vec<String> = weights
        .iter()
        .map(|(name, weight)| {
            format!(
                r#"{{"name": "{}", "weight": {}, "variables": {{"sort_method": "{}"}}}}"#,
                name, weight, name
            )
        })
        .collect();
    fs::write(
        path,
        format!(
            r#"{{"revision": "5", "flags": [{{"key": "product_sort", "variations": [{}]}}]}}"#,
            variations.join(",")
        ),
    )
    .unwrap();
}

fn load(config: &Config) -> Result<Arc<ExperimentConfig>, SorterError> {
    let source = FileConfigSource::new(config.datafile_path(), config.flag_key());
    let mut store = SnapshotStore::new();
    store.refresh(&source).map(|outcome| outcome.snapshot().clone())
}

#[test]
fn test_end_to_end_run_is_bit_identical() {
    let dir = tempdir().unwrap();
    let datafile = dir.path().join("datafile.json");
    write_datafile(&datafile, &[("sort_by_price", 30.0), ("sort_by_popularity", 30.0)]);
    let config = write_config(dir.path(), &datafile);

    let experiment = load(&config).unwrap();
    let sim = Simulation::new(&config, Arc::new(Metrics::new()), None);

    let first = sim.run(config.visitors(), &experiment).unwrap().render(false);
    let second = sim.run(config.visitors(), &experiment).unwrap().render(false);
    assert_eq!(first, second);

    // 50 visitor lines, blank, summaries, blank, separator
    assert!(first[0].starts_with("Visitor #0: "));
    assert!(first[49].starts_with("Visitor #49: "));
    assert_eq!(first[50], "");
    assert_eq!(first.last().unwrap(), "-------");

    let summary: Vec<&String> = first[51..first.len() - 2].iter().collect();
    assert!(!summary.is_empty() && summary.len() <= 3);
    let counted: usize = summary
        .iter()
        .map(|line| line.split(' ').next().unwrap().parse::<usize>().unwrap())
        .sum();
    assert_eq!(counted, 50);
}

#[test]
fn test_half_allocation_scenario() {
    let experiment = ExperimentConfig::new("product_sort").with_variation(
        Variation::new("sort_by_price", 50.0).with_variable("sort_method", "sort_by_price"),
    );
    let allocator = Allocator::new(&experiment).unwrap();

    let enrolled = allocator.resolve(1000);
    assert!(enrolled.enabled);
    assert_eq!(enrolled.variable("sort_method"), Some("sort_by_price"));

    let not_enrolled = allocator.resolve(9000);
    assert!(!not_enrolled.enrolled);
    assert_eq!(not_enrolled.bucket_value, 9000);
}

#[test]
fn test_zero_weight_datafile_turns_everyone_off() {
    let dir = tempdir().unwrap();
    let datafile = dir.path().join("datafile.json");
    write_datafile(&datafile, &[("sort_by_price", 0.0), ("sort_by_popularity", 0.0)]);
    let config = write_config(dir.path(), &datafile);

    let experiment = load(&config).unwrap();
    let report = Simulation::new(&config, Arc::new(Metrics::new()), None)
        .run(500, &experiment)
        .unwrap();

    assert_eq!(report.enabled_count(), 0);
    let lines = report.render(false);
    assert_eq!(lines[0], format!("Visitor #0: {}", OFF_TEXT));
    assert!(lines.contains(&format!("500 visitors (~100%) got the experience: '{}'", OFF_TEXT)));
}

#[test]
fn test_over_allocated_datafile_fails_fast() {
    let dir = tempdir().unwrap();
    let datafile = dir.path().join("datafile.json");
    write_datafile(&datafile, &[("sort_by_price", 100.0), ("sort_by_popularity", 50.0)]);
    let config = write_config(dir.path(), &datafile);

    let err = load(&config).unwrap_err();
    assert!(err.is_configuration());

    // Running directly against the bad snapshot fails the same way, with no report
    let bad = ExperimentConfig::new("product_sort")
        .with_variation(Variation::new("sort_by_price", 100.0))
        .with_variation(Variation::new("sort_by_popularity", 50.0));
    let metrics = Arc::new(Metrics::new());
    let result = Simulation::new(&config, metrics.clone(), None).run(50, &bad);
    assert!(result.unwrap_err().is_configuration());
    assert_eq!(metrics.runs_total(), 0);
}

#[test]
fn test_missing_datafile_is_collaborator_unavailable() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), &dir.path().join("missing.json"));
    assert!(matches!(load(&config), Err(SorterError::CollaboratorUnavailable { .. })));
}

#[test]
fn test_every_bucket_maps_to_exactly_one_outcome() {
    let experiment = ExperimentConfig::new("product_sort")
        .with_variation(Variation::new("a", 12.5))
        .with_variation(Variation::new("b", 37.5))
        .with_variation(Variation::new("c", 50.0));
    let allocator = Allocator::new(&experiment).unwrap();
    assert!((0..BUCKET_RANGE).all(|b| allocator.resolve(b).enrolled));
}

#[test]
fn test_sixty_percent_allocation_over_generated_visitors() {
    let config = Config::default().with_overrides(None, Some(42), false);
    let experiment = ExperimentConfig::new("product_sort")
        .with_variation(Variation::new("sort_by_price", 60.0).with_variable("sort_method", "price"));
    let report = Simulation::new(&config, Arc::new(Metrics::new()), None)
        .run(10_000, &experiment)
        .unwrap();

    let off = report.total() - report.enabled_count();
    let share = off as f64 / report.total() as f64;
    assert!((0.37..=0.43).contains(&share), "not-enrolled share was {}", share);
}

#[test]
fn test_shipped_datafile_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/datafiles/product_sort.json");
    let source = FileConfigSource::new(path, "product_sort");
    let mut store = SnapshotStore::new();
    let outcome = store.refresh(&source).unwrap();
    assert_eq!(outcome.snapshot().variations.len(), 3);

    let visitor = VisitorId::new("654321");
    let allocator = Allocator::new(outcome.snapshot()).unwrap();
    assert_eq!(allocator.decide(&visitor).unwrap(), allocator.decide(&visitor).unwrap());
}
