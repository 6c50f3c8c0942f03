use std::fs;

use har_rust_core::*;

const CONFIG: &str = r#"
sequential: true
train_fraction: 0.6
preprocessors:
  raw: { kind: passthrough }
  dedup: { kind: drop_repeats }
segmentation:
  events3: { kind: fixed_events, size: 3 }
  learned: { kind: duration_quantile, quantile: 0.5, min_events: 2 }
fetchers:
  majority: { kind: majority }
features:
  tapered: { kind: tapered_sensor_counts }
classifiers:
  centroid: { kind: nearest_centroid }
"#;

fn dataset_yaml() -> String {
    let mut events = Vec::new();
    for i in 0..30i64 {
        // Sensor 0 fires during the first activity, sensor 1 during the second.
        let sensor = if (i / 5) % 2 == 0 { 0 } else { 1 };
        events.push(SensorEvent::new(sensor, i * 100, (i % 2) as f32));
    }
    let activities: Vec<ActivityEvent> = (0..6)
        .map(|k| ActivityEvent::new(Activity(1 + (k % 2) as u32), k * 500, k * 500 + 450))
        .collect();
    let dataset = Dataset::new(events.into(), activities.into());
    serde_yaml::to_string(&dataset).unwrap()
}

#[test]
fn test_search_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("search.yaml");
    let dataset_path = dir.path().join("dataset.yaml");
    fs::write(&config_path, CONFIG).unwrap();
    fs::write(&dataset_path, dataset_yaml()).unwrap();

    let config = SearchConfig::from_path(&config_path).unwrap();
    assert_eq!(config.schedule(), Schedule::Sequential);

    let dataset: Dataset =
        serde_yaml::from_str(&fs::read_to_string(&dataset_path).unwrap()).unwrap();
    assert_eq!(dataset.events.len(), 30);
    assert_eq!(dataset.sensor_count(), 2);

    let report = config
        .optimizer()
        .optimize(&config.to_catalog(), &dataset, config.schedule())
        .unwrap();
    assert_eq!(report.trials.len(), 4);
    assert!(report.failures().is_empty());

    let identities: Vec<String> = report
        .trials
        .successes
        .iter()
        .map(|r| r.identity().to_string())
        .collect();
    assert_eq!(
        identities,
        vec![
            "dedup/events3/majority/tapered/centroid",
            "dedup/learned/majority/tapered/centroid",
            "raw/events3/majority/tapered/centroid",
            "raw/learned/majority/tapered/centroid",
        ]
    );
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = SearchConfig::from_path(dir.path().join("nope.yaml")).unwrap_err();
    assert!(matches!(err, PipelineError::Io(_)));
    assert!(!err.is_fatal());
}

#[test]
fn test_invalid_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("search.yaml");
    fs::write(&path, CONFIG.replace("size: 3", "size: 0")).unwrap();
    let err = SearchConfig::from_path(&path).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidConfig(_)));
}
