//! YAML description of a search: the candidates on each axis plus the
//! settings that apply to every trial.
//!
//! ```yaml
//! train_fraction: 0.7
//! metric: macro_f1
//! preprocessors:
//!   raw: { kind: passthrough }
//! segmentation:
//!   events8: { kind: fixed_events, size: 8 }
//!   learned: { kind: duration_quantile, quantile: 0.5 }
//! fetchers:
//!   last: { kind: last_event }
//! features:
//!   counts: { kind: sensor_counts }
//! classifiers:
//!   knn: { kind: k_nearest, k: 5 }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    Activity, ActivityCombiner, ActivityFetcher, CenterActivity, Classifier, ComponentCatalog,
    Debounce, DropRepeats, DurationQuantileWindow, EventAccuracy, FailurePolicy, FeatureExtractor,
    FixedEventWindow, FixedTimeWindow, KNearest, LastEventActivity, MacroF1, MajorityActivity,
    MajorityClass, NearestCentroid, OnnxClassifier, Optimizer, Passthrough, PipelineError,
    Preprocessor, QualityMetric, Result, Schedule, SegmentationPolicy, SensorCounts,
    TaperedSensorCounts, WindowSummary,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreprocessorSpec {
    Passthrough,
    DropRepeats,
    Debounce { min_gap_ms: i64 },
}

impl PreprocessorSpec {
    pub fn build(&self) -> Box<dyn Preprocessor> {
        match self {
            PreprocessorSpec::Passthrough => Box::new(Passthrough),
            PreprocessorSpec::DropRepeats => Box::new(DropRepeats),
            PreprocessorSpec::Debounce { min_gap_ms } => Box::new(Debounce::new(*min_gap_ms)),
        }
    }
}

fn default_quantile() -> f64 {
    0.5
}

fn default_min_events() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentationSpec {
    FixedEvents {
        size: usize,
    },
    FixedTime {
        duration_ms: i64,
    },
    DurationQuantile {
        #[serde(default = "default_quantile")]
        quantile: f64,
        #[serde(default = "default_min_events")]
        min_events: usize,
    },
}

impl SegmentationSpec {
    pub fn build(&self) -> Box<dyn SegmentationPolicy> {
        match self {
            SegmentationSpec::FixedEvents { size } => Box::new(FixedEventWindow::new(*size)),
            SegmentationSpec::FixedTime { duration_ms } => {
                Box::new(FixedTimeWindow::new(*duration_ms))
            }
            SegmentationSpec::DurationQuantile {
                quantile,
                min_events,
            } => Box::new(DurationQuantileWindow::new(*quantile, *min_events)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetcherSpec {
    LastEvent,
    Center,
    Majority,
}

impl FetcherSpec {
    pub fn build(&self) -> Box<dyn ActivityFetcher> {
        match self {
            FetcherSpec::LastEvent => Box::new(LastEventActivity),
            FetcherSpec::Center => Box::new(CenterActivity),
            FetcherSpec::Majority => Box::new(MajorityActivity),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureSpec {
    SensorCounts,
    TaperedSensorCounts,
    WindowSummary,
}

impl FeatureSpec {
    pub fn build(&self) -> Box<dyn FeatureExtractor> {
        match self {
            FeatureSpec::SensorCounts => Box::new(SensorCounts::new()),
            FeatureSpec::TaperedSensorCounts => Box::new(TaperedSensorCounts::new()),
            FeatureSpec::WindowSummary => Box::new(WindowSummary),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierSpec {
    MajorityClass,
    NearestCentroid,
    KNearest {
        k: usize,
    },
    Onnx {
        path: String,
        #[serde(default)]
        labels: Vec<Activity>,
    },
}

impl ClassifierSpec {
    pub fn build(&self) -> Box<dyn Classifier> {
        match self {
            ClassifierSpec::MajorityClass => Box::new(MajorityClass::new()),
            ClassifierSpec::NearestCentroid => Box::new(NearestCentroid::new()),
            ClassifierSpec::KNearest { k } => Box::new(KNearest::new(*k)),
            ClassifierSpec::Onnx { path, labels } => {
                Box::new(OnnxClassifier::new(path, labels.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[default]
    EventAccuracy,
    MacroF1,
}

impl MetricKind {
    pub fn build(&self) -> Arc<dyn QualityMetric> {
        match self {
            MetricKind::EventAccuracy => Arc::new(EventAccuracy),
            MetricKind::MacroF1 => Arc::new(MacroF1),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinerConfig {
    #[serde(default)]
    pub background: Activity,
    #[serde(default = "default_true")]
    pub gap_fix: bool,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            background: Activity::NONE,
            gap_fix: true,
        }
    }
}

fn default_train_fraction() -> f64 {
    0.7
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Worker threads; one per CPU when unset.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default = "default_train_fraction")]
    pub train_fraction: f64,
    #[serde(default)]
    pub sequential: bool,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub metric: MetricKind,
    #[serde(default)]
    pub combiner: CombinerConfig,

    #[serde(default)]
    pub preprocessors: BTreeMap<String, PreprocessorSpec>,
    #[serde(default)]
    pub segmentation: BTreeMap<String, SegmentationSpec>,
    #[serde(default)]
    pub fetchers: BTreeMap<String, FetcherSpec>,
    #[serde(default)]
    pub features: BTreeMap<String, FeatureSpec>,
    #[serde(default)]
    pub classifiers: BTreeMap<String, ClassifierSpec>,
}

fn invalid<T>(msg: String) -> Result<T> {
    Err(PipelineError::InvalidConfig(msg))
}

impl SearchConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: SearchConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return invalid(format!(
                "train_fraction must be between 0 and 1, got {}",
                self.train_fraction
            ));
        }
        if self.workers == Some(0) {
            return invalid("workers must be positive".into());
        }

        let axes = [
            ("preprocessors", self.preprocessors.len()),
            ("segmentation", self.segmentation.len()),
            ("fetchers", self.fetchers.len()),
            ("features", self.features.len()),
            ("classifiers", self.classifiers.len()),
        ];
        if let Some((axis, _)) = axes.iter().find(|(_, n)| *n == 0) {
            return invalid(format!("no {} configured", axis));
        }

        for (name, spec) in &self.preprocessors {
            if let PreprocessorSpec::Debounce { min_gap_ms } = spec {
                if *min_gap_ms < 0 {
                    return invalid(format!("preprocessor {}: min_gap_ms is negative", name));
                }
            }
        }
        for (name, spec) in &self.segmentation {
            match spec {
                SegmentationSpec::FixedEvents { size: 0 } => {
                    return invalid(format!("segmentation {}: size must be positive", name));
                }
                SegmentationSpec::FixedTime { duration_ms } if *duration_ms < 0 => {
                    return invalid(format!("segmentation {}: duration_ms is negative", name));
                }
                SegmentationSpec::DurationQuantile {
                    quantile,
                    min_events,
                } => {
                    if !(0.0..=1.0).contains(quantile) {
                        return invalid(format!(
                            "segmentation {}: quantile must be within [0, 1]",
                            name
                        ));
                    }
                    if *min_events == 0 {
                        return invalid(format!(
                            "segmentation {}: min_events must be positive",
                            name
                        ));
                    }
                }
                _ => {}
            }
        }
        for (name, spec) in &self.classifiers {
            if let ClassifierSpec::KNearest { k: 0 } = spec {
                return invalid(format!("classifier {}: k must be positive", name));
            }
        }
        Ok(())
    }

    /// Builds a catalog with one candidate per configured entry, ordered by
    /// name within each axis.
    pub fn to_catalog(&self) -> ComponentCatalog {
        let mut catalog = ComponentCatalog::new()
            .with_combiner(ActivityCombiner::new(
                self.combiner.background,
                self.combiner.gap_fix,
            ))
            .with_metric(self.metric.build());

        for (name, spec) in &self.preprocessors {
            let spec = spec.clone();
            catalog = catalog.with_preprocessor(name.as_str(), move || spec.build());
        }
        for (name, spec) in &self.segmentation {
            let spec = spec.clone();
            catalog = catalog.with_segmentation(name.as_str(), move || spec.build());
        }
        for (name, spec) in &self.fetchers {
            let spec = *spec;
            catalog = catalog.with_fetcher(name.as_str(), move || spec.build());
        }
        for (name, spec) in &self.features {
            let spec = *spec;
            catalog = catalog.with_features(name.as_str(), move || spec.build());
        }
        for (name, spec) in &self.classifiers {
            let spec = spec.clone();
            catalog = catalog.with_classifier(name.as_str(), move || spec.build());
        }
        catalog
    }

    pub fn schedule(&self) -> Schedule {
        if self.sequential {
            Schedule::Sequential
        } else {
            self.workers
                .map(|workers| Schedule::Parallel { workers })
                .unwrap_or_else(Schedule::parallel)
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        if self.fail_fast {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::Recover
        }
    }

    pub fn optimizer(&self) -> Optimizer {
        Optimizer::new()
            .with_failure_policy(self.failure_policy())
            .with_train_fraction(self.train_fraction)
    }
}
