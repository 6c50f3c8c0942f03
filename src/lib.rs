use serde::{Deserialize, Serialize};

mod error;
pub use error::{PipelineError, Result};

mod buffer;
pub use buffer::{Direction, EventBuffer};

mod dataset;
pub use dataset::{Dataset, GroundTruth};

mod segmenter;
pub use segmenter::{SegmentHistory, SegmentationPolicy, Segmenter, SegmenterState, Window, Windows};

mod policy;
pub use policy::{DurationQuantileWindow, FixedEventWindow, FixedTimeWindow};

mod combiner;
pub use combiner::{ActivityCombiner, PredictedInterval, ReconciledInterval};

mod preprocess;
pub use preprocess::{Debounce, DropRepeats, Passthrough, Preprocessor};

mod fetcher;
pub use fetcher::{ActivityFetcher, CenterActivity, LastEventActivity, MajorityActivity};

mod features;
pub use features::{
    FeatureExtractor, FeatureVector, SensorCounts, TaperedSensorCounts, WindowSummary,
};

mod classifier;
pub use classifier::{
    Classifier, KNearest, LabeledFeatures, MajorityClass, NearestCentroid, OnnxClassifier,
};

mod metric;
pub use metric::{EventAccuracy, MacroF1, QualityMetric};

pub mod catalog;
pub use catalog::{Axis, ComponentCatalog, ConfigIdentity, PipelineConfig};

pub mod config;
pub use config::SearchConfig;

mod pipeline;

mod optimizer;
pub use optimizer::{
    select_best, FailurePolicy, Optimizer, Schedule, SearchReport, TrialFailure, TrialResult,
    TrialSet,
};

/// Milliseconds since an arbitrary, dataset-defined epoch.
pub type Timestamp = i64;

/// An activity class index. Index 0 is the background "no activity" class.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Activity(pub u32);

impl Activity {
    pub const NONE: Activity = Activity(0);

    pub fn is_none(&self) -> bool {
        *self == Activity::NONE
    }
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single discrete sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    pub sensor: u32,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub value: f32,
}

impl SensorEvent {
    pub fn new(sensor: u32, timestamp: Timestamp, value: f32) -> Self {
        Self {
            sensor,
            timestamp,
            value,
        }
    }
}

/// A ground-truth activity occurrence, used for training labels and scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub activity: Activity,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
}

impl ActivityEvent {
    pub fn new(activity: Activity, start_time: Timestamp, end_time: Timestamp) -> Self {
        Self {
            activity,
            start_time,
            end_time,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_time - self.start_time
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        self.start_time <= t && t <= self.end_time
    }
}
