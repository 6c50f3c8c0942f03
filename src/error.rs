//! Error types for the activity pipeline.
//!
//! Configuration mistakes abort a search. Failures inside a single trial are
//! captured as data by the optimizer and never reach this type unless the
//! caller asked for fail-fast execution.

use thiserror::Error;

use crate::catalog::Axis;
use crate::Timestamp;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// An axis of the component catalog has no candidates.
    #[error("component catalog has no {axis} candidates")]
    EmptyCatalog { axis: Axis },

    /// A segmentation policy was asked for a boundary before its statistics existed.
    #[error("segmentation policy '{policy}' has not been precomputed")]
    PolicyNotPrecomputed { policy: String },

    /// A segmentation policy returned an end index the segmenter cannot accept.
    #[error("segmentation policy '{policy}' returned end {end} for start {start} (buffer length {len})")]
    InvalidBoundary {
        policy: String,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("no event at or {direction} timestamp {timestamp}")]
    OutOfRange {
        timestamp: Timestamp,
        direction: &'static str,
    },

    #[error("slice {from}..{to} is out of bounds for buffer of length {len}")]
    IndexOutOfBounds { from: usize, to: usize, len: usize },

    /// Upstream produced an interval that ends before it starts.
    #[error("predicted interval {index} is malformed: start {start} > end {end}")]
    MalformedInterval {
        index: usize,
        start: Timestamp,
        end: Timestamp,
    },

    #[error("no successful trials ({} failed: {})", failed.len(), failed.join(", "))]
    NoSuccessfulTrials { failed: Vec<String> },

    /// A trial failed while running in fail-fast mode.
    #[error("trial {config} failed: {source:#}")]
    TrialFailed {
        config: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Caller mistakes that must abort the whole optimization run, even when
    /// raised from inside a trial.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::EmptyCatalog { .. }
                | PipelineError::PolicyNotPrecomputed { .. }
                | PipelineError::InvalidBoundary { .. }
                | PipelineError::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::EmptyCatalog {
            axis: Axis::Classifier,
        };
        assert_eq!(err.to_string(), "component catalog has no classifier candidates");

        let err = PipelineError::NoSuccessfulTrials {
            failed: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "no successful trials (2 failed: a, b)");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(PipelineError::PolicyNotPrecomputed {
            policy: "quantile".into()
        }
        .is_fatal());
        assert!(!PipelineError::MalformedInterval {
            index: 0,
            start: 5,
            end: 1
        }
        .is_fatal());
        assert!(!PipelineError::OutOfRange {
            timestamp: 0,
            direction: "before"
        }
        .is_fatal());
    }
}
