use std::collections::BTreeMap;

use anyhow::ensure;

use crate::{Activity, EventBuffer, GroundTruth, ReconciledInterval, Timestamp};

/// Scores a reconciled timeline against ground truth. Higher is better.
pub trait QualityMetric: Send + Sync {
    fn name(&self) -> &str;

    fn score(
        &self,
        timeline: &[ReconciledInterval],
        truth: &GroundTruth,
        events: &EventBuffer,
    ) -> anyhow::Result<f64>;
}

/// Activity the timeline assigns to `t`; the timeline must be sorted and
/// non-overlapping.
fn predicted_at(timeline: &[ReconciledInterval], t: Timestamp) -> Activity {
    let idx = timeline.partition_point(|r| r.start_time <= t);
    match idx.checked_sub(1).map(|i| &timeline[i]) {
        Some(r) if r.contains(t) => r.activity,
        _ => Activity::NONE,
    }
}

/// (predicted, actual) per evaluation event.
fn event_labels<'a>(
    timeline: &'a [ReconciledInterval],
    truth: &'a GroundTruth,
    events: &'a EventBuffer,
) -> impl Iterator<Item = (Activity, Activity)> + 'a {
    events
        .events()
        .iter()
        .map(move |e| (predicted_at(timeline, e.timestamp), truth.activity_at(e.timestamp)))
}

/// Fraction of evaluation events whose predicted activity matches the truth.
#[derive(Debug, Clone, Default)]
pub struct EventAccuracy;

impl QualityMetric for EventAccuracy {
    fn name(&self) -> &str {
        "event_accuracy"
    }

    fn score(
        &self,
        timeline: &[ReconciledInterval],
        truth: &GroundTruth,
        events: &EventBuffer,
    ) -> anyhow::Result<f64> {
        ensure!(!events.is_empty(), "no evaluation events");
        let hits = event_labels(timeline, truth, events)
            .filter(|(p, a)| p == a)
            .count();
        Ok(hits as f64 / events.len() as f64)
    }
}

/// Event-level F1, averaged over every activity that occurs in either the
/// prediction or the truth.
#[derive(Debug, Clone, Default)]
pub struct MacroF1;

impl QualityMetric for MacroF1 {
    fn name(&self) -> &str {
        "macro_f1"
    }

    fn score(
        &self,
        timeline: &[ReconciledInterval],
        truth: &GroundTruth,
        events: &EventBuffer,
    ) -> anyhow::Result<f64> {
        ensure!(!events.is_empty(), "no evaluation events");
        // activity -> (true positives, false positives, false negatives)
        let mut counts: BTreeMap<Activity, (usize, usize, usize)> = BTreeMap::new();
        for (predicted, actual) in event_labels(timeline, truth, events) {
            if predicted == actual {
                counts.entry(actual).or_default().0 += 1;
            } else {
                counts.entry(predicted).or_default().1 += 1;
                counts.entry(actual).or_default().2 += 1;
            }
        }
        let total: f64 = counts
            .values()
            .map(|&(tp, fp, fn_)| 2.0 * tp as f64 / (2 * tp + fp + fn_) as f64)
            .sum();
        Ok(total / counts.len() as f64)
    }
}
