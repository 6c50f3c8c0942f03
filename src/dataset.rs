use serde::{Deserialize, Serialize};

use crate::{Activity, ActivityEvent, EventBuffer, Timestamp};

/// Ground-truth activity occurrences, ordered by start time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ActivityEvent>", into = "Vec<ActivityEvent>")]
pub struct GroundTruth {
    events: Vec<ActivityEvent>,
    // Longest occurrence; bounds the backwards scan in `activity_at`.
    max_duration: i64,
}

impl GroundTruth {
    pub fn new(mut events: Vec<ActivityEvent>) -> Self {
        events.sort_by_key(|a| a.start_time);
        let max_duration = events.iter().map(|a| a.duration_ms()).max().unwrap_or(0);
        Self {
            events,
            max_duration,
        }
    }

    pub fn events(&self) -> &[ActivityEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The activity covering `t`, or `Activity::NONE` if nothing does. When
    /// occurrences overlap the latest-starting one wins.
    pub fn activity_at(&self, t: Timestamp) -> Activity {
        let candidates = self.events.partition_point(|a| a.start_time <= t);
        self.events[..candidates]
            .iter()
            .rev()
            .take_while(|a| t - a.start_time <= self.max_duration)
            .find(|a| a.contains(t))
            .map(|a| a.activity)
            .unwrap_or(Activity::NONE)
    }
}

impl From<Vec<ActivityEvent>> for GroundTruth {
    fn from(events: Vec<ActivityEvent>) -> Self {
        Self::new(events)
    }
}

impl From<GroundTruth> for Vec<ActivityEvent> {
    fn from(truth: GroundTruth) -> Self {
        truth.events
    }
}

/// A sensor event stream together with its ground-truth annotations.
///
/// Components receive a dataset in `precompute`, always the training part of
/// the chronological split made by the trial harness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub events: EventBuffer,
    #[serde(default)]
    pub activities: GroundTruth,
}

impl Dataset {
    pub fn new(events: EventBuffer, activities: GroundTruth) -> Self {
        Self { events, activities }
    }

    /// One past the largest sensor id present.
    pub fn sensor_count(&self) -> usize {
        self.events
            .events()
            .iter()
            .map(|e| e.sensor as usize + 1)
            .max()
            .unwrap_or(0)
    }

    /// Splits chronologically: the first `train_fraction` of the events (and
    /// the annotations overlapping them, clipped) form the training part.
    pub fn split(&self, train_fraction: f64) -> (Dataset, Dataset) {
        let events = self.events.events();
        let cut = ((events.len() as f64) * train_fraction.clamp(0.0, 1.0)).round() as usize;
        let cut = cut.min(events.len());

        let Some(cut_time) = events.get(cut).map(|e| e.timestamp) else {
            return (self.clone(), Dataset::default());
        };
        // Events sharing the cut timestamp all go to evaluation.
        let cut = events.partition_point(|e| e.timestamp < cut_time);

        let mut train_truth = Vec::new();
        let mut eval_truth = Vec::new();
        for a in self.activities.events() {
            if a.start_time < cut_time {
                train_truth.push(ActivityEvent::new(
                    a.activity,
                    a.start_time,
                    a.end_time.min(cut_time),
                ));
            }
            if a.end_time >= cut_time {
                eval_truth.push(ActivityEvent::new(
                    a.activity,
                    a.start_time.max(cut_time),
                    a.end_time,
                ));
            }
        }

        (
            Dataset::new(events[..cut].to_vec().into(), train_truth.into()),
            Dataset::new(events[cut..].to_vec().into(), eval_truth.into()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SensorEvent;

    fn activity(id: u32, start: Timestamp, end: Timestamp) -> ActivityEvent {
        ActivityEvent::new(Activity(id), start, end)
    }

    #[test]
    fn test_activity_at() {
        let truth = GroundTruth::new(vec![activity(2, 50, 80), activity(1, 0, 40)]);
        assert_eq!(truth.events()[0].activity, Activity(1));
        assert_eq!(truth.activity_at(0), Activity(1));
        assert_eq!(truth.activity_at(40), Activity(1));
        assert_eq!(truth.activity_at(45), Activity::NONE);
        assert_eq!(truth.activity_at(60), Activity(2));
        assert_eq!(truth.activity_at(100), Activity::NONE);
        assert_eq!(truth.activity_at(-1), Activity::NONE);
    }

    #[test]
    fn test_activity_at_overlap_prefers_latest_start() {
        let truth = GroundTruth::new(vec![activity(1, 0, 100), activity(2, 20, 30)]);
        assert_eq!(truth.activity_at(25), Activity(2));
        assert_eq!(truth.activity_at(50), Activity(1));
    }

    #[test]
    fn test_split_clips_annotations() {
        let events: Vec<_> = (0..10).map(|i| SensorEvent::new(0, i * 10, 1.0)).collect();
        let data = Dataset::new(
            events.into(),
            vec![activity(1, 0, 55), activity(2, 60, 90)].into(),
        );
        let (train, eval) = data.split(0.5);
        assert_eq!(train.events.len(), 5);
        assert_eq!(eval.events.len(), 5);
        assert_eq!(eval.events.get(0).unwrap().timestamp, 50);
        assert_eq!(train.activities.events(), &[activity(1, 0, 50)]);
        assert_eq!(
            eval.activities.events(),
            &[activity(1, 50, 55), activity(2, 60, 90)]
        );
    }

    #[test]
    fn test_split_keeps_equal_timestamps_together() {
        let times = [0, 10, 20, 30, 30, 30, 40, 50];
        let events: Vec<_> = times.iter().map(|t| SensorEvent::new(0, *t, 1.0)).collect();
        let data = Dataset::new(
            events.into(),
            vec![activity(1, 0, 25), activity(2, 30, 50)].into(),
        );
        // round(8 * 0.5) = 4 lands between two events at t = 30.
        let (train, eval) = data.split(0.5);
        assert_eq!(train.events.len(), 3);
        assert!(train.events.events().iter().all(|e| e.timestamp < 30));
        assert_eq!(eval.events.len(), 5);
        assert_eq!(eval.events.get(0).unwrap().timestamp, 30);
        assert_eq!(train.activities.events(), &[activity(1, 0, 25)]);
        assert_eq!(eval.activities.events(), &[activity(2, 30, 50)]);
        assert_eq!(eval.activities.activity_at(30), Activity(2));
    }

    #[test]
    fn test_split_whole_dataset() {
        let events: Vec<_> = (0..4).map(|i| SensorEvent::new(i, i as i64, 1.0)).collect();
        let data = Dataset::new(events.into(), GroundTruth::default());
        let (train, eval) = data.split(1.0);
        assert_eq!(train.events.len(), 4);
        assert!(eval.events.is_empty());
        assert_eq!(data.sensor_count(), 4);
    }
}
