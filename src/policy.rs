//! Built-in segmentation policies.

use tracing::debug;

use crate::{
    Dataset, Direction, EventBuffer, PipelineError, Result, SegmentHistory, SegmentationPolicy,
};

/// Windows of a fixed number of events. The final window may be shorter.
#[derive(Debug, Clone)]
pub struct FixedEventWindow {
    size: usize,
}

impl FixedEventWindow {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl SegmentationPolicy for FixedEventWindow {
    fn name(&self) -> &str {
        "fixed_events"
    }

    fn segment(&self, _: &SegmentHistory, buffer: &EventBuffer, start: usize) -> Result<usize> {
        if self.size == 0 {
            return Err(PipelineError::InvalidConfig(
                "fixed_events window size must be positive".into(),
            ));
        }
        Ok((start + self.size - 1).min(buffer.len() - 1))
    }
}

/// Windows spanning a fixed amount of time from their first event.
#[derive(Debug, Clone)]
pub struct FixedTimeWindow {
    duration_ms: i64,
}

impl FixedTimeWindow {
    pub fn new(duration_ms: i64) -> Self {
        Self { duration_ms }
    }
}

impl SegmentationPolicy for FixedTimeWindow {
    fn name(&self) -> &str {
        "fixed_time"
    }

    fn segment(&self, _: &SegmentHistory, buffer: &EventBuffer, start: usize) -> Result<usize> {
        if self.duration_ms < 0 {
            return Err(PipelineError::InvalidConfig(
                "fixed_time duration must not be negative".into(),
            ));
        }
        time_boundary(buffer, start, self.duration_ms)
    }
}

/// Last event within `duration_ms` of the event at `start`.
fn time_boundary(buffer: &EventBuffer, start: usize, duration_ms: i64) -> Result<usize> {
    let t0 = buffer
        .get(start)
        .map(|e| e.timestamp)
        .ok_or(PipelineError::IndexOutOfBounds {
            from: start,
            to: start + 1,
            len: buffer.len(),
        })?;
    let end = buffer.search_time(t0.saturating_add(duration_ms), Direction::Before)?;
    Ok(end.max(start))
}

/// Windows sized from the distribution of activity durations in the
/// training data: each window spans the configured quantile of observed
/// durations and holds at least `min_events` events.
#[derive(Debug, Clone)]
pub struct DurationQuantileWindow {
    quantile: f64,
    min_events: usize,
    duration_ms: Option<i64>,
}

impl DurationQuantileWindow {
    pub fn new(quantile: f64, min_events: usize) -> Self {
        Self {
            quantile: quantile.clamp(0.0, 1.0),
            min_events: min_events.max(1),
            duration_ms: None,
        }
    }

    /// The learned window length, once precomputed.
    pub fn duration_ms(&self) -> Option<i64> {
        self.duration_ms
    }
}

impl SegmentationPolicy for DurationQuantileWindow {
    fn name(&self) -> &str {
        "duration_quantile"
    }

    fn precompute(&mut self, dataset: &Dataset) -> anyhow::Result<()> {
        let mut durations: Vec<i64> = dataset
            .activities
            .events()
            .iter()
            .filter(|a| !a.activity.is_none())
            .map(|a| a.duration_ms())
            .filter(|d| *d > 0)
            .collect();
        durations.sort_unstable();

        self.duration_ms = if durations.is_empty() {
            None
        } else {
            let rank = ((durations.len() - 1) as f64 * self.quantile).round() as usize;
            Some(durations[rank])
        };
        debug!(
            samples = durations.len(),
            duration_ms = ?self.duration_ms,
            "learned window duration"
        );
        Ok(())
    }

    fn segment(&self, _: &SegmentHistory, buffer: &EventBuffer, start: usize) -> Result<usize> {
        let duration_ms = self
            .duration_ms
            .ok_or_else(|| PipelineError::PolicyNotPrecomputed {
                policy: self.name().to_string(),
            })?;
        let end = time_boundary(buffer, start, duration_ms)?;
        Ok(end.max(start + self.min_events - 1).min(buffer.len() - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Activity, ActivityEvent, SensorEvent, Segmenter, Timestamp};

    fn buffer(times: &[Timestamp]) -> EventBuffer {
        times
            .iter()
            .map(|t| SensorEvent::new(0, *t, 1.0))
            .collect::<Vec<_>>()
            .into()
    }

    fn bounds(policy: &dyn SegmentationPolicy, buf: &EventBuffer) -> Vec<(usize, usize)> {
        let mut seg = Segmenter::new(policy);
        seg.windows(buf)
            .map(|w| w.map(|w| (w.first, w.last)))
            .collect::<Result<_>>()
            .unwrap()
    }

    #[test]
    fn test_fixed_events() {
        let buf = buffer(&[0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(
            bounds(&FixedEventWindow::new(3), &buf),
            vec![(0, 2), (3, 5), (6, 6)]
        );
        assert_eq!(bounds(&FixedEventWindow::new(1), &buf).len(), 7);
    }

    #[test]
    fn test_fixed_events_zero_size_is_fatal() {
        let buf = buffer(&[0, 1]);
        let policy = FixedEventWindow::new(0);
        let mut seg = Segmenter::new(&policy);
        let err = seg.next_window(&buf).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_fixed_time() {
        let buf = buffer(&[0, 10, 20, 35, 36, 100]);
        assert_eq!(
            bounds(&FixedTimeWindow::new(20), &buf),
            vec![(0, 2), (3, 4), (5, 5)]
        );
        // A zero-length window still consumes the starting event.
        assert_eq!(bounds(&FixedTimeWindow::new(0), &buf).len(), 6);
    }

    #[test]
    fn test_duration_quantile_requires_precompute() {
        let buf = buffer(&[0, 1, 2]);
        let policy = DurationQuantileWindow::new(0.5, 1);
        let mut seg = Segmenter::new(&policy);
        assert!(matches!(
            seg.next_window(&buf),
            Err(PipelineError::PolicyNotPrecomputed { .. })
        ));
    }

    #[test]
    fn test_duration_quantile_empty_statistics_stay_unset() {
        let mut policy = DurationQuantileWindow::new(0.5, 1);
        let data = Dataset::new(buffer(&[0, 1]), Default::default());
        policy.precompute(&data).unwrap();
        assert_eq!(policy.duration_ms(), None);
    }

    #[test]
    fn test_duration_quantile_learns_median() {
        let truth = vec![
            ActivityEvent::new(Activity(1), 0, 10),
            ActivityEvent::new(Activity(2), 100, 130),
            ActivityEvent::new(Activity(1), 200, 220),
            // Background and instantaneous annotations do not count.
            ActivityEvent::new(Activity::NONE, 300, 900),
            ActivityEvent::new(Activity(2), 950, 950),
        ];
        let data = Dataset::new(buffer(&[0]), truth.into());
        let mut policy = DurationQuantileWindow::new(0.5, 1);
        policy.precompute(&data).unwrap();
        assert_eq!(policy.duration_ms(), Some(20));

        let buf = buffer(&[0, 5, 20, 21, 50, 60]);
        assert_eq!(bounds(&policy, &buf), vec![(0, 2), (3, 3), (4, 5)]);
    }

    #[test]
    fn test_duration_quantile_min_events() {
        let truth = vec![ActivityEvent::new(Activity(1), 0, 1)];
        let data = Dataset::new(buffer(&[0]), truth.into());
        let mut policy = DurationQuantileWindow::new(1.0, 3);
        policy.precompute(&data).unwrap();

        let buf = buffer(&[0, 100, 200, 300]);
        assert_eq!(bounds(&policy, &buf), vec![(0, 2), (3, 3)]);
    }
}
