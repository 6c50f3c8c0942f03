//! Pull-based segmentation of an event buffer into windows.
//!
//! A [`Segmenter`] walks the buffer front to back, asking its
//! [`SegmentationPolicy`] where each window ends. Windows never overlap and
//! never move backwards: each one starts at the event after the last event
//! of its predecessor. Restarting requires an explicit [`Segmenter::reset`].

use tracing::trace;

use crate::{Dataset, EventBuffer, PipelineError, Result, SensorEvent, Timestamp};

/// Strategy deciding where a window ends.
pub trait SegmentationPolicy: Send {
    fn name(&self) -> &str;

    /// Learns whatever statistics the policy needs from the training data.
    fn precompute(&mut self, _dataset: &Dataset) -> anyhow::Result<()> {
        Ok(())
    }

    /// Returns the inclusive index of the last event of the window starting
    /// at `start`. `start` is always a valid index into `buffer`.
    fn segment(&self, history: &SegmentHistory, buffer: &EventBuffer, start: usize)
        -> Result<usize>;
}

/// Bookkeeping a segmenter keeps between windows, visible to policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentHistory {
    /// Index of the last event consumed by the previous window.
    pub last_index: Option<usize>,
    /// Number of windows emitted since the last reset.
    pub emitted: usize,
    /// End time of the previous window.
    pub last_end_time: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    Ready,
    Emitting,
    Exhausted,
}

/// A contiguous run of events `first..=last`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window<'a> {
    /// Position of this window in the emitted sequence.
    pub seq: usize,
    pub first: usize,
    pub last: usize,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub events: &'a [SensorEvent],
}

impl<'a> Window<'a> {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_time - self.start_time
    }

    /// Half-open event index range covered by the window.
    pub fn source(&self) -> std::ops::Range<usize> {
        self.first..self.last + 1
    }
}

pub struct Segmenter<'p> {
    policy: &'p dyn SegmentationPolicy,
    state: SegmenterState,
    history: SegmentHistory,
}

impl<'p> Segmenter<'p> {
    pub fn new(policy: &'p dyn SegmentationPolicy) -> Self {
        Self {
            policy,
            state: SegmenterState::Ready,
            history: SegmentHistory::default(),
        }
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    pub fn history(&self) -> &SegmentHistory {
        &self.history
    }

    pub fn reset(&mut self) {
        self.history = SegmentHistory::default();
        self.state = SegmenterState::Ready;
    }

    /// Carves the next window out of `buffer`, or returns `None` once the
    /// buffer is used up. Exhaustion is terminal until [`Segmenter::reset`].
    pub fn next_window<'a>(&mut self, buffer: &'a EventBuffer) -> Result<Option<Window<'a>>> {
        if self.state == SegmenterState::Exhausted {
            return Ok(None);
        }

        let start = self.history.last_index.map_or(0, |i| i + 1);
        if start >= buffer.len() {
            trace!(emitted = self.history.emitted, "segmenter exhausted");
            self.state = SegmenterState::Exhausted;
            return Ok(None);
        }

        let end = self.policy.segment(&self.history, buffer, start)?;
        if end < start || end >= buffer.len() {
            return Err(PipelineError::InvalidBoundary {
                policy: self.policy.name().to_string(),
                start,
                end,
                len: buffer.len(),
            });
        }

        let events = buffer.slice(start, end + 1)?;
        let window = Window {
            seq: self.history.emitted,
            first: start,
            last: end,
            start_time: events[0].timestamp,
            end_time: events[events.len() - 1].timestamp,
            events,
        };

        self.history = SegmentHistory {
            last_index: Some(end),
            emitted: self.history.emitted + 1,
            last_end_time: Some(window.end_time),
        };
        self.state = SegmenterState::Emitting;
        Ok(Some(window))
    }

    /// Iterates the remaining windows of `buffer`. Iteration stops after the
    /// first error.
    pub fn windows<'s, 'a>(&'s mut self, buffer: &'a EventBuffer) -> Windows<'s, 'p, 'a> {
        Windows {
            segmenter: self,
            buffer,
            failed: false,
        }
    }
}

pub struct Windows<'s, 'p, 'a> {
    segmenter: &'s mut Segmenter<'p>,
    buffer: &'a EventBuffer,
    failed: bool,
}

impl<'s, 'p, 'a> Iterator for Windows<'s, 'p, 'a> {
    type Item = Result<Window<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.segmenter.next_window(self.buffer) {
            Ok(window) => window.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FixedEventWindow;
    use proptest::prelude::*;

    fn buffer(times: &[Timestamp]) -> EventBuffer {
        times
            .iter()
            .map(|t| SensorEvent::new(0, *t, 1.0))
            .collect::<Vec<_>>()
            .into()
    }

    /// Returns a fixed end index regardless of input.
    struct Stuck(usize);

    impl SegmentationPolicy for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        fn segment(&self, _: &SegmentHistory, _: &EventBuffer, _: usize) -> Result<usize> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_fixed_windows_cover_buffer() {
        let policy = FixedEventWindow::new(2);
        let mut seg = Segmenter::new(&policy);
        let buf = buffer(&[0, 1, 2, 3, 4]);

        assert_eq!(seg.state(), SegmenterState::Ready);
        let w = seg.next_window(&buf).unwrap().unwrap();
        assert_eq!((w.first, w.last, w.seq), (0, 1, 0));
        assert_eq!(seg.state(), SegmenterState::Emitting);
        let w = seg.next_window(&buf).unwrap().unwrap();
        assert_eq!((w.first, w.last, w.seq), (2, 3, 1));
        let w = seg.next_window(&buf).unwrap().unwrap();
        assert_eq!((w.first, w.last), (4, 4));
        assert_eq!(w.start_time, w.end_time);
        assert_eq!(seg.history().last_index, Some(4));
    }

    #[test]
    fn test_exhaustion_is_absorbing() {
        let policy = FixedEventWindow::new(10);
        let mut seg = Segmenter::new(&policy);
        let buf = buffer(&[0, 1, 2]);

        assert!(seg.next_window(&buf).unwrap().is_some());
        assert!(seg.next_window(&buf).unwrap().is_none());
        assert_eq!(seg.state(), SegmenterState::Exhausted);
        assert!(seg.next_window(&buf).unwrap().is_none());

        // Even a larger buffer cannot revive it without a reset.
        let bigger = buffer(&[0, 1, 2, 3, 4]);
        assert!(seg.next_window(&bigger).unwrap().is_none());
    }

    #[test]
    fn test_reset_rescans_from_start() {
        let policy = FixedEventWindow::new(2);
        let mut seg = Segmenter::new(&policy);
        let buf = buffer(&[0, 1, 2]);

        let first: Vec<_> = seg.windows(&buf).map(|w| w.unwrap().first).collect();
        assert_eq!(first, vec![0, 2]);
        seg.reset();
        assert_eq!(seg.state(), SegmenterState::Ready);
        let again: Vec<_> = seg.windows(&buf).map(|w| w.unwrap().first).collect();
        assert_eq!(again, first);
    }

    #[test]
    fn test_empty_buffer() {
        let policy = FixedEventWindow::new(2);
        let mut seg = Segmenter::new(&policy);
        assert!(seg.next_window(&EventBuffer::default()).unwrap().is_none());
        assert_eq!(seg.state(), SegmenterState::Exhausted);
    }

    #[test]
    fn test_invalid_boundary_is_reported() {
        let buf = buffer(&[0, 1, 2]);

        let past_end = Stuck(7);
        let mut seg = Segmenter::new(&past_end);
        let err = seg.next_window(&buf).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidBoundary { end: 7, len: 3, .. }));
        assert!(err.is_fatal());

        // Going backwards is rejected on the second window.
        let backwards = Stuck(0);
        let mut seg = Segmenter::new(&backwards);
        assert!(seg.next_window(&buf).unwrap().is_some());
        assert!(matches!(
            seg.next_window(&buf),
            Err(PipelineError::InvalidBoundary { start: 1, end: 0, .. })
        ));
    }

    #[test]
    fn test_windows_iterator_stops_after_error() {
        let buf = buffer(&[0, 1, 2]);
        let policy = Stuck(0);
        let mut seg = Segmenter::new(&policy);
        let items: Vec<_> = seg.windows(&buf).collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    proptest! {
        #[test]
        fn prop_windows_are_monotonic_and_terminate(
            mut times in proptest::collection::vec(0i64..10_000, 0..200),
            size in 1usize..20,
        ) {
            times.sort();
            let buf = buffer(&times);
            let policy = FixedEventWindow::new(size);
            let mut seg = Segmenter::new(&policy);

            let mut windows = Vec::new();
            while let Some(w) = seg.next_window(&buf).unwrap() {
                prop_assert!(w.start_time <= w.end_time);
                windows.push(w);
                prop_assert!(windows.len() <= buf.len());
            }
            for pair in windows.windows(2) {
                prop_assert!(pair[0].end_time <= pair[1].start_time);
                prop_assert_eq!(pair[0].last + 1, pair[1].first);
            }
            let covered: usize = windows.iter().map(|w| w.len()).sum();
            prop_assert_eq!(covered, buf.len());

            prop_assert!(seg.next_window(&buf).unwrap().is_none());
            prop_assert_eq!(seg.state(), SegmenterState::Exhausted);
        }
    }
}
