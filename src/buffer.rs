use serde::{Deserialize, Serialize};

use crate::{PipelineError, Result, SensorEvent, Timestamp};

/// Which side of a timestamp a lookup should resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The last event at or before the timestamp.
    Before,
    /// The first event at or after the timestamp.
    After,
}

/// EventBuffer is a read-only, time-ordered view over sensor events.
///
/// Events must be supplied sorted by ascending timestamp. That ordering is a
/// precondition and is not checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventBuffer {
    events: Vec<SensorEvent>,
}

impl EventBuffer {
    pub fn new(events: Vec<SensorEvent>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&SensorEvent> {
        self.events.get(idx)
    }

    pub fn events(&self) -> &[SensorEvent] {
        &self.events
    }

    /// First and last timestamps, if there are any events.
    pub fn time_span(&self) -> Option<(Timestamp, Timestamp)> {
        Some((self.events.first()?.timestamp, self.events.last()?.timestamp))
    }

    /// Finds the index of the nearest event on the requested side of `t`.
    pub fn search_time(&self, t: Timestamp, direction: Direction) -> Result<usize> {
        match direction {
            Direction::Before => {
                // Number of events at or before t; the last of them is the answer.
                let n = self.events.partition_point(|e| e.timestamp <= t);
                n.checked_sub(1).ok_or(PipelineError::OutOfRange {
                    timestamp: t,
                    direction: "before",
                })
            }
            Direction::After => {
                let idx = self.events.partition_point(|e| e.timestamp < t);
                if idx < self.events.len() {
                    Ok(idx)
                } else {
                    Err(PipelineError::OutOfRange {
                        timestamp: t,
                        direction: "after",
                    })
                }
            }
        }
    }

    /// Returns the events in `from..to`.
    pub fn slice(&self, from: usize, to: usize) -> Result<&[SensorEvent]> {
        if from > to || to > self.events.len() {
            return Err(PipelineError::IndexOutOfBounds {
                from,
                to,
                len: self.events.len(),
            });
        }
        Ok(&self.events[from..to])
    }
}

impl From<Vec<SensorEvent>> for EventBuffer {
    fn from(events: Vec<SensorEvent>) -> Self {
        Self::new(events)
    }
}
