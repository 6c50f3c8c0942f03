use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::{Dataset, EventBuffer, Timestamp};

/// Cleans up a raw event stream before segmentation.
pub trait Preprocessor: Send {
    fn name(&self) -> &str;

    fn precompute(&mut self, _dataset: &Dataset) -> anyhow::Result<()> {
        Ok(())
    }

    /// Returns the processed stream, borrowing the input when nothing changes.
    fn apply<'a>(&self, buffer: &'a EventBuffer) -> anyhow::Result<Cow<'a, EventBuffer>>;
}

/// Leaves the stream untouched.
#[derive(Debug, Clone, Default)]
pub struct Passthrough;

impl Preprocessor for Passthrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn apply<'a>(&self, buffer: &'a EventBuffer) -> anyhow::Result<Cow<'a, EventBuffer>> {
        Ok(Cow::Borrowed(buffer))
    }
}

/// Drops events that repeat the previous value reported by the same sensor.
#[derive(Debug, Clone, Default)]
pub struct DropRepeats;

impl Preprocessor for DropRepeats {
    fn name(&self) -> &str {
        "drop_repeats"
    }

    fn apply<'a>(&self, buffer: &'a EventBuffer) -> anyhow::Result<Cow<'a, EventBuffer>> {
        let mut last_value: BTreeMap<u32, f32> = BTreeMap::new();
        let events = buffer
            .events()
            .iter()
            .filter(|e| last_value.insert(e.sensor, e.value) != Some(e.value))
            .copied()
            .collect::<Vec<_>>();
        Ok(Cow::Owned(events.into()))
    }
}

/// Drops events arriving less than `min_gap_ms` after the previously kept
/// event of the same sensor.
#[derive(Debug, Clone)]
pub struct Debounce {
    min_gap_ms: i64,
}

impl Debounce {
    pub fn new(min_gap_ms: i64) -> Self {
        Self { min_gap_ms }
    }
}

impl Preprocessor for Debounce {
    fn name(&self) -> &str {
        "debounce"
    }

    fn apply<'a>(&self, buffer: &'a EventBuffer) -> anyhow::Result<Cow<'a, EventBuffer>> {
        anyhow::ensure!(
            self.min_gap_ms >= 0,
            "debounce gap must not be negative, got {}",
            self.min_gap_ms
        );
        let mut last_kept: BTreeMap<u32, Timestamp> = BTreeMap::new();
        let mut events = Vec::with_capacity(buffer.len());
        for e in buffer.events() {
            let keep = last_kept
                .get(&e.sensor)
                .map_or(true, |t| e.timestamp - t >= self.min_gap_ms);
            if keep {
                last_kept.insert(e.sensor, e.timestamp);
                events.push(*e);
            }
        }
        Ok(Cow::Owned(events.into()))
    }
}
