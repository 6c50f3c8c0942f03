use std::collections::BTreeSet;

use anyhow::Context;

use crate::{Dataset, Window};

pub type FeatureVector = Vec<f32>;

/// Turns a window of events into a fixed-length feature vector.
pub trait FeatureExtractor: Send {
    fn name(&self) -> &str;

    fn precompute(&mut self, _dataset: &Dataset) -> anyhow::Result<()> {
        Ok(())
    }

    fn extract(&self, window: &Window<'_>) -> anyhow::Result<FeatureVector>;
}

/// Share of the window's events reported by each sensor.
///
/// The sensor set is learned from the training data; sensors first seen
/// later are ignored.
#[derive(Debug, Clone, Default)]
pub struct SensorCounts {
    sensors: Option<usize>,
}

impl SensorCounts {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureExtractor for SensorCounts {
    fn name(&self) -> &str {
        "sensor_counts"
    }

    fn precompute(&mut self, dataset: &Dataset) -> anyhow::Result<()> {
        self.sensors = Some(dataset.sensor_count());
        Ok(())
    }

    fn extract(&self, window: &Window<'_>) -> anyhow::Result<FeatureVector> {
        let sensors = self.sensors.context("sensor_counts used before precompute")?;
        weighted_counts(window, sensors, |_| 1.0)
    }
}

/// Like [`SensorCounts`], but each event is weighted by a Hamming window
/// over its position, so events in the middle of the window count most.
#[derive(Debug, Clone, Default)]
pub struct TaperedSensorCounts {
    sensors: Option<usize>,
}

impl TaperedSensorCounts {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureExtractor for TaperedSensorCounts {
    fn name(&self) -> &str {
        "tapered_sensor_counts"
    }

    fn precompute(&mut self, dataset: &Dataset) -> anyhow::Result<()> {
        self.sensors = Some(dataset.sensor_count());
        Ok(())
    }

    fn extract(&self, window: &Window<'_>) -> anyhow::Result<FeatureVector> {
        let sensors = self
            .sensors
            .context("tapered_sensor_counts used before precompute")?;
        // The Hamming formula is undefined for fewer than two points and
        // zeroes both ends for two, so short windows are weighted uniformly.
        let co_effs: Vec<f32> = if window.len() < 3 {
            vec![1.0; window.len()]
        } else {
            apodize::hamming_iter(window.len())
                .map(|x| x as f32)
                .collect()
        };
        weighted_counts(window, sensors, |i| co_effs[i])
    }
}

fn weighted_counts(
    window: &Window<'_>,
    sensors: usize,
    weight: impl Fn(usize) -> f32,
) -> anyhow::Result<FeatureVector> {
    let mut out = vec![0f32; sensors];
    let mut total = 0f32;
    for (i, e) in window.events.iter().enumerate() {
        let w = weight(i);
        total += w;
        if let Some(slot) = out.get_mut(e.sensor as usize) {
            *slot += w;
        }
    }
    if total > 0.0 {
        out.iter_mut().for_each(|v| *v /= total);
    }
    Ok(out)
}

/// Coarse shape of a window: duration in seconds, event count, distinct
/// sensors, mean reported value and the last sensor id.
#[derive(Debug, Clone, Default)]
pub struct WindowSummary;

impl FeatureExtractor for WindowSummary {
    fn name(&self) -> &str {
        "window_summary"
    }

    fn extract(&self, window: &Window<'_>) -> anyhow::Result<FeatureVector> {
        let last = window.events.last().context("empty window")?;
        let distinct: BTreeSet<u32> = window.events.iter().map(|e| e.sensor).collect();
        let mean = window.events.iter().map(|e| e.value).sum::<f32>() / window.len() as f32;
        Ok(vec![
            window.duration_ms() as f32 / 1000.0,
            window.len() as f32,
            distinct.len() as f32,
            mean,
            last.sensor as f32,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventBuffer, FixedEventWindow, GroundTruth, SensorEvent, Segmenter};

    fn events(sensors: &[u32]) -> EventBuffer {
        sensors
            .iter()
            .enumerate()
            .map(|(i, s)| SensorEvent::new(*s, i as i64 * 500, 1.0))
            .collect::<Vec<_>>()
            .into()
    }

    fn extract_first(extractor: &mut dyn FeatureExtractor, buf: &EventBuffer) -> FeatureVector {
        extractor
            .precompute(&Dataset::new(buf.clone(), GroundTruth::default()))
            .unwrap();
        let policy = FixedEventWindow::new(buf.len());
        let mut seg = Segmenter::new(&policy);
        let window = seg.next_window(buf).unwrap().unwrap();
        extractor.extract(&window).unwrap()
    }

    #[test]
    fn test_sensor_counts() {
        let buf = events(&[0, 2, 2, 1]);
        let out = extract_first(&mut SensorCounts::new(), &buf);
        assert_eq!(out, vec![0.25, 0.25, 0.5]);
    }

    #[test]
    fn test_sensor_counts_requires_precompute() {
        let buf = events(&[0]);
        let policy = FixedEventWindow::new(1);
        let mut seg = Segmenter::new(&policy);
        let window = seg.next_window(&buf).unwrap().unwrap();
        assert!(SensorCounts::new().extract(&window).is_err());
    }

    #[test]
    fn test_tapered_counts_favour_centre() {
        let buf = events(&[0, 0, 1, 0, 0]);
        let out = extract_first(&mut TaperedSensorCounts::new(), &buf);
        assert_eq!(out.len(), 2);
        assert!((out.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        // One central event outweighs a fifth of the mass.
        assert!(out[1] > 0.2);
    }

    #[test]
    fn test_tapered_counts_short_window() {
        let buf = events(&[1, 0]);
        let out = extract_first(&mut TaperedSensorCounts::new(), &buf);
        assert_eq!(out, vec![0.5, 0.5]);
    }

    #[test]
    fn test_window_summary() {
        let buf = events(&[3, 1, 3]);
        let out = extract_first(&mut WindowSummary, &buf);
        assert_eq!(out, vec![1.0, 3.0, 2.0, 1.0, 3.0]);
    }
}
