use std::collections::BTreeMap;

use crate::{Activity, Dataset, GroundTruth, Window};

/// Decides which ground-truth activity a training window is labelled with.
pub trait ActivityFetcher: Send {
    fn name(&self) -> &str;

    fn precompute(&mut self, _dataset: &Dataset) -> anyhow::Result<()> {
        Ok(())
    }

    fn fetch(&self, window: &Window<'_>, truth: &GroundTruth) -> Activity;
}

/// Labels a window with the activity at its last event.
#[derive(Debug, Clone, Default)]
pub struct LastEventActivity;

impl ActivityFetcher for LastEventActivity {
    fn name(&self) -> &str {
        "last_event"
    }

    fn fetch(&self, window: &Window<'_>, truth: &GroundTruth) -> Activity {
        truth.activity_at(window.end_time)
    }
}

/// Labels a window with the activity at the midpoint of its time span.
#[derive(Debug, Clone, Default)]
pub struct CenterActivity;

impl ActivityFetcher for CenterActivity {
    fn name(&self) -> &str {
        "center"
    }

    fn fetch(&self, window: &Window<'_>, truth: &GroundTruth) -> Activity {
        truth.activity_at(window.start_time + window.duration_ms() / 2)
    }
}

/// Labels a window with the activity covering most of its events. Ties go to
/// the activity seen first.
#[derive(Debug, Clone, Default)]
pub struct MajorityActivity;

impl ActivityFetcher for MajorityActivity {
    fn name(&self) -> &str {
        "majority"
    }

    fn fetch(&self, window: &Window<'_>, truth: &GroundTruth) -> Activity {
        // activity -> (count, first position)
        let mut votes: BTreeMap<Activity, (usize, usize)> = BTreeMap::new();
        for (pos, e) in window.events.iter().enumerate() {
            votes.entry(truth.activity_at(e.timestamp)).or_insert((0, pos)).0 += 1;
        }
        votes
            .into_iter()
            .max_by(|(_, (ca, pa)), (_, (cb, pb))| ca.cmp(cb).then(pb.cmp(pa)))
            .map(|(activity, _)| activity)
            .unwrap_or(Activity::NONE)
    }
}
