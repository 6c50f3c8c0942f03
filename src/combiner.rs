//! Reconciliation of per-window predictions into an activity timeline.
//!
//! The combiner turns one prediction per window into a minimal,
//! time-ordered, non-overlapping sequence of activity intervals:
//!
//! 1. predictions are grouped by activity, in order of first appearance;
//! 2. within a group, overlapping or touching intervals are merged;
//! 3. consecutive windows that share a non-background activity and whose
//!    source events are adjacent get the time gap between them bridged;
//! 4. all groups are cut at every boundary point of the union;
//! 5. where pieces share a start, the earliest-ending piece wins, then the
//!    earlier group;
//! 6. touching pieces of the same activity are joined back together.
//!
//! Instantaneous intervals (windows holding a single timestamp) are kept
//! only where no interval of positive length covers that instant.
//!
//! The result depends only on the input order, never on hashing.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Activity, PipelineError, Result, Timestamp, Window};

/// The classifier's verdict for one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictedInterval {
    pub activity: Activity,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// Half-open index range of the events the window was built from.
    pub source: Range<usize>,
}

impl PredictedInterval {
    pub fn new(
        activity: Activity,
        start_time: Timestamp,
        end_time: Timestamp,
        source: Range<usize>,
    ) -> Self {
        Self {
            activity,
            start_time,
            end_time,
            source,
        }
    }

    pub fn from_window(window: &Window<'_>, activity: Activity) -> Self {
        Self::new(activity, window.start_time, window.end_time, window.source())
    }
}

/// One entry of the reconciled activity timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledInterval {
    pub activity: Activity,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
}

impl ReconciledInterval {
    pub fn contains(&self, t: Timestamp) -> bool {
        self.start_time <= t && t <= self.end_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityCombiner {
    background: Activity,
    gap_fix: bool,
}

impl Default for ActivityCombiner {
    fn default() -> Self {
        Self {
            background: Activity::NONE,
            gap_fix: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Piece {
    activity: Activity,
    start: Timestamp,
    end: Timestamp,
    group: usize,
}

impl ActivityCombiner {
    pub fn new(background: Activity, gap_fix: bool) -> Self {
        Self {
            background,
            gap_fix,
        }
    }

    pub fn background(&self) -> Activity {
        self.background
    }

    pub fn gap_fix(&self) -> bool {
        self.gap_fix
    }

    /// Reduces per-window predictions, given in window order, to a
    /// reconciled timeline sorted by start time.
    ///
    /// With gap-fix enabled, `source` ranges decide which time gaps get
    /// bridged: two consecutive same-activity predictions whose sources
    /// touch are treated as one run. Feeding a reconciled timeline back in
    /// therefore returns it unchanged only when the re-fed intervals carry
    /// non-adjacent sources. Adjacent sources would bridge separate
    /// same-activity intervals into one.
    pub fn combine(&self, windows: &[PredictedInterval]) -> Result<Vec<ReconciledInterval>> {
        if let Some((index, w)) = windows
            .iter()
            .enumerate()
            .find(|(_, w)| w.start_time > w.end_time)
        {
            return Err(PipelineError::MalformedInterval {
                index,
                start: w.start_time,
                end: w.end_time,
            });
        }

        let mut groups = group_by_activity(windows);
        if self.gap_fix {
            self.bridge_gaps(windows, &mut groups);
        }

        let pieces: Vec<Piece> = groups
            .into_iter()
            .enumerate()
            .flat_map(|(group, (activity, spans))| {
                merge_spans(spans).into_iter().map(move |(start, end)| Piece {
                    activity,
                    start,
                    end,
                    group,
                })
            })
            .collect();

        let timeline = coalesce(resolve(split(pieces)));
        debug!(
            windows = windows.len(),
            intervals = timeline.len(),
            "combined predictions"
        );
        Ok(timeline)
    }

    fn bridge_gaps(
        &self,
        windows: &[PredictedInterval],
        groups: &mut [(Activity, Vec<(Timestamp, Timestamp)>)],
    ) {
        for pair in windows.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.activity != next.activity || prev.activity == self.background {
                continue;
            }
            let adjacent = next.source.start <= prev.source.end;
            if adjacent && prev.end_time < next.start_time {
                if let Some((_, spans)) = groups.iter_mut().find(|(a, _)| *a == prev.activity) {
                    spans.push((prev.end_time, next.start_time));
                }
            }
        }
    }
}

fn group_by_activity(
    windows: &[PredictedInterval],
) -> Vec<(Activity, Vec<(Timestamp, Timestamp)>)> {
    let mut groups: Vec<(Activity, Vec<(Timestamp, Timestamp)>)> = Vec::new();
    for w in windows {
        let span = (w.start_time, w.end_time);
        match groups.iter_mut().find(|(a, _)| *a == w.activity) {
            Some((_, spans)) => spans.push(span),
            None => groups.push((w.activity, vec![span])),
        }
    }
    groups
}

/// Merges overlapping or touching closed ranges. The merged range starts at
/// the earliest start and ends at the latest end.
fn merge_spans(mut spans: Vec<(Timestamp, Timestamp)>) -> Vec<(Timestamp, Timestamp)> {
    spans.sort_by_key(|s| s.0);
    let mut merged: Vec<(Timestamp, Timestamp)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Cuts every positive-length piece at every boundary point of the union.
fn split(pieces: Vec<Piece>) -> Vec<Piece> {
    let mut cuts: Vec<Timestamp> = pieces.iter().flat_map(|p| [p.start, p.end]).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut out = Vec::with_capacity(pieces.len());
    for p in pieces {
        if p.start == p.end {
            out.push(p);
            continue;
        }
        let mut from = p.start;
        let first = cuts.partition_point(|c| *c <= p.start);
        for &cut in cuts[first..].iter().take_while(|c| **c <= p.end) {
            out.push(Piece {
                start: from,
                end: cut,
                ..p
            });
            from = cut;
        }
    }
    out
}

/// Keeps one piece per start time: the earliest-ending, then the earliest group.
fn first_per_start(mut pieces: Vec<Piece>) -> Vec<Piece> {
    pieces.sort_by_key(|p| (p.start, p.end, p.group));
    pieces.dedup_by_key(|p| p.start);
    pieces
}

fn resolve(pieces: Vec<Piece>) -> Vec<Piece> {
    let (spans, points): (Vec<Piece>, Vec<Piece>) =
        pieces.into_iter().partition(|p| p.start < p.end);
    let mut spans = first_per_start(spans);

    let covered = |t: Timestamp, spans: &[Piece]| {
        let idx = spans.partition_point(|s| s.start <= t);
        idx > 0 && spans[idx - 1].end >= t
    };
    let points: Vec<Piece> = first_per_start(points)
        .into_iter()
        .filter(|p| !covered(p.start, &spans))
        .collect();

    spans.extend(points);
    spans.sort_by_key(|p| (p.start, p.end));
    spans
}

fn coalesce(pieces: Vec<Piece>) -> Vec<ReconciledInterval> {
    let mut out: Vec<ReconciledInterval> = Vec::with_capacity(pieces.len());
    for p in pieces {
        match out.last_mut() {
            Some(last) if last.activity == p.activity && last.end_time == p.start => {
                last.end_time = p.end;
            }
            _ => out.push(ReconciledInterval {
                activity: p.activity,
                start_time: p.start,
                end_time: p.end,
            }),
        }
    }
    out
}
