//! Turns a `History` into what the map draws: latest markers plus segments
//! linking each balloon to its position in the next retained hour.
//!
//! Upstream exposes no balloon identifier, so the default matcher pairs
//! points by their index in each snapshot. That only holds while upstream
//! keeps a stable ordering; if balloons are added, dropped or reordered,
//! segments connect unrelated balloons. `TrailMatcher` lets an ID-based
//! strategy replace it.

use shared::models::{History, HourSnapshot, RenderModel, Segment};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum TrailError {
    #[error("no balloon history available")]
    EmptyHistory,
}

/// Decides which point of `next` is the same balloon as a point of `current`.
pub trait TrailMatcher {
    fn segments(&self, current: &HourSnapshot, next: &HourSnapshot) -> Vec<Segment>;
}

/// Pairs index `i` with index `i`. Indices missing from `next` are skipped.
#[derive(Clone, Copy, Debug, Default)]
pub struct IndexMatcher;

impl TrailMatcher for IndexMatcher {
    fn segments(&self, current: &HourSnapshot, next: &HourSnapshot) -> Vec<Segment> {
        current
            .points
            .iter()
            .zip(next.points.iter())
            .map(|(from, to)| Segment {
                from: *from,
                to: *to,
            })
            .collect()
    }
}

/// Markers for the latest snapshot only.
pub fn latest_only(history: &History) -> Result<RenderModel, TrailError> {
    let latest = history.latest().ok_or(TrailError::EmptyHistory)?;
    Ok(RenderModel {
        markers: latest.points.clone(),
        segments: Vec::new(),
    })
}

/// Latest markers plus segments between every pair of consecutive snapshots.
pub fn build_trail<M>(history: &History, matcher: &M) -> Result<RenderModel, TrailError>
where
    M: TrailMatcher + ?Sized,
{
    let mut model = latest_only(history)?;
    model.segments = history
        .snapshots()
        .windows(2)
        .flat_map(|pair| matcher.segments(&pair[0], &pair[1]))
        .collect();
    Ok(model)
}
