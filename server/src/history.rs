//! Assembles per-hour snapshots into a `History` and holds the current one.

use crate::hours::{HourError, HourSource, HOURS};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use shared::messages::{HistorySummary, SkippedHourReport};
use shared::models::{History, HourSnapshot};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum SkipReason {
    #[error(transparent)]
    Unavailable(HourError),
    #[error("hour {0} reported no balloons")]
    Empty(u8),
}

/// An hour left out of the history, kept for diagnostics.
#[derive(Debug)]
pub struct SkippedHour {
    pub hour: u8,
    pub reason: SkipReason,
}

/// One assembly run: the history plus the hours it had to leave out.
#[derive(Clone, Debug)]
pub struct FetchSummary {
    pub history: Arc<History>,
    pub skipped: Arc<[SkippedHour]>,
}

impl FetchSummary {
    pub fn to_message(&self) -> HistorySummary {
        HistorySummary {
            fetched_at: self.history.fetched_at(),
            hours: self.history.hours(),
            total_points: self.history.total_points(),
            skipped: self
                .skipped
                .iter()
                .map(|s| SkippedHourReport {
                    hour: s.hour,
                    reason: s.reason.to_string(),
                })
                .collect(),
        }
    }
}

pub struct HistoryAssembler<S> {
    source: S,
    concurrency: usize,
}

impl<S> HistoryAssembler<S>
where
    S: HourSource + Sync,
{
    /// `concurrency` bounds the requests in flight; 1 fetches hour after hour.
    pub fn new(source: S, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch every hour once and keep the non-empty ones, in hour order.
    ///
    /// Results are buffered so that completion order never leaks into the
    /// history, whatever the concurrency.
    pub async fn fetch_all_hours(&self) -> FetchSummary {
        let results: Vec<_> = stream::iter(HOURS)
            .map(|hour| async move { (hour, self.source.fetch_hour(hour).await) })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut snapshots = Vec::new();
        let mut skipped = Vec::new();
        for (hour, result) in results {
            match result {
                Ok(points) if points.is_empty() => skipped.push(SkippedHour {
                    hour,
                    reason: SkipReason::Empty(hour),
                }),
                Ok(points) => snapshots.push(HourSnapshot { hour, points }),
                Err(err) => skipped.push(SkippedHour {
                    hour,
                    reason: SkipReason::Unavailable(err),
                }),
            }
        }

        let history = History::new(snapshots, Utc::now());
        log::info!(
            "Fetched {} hours ({} points), skipped {:?}",
            history.len(),
            history.total_points(),
            skipped.iter().map(|s| s.hour).collect::<Vec<_>>()
        );
        if let Some(latest) = history.latest() {
            log::info!("Treating upstream hour {} as the latest snapshot", latest.hour);
        }

        FetchSummary {
            history: Arc::new(history),
            skipped: skipped.into(),
        }
    }
}

/// The history currently shown. A refresh swaps the whole value, so readers
/// see either the previous history or the new one, never a partial one.
#[derive(Default)]
pub struct Session {
    current: RwLock<Option<FetchSummary>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<Arc<History>> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|summary| summary.history.clone())
    }

    /// The current history together with the hours skipped while building it.
    pub async fn summary(&self) -> Option<FetchSummary> {
        self.current.read().await.clone()
    }

    pub async fn replace(&self, summary: FetchSummary) -> FetchSummary {
        *self.current.write().await = Some(summary.clone());
        summary
    }

    /// Assemble a fresh history, then swap it in.
    pub async fn refresh<S>(&self, assembler: &HistoryAssembler<S>) -> FetchSummary
    where
        S: HourSource + Sync,
    {
        let summary = assembler.fetch_all_hours().await;
        self.replace(summary).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use reqwest::StatusCode;
    use shared::models::BalloonPoint;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves canned hours, failing any hour listed in `failing`.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub hours: HashMap<u8, Vec<BalloonPoint>>,
        pub failing: Vec<u8>,
        pub delay: Option<fn(u8) -> Duration>,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
    }

    impl FakeSource {
        pub(crate) fn full_day(points_per_hour: usize) -> Self {
            let hours = HOURS
                .map(|hour| {
                    let points = (0..points_per_hour)
                        .map(|i| BalloonPoint::new(hour as f64, i as f64, None).unwrap())
                        .collect();
                    (hour, points)
                })
                .collect();
            FakeSource {
                hours,
                ..Default::default()
            }
        }
    }

    impl HourSource for FakeSource {
        async fn fetch_hour(&self, hour: u8) -> Result<Vec<BalloonPoint>, HourError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay(hour)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&hour) {
                return Err(HourError::Status {
                    hour,
                    status: StatusCode::BAD_GATEWAY,
                });
            }
            Ok(self.hours.get(&hour).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_history_omits_failed_hour() {
        let source = FakeSource {
            failing: vec![3],
            ..FakeSource::full_day(2)
        };
        let summary = HistoryAssembler::new(source, 1).fetch_all_hours().await;

        assert_eq!(summary.history.len(), 23);
        let expected: Vec<u8> = HOURS.filter(|h| *h != 3).collect();
        assert_eq!(summary.history.hours(), expected);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].hour, 3);
        assert!(matches!(
            summary.skipped[0].reason,
            SkipReason::Unavailable(HourError::Status { hour: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_history_omits_empty_hours() {
        let mut source = FakeSource::full_day(1);
        source.hours.insert(0, vec![]);
        source.hours.remove(&10);
        let summary = HistoryAssembler::new(source, 1).fetch_all_hours().await;

        assert_eq!(summary.history.len(), 22);
        assert_eq!(summary.history.latest().map(|s| s.hour), Some(1));
        let skipped: Vec<u8> = summary.skipped.iter().map(|s| s.hour).collect();
        assert_eq!(skipped, vec![0, 10]);
        assert!(summary
            .skipped
            .iter()
            .all(|s| matches!(s.reason, SkipReason::Empty(h) if h == s.hour)));
    }

    #[tokio::test]
    async fn test_sequential_fetch_has_one_request_in_flight() {
        let source = FakeSource {
            delay: Some(|_| Duration::from_millis(1)),
            ..FakeSource::full_day(1)
        };
        let assembler = HistoryAssembler::new(source, 1);
        assembler.fetch_all_hours().await;
        assert_eq!(assembler.source.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_fetch_preserves_hour_order() {
        // Later hours answer first.
        let source = FakeSource {
            delay: Some(|hour| Duration::from_millis(48 - 2 * hour as u64)),
            ..FakeSource::full_day(1)
        };
        let assembler = HistoryAssembler::new(source, 6);
        let summary = assembler.fetch_all_hours().await;

        assert_eq!(summary.history.hours(), HOURS.collect::<Vec<_>>());
        let max = assembler.source.max_in_flight.load(Ordering::SeqCst);
        assert!(max > 1 && max <= 6, "max in flight was {}", max);
    }

    #[tokio::test]
    async fn test_all_hours_failing_gives_empty_history() {
        let source = FakeSource {
            failing: HOURS.collect(),
            ..FakeSource::full_day(1)
        };
        let summary = HistoryAssembler::new(source, 4).fetch_all_hours().await;
        assert!(summary.history.is_empty());
        assert_eq!(summary.skipped.len(), 24);
    }

    #[tokio::test]
    async fn test_session_refresh_replaces_history() {
        let session = Session::new();
        assert!(session.current().await.is_none());

        let first = session
            .refresh(&HistoryAssembler::new(FakeSource::full_day(1), 1))
            .await
            .history;
        assert_eq!(first.len(), 24);

        let source = FakeSource {
            failing: (1..=23).collect(),
            ..FakeSource::full_day(3)
        };
        session.refresh(&HistoryAssembler::new(source, 1)).await;

        let current = session.current().await.unwrap();
        assert_eq!(current.hours(), vec![0]);
        assert_eq!(current.total_points(), 3);
        // Earlier readers keep the snapshot they were handed.
        assert_eq!(first.len(), 24);

        let summary = session.summary().await.unwrap();
        assert_eq!(summary.skipped.len(), 23);
    }

    #[tokio::test]
    async fn test_summary_message_lists_skipped_hours() {
        let mut source = FakeSource {
            failing: vec![5],
            ..FakeSource::full_day(2)
        };
        source.hours.insert(9, vec![]);
        let message = HistoryAssembler::new(source, 1)
            .fetch_all_hours()
            .await
            .to_message();

        assert_eq!(message.hours.len(), 22);
        assert_eq!(message.total_points, 44);
        assert_eq!(
            message.skipped,
            vec![
                SkippedHourReport {
                    hour: 5,
                    reason: "hour 5 returned HTTP 502 Bad Gateway".to_string(),
                },
                SkippedHourReport {
                    hour: 9,
                    reason: "hour 9 reported no balloons".to_string(),
                },
            ]
        );
    }
}
