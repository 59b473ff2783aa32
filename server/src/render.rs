//! Drives a map widget from the current history.
//!
//! The widget itself lives outside this crate and is reached through
//! `MapSurface`. `Controller` owns the session, redraws on user actions and
//! routes weather lookups to marker popups.

use crate::history::{HistoryAssembler, Session};
use crate::hours::HourSource;
use crate::trail::{build_trail, latest_only, IndexMatcher, TrailError, TrailMatcher};
use crate::weather::WeatherClient;
use crate::weather_tasks::{PopupUpdate, WeatherTasks};
use shared::models::{BalloonPoint, History, LatLngBounds, RenderModel, Segment};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub type MarkerId = u64;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentStyle {
    pub weight: f64,
    pub opacity: f64,
}

pub const TRAIL_STYLE: SegmentStyle = SegmentStyle {
    weight: 2.0,
    opacity: 0.6,
};

/// Share of the drawn extent added on each side when fitting the viewport.
pub const FIT_PADDING: f64 = 0.05;

pub const LOADING_TEXT: &str = "Loading weather...";

pub trait MapSurface {
    fn clear(&mut self);
    fn add_marker(&mut self, point: &BalloonPoint, popup: &str) -> MarkerId;
    fn add_segment(&mut self, segment: &Segment, style: SegmentStyle);
    fn fit_bounds(&mut self, bounds: LatLngBounds);
    fn set_popup(&mut self, marker: MarkerId, text: &str);
}

pub fn marker_popup(point: &BalloonPoint) -> String {
    match point.alt() {
        Some(alt) => format!(
            "Lat {:.3}, Lon {:.3}, Alt {:.2} km",
            point.lat(),
            point.lon(),
            alt
        ),
        None => format!("Lat {:.3}, Lon {:.3}", point.lat(), point.lon()),
    }
}

pub struct Controller<M, S> {
    map: M,
    session: Arc<Session>,
    assembler: HistoryAssembler<S>,
    matcher: Box<dyn TrailMatcher + Send + Sync>,
    weather: WeatherTasks,
    updates: mpsc::UnboundedReceiver<PopupUpdate>,
    markers: HashMap<MarkerId, BalloonPoint>,
}

impl<M, S> Controller<M, S>
where
    M: MapSurface,
    S: HourSource + Sync,
{
    pub fn new(
        map: M,
        session: Arc<Session>,
        assembler: HistoryAssembler<S>,
        weather: WeatherClient,
    ) -> Self {
        let (weather, updates) = WeatherTasks::new(weather);
        Self {
            map,
            session,
            assembler,
            matcher: Box::new(IndexMatcher),
            weather,
            updates,
            markers: HashMap::new(),
        }
    }

    pub fn with_matcher(mut self, matcher: impl TrailMatcher + Send + Sync + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    pub async fn refresh(&self) -> Arc<History> {
        self.session.refresh(&self.assembler).await.history
    }

    pub async fn show_latest(&mut self) -> Result<RenderModel, TrailError> {
        let history = self.session.current().await.ok_or(TrailError::EmptyHistory)?;
        let model = latest_only(&history)?;
        self.draw(&model);
        Ok(model)
    }

    pub async fn show_trail(&mut self) -> Result<RenderModel, TrailError> {
        let history = self.session.current().await.ok_or(TrailError::EmptyHistory)?;
        let model = build_trail(&history, self.matcher.as_ref())?;
        self.draw(&model);
        Ok(model)
    }

    fn draw(&mut self, model: &RenderModel) {
        // Markers are about to be destroyed, their lookups with them.
        let pending = self.weather.in_flight();
        if pending > 0 {
            log::debug!("Redraw discards {} pending weather lookups", pending);
        }
        self.weather.cancel_all();
        while self.updates.try_recv().is_ok() {}
        self.markers.clear();
        self.map.clear();

        for point in &model.markers {
            let id = self.map.add_marker(point, &marker_popup(point));
            self.markers.insert(id, *point);
        }
        for segment in &model.segments {
            self.map.add_segment(segment, TRAIL_STYLE);
        }
        if let Some(bounds) = model.bounds() {
            self.map.fit_bounds(bounds.padded(FIT_PADDING));
        }
    }

    /// Start a weather lookup for a marker. Returns false for unknown markers.
    pub fn marker_clicked(&mut self, marker: MarkerId) -> bool {
        let Some(point) = self.markers.get(&marker).copied() else {
            return false;
        };
        self.map.set_popup(marker, LOADING_TEXT);
        self.weather.request(marker, point.lat(), point.lon());
        true
    }

    /// Copy resolved lookups into popups. Updates requested before the last
    /// redraw, or for markers that no longer exist, are dropped.
    pub fn apply_weather_updates(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.updates.try_recv() {
            if update.generation != self.weather.generation() {
                continue;
            }
            let Some(point) = self.markers.get(&update.marker) else {
                continue;
            };
            let text = format!("{}\n{}", marker_popup(point), update.report.summary);
            self.map.set_popup(update.marker, &text);
            applied += 1;
        }
        applied
    }

    pub fn map(&self) -> &M {
        &self.map
    }
}
