use crate::render::{MapSurface, MarkerId, SegmentStyle};
use serde::Serialize;
use shared::models::{BalloonPoint, LatLngBounds, Segment};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
enum Geometry {
    Point { coordinates: Vec<f64> },
    LineString { coordinates: Vec<[f64; 2]> },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct Properties {
    #[serde(skip_serializing_if = "Option::is_none")]
    marker: Option<MarkerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    popup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    opacity: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    geometry: Geometry,
    properties: Properties,
}

#[derive(Serialize)]
struct FeatureCollection<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bbox: Option<[f64; 4]>,
    features: &'a [Feature],
}

/// A map surface that renders into a GeoJSON `FeatureCollection`, for
/// consumption by any web map. Coordinates are `[lon, lat(, alt)]`.
#[derive(Debug, Default)]
pub struct GeoJsonMap {
    features: Vec<Feature>,
    bbox: Option<LatLngBounds>,
    next_marker: MarkerId,
}

impl GeoJsonMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&FeatureCollection {
            kind: "FeatureCollection",
            bbox: self
                .bbox
                .map(|b| [b.sw.lng, b.sw.lat, b.ne.lng, b.ne.lat]),
            features: &self.features,
        })
    }
}

impl MapSurface for GeoJsonMap {
    fn clear(&mut self) {
        self.features.clear();
        self.bbox = None;
    }

    fn add_marker(&mut self, point: &BalloonPoint, popup: &str) -> MarkerId {
        self.next_marker += 1;
        let mut coordinates = vec![point.lon(), point.lat()];
        coordinates.extend(point.alt());
        self.features.push(Feature {
            kind: "Feature",
            geometry: Geometry::Point { coordinates },
            properties: Properties {
                marker: Some(self.next_marker),
                popup: Some(popup.to_string()),
                weight: None,
                opacity: None,
            },
        });
        self.next_marker
    }

    fn add_segment(&mut self, segment: &Segment, style: SegmentStyle) {
        self.features.push(Feature {
            kind: "Feature",
            geometry: Geometry::LineString {
                coordinates: vec![
                    [segment.from.lon(), segment.from.lat()],
                    [segment.to.lon(), segment.to.lat()],
                ],
            },
            properties: Properties {
                marker: None,
                popup: None,
                weight: Some(style.weight),
                opacity: Some(style.opacity),
            },
        });
    }

    fn fit_bounds(&mut self, bounds: LatLngBounds) {
        self.bbox = Some(bounds);
    }

    fn set_popup(&mut self, marker: MarkerId, text: &str) {
        if let Some(feature) = self
            .features
            .iter_mut()
            .find(|f| f.properties.marker == Some(marker))
        {
            feature.properties.popup = Some(text.to_string());
        }
    }
}
