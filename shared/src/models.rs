use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single balloon position. `lat` and `lon` are always finite, `alt` is
/// either finite or absent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BalloonPoint {
    lat: f64,
    lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    alt: Option<f64>,
}

impl BalloonPoint {
    /// Returns `None` when either coordinate is not finite. A non-finite
    /// altitude is dropped rather than rejecting the point.
    pub fn new(lat: f64, lon: f64, alt: Option<f64>) -> Option<Self> {
        if !lat.is_finite() || !lon.is_finite() {
            return None;
        }
        Some(Self {
            lat,
            lon,
            alt: alt.filter(|a| a.is_finite()),
        })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn alt(&self) -> Option<f64> {
        self.alt
    }

    /// The upstream record shape: `[lat, lon]` or `[lat, lon, alt]`.
    pub fn to_record(&self) -> Vec<f64> {
        match self.alt {
            Some(alt) => vec![self.lat, self.lon, alt],
            None => vec![self.lat, self.lon],
        }
    }
}

/// Positions reported for one upstream hour. Point order is significant:
/// it is the only key used to follow a balloon from one hour to the next.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HourSnapshot {
    pub hour: u8,
    pub points: Vec<BalloonPoint>,
}

/// Retained snapshots in fetch order. Missing hours are omitted, so two
/// neighbouring entries are not necessarily neighbouring hours.
///
/// Index 0 is treated as the latest snapshot because upstream hour `0` is
/// assumed to be the most recent one. Nothing verifies that assumption.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    snapshots: Vec<HourSnapshot>,
    #[serde(with = "ts_milliseconds")]
    fetched_at: DateTime<Utc>,
}

impl History {
    pub fn new(snapshots: Vec<HourSnapshot>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            snapshots,
            fetched_at,
        }
    }

    pub fn snapshots(&self) -> &[HourSnapshot] {
        &self.snapshots
    }

    pub fn latest(&self) -> Option<&HourSnapshot> {
        self.snapshots.first()
    }

    pub fn hours(&self) -> Vec<u8> {
        self.snapshots.iter().map(|s| s.hour).collect()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn total_points(&self) -> usize {
        self.snapshots.iter().map(|s| s.points.len()).sum()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Current conditions at a point, as returned by Open-Meteo.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct WeatherReading {
    pub temperature_2m: f64,
    pub wind_speed_10m: f64,
    pub weather_code: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Segment {
    pub from: BalloonPoint,
    pub to: BalloonPoint,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RenderModel {
    pub markers: Vec<BalloonPoint>,
    pub segments: Vec<Segment>,
}

impl RenderModel {
    /// Every point the model draws, markers first.
    pub fn points(&self) -> impl Iterator<Item = &BalloonPoint> {
        self.markers
            .iter()
            .chain(self.segments.iter().flat_map(|s| [&s.from, &s.to]))
    }

    pub fn bounds(&self) -> Option<LatLngBounds> {
        LatLngBounds::around(self.points())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct LatLngBounds {
    pub sw: LatLng,
    pub ne: LatLng,
}

impl LatLngBounds {
    pub fn around<'a>(points: impl IntoIterator<Item = &'a BalloonPoint>) -> Option<Self> {
        points.into_iter().fold(None, |acc, p| {
            let bounds = match acc {
                None => LatLngBounds {
                    sw: LatLng {
                        lat: p.lat,
                        lng: p.lon,
                    },
                    ne: LatLng {
                        lat: p.lat,
                        lng: p.lon,
                    },
                },
                Some(b) => LatLngBounds {
                    sw: LatLng {
                        lat: b.sw.lat.min(p.lat),
                        lng: b.sw.lng.min(p.lon),
                    },
                    ne: LatLng {
                        lat: b.ne.lat.max(p.lat),
                        lng: b.ne.lng.max(p.lon),
                    },
                },
            };
            Some(bounds)
        })
    }

    /// Grow each side by `ratio` of the span, clamped to valid coordinates.
    pub fn padded(&self, ratio: f64) -> Self {
        let lat_pad = (self.ne.lat - self.sw.lat) * ratio;
        let lng_pad = (self.ne.lng - self.sw.lng) * ratio;
        LatLngBounds {
            sw: LatLng {
                lat: (self.sw.lat - lat_pad).max(-90.0),
                lng: (self.sw.lng - lng_pad).max(-180.0),
            },
            ne: LatLng {
                lat: (self.ne.lat + lat_pad).min(90.0),
                lng: (self.ne.lng + lng_pad).min(180.0),
            },
        }
    }
}
