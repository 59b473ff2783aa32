//! Current conditions from Open-Meteo, fetched on demand for one point.

use reqwest::StatusCode;
use serde::Deserialize;
use shared::messages::WeatherReport;
use shared::models::WeatherReading;
use std::time::Duration;
use thiserror::Error;

pub const UNAVAILABLE_TEXT: &str = "Weather unavailable";

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("weather service returned HTTP {0}")]
    Status(StatusCode),
    #[error("weather response is malformed: {0}")]
    Body(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: WeatherReading,
}

/// Open-Meteo client. No caching and no retries: every call is one request.
#[derive(Clone, Debug)]
pub struct WeatherClient {
    client: reqwest::Client,
    base_url: String,
}

impl WeatherClient {
    pub fn new(base_url: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn forecast_url(&self, lat: f64, lon: f64) -> String {
        format!(
            "{}/v1/forecast?latitude={}&longitude={}&current=temperature_2m,wind_speed_10m,weather_code&wind_speed_unit=ms",
            self.base_url, lat, lon
        )
    }

    pub async fn fetch_weather(&self, lat: f64, lon: f64) -> Result<WeatherReading, WeatherError> {
        self.try_fetch(lat, lon)
            .await
            .inspect_err(|err| log::warn!("Weather lookup at ({}, {}) failed: {}", lat, lon, err))
    }

    async fn try_fetch(&self, lat: f64, lon: f64) -> Result<WeatherReading, WeatherError> {
        let response = self.client.get(self.forecast_url(lat, lon)).send().await?;

        if !response.status().is_success() {
            return Err(WeatherError::Status(response.status()));
        }

        let body = response.bytes().await?;
        let forecast: ForecastResponse = serde_json::from_slice(&body)?;
        Ok(forecast.current)
    }
}

/// WMO weather interpretation codes as used by Open-Meteo.
pub fn describe_weather_code(code: i32) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Freezing drizzle",
        61 => "Light rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Freezing rain",
        71 => "Light snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        77 => "Snow grains",
        80 => "Light rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Light snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with light hail",
        99 => "Thunderstorm with hail",
        _ => "Unknown conditions",
    }
}

/// Popup text for a lookup, with the fallback message on failure.
pub fn popup_text(result: &Result<WeatherReading, WeatherError>) -> String {
    match result {
        Ok(reading) => format!(
            "{}, {:.1}°C, wind {:.1} m/s",
            describe_weather_code(reading.weather_code),
            reading.temperature_2m,
            reading.wind_speed_10m
        ),
        Err(_) => UNAVAILABLE_TEXT.to_string(),
    }
}

pub fn report(result: Result<WeatherReading, WeatherError>) -> WeatherReport {
    let summary = popup_text(&result);
    WeatherReport {
        available: result.is_ok(),
        reading: result.ok(),
        summary,
    }
}
