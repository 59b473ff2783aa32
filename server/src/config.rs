use serde::Deserialize;
use std::time::Duration;

/// Raw upstream snapshot files, e.g. `https://a.windbornesystems.com/treasure/07.json`.
pub const DEFAULT_UPSTREAM: &str = "https://a.windbornesystems.com/treasure";

/// The proxy served by `http` on its default address.
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:3030/api";

pub const DEFAULT_WEATHER_BASE: &str = "https://api.open-meteo.com";

/// How an hour number is turned into an upstream URL.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamLayout {
    /// `{base}/balloons/{hour}`, the layout served by this crate's proxy.
    Api,
    /// `{base}/{hour:02}.json`, the raw upstream files.
    Treasure,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_upstream_layout")]
    pub upstream_layout: UpstreamLayout,
    /// Where the `/api/balloons/{hour}` proxy route reads from.
    #[serde(default = "default_proxy_upstream")]
    pub proxy_upstream: String,
    #[serde(default = "default_weather_base")]
    pub weather_base: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub weather_timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
    /// Hours fetched in parallel when assembling a history. 1 fetches strictly in sequence.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_upstream_layout() -> UpstreamLayout {
    UpstreamLayout::Api
}

fn default_proxy_upstream() -> String {
    DEFAULT_UPSTREAM.to_string()
}

fn default_weather_base() -> String {
    DEFAULT_WEATHER_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_fetch_concurrency() -> usize {
    1
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base: default_api_base(),
            upstream_layout: default_upstream_layout(),
            proxy_upstream: default_proxy_upstream(),
            weather_base: default_weather_base(),
            request_timeout_secs: default_timeout_secs(),
            weather_timeout_secs: default_timeout_secs(),
            max_retries: 0,
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

impl Config {
    /// Read `TRACKER_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("TRACKER_").from_env::<Config>()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn weather_timeout(&self) -> Duration {
        Duration::from_secs(self.weather_timeout_secs)
    }

    pub fn fetch_concurrency(&self) -> usize {
        self.fetch_concurrency.max(1)
    }
}
