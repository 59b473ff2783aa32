use crate::config::Config;
use crate::history::{HistoryAssembler, Session};
use crate::hours::HourFetcher;
use crate::trail::{build_trail, latest_only, IndexMatcher, TrailError};
use crate::weather::{report, WeatherClient};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shared::messages::ErrorMessage;
use shared::models::RenderModel;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::header::{HeaderValue, CONTENT_TYPE};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

const HOME_TEXT: &str = "Backend is running. Try /api/balloons/0";

/// Relays raw upstream hour files, e.g. `{upstream}/07.json`.
#[derive(Clone, Debug)]
pub struct Proxy {
    client: reqwest::Client,
    upstream: String,
}

impl Proxy {
    pub fn new(config: &Config) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            upstream: config.proxy_upstream.trim_end_matches('/').to_string(),
        })
    }

    pub fn upstream_url(&self, hour: u8) -> String {
        format!("{}/{:02}.json", self.upstream, hour)
    }

    async fn fetch(&self, hour: u8) -> reqwest::Result<(u16, Bytes)> {
        let response = self
            .client
            .get(self.upstream_url(hour))
            .send()
            .await?
            .error_for_status()?;
        let status = response.status().as_u16();
        Ok((status, response.bytes().await?))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub assembler: Arc<HistoryAssembler<HourFetcher>>,
    pub weather: WeatherClient,
    pub proxy: Proxy,
}

impl AppState {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            session: Arc::new(Session::new()),
            assembler: Arc::new(HistoryAssembler::new(
                HourFetcher::new(config)?,
                config.fetch_concurrency(),
            )),
            weather: WeatherClient::new(&config.weather_base, config.weather_timeout())?,
            proxy: Proxy::new(config)?,
        })
    }
}

pub async fn run(address: std::net::SocketAddr, config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;

    let session = state.session.clone();
    let assembler = state.assembler.clone();
    tokio::spawn(async move {
        let summary = session.refresh(&assembler).await;
        log::info!(
            "Initial history loaded: {} hours, {} skipped",
            summary.history.len(),
            summary.skipped.len()
        );
    });

    log::info!("Listening on http://{}", address);
    warp::serve(routes(state)).run(address).await;
    Ok(())
}

pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let home_route = warp::path::end().and(warp::get()).map(|| HOME_TEXT);

    let balloons_route = warp::path!("api" / "balloons" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(balloons);

    let history_route = warp::path!("api" / "history")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(history);

    let latest_route = warp::path!("api" / "latest")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(latest);

    let trail_route = warp::path!("api" / "trail")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(trail);

    let weather_route = warp::path!("api" / "weather")
        .and(warp::get())
        .and(warp::query::<WeatherQuery>())
        .and(with_state(state.clone()))
        .and_then(weather);

    let refresh_route = warp::path!("api" / "refresh")
        .and(warp::post())
        .and(with_state(state))
        .and_then(refresh);

    home_route
        .or(balloons_route)
        .or(history_route)
        .or(latest_route)
        .or(trail_route)
        .or(weather_route)
        .or(refresh_route)
        .recover(rejection)
        .with(warp::reply::with::header("Access-Control-Allow-Origin", "*"))
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn parse_hour(raw: &str) -> Result<u8, &'static str> {
    let hour: i64 = raw
        .trim()
        .parse()
        .map_err(|_| "hour must be an integer between 0 and 23")?;
    if !(0..=23).contains(&hour) {
        return Err("hour must be between 0 and 23");
    }
    Ok(hour as u8)
}

async fn balloons(raw_hour: String, state: AppState) -> Result<Response, Rejection> {
    let hour = match parse_hour(&raw_hour) {
        Ok(hour) => hour,
        Err(message) => return Ok(json_error(StatusCode::BAD_REQUEST, message, None)),
    };

    match state.proxy.fetch(hour).await {
        Ok((status, body)) => {
            let mut response = Response::new(body.into());
            *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Ok(response)
        }
        Err(e) => {
            log::warn!("Upstream fetch for hour {} failed: {}", hour, e);
            Ok(json_error(
                StatusCode::BAD_GATEWAY,
                "Failed to fetch from WindBorne",
                Some(e.to_string()),
            ))
        }
    }
}

async fn history(state: AppState) -> Result<Response, Rejection> {
    match state.session.summary().await {
        Some(summary) => Ok(json_reply(&summary.to_message())),
        None => Ok(json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            &TrailError::EmptyHistory.to_string(),
            None,
        )),
    }
}

async fn latest(state: AppState) -> Result<Response, Rejection> {
    let history = state.session.current().await;
    Ok(model_reply(
        history
            .as_deref()
            .map_or(Err(TrailError::EmptyHistory), latest_only),
    ))
}

async fn trail(state: AppState) -> Result<Response, Rejection> {
    let history = state.session.current().await;
    Ok(model_reply(
        history
            .as_deref()
            .map_or(Err(TrailError::EmptyHistory), |h| build_trail(h, &IndexMatcher)),
    ))
}

#[derive(Debug, Deserialize)]
struct WeatherQuery {
    lat: f64,
    lon: f64,
}

async fn weather(query: WeatherQuery, state: AppState) -> Result<Response, Rejection> {
    if !query.lat.is_finite() || !query.lon.is_finite() {
        return Ok(json_error(
            StatusCode::BAD_REQUEST,
            "lat and lon must be finite numbers",
            None,
        ));
    }
    let result = state.weather.fetch_weather(query.lat, query.lon).await;
    Ok(json_reply(&report(result)))
}

async fn refresh(state: AppState) -> Result<Response, Rejection> {
    let summary = state.session.refresh(&state.assembler).await;
    Ok(json_reply(&summary.to_message()))
}

fn model_reply(result: Result<RenderModel, TrailError>) -> Response {
    match result {
        Ok(model) => json_reply(&model),
        Err(e) => json_error(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    }
}

fn json_reply<T: Serialize>(value: &T) -> Response {
    warp::reply::json(value).into_response()
}

fn json_error(status: StatusCode, error: &str, details: Option<String>) -> Response {
    let message = ErrorMessage {
        error: error.to_string(),
        details,
    };
    warp::reply::with_status(warp::reply::json(&message), status).into_response()
}

pub async fn rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found.")
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid query string.")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed.")
    } else {
        log::error!("Error: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
    };

    Ok(json_error(code, message, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamLayout;
    use crate::history::{FetchSummary, SkipReason, SkippedHour};
    use shared::models::History;
    use chrono::Utc;
    use serde_json::{json, Value};
    use shared::models::{BalloonPoint, HourSnapshot};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state(upstream: &str) -> AppState {
        let config = Config {
            api_base: upstream.to_string(),
            upstream_layout: UpstreamLayout::Treasure,
            proxy_upstream: upstream.to_string(),
            weather_base: upstream.to_string(),
            request_timeout_secs: 2,
            weather_timeout_secs: 2,
            ..Config::default()
        };
        AppState::from_config(&config).unwrap()
    }

    fn body_json(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    fn p(lat: f64, lon: f64) -> BalloonPoint {
        BalloonPoint::new(lat, lon, None).unwrap()
    }

    #[test]
    fn test_parse_hour() {
        assert_eq!(parse_hour("0"), Ok(0));
        assert_eq!(parse_hour("07"), Ok(7));
        assert_eq!(parse_hour("23"), Ok(23));
        assert_eq!(parse_hour("24"), Err("hour must be between 0 and 23"));
        assert_eq!(parse_hour("-1"), Err("hour must be between 0 and 23"));
        assert_eq!(
            parse_hour("abc"),
            Err("hour must be an integer between 0 and 23")
        );
    }

    #[tokio::test]
    async fn test_home() {
        let res = warp::test::request()
            .path("/")
            .reply(&routes(state("http://127.0.0.1:9")))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body().as_ref(), HOME_TEXT.as_bytes());
        assert_eq!(res.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn test_balloons_rejects_bad_hours() {
        let routes = routes(state("http://127.0.0.1:9"));
        for (hour, message) in [
            ("24", "hour must be between 0 and 23"),
            ("abc", "hour must be an integer between 0 and 23"),
        ] {
            let res = warp::test::request()
                .path(&format!("/api/balloons/{}", hour))
                .reply(&routes)
                .await;
            assert_eq!(res.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_json(res.body()), json!({ "error": message }));
            assert_eq!(res.headers()["access-control-allow-origin"], "*");
        }
    }

    #[tokio::test]
    async fn test_balloons_relays_upstream_body() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/07.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[[1.5, 2.5, 10]]"))
            .mount(&upstream)
            .await;

        let res = warp::test::request()
            .path("/api/balloons/7")
            .reply(&routes(state(&upstream.uri())))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["content-type"], "application/json");
        assert_eq!(res.headers()["access-control-allow-origin"], "*");
        assert_eq!(res.body().as_ref(), b"[[1.5, 2.5, 10]]");
    }

    #[tokio::test]
    async fn test_balloons_upstream_failure_is_bad_gateway() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&upstream)
            .await;

        let res = warp::test::request()
            .path("/api/balloons/3")
            .reply(&routes(state(&upstream.uri())))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(res.body());
        assert_eq!(body["error"], "Failed to fetch from WindBorne");
        assert!(body["details"].is_string());
    }

    #[tokio::test]
    async fn test_trail_before_any_history() {
        let routes = routes(state("http://127.0.0.1:9"));
        for route in ["/api/latest", "/api/trail", "/api/history"] {
            let res = warp::test::request().path(route).reply(&routes).await;
            assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    #[tokio::test]
    async fn test_latest_and_trail_from_session() {
        let state = state("http://127.0.0.1:9");
        state
            .session
            .replace(FetchSummary {
                history: Arc::new(History::new(
                    vec![
                        HourSnapshot {
                            hour: 0,
                            points: vec![p(1.0, 2.0), p(3.0, 4.0)],
                        },
                        HourSnapshot {
                            hour: 1,
                            points: vec![p(5.0, 6.0)],
                        },
                    ],
                    Utc::now(),
                )),
                skipped: vec![SkippedHour {
                    hour: 2,
                    reason: SkipReason::Empty(2),
                }]
                .into(),
            })
            .await;
        let routes = routes(state);

        let res = warp::test::request().path("/api/latest").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            body_json(res.body()),
            json!({
                "markers": [{"lat": 1.0, "lon": 2.0}, {"lat": 3.0, "lon": 4.0}],
                "segments": []
            })
        );

        let res = warp::test::request().path("/api/trail").reply(&routes).await;
        assert_eq!(
            body_json(res.body())["segments"],
            json!([{"from": {"lat": 1.0, "lon": 2.0}, "to": {"lat": 5.0, "lon": 6.0}}])
        );

        let res = warp::test::request().path("/api/history").reply(&routes).await;
        let body = body_json(res.body());
        assert_eq!(body["hours"], json!([0, 1]));
        assert_eq!(body["totalPoints"], 3);
        assert_eq!(
            body["skipped"],
            json!([{"hour": 2, "reason": "hour 2 reported no balloons"}])
        );
    }

    #[tokio::test]
    async fn test_refresh_fetches_upstream_hours() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/00.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[[1, 1], [2, 2]]"))
            .mount(&upstream)
            .await;
        Mock::given(method("GET"))
            .and(path("/01.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[[1.1, 1.1]]"))
            .mount(&upstream)
            .await;

        let state = state(&upstream.uri());
        let routes = routes(state.clone());

        let res = warp::test::request()
            .method("POST")
            .path("/api/refresh")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res.body())["hours"], json!([0, 1]));

        let current = state.session.current().await.unwrap();
        assert_eq!(current.total_points(), 3);
    }

    #[tokio::test]
    async fn test_weather_unavailable() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&upstream)
            .await;

        let res = warp::test::request()
            .path("/api/weather?lat=10.5&lon=-20")
            .reply(&routes(state(&upstream.uri())))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            body_json(res.body()),
            json!({"available": false, "summary": "Weather unavailable"})
        );
    }

    #[tokio::test]
    async fn test_weather_requires_coordinates() {
        let res = warp::test::request()
            .path("/api/weather?lat=10.5")
            .reply(&routes(state("http://127.0.0.1:9")))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let res = warp::test::request()
            .path("/api/nope")
            .reply(&routes(state("http://127.0.0.1:9")))
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
