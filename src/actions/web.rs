//! Online lookups: current weather and Wikipedia summaries.
//!
//! Both actions fetch public APIs that need no key: Open-Meteo for
//! geocoding and forecasts, and the Wikipedia REST summary endpoint.
//! Network failures are captured as action failures and relayed to
//! the engine, never propagated.

use super::{Action, ActionContext, ActionError, ParamKind, ParamSpec};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const WIKIPEDIA_SUMMARY_URL: &str = "https://en.wikipedia.org/api/rest_v1/page/summary";
const USER_AGENT: &str = concat!("iris/", env!("CARGO_PKG_VERSION"));

/// Current weather for a named location, via Open-Meteo.
pub struct WeatherAction {
    client: reqwest::Client,
}

impl WeatherAction {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WeatherAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Action for WeatherAction {
    fn name(&self) -> &'static str {
        "get_weather"
    }

    fn description(&self) -> &'static str {
        "Get the current weather for a location"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &[ParamSpec {
            name: "location",
            kind: ParamKind::String,
            description: "City or location name",
            required: true,
        }]
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        _ctx: &ActionContext,
    ) -> Result<Value, ActionError> {
        let location = args["location"].as_str().unwrap_or_default();
        // Geocoding matches best on a bare city name.
        let city = location.split(',').next().unwrap_or(location).trim();

        let geo = self
            .fetch(
                self.client
                    .get(GEOCODING_URL)
                    .query(&[("name", city), ("count", "1")]),
            )
            .await?;
        let place = geocoded(&geo)
            .ok_or_else(|| ActionError::failed(format!("could not find location: {location}")))?;

        let forecast = self
            .fetch(self.client.get(FORECAST_URL).query(&[
                ("latitude", place.latitude.to_string().as_str()),
                ("longitude", place.longitude.to_string().as_str()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,weather_code,wind_speed_10m",
                ),
                ("temperature_unit", "celsius"),
            ]))
            .await?;
        weather_report(&place.name, &forecast)
    }
}

impl WeatherAction {
    async fn fetch(&self, request: reqwest::RequestBuilder) -> Result<Value, ActionError> {
        let response = request
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| ActionError::failed(format!("weather lookup failed: {e}")))?
            .error_for_status()
            .map_err(|e| ActionError::failed(format!("weather lookup failed: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| ActionError::failed(format!("weather lookup failed: {e}")))
    }
}

struct Place {
    name: String,
    latitude: f64,
    longitude: f64,
}

/// Best geocoding match, or `None` when the API found nothing.
fn geocoded(geo: &Value) -> Option<Place> {
    let place = geo.get("results")?.as_array()?.first()?;
    Some(Place {
        name: place.get("name")?.as_str()?.to_owned(),
        latitude: place.get("latitude")?.as_f64()?,
        longitude: place.get("longitude")?.as_f64()?,
    })
}

/// Folds a forecast response into the spoken-friendly result shape.
fn weather_report(name: &str, forecast: &Value) -> Result<Value, ActionError> {
    let current = forecast
        .get("current")
        .ok_or_else(|| ActionError::failed("forecast response had no current conditions"))?;
    let code = current
        .get("weather_code")
        .and_then(Value::as_i64)
        .unwrap_or(-1);
    Ok(json!({
        "location": name,
        "temperature": current.get("temperature_2m").cloned().unwrap_or(Value::Null),
        "humidity": current.get("relative_humidity_2m").cloned().unwrap_or(Value::Null),
        "condition": condition(code),
        "wind_speed": current.get("wind_speed_10m").cloned().unwrap_or(Value::Null),
    }))
}

/// WMO weather code to a plain-English condition.
fn condition(code: i64) -> String {
    let label = match code {
        0 => "clear sky",
        1 => "mainly clear",
        2 => "partly cloudy",
        3 => "overcast",
        45 => "foggy",
        48 => "depositing rime fog",
        51 => "light drizzle",
        53 => "moderate drizzle",
        55 => "dense drizzle",
        61 => "slight rain",
        63 => "moderate rain",
        65 => "heavy rain",
        71 => "slight snow",
        73 => "moderate snow",
        75 => "heavy snow",
        80 => "slight rain showers",
        81 => "moderate rain showers",
        82 => "violent rain showers",
        95 => "thunderstorm",
        96 => "thunderstorm with slight hail",
        99 => "thunderstorm with heavy hail",
        other => return format!("code {other}"),
    };
    label.to_owned()
}

/// Short topic summary from the Wikipedia REST API.
pub struct WikipediaSummaryAction {
    client: reqwest::Client,
}

impl WikipediaSummaryAction {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WikipediaSummaryAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Action for WikipediaSummaryAction {
    fn name(&self) -> &'static str {
        "wikipedia_summary"
    }

    fn description(&self) -> &'static str {
        "Get a short summary about a topic from Wikipedia"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &[ParamSpec {
            name: "topic",
            kind: ParamKind::String,
            description: "Topic to look up",
            required: true,
        }]
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        _ctx: &ActionContext,
    ) -> Result<Value, ActionError> {
        let topic = args["topic"].as_str().unwrap_or_default();
        let url = format!("{WIKIPEDIA_SUMMARY_URL}/{}", urlencoding::encode(topic));
        let data: Value = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| ActionError::failed(format!("wikipedia lookup failed: {e}")))?
            .error_for_status()
            .map_err(|e| ActionError::failed(format!("wikipedia lookup failed: {e}")))?
            .json()
            .await
            .map_err(|e| ActionError::failed(format!("wikipedia lookup failed: {e}")))?;
        Ok(summary_report(topic, &data))
    }
}

/// Folds a summary response into the result shape, with fallbacks for
/// pages that carry no extract.
fn summary_report(topic: &str, data: &Value) -> Value {
    json!({
        "title": data.get("title").and_then(Value::as_str).unwrap_or(topic),
        "summary": data
            .get("extract")
            .and_then(Value::as_str)
            .unwrap_or("No summary available."),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn geocoded_takes_the_first_result() {
        let geo = json!({
            "results": [
                {"name": "London", "latitude": 51.5, "longitude": -0.12},
                {"name": "London", "latitude": 42.98, "longitude": -81.25},
            ]
        });
        let place = geocoded(&geo).unwrap();
        assert_eq!(place.name, "London");
        assert!((place.latitude - 51.5).abs() < 1e-9);
    }

    #[test]
    fn geocoded_empty_results_is_none() {
        assert!(geocoded(&json!({"results": []})).is_none());
        assert!(geocoded(&json!({})).is_none());
    }

    #[test]
    fn weather_report_reads_current_conditions() {
        let forecast = json!({
            "current": {
                "temperature_2m": 17.3,
                "relative_humidity_2m": 62,
                "weather_code": 61,
                "wind_speed_10m": 11.5,
            }
        });
        let report = weather_report("Cardiff", &forecast).unwrap();
        assert_eq!(report["location"], "Cardiff");
        assert_eq!(report["temperature"], 17.3);
        assert_eq!(report["condition"], "slight rain");
        assert_eq!(report["wind_speed"], 11.5);
    }

    #[test]
    fn weather_report_without_current_block_fails() {
        assert!(weather_report("Nowhere", &json!({})).is_err());
    }

    #[test]
    fn unknown_weather_code_reports_the_code() {
        assert_eq!(condition(0), "clear sky");
        assert_eq!(condition(99), "thunderstorm with heavy hail");
        assert_eq!(condition(42), "code 42");
    }

    #[test]
    fn summary_report_falls_back_when_extract_is_missing() {
        let full = json!({"title": "Rust", "extract": "A systems language."});
        let report = summary_report("rust", &full);
        assert_eq!(report["title"], "Rust");
        assert_eq!(report["summary"], "A systems language.");

        let bare = summary_report("rust", &json!({}));
        assert_eq!(bare["title"], "rust");
        assert_eq!(bare["summary"], "No summary available.");
    }
}
