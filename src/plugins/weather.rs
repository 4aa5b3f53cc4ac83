//! Weather at the node's GPS position from Open-Meteo (no API key needed).

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use log::warn;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::http::HttpClient;
use crate::config::WeatherConfig;
use crate::plugin::{state_of, GpsLocation, NodeContext, Plugin, PluginMetadata, PluginResponse, PluginState};

const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";
const SERVICE: &str = "weather service";

/// WMO weather interpretation code to short text.
pub fn wmo_description(code: u16) -> &'static str {
    match code {
        0 => "Clear",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Foggy",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow",
        73 => "Moderate snow",
        75 => "Heavy snow",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown",
    }
}

/// Eight-point compass direction for a bearing in degrees.
pub fn degrees_to_cardinal(degrees: f64) -> &'static str {
    const DIRECTIONS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    let index = (degrees.rem_euclid(360.0) / 45.0).round() as usize % 8;
    DIRECTIONS[index]
}

#[derive(Debug, Deserialize)]
pub struct CurrentResponse {
    pub current: Current,
}

#[derive(Debug, Deserialize)]
pub struct Current {
    pub temperature_2m: f64,
    pub relative_humidity_2m: f64,
    pub weather_code: u16,
    pub wind_speed_10m: f64,
    pub wind_direction_10m: f64,
}

#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    pub daily: Daily,
}

#[derive(Debug, Deserialize)]
pub struct Daily {
    pub time: Vec<String>,
    pub weather_code: Vec<u16>,
    pub temperature_2m_max: Vec<f64>,
    pub temperature_2m_min: Vec<f64>,
}

pub fn format_current(current: &Current) -> String {
    format!(
        "Current Weather:\n{}\nTemp: {:.1}C\nHumidity: {:.0}%\nWind: {:.0}km/h {}",
        wmo_description(current.weather_code),
        current.temperature_2m,
        current.relative_humidity_2m,
        current.wind_speed_10m,
        degrees_to_cardinal(current.wind_direction_10m)
    )
}

pub fn format_forecast(daily: &Daily) -> String {
    let mut out = String::from("3-Day Forecast:");
    for (i, date) in daily.time.iter().take(3).enumerate() {
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(|d| d.format("%a").to_string())
            .unwrap_or_else(|_| date.clone());
        let condition = daily.weather_code.get(i).map(|c| wmo_description(*c)).unwrap_or("?");
        let low = daily
            .temperature_2m_min
            .get(i)
            .map(|t| format!("{:.0}", t))
            .unwrap_or_else(|| "?".into());
        let high = daily
            .temperature_2m_max
            .get(i)
            .map(|t| format!("{:.0}", t))
            .unwrap_or_else(|| "?".into());
        out.push_str(&format!("\n{}: {} {}-{}C", day, condition, low, high));
    }
    out
}

pub struct WeatherPlugin {
    metadata: PluginMetadata,
    http: HttpClient,
}

impl WeatherPlugin {
    pub fn from_config(config: &WeatherConfig) -> Result<Self> {
        Ok(Self {
            metadata: PluginMetadata::new("Weather", "GPS-based weather", 3, &["!forecast", "!refresh"])?,
            http: HttpClient::new(Duration::from_secs(config.timeout_seconds))?,
        })
    }

    fn position_state(location: &GpsLocation) -> PluginState {
        state_of([
            ("last_lat", json!(location.latitude)),
            ("last_lon", json!(location.longitude)),
        ])
    }

    async fn current(&self, location: &GpsLocation) -> PluginResponse {
        let query = [
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            (
                "current",
                "temperature_2m,relative_humidity_2m,weather_code,wind_speed_10m,wind_direction_10m".to_string(),
            ),
            ("temperature_unit", "celsius".to_string()),
            ("wind_speed_unit", "kmh".to_string()),
        ];
        match self.http.get_json::<CurrentResponse>(OPEN_METEO_URL, &query).await {
            Ok(data) => PluginResponse::with_state(format_current(&data.current), Self::position_state(location)),
            Err(e) => {
                warn!("Open-Meteo current weather failed: {}", e);
                PluginResponse::reply(e.user_message(SERVICE))
            }
        }
    }

    async fn forecast(&self, location: &GpsLocation) -> PluginResponse {
        let query = [
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("daily", "weather_code,temperature_2m_max,temperature_2m_min".to_string()),
            ("temperature_unit", "celsius".to_string()),
            ("forecast_days", "3".to_string()),
        ];
        match self.http.get_json::<ForecastResponse>(OPEN_METEO_URL, &query).await {
            Ok(data) => PluginResponse::with_state(format_forecast(&data.daily), Self::position_state(location)),
            Err(e) => {
                warn!("Open-Meteo forecast failed: {}", e);
                PluginResponse::reply(e.user_message(SERVICE))
            }
        }
    }
}

#[async_trait]
impl Plugin for WeatherPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn welcome_message(&self) -> String {
        "Weather Service\nSend any text for current weather.\nSend !help for commands".to_string()
    }

    fn help_text(&self) -> String {
        "Weather Commands:\n!refresh - Current weather\n!forecast - 3-day forecast\n!help - Show this help\n!exit - Return to menu".to_string()
    }

    async fn handle(&self, message: &str, context: &NodeContext, _state: &PluginState) -> Result<PluginResponse> {
        let Some(location) = context.location else {
            return Ok(PluginResponse::reply(
                "No GPS location available. Enable GPS on your device.",
            ));
        };
        let response = if message.trim().eq_ignore_ascii_case("!forecast") {
            self.forecast(&location).await
        } else {
            self.current(&location).await
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinal_directions_wrap() {
        assert_eq!(degrees_to_cardinal(0.0), "N");
        assert_eq!(degrees_to_cardinal(44.0), "NE");
        assert_eq!(degrees_to_cardinal(180.0), "S");
        assert_eq!(degrees_to_cardinal(350.0), "N");
        assert_eq!(degrees_to_cardinal(-90.0), "W");
    }

    #[test]
    fn unknown_wmo_code() {
        assert_eq!(wmo_description(61), "Slight rain");
        assert_eq!(wmo_description(42), "Unknown");
    }

    #[test]
    fn formats_current_conditions() {
        let current = Current {
            temperature_2m: 12.34,
            relative_humidity_2m: 80.0,
            weather_code: 3,
            wind_speed_10m: 14.6,
            wind_direction_10m: 225.0,
        };
        assert_eq!(
            format_current(&current),
            "Current Weather:\nOvercast\nTemp: 12.3C\nHumidity: 80%\nWind: 15km/h SW"
        );
    }

    #[test]
    fn formats_forecast_with_day_names() {
        let daily = Daily {
            time: vec!["2024-06-03".into(), "2024-06-04".into(), "bad-date".into()],
            weather_code: vec![0, 95],
            temperature_2m_max: vec![21.4, 18.0, 17.0],
            temperature_2m_min: vec![10.2, 9.0, 8.0],
        };
        assert_eq!(
            format_forecast(&daily),
            "3-Day Forecast:\nMon: Clear 10-21C\nTue: Thunderstorm 9-18C\nbad-date: ? 8-17C"
        );
    }

    #[tokio::test]
    async fn missing_location_is_reported() {
        let plugin = WeatherPlugin::from_config(&WeatherConfig::default()).unwrap();
        let now = chrono::Utc::now();
        let context = NodeContext {
            node_id: "!a".into(),
            node_name: None,
            location: None,
            session_created_at: now,
            session_last_active_at: now,
        };
        let response = plugin.handle("", &context, &PluginState::new()).await.unwrap();
        assert!(response.message.starts_with("No GPS location"));
        assert!(response.plugin_state_patch.is_none());
    }
}
