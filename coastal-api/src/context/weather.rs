//! National Weather Service client.
//!
//! NWS needs no API key but requires a custom User-Agent and a two-step
//! lookup: coordinates resolve to a grid point, the grid point links to the
//! forecast endpoints. Failures bubble up so the caller can omit the weather
//! context block instead of fabricating data.

use chrono::{DateTime, Duration, Local, NaiveDate};
use coastal_common::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_BASE_URL: &str = "https://api.weather.gov";
const USER_AGENT: &str = "CoastalPrepApp/1.0 (disaster preparedness service)";
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Days of forecast returned, counting today.
const FORECAST_DAYS: i64 = 6;

/// Weather summary injected into the chatbot context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherReport {
    pub current: CurrentConditions,
    pub location: String,
    pub current_date: String,
    pub forecast: Vec<ForecastDay>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detailed_forecast: String,
    pub is_daytime: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: String,
    pub is_today: bool,
    pub temp_max: i64,
    pub temp_min: i64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind: Option<String>,
}

// NWS wire types

#[derive(Debug, Deserialize)]
struct PointsResponse {
    properties: PointsProperties,
}

#[derive(Debug, Deserialize)]
struct PointsProperties {
    forecast: Option<String>,
    #[serde(rename = "forecastHourly")]
    forecast_hourly: Option<String>,
    #[serde(rename = "relativeLocation")]
    relative_location: Option<RelativeLocation>,
}

#[derive(Debug, Deserialize)]
struct RelativeLocation {
    properties: RelativeLocationProperties,
}

#[derive(Debug, Deserialize)]
struct RelativeLocationProperties {
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    properties: ForecastProperties,
}

#[derive(Debug, Deserialize)]
struct ForecastProperties {
    #[serde(default)]
    periods: Vec<ForecastPeriod>,
}

#[derive(Debug, Clone, Deserialize)]
struct ForecastPeriod {
    #[serde(rename = "startTime")]
    start_time: Option<String>,
    temperature: Option<i64>,
    #[serde(rename = "windSpeed")]
    wind_speed: Option<String>,
    #[serde(rename = "windDirection")]
    wind_direction: Option<String>,
    #[serde(rename = "shortForecast")]
    short_forecast: Option<String>,
    #[serde(rename = "detailedForecast")]
    detailed_forecast: Option<String>,
    #[serde(rename = "isDaytime", default = "default_true")]
    is_daytime: bool,
}

fn default_true() -> bool {
    true
}

/// Client for the NWS forecast API.
pub struct WeatherClient {
    client: Client,
    base_url: String,
}

impl WeatherClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the forecast for a location.
    pub async fn forecast(&self, lat: f64, lng: f64) -> Result<WeatherReport> {
        let points_url = format!("{}/points/{},{}", self.base_url, lat, lng);
        let points: PointsResponse = self.get_json(&points_url).await?;

        let forecast_url = points
            .properties
            .forecast
            .ok_or_else(|| Error::External("No forecast URL available".into()))?;

        let forecast: ForecastResponse = self.get_json(&forecast_url).await?;
        if forecast.properties.periods.is_empty() {
            return Err(Error::External("Empty forecast".into()));
        }

        // Hourly gives better "right now" conditions; fall back to the
        // first daily period if it fails.
        let mut current_period = forecast.properties.periods[0].clone();
        if let Some(hourly_url) = points.properties.forecast_hourly {
            if let Ok(hourly) = self.get_json::<ForecastResponse>(&hourly_url).await {
                if let Some(first) = hourly.properties.periods.into_iter().next() {
                    current_period = first;
                }
            }
        }

        let location = points
            .properties
            .relative_location
            .and_then(|l| l.properties.city)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| format!("Location ({:.2}, {:.2})", lat, lng));

        Ok(build_report(
            forecast.properties.periods,
            current_period,
            location,
            Local::now().date_naive(),
        ))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::External(format!("Weather request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::External(format!(
                "Weather API returned {}",
                response.status()
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| Error::External(format!("Weather response parse failed: {}", e)))
    }
}

impl Default for WeatherClient {
    fn default() -> Self {
        Self::new()
    }
}

struct DailyPeriods {
    day: Option<ForecastPeriod>,
    night: Option<ForecastPeriod>,
}

/// Group the half-day NWS periods into calendar days, today through
/// today + 5, and shape the report.
fn build_report(
    periods: Vec<ForecastPeriod>,
    current_period: ForecastPeriod,
    location: String,
    today: NaiveDate,
) -> WeatherReport {
    let max_date = today + Duration::days(FORECAST_DAYS - 1);
    let mut daily: BTreeMap<NaiveDate, DailyPeriods> = BTreeMap::new();

    for period in periods {
        let Some(start) = &period.start_time else {
            continue;
        };
        let Ok(dt) = DateTime::parse_from_rfc3339(start) else {
            continue;
        };
        let date = dt.with_timezone(&Local).date_naive();
        if date < today || date > max_date {
            continue;
        }
        let slot = daily.entry(date).or_insert(DailyPeriods {
            day: None,
            night: None,
        });
        if period.is_daytime {
            slot.day = Some(period);
        } else {
            slot.night = Some(period);
        }
    }

    let forecast = daily
        .into_iter()
        .filter_map(|(date, slot)| {
            let lead = slot.day.as_ref().or(slot.night.as_ref())?;
            let temp_max = slot
                .day
                .as_ref()
                .and_then(|p| p.temperature)
                .or_else(|| slot.night.as_ref().and_then(|p| p.temperature))
                .unwrap_or(0);
            let temp_min = slot
                .night
                .as_ref()
                .and_then(|p| p.temperature)
                .or(lead.temperature)
                .unwrap_or(0);
            Some(ForecastDay {
                date: date.format("%Y-%m-%d").to_string(),
                is_today: date == today,
                temp_max,
                temp_min,
                description: lead.short_forecast.clone().unwrap_or_default(),
                wind: lead.wind_speed.clone(),
            })
        })
        .collect();

    WeatherReport {
        current: CurrentConditions {
            temp: current_period.temperature.unwrap_or(0),
            wind_speed: current_period.wind_speed,
            wind_direction: current_period.wind_direction,
            description: current_period.short_forecast.unwrap_or_default(),
            detailed_forecast: current_period.detailed_forecast.unwrap_or_default(),
            is_daytime: current_period.is_daytime,
        },
        location,
        current_date: today.format("%Y-%m-%d").to_string(),
        forecast,
    }
}
