//! Synthetic weather forecasts and the summaries payload.

use chrono::{Days, Local, NaiveDate};
use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::{FORECAST_DAYS, MAX_TEMPERATURE_C, MIN_TEMPERATURE_C, WEATHER_SUMMARIES};

/// One day's forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeatherForecast {
    pub date: NaiveDate,
    pub temperature_c: i32,
    pub temperature_f: i32,
    pub summary: Option<String>,
}

impl WeatherForecast {
    pub fn new(date: NaiveDate, temperature_c: i32, summary: Option<String>) -> Self {
        Self {
            date,
            temperature_c,
            temperature_f: fahrenheit(temperature_c),
            summary,
        }
    }

    /// Random forecasts for the days following `today`.
    pub fn generate<R: Rng + ?Sized>(today: NaiveDate, rng: &mut R) -> Vec<Self> {
        (1..=FORECAST_DAYS as u64)
            .filter_map(|offset| today.checked_add_days(Days::new(offset)))
            .map(|date| {
                let temperature_c = rng.gen_range(MIN_TEMPERATURE_C..MAX_TEMPERATURE_C);
                let summary = WEATHER_SUMMARIES[rng.gen_range(0..WEATHER_SUMMARIES.len())];
                Self::new(date, temperature_c, Some(summary.to_string()))
            })
            .collect()
    }

    /// Forecasts for the next days, starting tomorrow (local time).
    pub fn forecast() -> Vec<Self> {
        Self::generate(Local::now().date_naive(), &mut rand::thread_rng())
    }
}

/// `32 + C / 0.5556`, truncated.
pub fn fahrenheit(celsius: i32) -> i32 {
    32 + (f64::from(celsius) / 0.5556) as i32
}

/// Payload of the summaries endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SummariesResponse {
    pub summaries: Vec<String>,
    pub id: i32,
    pub name: Option<String>,
}

impl SummariesResponse {
    pub fn new(id: i32, name: Option<String>) -> Self {
        Self {
            summaries: WEATHER_SUMMARIES.iter().map(|s| s.to_string()).collect(),
            id,
            name,
        }
    }
}
