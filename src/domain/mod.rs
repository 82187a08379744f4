//! Domain layer - Core entities returned by the demo endpoints.

pub mod weather;

pub use weather::{fahrenheit, SummariesResponse, WeatherForecast};
