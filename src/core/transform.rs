use crate::domain::model::{ForecastPoint, ForecastSeries, MAX_FORECAST_POINTS};
use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// One `timeseries` row. Every field tolerates a wrong type by falling back to its default.
#[derive(Debug, Default, Deserialize)]
struct LfEntry {
    #[serde(default, deserialize_with = "lenient")]
    time: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    data: LfData,
}

#[derive(Debug, Default, Deserialize)]
struct LfData {
    #[serde(default, deserialize_with = "lenient")]
    instant: LfBlock,
    #[serde(default, deserialize_with = "lenient")]
    next_1_hours: Option<LfBlock>,
    #[serde(default, deserialize_with = "lenient")]
    next_6_hours: Option<LfBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct LfBlock {
    #[serde(default, deserialize_with = "lenient")]
    details: LfDetails,
}

#[derive(Debug, Default, Deserialize)]
struct LfDetails {
    #[serde(default, deserialize_with = "lenient")]
    air_temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    wind_speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    wind_speed_of_gust: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    precipitation_amount: Option<f64>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Normalises a locationforecast payload, stamping a missing `updated_at` with now.
pub fn transform(raw: &Value) -> Option<ForecastSeries> {
    transform_at(raw, Utc::now())
}

/// Like [`transform`] with an explicit fallback freshness timestamp.
pub fn transform_at(raw: &Value, now: DateTime<Utc>) -> Option<ForecastSeries> {
    let properties = raw.get("properties")?;

    let updated_at = properties
        .pointer("/meta/updated_at")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .unwrap_or(now);

    let timeseries = properties.get("timeseries")?.as_array()?;
    if timeseries.is_empty() {
        return None;
    }

    let points: Vec<ForecastPoint> = timeseries
        .iter()
        .take(MAX_FORECAST_POINTS)
        .filter_map(to_point)
        .collect();

    if points.is_empty() {
        tracing::debug!("No usable entries among {} timeseries rows", timeseries.len());
        return None;
    }

    Some(ForecastSeries { updated_at, points })
}

/// Entries without a timestamp or numeric instant readings are dropped.
fn to_point(value: &Value) -> Option<ForecastPoint> {
    let entry = LfEntry::deserialize(value).ok()?;
    let time = parse_timestamp(entry.time.as_deref()?)?;

    let instant = &entry.data.instant.details;
    let temperature = instant.air_temperature.filter(|t| t.is_finite())?;
    let wind_speed = instant.wind_speed.filter(|w| w.is_finite())?;

    let next_1 = entry.data.next_1_hours.as_ref().map(|b| &b.details);
    let next_6 = entry.data.next_6_hours.as_ref().map(|b| &b.details);

    let wind_gust = instant
        .wind_speed_of_gust
        .or_else(|| next_1.and_then(|d| d.wind_speed_of_gust))
        .or_else(|| next_6.and_then(|d| d.wind_speed_of_gust));

    let precipitation = next_1
        .and_then(|d| d.precipitation_amount)
        .or_else(|| next_6.and_then(|d| d.precipitation_amount).map(|mm| mm / 6.0));

    Some(ForecastPoint {
        time,
        temperature,
        wind_speed,
        wind_gust,
        precipitation,
    })
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
