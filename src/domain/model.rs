use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on the number of forecast entries turned into chart points.
pub const MAX_FORECAST_POINTS: usize = 48;

/// Where the document for one acquisition comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Url(String),
    LiteralSvg(String),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub time: DateTime<Utc>,
    /// Air temperature in °C.
    pub temperature: f64,
    /// Wind speed in m/s.
    pub wind_speed: f64,
    pub wind_gust: Option<f64>,
    /// Hourly precipitation in mm.
    pub precipitation: Option<f64>,
}

/// A non-empty, chronologically ordered forecast of at most
/// [`MAX_FORECAST_POINTS`] points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub updated_at: DateTime<Utc>,
    pub points: Vec<ForecastPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredDocument {
    /// Last known good source document; persisted as the fallback of record.
    pub raw_svg: String,
    /// Theme-dependent markup derived from `raw_svg`. Never persisted.
    pub sanitized_html: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    #[default]
    Idle,
    Loading,
    Ready(AcquiredDocument),
    /// The direct-SVG source could not be inlined; embed this URL as an external view.
    Degraded(String),
    Failed(String),
}

impl AcquisitionState {
    pub fn document(&self) -> Option<&AcquiredDocument> {
        match self {
            AcquisitionState::Ready(doc) => Some(doc),
            _ => None,
        }
    }

    /// Whether the state is one an acquisition can end in.
    pub fn is_settled(&self) -> bool {
        !matches!(self, AcquisitionState::Loading)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AcquisitionState::Idle => "idle",
            AcquisitionState::Loading => "loading",
            AcquisitionState::Ready(_) => "ready",
            AcquisitionState::Degraded(_) => "degraded",
            AcquisitionState::Failed(_) => "failed",
        }
    }
}
