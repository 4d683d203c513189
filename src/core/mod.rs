pub mod chart;
pub mod controller;
pub mod coordinates;
pub mod document;
pub mod forecast;
pub mod sanitize;
pub mod transform;

pub use crate::domain::model::{AcquiredDocument, AcquisitionState, ForecastSeries};
pub use crate::domain::ports::{ConfigStore, DocumentSource, ForecastSource};
pub use crate::utils::error::Result;
