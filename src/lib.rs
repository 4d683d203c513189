pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::{cli::LocalStorage, toml_config::TomlConfig, Theme, WidgetConfig};
pub use core::controller::{AcquisitionController, ControllerHandle};
pub use core::{document::DocumentClient, forecast::ForecastClient};
pub use domain::model::{AcquiredDocument, AcquisitionState};
pub use utils::error::{MeteogramError, Result};
