use crate::domain::model::{Coordinates, ForecastSeries};
use crate::utils::error::Result;
use async_trait::async_trait;

/// One forecast attempt: request, decode and normalise.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch_forecast(&self, coords: Coordinates) -> Result<ForecastSeries>;
}

/// One direct-SVG attempt. `attempt` starts at 1.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_document(&self, url: &str, attempt: u32) -> Result<String>;
}

/// Write-back target for the last successfully acquired SVG (`svgCode`).
pub trait ConfigStore: Send + Sync {
    fn read_svg_code(&self) -> impl std::future::Future<Output = Result<Option<String>>> + Send;
    fn write_svg_code(&self, svg: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}
