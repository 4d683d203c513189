pub mod cli;
pub mod toml_config;

use crate::domain::model::SourceSpec;
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};

/// Caller-owned widget configuration. Keys follow the card configuration schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetConfig {
    pub source_url: Option<String>,
    /// Literal fallback SVG, also the write-back slot for the last good document.
    pub svg_code: Option<String>,
    pub auto_refresh_enabled: bool,
    /// Minutes between automatic refreshes.
    pub refresh_interval: u64,
    pub theme: Theme,
}

impl WidgetConfig {
    pub fn source_url(&self) -> Option<&str> {
        self.source_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// The configured literal SVG, unless it is blank or only a placeholder comment.
    pub fn literal_svg(&self) -> Option<&str> {
        self.svg_code
            .as_deref()
            .filter(|svg| !is_placeholder_svg(svg))
    }

    pub fn source_spec(&self) -> SourceSpec {
        if let Some(url) = self.source_url() {
            SourceSpec::Url(url.to_string())
        } else if let Some(svg) = self.literal_svg() {
            SourceSpec::LiteralSvg(svg.to_string())
        } else {
            SourceSpec::None
        }
    }

    /// Refresh period, if auto-refresh applies to this configuration.
    pub fn refresh_period(&self) -> Option<std::time::Duration> {
        if self.auto_refresh_enabled && self.refresh_interval > 0 && self.source_url().is_some() {
            Some(std::time::Duration::from_millis(
                self.refresh_interval.saturating_mul(60_000),
            ))
        } else {
            None
        }
    }
}

impl Validate for WidgetConfig {
    fn validate(&self) -> Result<()> {
        if let Some(url) = self.source_url() {
            validation::validate_url("sourceUrl", url)?;
        }
        if self.auto_refresh_enabled {
            validation::validate_positive_number("refreshInterval", self.refresh_interval, 1)?;
        }
        self.theme.validate()
    }
}

fn is_placeholder_svg(svg: &str) -> bool {
    let trimmed = svg.trim();
    if trimmed.is_empty() {
        return true;
    }
    trimmed
        .strip_prefix("<!--")
        .and_then(|rest| rest.strip_suffix("-->"))
        .is_some_and(|inner| !inner.contains("-->"))
}

/// Colours and dimensions the chart renderer and sanitizer honour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Theme {
    pub background_color: String,
    pub text_color: String,
    pub secondary_text_color: String,
    pub grid_color: String,
    pub grid_width: f64,
    pub grid_opacity: f64,
    pub temperature_color: String,
    pub wind_color: String,
    pub gust_color: String,
    pub accent_color: String,
    pub precipitation_color: String,
    pub precipitation_opacity: f64,
    pub line_width: f64,
    // Consumed by the presentation layer only.
    pub logo_color: String,
    pub logo_accent_color: String,
    pub button_color: String,
    pub button_text_color: String,
    pub popup_background_color: String,
    pub popup_text_color: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background_color: "#ffffff".to_string(),
            text_color: "#1f2937".to_string(),
            secondary_text_color: "#6b7280".to_string(),
            grid_color: "#cbd5e1".to_string(),
            grid_width: 1.0,
            grid_opacity: 0.6,
            temperature_color: "#dc2626".to_string(),
            wind_color: "#2563eb".to_string(),
            gust_color: "#60a5fa".to_string(),
            accent_color: "#f59e0b".to_string(),
            precipitation_color: "#0ea5e9".to_string(),
            precipitation_opacity: 0.65,
            line_width: 2.0,
            logo_color: "#1f2937".to_string(),
            logo_accent_color: "#f59e0b".to_string(),
            button_color: "#e5e7eb".to_string(),
            button_text_color: "#1f2937".to_string(),
            popup_background_color: "#ffffff".to_string(),
            popup_text_color: "#1f2937".to_string(),
        }
    }
}

impl Validate for Theme {
    fn validate(&self) -> Result<()> {
        let colors = [
            ("theme.backgroundColor", &self.background_color),
            ("theme.textColor", &self.text_color),
            ("theme.secondaryTextColor", &self.secondary_text_color),
            ("theme.gridColor", &self.grid_color),
            ("theme.temperatureColor", &self.temperature_color),
            ("theme.windColor", &self.wind_color),
            ("theme.gustColor", &self.gust_color),
            ("theme.accentColor", &self.accent_color),
            ("theme.precipitationColor", &self.precipitation_color),
            ("theme.logoColor", &self.logo_color),
            ("theme.logoAccentColor", &self.logo_accent_color),
            ("theme.buttonColor", &self.button_color),
            ("theme.buttonTextColor", &self.button_text_color),
            ("theme.popupBackgroundColor", &self.popup_background_color),
            ("theme.popupTextColor", &self.popup_text_color),
        ];
        for (field, value) in colors {
            validation::validate_color(field, value)?;
        }

        validation::validate_range("theme.gridWidth", self.grid_width, 0.0, 10.0)?;
        validation::validate_range("theme.gridOpacity", self.grid_opacity, 0.0, 1.0)?;
        validation::validate_range(
            "theme.precipitationOpacity",
            self.precipitation_opacity,
            0.0,
            1.0,
        )?;
        validation::validate_range("theme.lineWidth", self.line_width, 0.0, 20.0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_takes_priority_over_literal_svg() {
        let config = WidgetConfig {
            source_url: Some("https://example.com/chart.svg".to_string()),
            svg_code: Some("<svg></svg>".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.source_spec(),
            SourceSpec::Url("https://example.com/chart.svg".to_string())
        );
    }

    #[test]
    fn placeholder_comment_is_not_a_literal_svg() {
        let mut config = WidgetConfig {
            svg_code: Some("  <!-- paste your SVG here -->  ".to_string()),
            ..Default::default()
        };
        assert_eq!(config.source_spec(), SourceSpec::None);

        config.svg_code = Some("<!-- a --><svg></svg><!-- b -->".to_string());
        assert!(matches!(config.source_spec(), SourceSpec::LiteralSvg(_)));

        config.svg_code = Some("   ".to_string());
        assert_eq!(config.source_spec(), SourceSpec::None);
    }

    #[test]
    fn short_comment_fragments_do_not_panic() {
        let mut config = WidgetConfig::default();
        for svg in ["<!-->", "<!--->", "<!---->", "<!-- -->"] {
            config.svg_code = Some(svg.to_string());
            let _ = config.source_spec();
        }

        config.svg_code = Some("<!-->".to_string());
        assert!(matches!(config.source_spec(), SourceSpec::LiteralSvg(_)));
        config.svg_code = Some("<!---->".to_string());
        assert_eq!(config.source_spec(), SourceSpec::None);
    }

    #[test]
    fn blank_url_falls_through() {
        let config = WidgetConfig {
            source_url: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(config.source_spec(), SourceSpec::None);
    }

    #[test]
    fn refresh_period_needs_url_and_positive_interval() {
        let mut config = WidgetConfig {
            source_url: Some("https://example.com".to_string()),
            auto_refresh_enabled: true,
            refresh_interval: 15,
            ..Default::default()
        };
        assert_eq!(
            config.refresh_period(),
            Some(std::time::Duration::from_millis(900_000))
        );

        config.refresh_interval = 0;
        assert_eq!(config.refresh_period(), None);

        config.refresh_interval = 15;
        config.source_url = None;
        assert_eq!(config.refresh_period(), None);
    }

    #[test]
    fn deserializes_camel_case_keys_with_defaults() {
        let config: WidgetConfig = serde_json::from_value(serde_json::json!({
            "sourceUrl": "https://example.com/x",
            "autoRefreshEnabled": true,
            "refreshInterval": 5,
            "theme": { "backgroundColor": "#000000" }
        }))
        .unwrap();

        assert_eq!(config.source_url(), Some("https://example.com/x"));
        assert_eq!(config.refresh_interval, 5);
        assert_eq!(config.theme.background_color, "#000000");
        assert_eq!(config.theme.text_color, Theme::default().text_color);
    }

    #[test]
    fn theme_validation_rejects_bad_opacity() {
        let theme = Theme {
            grid_opacity: 2.0,
            ..Theme::default()
        };
        assert!(theme.validate().is_err());
        assert!(Theme::default().validate().is_ok());
    }
}
