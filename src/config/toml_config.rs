use crate::config::{Theme, WidgetConfig};
use crate::core::document::DOCUMENT_TIMEOUT;
use crate::core::forecast::{DEFAULT_USER_AGENT, FORECAST_ENDPOINT};
use crate::utils::error::{MeteogramError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    pub url: Option<String>,
    pub svg_code: Option<String>,
    /// Overrides the locationforecast endpoint.
    pub forecast_endpoint: Option<String>,
    /// Per-attempt timeout for direct SVG downloads.
    pub timeout_secs: Option<u64>,
    /// User-Agent for forecast requests, ideally with contact details.
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub interval_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory the last good SVG is written back to.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "./.meteogram".to_string(),
        }
    }
}

fn env_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"))
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(MeteogramError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);
        Ok(toml::from_str(&processed_content)?)
    }

    /// Replaces `${VAR}` with the variable's value; unknown variables are left as written.
    fn substitute_env_vars(content: &str) -> String {
        env_var_regex()
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn validate_config(&self) -> Result<()> {
        if let Some(url) = self.source.url.as_deref().filter(|u| !u.trim().is_empty()) {
            validation::validate_url("source.url", url.trim())?;
        }

        if let Some(endpoint) = &self.source.forecast_endpoint {
            validation::validate_url("source.forecast_endpoint", endpoint)?;
        }

        if let Some(user_agent) = &self.source.user_agent {
            if user_agent.trim().is_empty() {
                return Err(MeteogramError::InvalidConfigValueError {
                    field: "source.user_agent".to_string(),
                    value: user_agent.clone(),
                    reason: "User-Agent cannot be blank".to_string(),
                });
            }
        }

        if let Some(timeout) = self.source.timeout_secs {
            validation::validate_positive_number("source.timeout_secs", timeout, 1)?;
        }

        if self.refresh.enabled {
            validation::validate_positive_number(
                "refresh.interval_minutes",
                self.refresh.interval_minutes,
                1,
            )?;
        }

        validation::validate_path("storage.path", &self.storage.path)?;
        self.theme.validate()
    }

    pub fn forecast_endpoint(&self) -> &str {
        self.source
            .forecast_endpoint
            .as_deref()
            .unwrap_or(FORECAST_ENDPOINT)
    }

    pub fn forecast_user_agent(&self) -> &str {
        self.source
            .user_agent
            .as_deref()
            .map(str::trim)
            .unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn document_timeout(&self) -> Duration {
        self.source
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DOCUMENT_TIMEOUT)
    }

    pub fn storage_path(&self) -> &str {
        &self.storage.path
    }

    pub fn to_widget_config(&self) -> WidgetConfig {
        WidgetConfig {
            source_url: self.source.url.clone(),
            svg_code: self.source.svg_code.clone(),
            auto_refresh_enabled: self.refresh.enabled,
            refresh_interval: self.refresh.interval_minutes,
            theme: self.theme.clone(),
        }
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
