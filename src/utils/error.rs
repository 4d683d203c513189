use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeteogramError {
    #[error("Invalid SVG content")]
    InvalidSvg,

    #[error("no SVG element found")]
    NoSvgElement,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed with status {status}")]
    Status { status: u16 },

    #[error("Forecast contained no usable data points")]
    EmptyResult,

    #[error("Gave up after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Parse,
    Transport,
    EmptyResult,
    ExhaustedRetries,
    Configuration,
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl MeteogramError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidSvg | Self::NoSvgElement => ErrorCategory::Parse,
            Self::Http(_) | Self::Status { .. } => ErrorCategory::Transport,
            Self::EmptyResult => ErrorCategory::EmptyResult,
            Self::ExhaustedRetries { .. } => ErrorCategory::ExhaustedRetries,
            Self::SerializationError(_) => ErrorCategory::Parse,
            Self::TomlError(_)
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            Self::IoError(_) => ErrorCategory::Io,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Parse => ErrorSeverity::Low,
            ErrorCategory::Transport | ErrorCategory::EmptyResult => ErrorSeverity::Medium,
            ErrorCategory::ExhaustedRetries | ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Io => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::InvalidSvg | Self::NoSvgElement => "Invalid SVG content".to_string(),
            Self::EmptyResult | Self::ExhaustedRetries { .. } => {
                "Unable to load forecast data.".to_string()
            }
            Self::Http(_) | Self::Status { .. } => "Unable to reach the data source.".to_string(),
            Self::SerializationError(_) => {
                "The data source returned data that could not be read.".to_string()
            }
            Self::TomlError(_)
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => format!("Configuration problem: {}", self),
            Self::IoError(_) => "A file could not be read or written.".to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Parse => "Check that the source URL points to an SVG or an HTML page containing one",
            ErrorCategory::Transport | ErrorCategory::EmptyResult => {
                "Check network connectivity and that the source URL is reachable"
            }
            ErrorCategory::ExhaustedRetries => "Try again later or configure a fallback svgCode",
            ErrorCategory::Configuration => "Fix the configuration file and run again",
            ErrorCategory::Io => "Check file permissions and available disk space",
        }
    }
}

pub type Result<T> = std::result::Result<T, MeteogramError>;
