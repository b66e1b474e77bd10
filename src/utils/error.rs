use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("DMI API returned {status}: {message}")]
    ApiStatusError { status: u16, message: String },

    #[error("NetCDF error: {0}")]
    NetCdfError(#[from] netcdf::Error),

    #[error("GeoTIFF encoding error: {0}")]
    TiffError(#[from] tiff::TiffError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid forecast data: {message}")]
    InvalidDataError { message: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Ingestion failed for parameters: {}", failed.join(", "))]
    PartialFailureError { failed: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Data,
    Storage,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IngestError {
    pub fn invalid_data(message: impl Into<String>) -> Self {
        IngestError::InvalidDataError {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        IngestError::StorageError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            IngestError::ApiError(_) | IngestError::ApiStatusError { .. } => {
                ErrorCategory::Network
            }
            IngestError::NetCdfError(_)
            | IngestError::TiffError(_)
            | IngestError::InvalidDataError { .. } => ErrorCategory::Data,
            IngestError::ConfigError { .. }
            | IngestError::MissingConfigError { .. }
            | IngestError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            IngestError::StorageError { .. } | IngestError::PartialFailureError { .. } => {
                ErrorCategory::Storage
            }
            IngestError::IoError(_)
            | IngestError::SerializationError(_)
            | IngestError::TaskError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network | ErrorCategory::Storage => ErrorSeverity::Medium,
            ErrorCategory::Data | ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// 暫時性錯誤 (5xx、429、逾時) 才值得重試
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestError::ApiError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            IngestError::ApiStatusError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            IngestError::ApiStatusError { status: 401, .. }
            | IngestError::ApiStatusError { status: 403, .. } => {
                "Check that DMI_API_KEY is valid for the forecast EDR API"
            }
            IngestError::ApiStatusError { status: 400, .. }
            | IngestError::ApiStatusError { status: 404, .. } => {
                "Check COLLECTION, PARAMETERS and BBOX against the DMI collection metadata"
            }
            IngestError::ApiError(_) | IngestError::ApiStatusError { .. } => {
                "The DMI API is unreachable or overloaded; retry later or raise RETRY_ATTEMPTS"
            }
            IngestError::NetCdfError(_) | IngestError::InvalidDataError { .. } => {
                "The payload could not be interpreted; verify the parameter exists in the collection"
            }
            IngestError::TiffError(_) => "Raster encoding failed; check the forecast grid size",
            IngestError::ConfigError { .. }
            | IngestError::MissingConfigError { .. }
            | IngestError::InvalidConfigValueError { .. } => {
                "Fix the environment variables listed above and restart the container"
            }
            IngestError::StorageError { .. } => {
                "Check BUCKET_ENDPOINT, BUCKET_NAME and the bucket credentials"
            }
            IngestError::PartialFailureError { .. } => {
                "Inspect the log lines of the failed parameters"
            }
            IngestError::IoError(_) | IngestError::TaskError(_) => {
                "Check free disk space and permissions of DATA_DIR and the temp directory"
            }
            IngestError::SerializationError(_) => "Manifest serialization failed; report a bug",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Network => format!("Could not fetch forecast data: {}", self),
            ErrorCategory::Data => format!("Could not process forecast data: {}", self),
            ErrorCategory::Storage => format!("Could not store forecasts: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
