pub mod local;
pub mod s3;

use crate::core::ConfigProvider;
use crate::domain::model::{BoundingBox, Collection};
use crate::utils::logger::LogFormat;
use crate::utils::validation::{self, Validate};
use crate::utils::error::Result;
use clap::builder::BoolishValueParser;
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_PARAMETER: &str = "sea-mean-deviation";

fn parse_collection(value: &str) -> std::result::Result<Collection, String> {
    value.parse().map_err(|e: crate::IngestError| e.to_string())
}

fn parse_bbox(value: &str) -> std::result::Result<BoundingBox, String> {
    value.parse().map_err(|e: crate::IngestError| e.to_string())
}

/// 所有設定皆來自環境變數；旗標僅供本機除錯
#[derive(Clone, Parser)]
#[command(name = "dmi-ingest")]
#[command(about = "Ingest DMI forecast data into an S3-compatible bucket")]
pub struct IngestConfig {
    #[arg(long, env = "DMI_API_KEY", hide_env_values = true)]
    pub dmi_api_key: String,

    #[arg(
        long,
        env = "DMI_API_URL",
        default_value = "https://dmigw.govcloud.dk/v1/forecastedr"
    )]
    pub dmi_api_url: String,

    #[arg(long, env = "COLLECTION", default_value = "dkss_if", value_parser = parse_collection)]
    pub collection: Collection,

    #[arg(long, env = "PARAMETERS", value_delimiter = ',')]
    pub parameters: Vec<String>,

    /// Single-parameter variable understood by older deployments.
    #[arg(long, env = "PARAMETER", hide = true)]
    pub parameter: Option<String>,

    #[arg(long, env = "BBOX", default_value = "11.5,55.5,12.2,56.1", value_parser = parse_bbox)]
    pub bbox: BoundingBox,

    #[arg(
        long,
        env = "BUCKET_ENDPOINT",
        default_value = "https://obs.eu-de.otc.t-systems.com"
    )]
    pub bucket_endpoint: String,

    #[arg(long, env = "BUCKET_REGION", default_value = "eu-de")]
    pub bucket_region: String,

    #[arg(long, env = "BUCKET_NAME")]
    pub bucket_name: Option<String>,

    #[arg(long, env = "BUCKET_KEY", hide_env_values = true)]
    pub bucket_key: Option<String>,

    #[arg(long, env = "BUCKET_SECRET", hide_env_values = true)]
    pub bucket_secret: Option<String>,

    #[arg(long, env = "BUCKET_BASE_PATH", default_value = "data/dmi/forecasts")]
    pub bucket_base_path: String,

    #[arg(long, env = "BUCKET_PATH_STYLE", default_value = "false", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub bucket_path_style: bool,

    #[arg(long, env = "UPLOAD_TO_BUCKET", default_value = "true", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub upload_to_bucket: bool,

    #[arg(long, env = "DATA_DIR", default_value = "/app/data")]
    pub data_dir: PathBuf,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "300")]
    pub request_timeout_secs: u64,

    #[arg(long, env = "RETRY_ATTEMPTS", default_value = "2")]
    pub retry_attempts: u32,

    #[arg(long, env = "VERBOSE", default_value = "false", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub verbose: bool,

    #[arg(long, env = "MONITOR", default_value = "false", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub monitor: bool,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "compact")]
    pub log_format: LogFormat,
}

impl IngestConfig {
    /// Trims the parameter list, falls back to `PARAMETER` and then to the
    /// sea-level default, and tidies the base path.
    pub fn normalized(mut self) -> Self {
        let mut parameters = split_parameters(self.parameters.iter().map(String::as_str));
        if parameters.is_empty() {
            if let Some(legacy) = &self.parameter {
                parameters = split_parameters(legacy.split(','));
            }
        }
        if parameters.is_empty() {
            parameters.push(DEFAULT_PARAMETER.to_string());
        }
        self.parameters = parameters;
        self.bucket_base_path = self.bucket_base_path.trim_matches('/').to_string();
        self
    }
}

/// Maps a clap failure to a configuration error. Help and version requests
/// are not failures and yield `None`.
pub fn parse_failure(e: &clap::Error) -> Option<crate::IngestError> {
    match e.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => None,
        _ => {
            let rendered = e.render().to_string();
            let message = rendered
                .lines()
                .next()
                .unwrap_or_default()
                .trim_start_matches("error: ")
                .to_string();
            Some(crate::IngestError::ConfigError { message })
        }
    }
}

fn split_parameters<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut parameters: Vec<String> = Vec::new();
    for parameter in raw.map(str::trim).filter(|p| !p.is_empty()) {
        if !parameters.iter().any(|p| p == parameter) {
            parameters.push(parameter.to_string());
        }
    }
    parameters
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "***");
        f.debug_struct("IngestConfig")
            .field("dmi_api_key", &"***")
            .field("dmi_api_url", &self.dmi_api_url)
            .field("collection", &self.collection.id())
            .field("parameters", &self.parameters)
            .field("bbox", &self.bbox.to_string())
            .field("bucket_endpoint", &self.bucket_endpoint)
            .field("bucket_region", &self.bucket_region)
            .field("bucket_name", &self.bucket_name)
            .field("bucket_key", &redact(&self.bucket_key))
            .field("bucket_secret", &redact(&self.bucket_secret))
            .field("bucket_base_path", &self.bucket_base_path)
            .field("bucket_path_style", &self.bucket_path_style)
            .field("upload_to_bucket", &self.upload_to_bucket)
            .field("data_dir", &self.data_dir)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry_attempts", &self.retry_attempts)
            .finish()
    }
}

impl ConfigProvider for IngestConfig {
    fn collection(&self) -> &Collection {
        &self.collection
    }

    fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    fn parameters(&self) -> &[String] {
        &self.parameters
    }

    fn base_path(&self) -> &str {
        &self.bucket_base_path
    }
}

impl Validate for IngestConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("dmi_api_key", &self.dmi_api_key)?;
        validation::validate_url("dmi_api_url", &self.dmi_api_url)?;
        validation::validate_positive_number("request_timeout_secs", self.request_timeout_secs, 1)?;
        validation::validate_range("retry_attempts", self.retry_attempts, 0, 10)?;

        if self.parameters.is_empty() {
            return Err(crate::IngestError::MissingConfigError {
                field: "parameters".to_string(),
            });
        }
        validation::validate_path_segment("collection", self.collection.id())?;
        for parameter in &self.parameters {
            validation::validate_path_segment("parameters", parameter)?;
        }

        if self.upload_to_bucket {
            validation::validate_url("bucket_endpoint", &self.bucket_endpoint)?;
            validation::validate_non_empty_string("bucket_region", &self.bucket_region)?;
            let bucket = validation::validate_required_field("bucket_name", &self.bucket_name)?;
            validation::validate_bucket_name("bucket_name", bucket)?;
            let key = validation::validate_required_field("bucket_key", &self.bucket_key)?;
            validation::validate_non_empty_string("bucket_key", key)?;
            let secret = validation::validate_required_field("bucket_secret", &self.bucket_secret)?;
            validation::validate_non_empty_string("bucket_secret", secret)?;
        } else {
            validation::validate_path("data_dir", &self.data_dir.to_string_lossy())?;
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> IngestConfig {
        let mut argv = vec!["dmi-ingest", "--dmi-api-key", "secret-key"];
        argv.extend_from_slice(args);
        IngestConfig::try_parse_from(argv).unwrap().normalized()
    }

    #[test]
    fn test_parameters_are_split_and_trimmed() {
        let config = parse(&[
            "--parameters",
            "total-precipitation, rain-precipitation-rate,,total-precipitation",
            "--upload-to-bucket",
            "false",
        ]);
        assert_eq!(
            config.parameters(),
            &["total-precipitation", "rain-precipitation-rate"]
        );
    }

    #[test]
    fn test_legacy_parameter_fallback() {
        let config = parse(&["--parameter", "sea-mean-deviation"]);
        assert_eq!(config.parameters(), &["sea-mean-deviation"]);
    }

    #[test]
    fn test_upload_requires_bucket_settings() {
        let mut config = parse(&["--parameters", "sea-mean-deviation"]);
        config.upload_to_bucket = true;
        config.bucket_name = None;
        assert!(matches!(
            config.validate(),
            Err(crate::IngestError::MissingConfigError { .. })
        ));

        config.bucket_name = Some("forecasts".to_string());
        config.bucket_key = Some("key".to_string());
        config.bucket_secret = Some("secret".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dry_run_skips_bucket_validation() {
        let config = parse(&["--parameters", "p", "--upload-to-bucket", "no"]);
        assert!(!config.upload_to_bucket);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_bbox_is_rejected_at_parse_time() {
        let result = IngestConfig::try_parse_from([
            "dmi-ingest",
            "--dmi-api-key",
            "k",
            "--bbox",
            "1,2,3",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_failures_become_config_errors() {
        let err = IngestConfig::try_parse_from(["dmi-ingest", "--bbox", "1,2,3"]).unwrap_err();
        match parse_failure(&err) {
            Some(crate::IngestError::ConfigError { message }) => {
                assert!(message.contains("--bbox"), "message: {}", message)
            }
            other => panic!("unexpected: {:?}", other),
        }

        let err = IngestConfig::try_parse_from(["dmi-ingest", "--dmi-api-key", "k", "--collection", ""])
            .unwrap_err();
        let mapped = parse_failure(&err).unwrap();
        assert_eq!(mapped.category(), crate::utils::error::ErrorCategory::Configuration);
    }

    #[test]
    fn test_parameters_must_be_single_key_segments() {
        for bad in ["..", ".", "rain/../..", "a\\b"] {
            let config = parse(&["--parameters", bad, "--upload-to-bucket", "false"]);
            assert!(
                matches!(
                    config.validate(),
                    Err(crate::IngestError::InvalidConfigValueError { .. })
                ),
                "accepted {}",
                bad
            );
        }

        let result = IngestConfig::try_parse_from([
            "dmi-ingest",
            "--dmi-api-key",
            "k",
            "--collection",
            "..",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_help_is_not_a_config_error() {
        let err = IngestConfig::try_parse_from(["dmi-ingest", "--help"]).unwrap_err();
        assert!(parse_failure(&err).is_none());
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let mut config = parse(&["--parameters", "p"]);
        config.bucket_secret = Some("very-secret".to_string());
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret-key"));
        assert!(!rendered.contains("very-secret"));
    }

    #[test]
    fn test_base_path_is_trimmed() {
        let config = parse(&["--parameters", "p", "--bucket-base-path", "/data/dmi/"]);
        assert_eq!(config.base_path(), "data/dmi");
    }
}
