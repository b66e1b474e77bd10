use crate::utils::error::{IngestError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: &str, reason: impl Into<String>) -> IngestError {
    IngestError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => {
                if url.host_str().is_none() {
                    return Err(invalid(field_name, url_str, "URL has no host"));
                }
                Ok(())
            }
            scheme => Err(invalid(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(invalid(
            field_name,
            url_str,
            format!("Invalid URL format: {}", e),
        )),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field_name,
            &value.to_string(),
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| IngestError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            &value.to_string(),
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

/// A single key segment: no separators and no `.` or `..`.
pub fn validate_path_segment(field_name: &str, value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(field_name, value, "Value cannot be empty"));
    }
    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(invalid(field_name, value, "Value cannot contain path separators"));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(invalid(field_name, value, "Value cannot be '.' or '..'"));
    }
    Ok(())
}

/// S3 命名規則：3-63 字元、小寫英數、'-' 與 '.'
pub fn validate_bucket_name(field_name: &str, bucket_name: &str) -> Result<()> {
    if bucket_name.len() < 3 || bucket_name.len() > 63 {
        return Err(invalid(
            field_name,
            bucket_name,
            "Bucket name must be between 3 and 63 characters",
        ));
    }

    if !bucket_name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(invalid(
            field_name,
            bucket_name,
            "Bucket name can only contain lowercase letters, numbers, hyphens, and dots",
        ));
    }

    let first_last_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !first_last_ok(bucket_name.chars().next()) || !first_last_ok(bucket_name.chars().last()) {
        return Err(invalid(
            field_name,
            bucket_name,
            "Bucket name must start and end with a letter or number",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path_segment() {
        assert!(validate_path_segment("parameters", "sea-mean-deviation").is_ok());
        assert!(validate_path_segment("parameters", "a.b").is_ok());
        assert!(validate_path_segment("parameters", "..").is_err());
        assert!(validate_path_segment("parameters", ".").is_err());
        assert!(validate_path_segment("collection", "dkss_if/../x").is_err());
        assert!(validate_path_segment("collection", "a\\b").is_err());
        assert!(validate_path_segment("collection", " ").is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("dmi_api_url", "https://dmigw.govcloud.dk/v1/forecastedr").is_ok());
        assert!(validate_url("bucket_endpoint", "http://localhost:9000").is_ok());
        assert!(validate_url("dmi_api_url", "").is_err());
        assert!(validate_url("dmi_api_url", "invalid-url").is_err());
        assert!(validate_url("dmi_api_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("request_timeout_secs", 30, 1).is_ok());
        assert!(validate_positive_number("request_timeout_secs", 0, 1).is_err());
    }

    #[test]
    fn test_validate_bucket_name() {
        assert!(validate_bucket_name("bucket_name", "forecast-data.v1").is_ok());
        assert!(validate_bucket_name("bucket_name", "ab").is_err());
        assert!(validate_bucket_name("bucket_name", "Forecasts").is_err());
        assert!(validate_bucket_name("bucket_name", "-forecasts").is_err());
        assert!(validate_bucket_name("bucket_name", "forecasts.").is_err());
    }

    #[test]
    fn test_validate_required_field() {
        let present = Some("key".to_string());
        let missing: Option<String> = None;
        assert_eq!(validate_required_field("bucket_key", &present).unwrap(), "key");
        assert!(matches!(
            validate_required_field("bucket_key", &missing),
            Err(IngestError::MissingConfigError { .. })
        ));
    }
}
