use crate::config::IngestConfig;
use crate::core::Storage;
use crate::utils::error::{IngestError, Result};
use crate::utils::validation::validate_required_field;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{
    Credentials, Region, RequestChecksumCalculation, ResponseChecksumValidation,
};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use url::Url;

#[derive(Debug, Clone)]
pub struct S3Storage {
    client: S3Client,
    bucket: String,
    endpoint: Url,
    path_style: bool,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String, endpoint: Url, path_style: bool) -> Self {
        Self {
            client,
            bucket,
            endpoint,
            path_style,
        }
    }

    /// Builds a client for an S3-compatible store from static credentials.
    pub async fn connect(config: &IngestConfig) -> Result<Self> {
        let bucket = validate_required_field("bucket_name", &config.bucket_name)?.clone();
        let key = validate_required_field("bucket_key", &config.bucket_key)?;
        let secret = validate_required_field("bucket_secret", &config.bucket_secret)?;
        let endpoint = Url::parse(&config.bucket_endpoint).map_err(|e| {
            IngestError::InvalidConfigValueError {
                field: "bucket_endpoint".to_string(),
                value: config.bucket_endpoint.clone(),
                reason: e.to_string(),
            }
        })?;

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.bucket_region.clone()))
            .endpoint_url(config.bucket_endpoint.clone())
            .credentials_provider(Credentials::new(
                key.clone(),
                secret.clone(),
                None,
                None,
                "dmi-ingest",
            ))
            .load()
            .await;

        // S3 相容儲存 (OBS、MinIO) 不接受 SDK 預設附加的 CRC 校驗
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.bucket_path_style)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
            .build();

        tracing::debug!(
            "S3 client ready for bucket {} at {}",
            bucket,
            config.bucket_endpoint
        );

        Ok(Self::new(
            S3Client::from_conf(s3_config),
            bucket,
            endpoint,
            config.bucket_path_style,
        ))
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                IngestError::storage(format!(
                    "Failed to list {}/{}: {}",
                    self.bucket,
                    prefix,
                    DisplayErrorContext(&e)
                ))
            })?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );
        }

        Ok(keys)
    }
}

fn content_type(path: &str) -> &'static str {
    if path.ends_with(".tif") {
        "image/tiff"
    } else if path.ends_with(".json") {
        "application/json"
    } else {
        "application/octet-stream"
    }
}

/// Public address of an object, virtual-hosted style unless path style is forced.
pub fn public_object_url(endpoint: &Url, bucket: &str, key: &str, path_style: bool) -> String {
    let base = endpoint.as_str().trim_end_matches('/');
    if path_style {
        return format!("{}/{}/{}", base, bucket, key);
    }

    let host = match (endpoint.host_str(), endpoint.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => return format!("{}/{}/{}", base, bucket, key),
    };
    format!("{}://{}.{}/{}", endpoint.scheme(), bucket, host, key)
}

impl Storage for S3Storage {
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        tracing::debug!("Uploading {} bytes to {}/{}", data.len(), self.bucket, path);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .content_type(content_type(path))
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| {
                IngestError::storage(format!(
                    "Failed to upload {}/{}: {}",
                    self.bucket,
                    path,
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let prefix = format!("{}/", prefix.trim_end_matches('/'));
        let keys = self.list_keys(&prefix).await?;
        if keys.is_empty() {
            tracing::debug!("Nothing to delete under {}/{}", self.bucket, prefix);
            return Ok(0);
        }

        for key in &keys {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| {
                    IngestError::storage(format!(
                        "Failed to delete {}/{}: {}",
                        self.bucket,
                        key,
                        DisplayErrorContext(&e)
                    ))
                })?;
        }

        Ok(keys.len())
    }

    fn public_url(&self, path: &str) -> String {
        public_object_url(&self.endpoint, &self.bucket, path, self.path_style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use httpmock::prelude::*;
    use httpmock::HttpMockRequest;

    const PREFIX: &str = "data/dmi/forecasts/dkss_if/sea-mean-deviation";

    async fn storage(server: &MockServer) -> S3Storage {
        let config = IngestConfig::try_parse_from([
            "dmi-ingest",
            "--dmi-api-key",
            "k",
            "--bucket-endpoint",
            &server.base_url(),
            "--bucket-name",
            "forecasts",
            "--bucket-key",
            "access",
            "--bucket-secret",
            "secret",
            "--bucket-path-style",
            "true",
        ])
        .unwrap();
        S3Storage::connect(&config).await.unwrap()
    }

    fn listing(keys: &[&str], next_token: Option<&str>) -> String {
        let contents: String = keys
            .iter()
            .map(|key| format!("<Contents><Key>{}</Key><Size>1</Size></Contents>", key))
            .collect();
        let truncation = match next_token {
            Some(token) => format!(
                "<IsTruncated>true</IsTruncated><NextContinuationToken>{}</NextContinuationToken>",
                token
            ),
            None => "<IsTruncated>false</IsTruncated>".to_string(),
        };
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>forecasts</Name><KeyCount>{}</KeyCount><MaxKeys>1000</MaxKeys>{}{}</ListBucketResult>"#,
            keys.len(),
            truncation,
            contents
        )
    }

    fn has_checksum_header(req: &HttpMockRequest) -> bool {
        req.headers.as_ref().is_some_and(|headers| {
            headers
                .iter()
                .any(|(name, _)| name.to_ascii_lowercase().starts_with("x-amz-checksum-"))
        })
    }

    fn has_continuation_token(req: &HttpMockRequest) -> bool {
        req.query_params
            .as_ref()
            .is_some_and(|params| params.iter().any(|(name, _)| name == "continuation-token"))
    }

    #[tokio::test]
    async fn test_delete_prefix_walks_all_pages() {
        let server = MockServer::start();
        let first_page = server.mock(|when, then| {
            when.method(GET)
                .path_contains("/forecasts")
                .query_param("list-type", "2")
                .query_param("prefix", &format!("{}/", PREFIX))
                .matches(|req| !has_continuation_token(req));
            then.status(200)
                .header("Content-Type", "application/xml")
                .body(listing(
                    &[&format!("{}/20250101T000000.tif", PREFIX)],
                    Some("page-2"),
                ));
        });
        let second_page = server.mock(|when, then| {
            when.method(GET)
                .path_contains("/forecasts")
                .query_param("list-type", "2")
                .query_param("continuation-token", "page-2");
            then.status(200)
                .header("Content-Type", "application/xml")
                .body(listing(
                    &[
                        &format!("{}/20250101T010000.tif", PREFIX),
                        &format!("{}/forecasts.json", PREFIX),
                    ],
                    None,
                ));
        });
        let deletes = server.mock(|when, then| {
            when.method(DELETE)
                .path_contains(&format!("/forecasts/{}/", PREFIX));
            then.status(204);
        });

        let storage = storage(&server).await;
        let deleted = storage.delete_prefix(PREFIX).await.unwrap();

        assert_eq!(deleted, 3);
        first_page.assert();
        second_page.assert();
        deletes.assert_hits(3);
    }

    #[tokio::test]
    async fn test_delete_missing_prefix_is_ok() {
        let server = MockServer::start();
        let list = server.mock(|when, then| {
            when.method(GET)
                .path_contains("/forecasts")
                .query_param("prefix", "nothing/here/");
            then.status(200)
                .header("Content-Type", "application/xml")
                .body(listing(&[], None));
        });
        let deletes = server.mock(|when, then| {
            when.method(DELETE);
            then.status(204);
        });

        let storage = storage(&server).await;
        assert_eq!(storage.delete_prefix("nothing/here").await.unwrap(), 0);
        list.assert();
        deletes.assert_hits(0);
    }

    #[tokio::test]
    async fn test_upload_sends_no_checksum_headers() {
        let server = MockServer::start();
        let put = server.mock(|when, then| {
            when.method(PUT)
                .path(format!("/forecasts/{}/forecasts.json", PREFIX))
                .matches(|req| !has_checksum_header(req));
            then.status(200).header("ETag", "\"abc\"");
        });

        let storage = storage(&server).await;
        storage
            .write_file(&format!("{}/forecasts.json", PREFIX), b"{}")
            .await
            .unwrap();

        put.assert();
        assert_eq!(
            storage.public_url("a.tif"),
            format!("{}/forecasts/a.tif", server.base_url())
        );
    }

    #[test]
    fn test_virtual_hosted_url() {
        let endpoint = Url::parse("https://obs.eu-de.otc.t-systems.com").unwrap();
        assert_eq!(
            public_object_url(&endpoint, "forecasts", "data/dmi/a.tif", false),
            "https://forecasts.obs.eu-de.otc.t-systems.com/data/dmi/a.tif"
        );
    }

    #[test]
    fn test_path_style_url_keeps_port() {
        let endpoint = Url::parse("http://localhost:9000/").unwrap();
        assert_eq!(
            public_object_url(&endpoint, "forecasts", "a.tif", true),
            "http://localhost:9000/forecasts/a.tif"
        );
        assert_eq!(
            public_object_url(&endpoint, "forecasts", "a.tif", false),
            "http://forecasts.localhost:9000/a.tif"
        );
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("x/20250101T000000.tif"), "image/tiff");
        assert_eq!(content_type("x/forecasts.json"), "application/json");
    }
}
