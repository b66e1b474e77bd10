use clap::Parser;
use dmi_ingest::core::etl::RunSummary;
use dmi_ingest::core::{ConfigProvider, Storage};
use dmi_ingest::config::parse_failure;
use dmi_ingest::utils::logger::{self, LogFormat};
use dmi_ingest::utils::validation::Validate;
use dmi_ingest::{
    DmiClient, EtlEngine, ForecastPipeline, IngestConfig, IngestError, LocalStorage, S3Storage,
};
use std::time::Duration;

const EXIT_CONFIG: i32 = 1;
const EXIT_PARTIAL: i32 = 2;

fn exit_with(e: &IngestError, code: i32) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    std::process::exit(code);
}

async fn ingest<S: Storage>(
    storage: S,
    config: IngestConfig,
    client: DmiClient,
) -> RunSummary {
    let parameters = config.parameters().to_vec();
    let monitor_enabled = config.monitor;
    let pipeline = ForecastPipeline::new(storage, config, client);
    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);
    engine.run(&parameters).await
}

#[tokio::main]
async fn main() {
    let config = match IngestConfig::try_parse() {
        Ok(config) => config.normalized(),
        Err(e) => match parse_failure(&e) {
            Some(err) => {
                logger::init_logger(false, LogFormat::Compact);
                let _ = e.print();
                exit_with(&err, EXIT_CONFIG);
            }
            None => e.exit(),
        },
    };

    logger::init_logger(config.verbose, config.log_format);
    tracing::info!("Start ingesting DMI data.");
    tracing::debug!("Config: {:?}", config);

    if let Err(e) = config.validate() {
        exit_with(&e, EXIT_CONFIG);
    }
    if config.monitor {
        tracing::info!("🔍 Resource monitoring enabled");
    }

    let client = match DmiClient::new(
        config.dmi_api_url.clone(),
        config.dmi_api_key.clone(),
        Duration::from_secs(config.request_timeout_secs),
        config.retry_attempts,
    ) {
        Ok(client) => client,
        Err(e) => exit_with(&e, EXIT_CONFIG),
    };

    tracing::info!(
        "Collection '{}', parameters [{}], bbox {}",
        config.collection(),
        config.parameters().join(", "),
        config.bbox()
    );

    let summary = if config.upload_to_bucket {
        let storage = match S3Storage::connect(&config).await {
            Ok(storage) => storage,
            Err(e) => exit_with(&e, EXIT_CONFIG),
        };
        ingest(storage, config, client).await
    } else {
        tracing::info!(
            "📁 UPLOAD_TO_BUCKET is off, writing results below {}",
            config.data_dir.display()
        );
        let storage = LocalStorage::new(config.data_dir.clone());
        ingest(storage, config, client).await
    };

    match summary.into_result() {
        Ok(done) => {
            tracing::info!("✅ Ingested {} parameter(s)", done.len());
        }
        Err(e) => exit_with(&e, EXIT_PARTIAL),
    }
}
