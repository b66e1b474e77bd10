use crate::core::Pipeline;
use crate::utils::error::{IngestError, Result};
use crate::utils::monitor::ResourceMonitor;

/// Outcome of one run over all configured parameters.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Parameter and the location of its manifest.
    pub succeeded: Vec<(String, String)>,
    pub failed: Vec<(String, IngestError)>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn into_result(self) -> Result<Vec<(String, String)>> {
        if self.failed.is_empty() {
            Ok(self.succeeded)
        } else {
            Err(IngestError::PartialFailureError {
                failed: self.failed.into_iter().map(|(name, _)| name).collect(),
            })
        }
    }
}

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: ResourceMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: ResourceMonitor::new(monitor_enabled),
        }
    }

    /// Runs extract, transform and load for one parameter.
    pub async fn run_parameter(&self, parameter: &str) -> Result<String> {
        let payload = self.pipeline.extract(parameter).await?;
        self.monitor.log_phase(parameter, "Extract");

        let result = self.pipeline.transform(parameter, payload).await?;
        tracing::info!("Built {} GeoTIFF slices", result.slices.len());
        self.monitor.log_phase(parameter, "Transform");

        let manifest = self.pipeline.load(result).await?;
        self.monitor.log_phase(parameter, "Load");
        Ok(manifest)
    }

    /// Ingests every parameter in order; a failing parameter does not stop the others.
    pub async fn run(&self, parameters: &[String]) -> RunSummary {
        let mut summary = RunSummary::default();

        for parameter in parameters {
            tracing::info!("🚀 Start ingesting parameter '{}'", parameter);
            match self.run_parameter(parameter).await {
                Ok(manifest) => {
                    tracing::info!("✅ '{}' done, manifest at {}", parameter, manifest);
                    summary.succeeded.push((parameter.clone(), manifest));
                }
                Err(e) => {
                    tracing::error!(
                        "❌ '{}' failed: {} (Category: {:?}, Severity: {:?})",
                        parameter,
                        e,
                        e.category(),
                        e.severity()
                    );
                    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
                    summary.failed.push((parameter.clone(), e));
                }
            }
        }

        self.monitor.log_final_stats();
        summary
    }
}
