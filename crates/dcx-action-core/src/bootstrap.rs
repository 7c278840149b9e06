//! Bootstrap orchestrator
//!
//! Runs the components in order: resolve, fetch, install, pipeline, locate,
//! and poll when an AI endpoint is configured. Every fatal error aborts the
//! run; a missing scan directory and a poll timeout are reported, not raised.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::exec::ProcessRunner;
use crate::fetcher::{Artifact, ArchiveFetcher};
use crate::http::HttpTransport;
use crate::installer::{InstallMethod, Installer};
use crate::obs;
use crate::output::{OutputLocator, OutputRepository, ScanLocation};
use crate::pipeline::PipelineRunner;
use crate::poller::{HttpStatusCheck, PollOutcome, ResultPoller};
use crate::resolver::DownloadDescriptor;
use crate::Result;

/// What was downloaded, without the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    pub file_name: String,
    pub source_url: String,
    pub bytes: usize,
    pub sha256: String,
}

impl From<&Artifact> for ArtifactSummary {
    fn from(artifact: &Artifact) -> Self {
        ArtifactSummary {
            file_name: artifact.file_name.clone(),
            source_url: artifact.source_url.clone(),
            bytes: artifact.len(),
            sha256: artifact.sha256(),
        }
    }
}

/// Result of a completed bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BootstrapReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Resolved download URL, before any envelope indirection
    pub install_url: String,
    pub artifact: ArtifactSummary,
    pub install_method: InstallMethod,
    pub pipeline_exit_code: i32,
    pub output_root: PathBuf,
    pub scan: ScanLocation,
    /// `None` when no AI endpoint was configured
    pub poll: Option<PollOutcome>,
}

impl BootstrapReport {
    /// Human-readable result lines for the CI log.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "[dcx-action] installed dcx from {} via {}",
                self.install_url, self.install_method
            ),
            format!(
                "[dcx-action] artifact {} sha256={} ({} bytes)",
                self.artifact.file_name, self.artifact.sha256, self.artifact.bytes
            ),
        ];

        lines.push(match &self.scan {
            ScanLocation::Found { path, .. } => {
                format!("[dcx-action] scan output: {}", path.display())
            }
            ScanLocation::NotFound => format!(
                "[dcx-action] no dcx-scan-* directory found under {}",
                self.output_root.display()
            ),
        });

        match &self.poll {
            Some(PollOutcome::Succeeded { attempts, payload }) => lines.push(format!(
                "[dcx-action] AI analysis completed after {attempts} check(s): {payload}"
            )),
            Some(PollOutcome::Failed { attempts, reason }) => lines.push(format!(
                "[dcx-action] AI analysis failed after {attempts} check(s): {reason}"
            )),
            Some(PollOutcome::TimedOut { attempts }) => lines.push(format!(
                "[dcx-action] AI analysis still pending after {attempts} check(s)"
            )),
            None => {}
        }
        lines
    }
}

struct Step {
    name: &'static str,
    started: Instant,
}

impl Step {
    fn start(name: &'static str) -> Self {
        obs::emit_step_started(name);
        Step {
            name,
            started: Instant::now(),
        }
    }

    fn finish(self) {
        obs::emit_step_finished(self.name, self.started.elapsed().as_millis() as u64);
    }
}

/// Wires the components to concrete I/O.
pub struct Bootstrap<'a> {
    transport: &'a dyn HttpTransport,
    runner: &'a dyn ProcessRunner,
    outputs: &'a dyn OutputRepository,
}

impl<'a> Bootstrap<'a> {
    pub fn new(
        transport: &'a dyn HttpTransport,
        runner: &'a dyn ProcessRunner,
        outputs: &'a dyn OutputRepository,
    ) -> Self {
        Bootstrap {
            transport,
            runner,
            outputs,
        }
    }

    /// Load the configuration through `lookup`, then [`run`](Self::run).
    ///
    /// A configuration error returns before the transport or the process
    /// runner is used.
    pub async fn run_from_lookup<F>(&self, cwd: &Path, lookup: F) -> Result<BootstrapReport>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Config::from_lookup(cwd, lookup)?;
        self.run(&config).await
    }

    pub async fn run(&self, config: &Config) -> Result<BootstrapReport> {
        let _span = obs::BootstrapSpan::enter(&config.tag);
        let started_at = Utc::now();

        config.validate()?;

        let step = Step::start("resolve");
        let descriptor = DownloadDescriptor::from_config(config)?;
        let install_url = descriptor.url.clone();
        step.finish();

        let step = Step::start("fetch");
        let artifact = ArchiveFetcher::new(self.transport, config.asset_regex()?)
            .fetch(descriptor)
            .await?;
        let summary = ArtifactSummary::from(&artifact);
        obs::emit_artifact_fetched(&summary.source_url, summary.bytes, &summary.sha256);
        step.finish();

        let step = Step::start("install");
        let install_method = Installer::new(self.runner).install(&artifact).await?;
        info!(method = %install_method, "dcx installed");
        step.finish();

        let step = Step::start("pipeline");
        let output = PipelineRunner::new(self.runner)
            .run(config, install_method)
            .await?;
        step.finish();

        let step = Step::start("locate");
        let output_root = config.output_root();
        let scan = OutputLocator::new(self.outputs).locate(&output_root);
        match &scan {
            ScanLocation::Found { path, .. } => info!(path = %path.display(), "Scan output located"),
            ScanLocation::NotFound => {
                info!(root = %output_root.display(), "No scan output directory found")
            }
        }
        step.finish();

        let poll = match &config.ai_endpoint {
            Some(endpoint) => {
                let step = Step::start("poll");
                let check = HttpStatusCheck::new(
                    self.transport,
                    endpoint,
                    config.ai_api_key.as_deref(),
                    scan.scan_id(),
                )?;
                let outcome = ResultPoller::new(config.poll_policy()).poll(&check).await?;
                step.finish();
                Some(outcome)
            }
            None => {
                info!("AI_ENDPOINT not set, skipping result polling");
                None
            }
        };

        Ok(BootstrapReport {
            started_at,
            finished_at: Utc::now(),
            install_url,
            artifact: summary,
            install_method,
            pipeline_exit_code: output.exit_code,
            output_root,
            scan,
            poll,
        })
    }
}
