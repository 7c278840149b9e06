//! Structured observability hooks for the bootstrap lifecycle.
//!
//! This module provides:
//! - A bootstrap-scoped tracing span via the `BootstrapSpan` RAII guard
//! - Emission functions for step start/finish, installer fallback and poll attempts
//!
//! Events are emitted at `info!` level (`warn!` for the installer fallback).
//! Pass `--json` to the binary, or set `DCX_LOG_JSON`, for JSON output.

use tracing::{info, warn};

/// RAII guard that enters the `dcx.bootstrap` span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = BootstrapSpan::enter("latest");
/// // every event in the run now carries tag = "latest"
/// ```
pub struct BootstrapSpan {
    _span: tracing::span::EnteredSpan,
}

impl BootstrapSpan {
    pub fn enter(tag: &str) -> Self {
        let span = tracing::info_span!("dcx.bootstrap", tag = %tag);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a bootstrap step started.
pub fn emit_step_started(step: &str) {
    info!(event = "bootstrap.step_started", step = %step);
}

/// Emit event: a bootstrap step finished.
pub fn emit_step_finished(step: &str, duration_ms: u64) {
    info!(
        event = "bootstrap.step_finished",
        step = %step,
        duration_ms = duration_ms,
    );
}

/// Emit event: the primary installer failed and the fallback is about to run.
pub fn emit_install_fallback(reason: &str) {
    warn!(event = "install.fallback", reason = %reason);
}

/// Emit event: one status check completed.
pub fn emit_poll_attempt(attempt: u32, max_attempts: u32, status: &str) {
    info!(
        event = "poll.attempt",
        attempt = attempt,
        max_attempts = max_attempts,
        status = %status,
    );
}

/// Emit event: the artifact was downloaded.
pub fn emit_artifact_fetched(source_url: &str, bytes: usize, sha256: &str) {
    info!(
        event = "artifact.fetched",
        source_url = %source_url,
        bytes = bytes,
        sha256 = %sha256,
    );
}
