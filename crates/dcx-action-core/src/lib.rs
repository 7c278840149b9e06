//! dcx-action core: CI bootstrap for the dcx scanner
//!
//! Downloads a released dcx build, installs it, runs its full pipeline against
//! a repository, finds the scan output and optionally waits on the AI
//! analysis. I/O sits behind the `HttpTransport`, `ProcessRunner`,
//! `OutputRepository` and `StatusCheck` traits; [`fakes`] has in-memory
//! implementations for tests.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod exec;
pub mod fakes;
pub mod fetcher;
pub mod http;
pub mod installer;
pub mod obs;
pub mod output;
pub mod pipeline;
pub mod poller;
pub mod resolver;
pub mod telemetry;

pub use bootstrap::{ArtifactSummary, Bootstrap, BootstrapReport};
pub use config::Config;
pub use error::{BootstrapError, ErrorCategory};
pub use exec::{CommandSpec, ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use fetcher::{ArchiveFetcher, Artifact, Envelope, FetchResult};
pub use http::{HttpResponse, HttpTransport, ReqwestTransport};
pub use installer::{InstallMethod, Installer};
pub use obs::{
    emit_artifact_fetched, emit_install_fallback, emit_poll_attempt, emit_step_finished,
    emit_step_started, BootstrapSpan,
};
pub use output::{FsOutputRepository, OutputLocator, OutputRepository, ScanLocation};
pub use pipeline::PipelineRunner;
pub use poller::{
    HttpStatusCheck, PollOutcome, PollPolicy, PollStatus, ResultPoller, StatusCheck,
    StatusVocabulary,
};
pub use resolver::{resolve_download_url, DownloadDescriptor};
pub use telemetry::init_tracing;

/// Result type for bootstrap operations
pub type Result<T> = std::result::Result<T, BootstrapError>;
