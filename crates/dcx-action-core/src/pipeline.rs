//! Pipeline runner: `dcx full-pipeline <repo>`.

use std::io::ErrorKind;

use tracing::{info, warn};

use crate::config::{vars, Config};
use crate::error::BootstrapError;
use crate::exec::{CommandSpec, ProcessOutput, ProcessRunner};
use crate::installer::InstallMethod;
use crate::Result;

pub const TOOL_BIN: &str = "dcx";
pub const SUBCOMMAND: &str = "full-pipeline";

/// Exit code reported when no launcher could start the tool.
const NOT_STARTED_EXIT_CODE: i32 = 127;

/// `dcx full-pipeline <repo>` in the scanner directory, with AI settings
/// forwarded to the tool's environment.
pub fn pipeline_command(config: &Config) -> CommandSpec {
    with_tool_env(
        CommandSpec::new(
            TOOL_BIN,
            [
                SUBCOMMAND.to_string(),
                config.repo_path.to_string_lossy().to_string(),
            ],
        ),
        config,
    )
}

/// Module launch used when `dcx` is not on `PATH`.
///
/// The interpreter matches how the tool was installed: `uv run -m dcx` after a
/// uv tool install, `python3 -m dcx` after a user-scoped pip install (whose
/// script directory is often missing from `PATH`).
pub fn launcher_fallback_command(config: &Config, method: InstallMethod) -> CommandSpec {
    let (program, prefix): (&str, &[&str]) = match method {
        InstallMethod::UvTool => ("uv", &["run", "-m"][..]),
        InstallMethod::PipUser => ("python3", &["-m"][..]),
    };
    let args = prefix
        .iter()
        .map(|a| a.to_string())
        .chain([
            TOOL_BIN.to_string(),
            SUBCOMMAND.to_string(),
            config.repo_path.to_string_lossy().to_string(),
        ]);
    with_tool_env(CommandSpec::new(program, args), config)
}

fn with_tool_env(mut command: CommandSpec, config: &Config) -> CommandSpec {
    command = command.in_dir(&config.scanner_dir);
    if let Some(endpoint) = &config.ai_endpoint {
        command = command.env(vars::AI_ENDPOINT, endpoint);
    }
    if let Some(key) = &config.ai_api_key {
        command = command.env(vars::AI_API_KEY, key);
    }
    command
}

pub struct PipelineRunner<'a> {
    runner: &'a dyn ProcessRunner,
}

impl<'a> PipelineRunner<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        PipelineRunner { runner }
    }

    /// Run the full pipeline. Any non-zero exit is fatal.
    ///
    /// `method` picks the launcher tried when `dcx` itself cannot be spawned.
    pub async fn run(&self, config: &Config, method: InstallMethod) -> Result<ProcessOutput> {
        let command = pipeline_command(config);
        info!(command = %command, dir = %config.scanner_dir.display(), "Running dcx pipeline");

        let output = match self.runner.run(&command).await {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let fallback = launcher_fallback_command(config, method);
                warn!(command = %fallback, "dcx is not on PATH, launching as a module");
                self.runner.run(&fallback).await.map_err(|e2| BootstrapError::Pipeline {
                    exit_code: NOT_STARTED_EXIT_CODE,
                    output: format!(
                        "{TOOL_BIN} could not be started: {e}; {} launcher: {e2}",
                        fallback.program
                    ),
                })?
            }
            Err(e) => {
                return Err(BootstrapError::Pipeline {
                    exit_code: NOT_STARTED_EXIT_CODE,
                    output: format!("{TOOL_BIN} could not be started: {e}"),
                })
            }
        };

        for line in output.stdout.lines() {
            info!("dcx: {line}");
        }

        if !output.success() {
            return Err(BootstrapError::Pipeline {
                exit_code: output.exit_code,
                output: output.combined(),
            });
        }
        Ok(output)
    }
}
