//! In-memory fakes for the I/O seams (testing only)
//!
//! Provides `FakeTransport`, `FakeProcessRunner`, `MemoryOutputRepository`
//! and `ScriptedStatusCheck`, which satisfy the trait contracts without
//! touching the network, spawning processes, or reading the filesystem.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{Config, DEFAULT_ASSET_PATTERN, DEFAULT_TAG};
use crate::error::BootstrapError;
use crate::exec::{CommandSpec, ProcessOutput, ProcessRunner};
use crate::http::{HttpResponse, HttpTransport};
use crate::output::OutputRepository;
use crate::poller::{PollStatus, StatusCheck};
use crate::Result;

/// Config rooted at `/work` with a test token and AI polling disabled.
pub fn test_config() -> Config {
    Config {
        base_url: None,
        tag: DEFAULT_TAG.to_string(),
        repo_path: PathBuf::from("/work/repo"),
        scanner_dir: PathBuf::from("/work/scanner"),
        max_checks: 3,
        delay: Duration::ZERO,
        ai_endpoint: None,
        ai_api_key: None,
        token: "test-token".to_string(),
        asset_pattern: DEFAULT_ASSET_PATTERN.to_string(),
        http_timeout: Duration::from_secs(5),
    }
}

// ---------------------------------------------------------------------------
// FakeTransport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Reply {
    Response(HttpResponse),
    ConnectionError(String),
}

/// A request observed by [`FakeTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// URL-routed HTTP fake.
///
/// Each URL holds a queue of replies; the last reply repeats once the queue
/// is down to one. Unrouted URLs fail like a refused connection.
#[derive(Debug, Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, url: &str, reply: Reply) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// 200 with the given content type and body.
    pub fn binary(self, url: &str, content_type: &str, body: &[u8]) -> Self {
        self.push(
            url,
            Reply::Response(HttpResponse {
                status: 200,
                content_type: Some(content_type.to_string()),
                content_disposition: None,
                body: body.to_vec(),
            }),
        )
    }

    /// 200 `application/json`.
    pub fn json(self, url: &str, body: Value) -> Self {
        self.push(
            url,
            Reply::Response(HttpResponse {
                status: 200,
                content_type: Some("application/json".to_string()),
                content_disposition: None,
                body: body.to_string().into_bytes(),
            }),
        )
    }

    /// Arbitrary status with a plain-text body.
    pub fn status(self, url: &str, status: u16, body: &[u8]) -> Self {
        self.push(
            url,
            Reply::Response(HttpResponse {
                status,
                content_type: Some("text/plain".to_string()),
                content_disposition: None,
                body: body.to_vec(),
            }),
        )
    }

    /// Full control over the response.
    pub fn response(self, url: &str, response: HttpResponse) -> Self {
        self.push(url, Reply::Response(response))
    }

    pub fn connection_error(self, url: &str, message: &str) -> Self {
        self.push(url, Reply::ConnectionError(message.to_string()))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            headers: headers.to_vec(),
        });

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::ConnectionError(message)) => Err(BootstrapError::Transport(message)),
            None => Err(BootstrapError::Transport(format!(
                "connection refused: no route for {url}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeProcessRunner
// ---------------------------------------------------------------------------

/// Scripted result for one program.
#[derive(Debug, Clone)]
pub struct ScriptedProcess {
    /// `None` means the program cannot be spawned.
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl ScriptedProcess {
    pub fn exit(code: i32) -> Self {
        ScriptedProcess {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn not_found() -> Self {
        ScriptedProcess {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn stdout(mut self, text: &str) -> Self {
        self.stdout = text.to_string();
        self
    }

    pub fn stderr(mut self, text: &str) -> Self {
        self.stderr = text.to_string();
        self
    }
}

/// Program-keyed process fake that records every command it receives.
///
/// Scripts queue per program like [`FakeTransport`] routes. Unscripted
/// programs are reported as not found.
#[derive(Debug, Default)]
pub struct FakeProcessRunner {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedProcess>>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl FakeProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, program: &str, script: ScriptedProcess) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(program.to_string())
            .or_default()
            .push_back(script);
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.program == program)
            .count()
    }
}

#[async_trait]
impl ProcessRunner for FakeProcessRunner {
    async fn run(&self, command: &CommandSpec) -> std::io::Result<ProcessOutput> {
        self.calls.lock().unwrap().push(command.clone());

        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&command.program) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match script.and_then(|s| s.exit_code.map(|code| (code, s))) {
            Some((exit_code, script)) => Ok(ProcessOutput {
                exit_code,
                stdout: script.stdout,
                stderr: script.stderr,
                duration_ms: 0,
            }),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: command not found", command.program),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryOutputRepository
// ---------------------------------------------------------------------------

/// Output tree held in a `HashMap<root, dir names>`.
#[derive(Debug, Default)]
pub struct MemoryOutputRepository {
    dirs: HashMap<PathBuf, Vec<String>>,
}

impl MemoryOutputRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dir(mut self, root: impl Into<PathBuf>, name: &str) -> Self {
        self.dirs.entry(root.into()).or_default().push(name.to_string());
        self
    }
}

impl OutputRepository for MemoryOutputRepository {
    fn list_dirs(&self, root: &Path) -> std::io::Result<Vec<String>> {
        self.dirs.get(root).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", root.display()),
            )
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedStatusCheck
// ---------------------------------------------------------------------------

/// Replays a fixed sequence of statuses; the last one repeats.
#[derive(Debug)]
pub struct ScriptedStatusCheck {
    statuses: Vec<PollStatus>,
    failure: Mutex<Option<BootstrapError>>,
    calls: AtomicU32,
}

impl ScriptedStatusCheck {
    pub fn new(statuses: Vec<PollStatus>) -> Self {
        ScriptedStatusCheck {
            statuses,
            failure: Mutex::new(None),
            calls: AtomicU32::new(0),
        }
    }

    /// A check whose first call fails with `error`.
    pub fn failing(error: BootstrapError) -> Self {
        ScriptedStatusCheck {
            statuses: vec![PollStatus::Pending],
            failure: Mutex::new(Some(error)),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusCheck for ScriptedStatusCheck {
    async fn check(&self, attempt: u32) -> Result<PollStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failure.lock().unwrap().take() {
            return Err(error);
        }
        let index = (attempt as usize)
            .saturating_sub(1)
            .min(self.statuses.len().saturating_sub(1));
        Ok(self
            .statuses
            .get(index)
            .cloned()
            .unwrap_or(PollStatus::Pending))
    }
}
